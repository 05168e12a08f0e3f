// Copyright (c) 2025 - Cowboy AI, Inc.
//! Firewall DNAT rule model
//!
//! Port forwards live in the host's NAT table as `iptables -t nat -S`
//! lines:
//!
//! ```text
//! -A PREROUTING -p tcp -m tcp --dport 20001 -m comment --comment fabric:br-1a2b3c4d -j DNAT --to-destination 10.10.1.2:8080
//! ```
//!
//! Lines that are not DNAT rules (chain declarations, MASQUERADE, ...) are
//! ignored by [`parse_rules`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::Protocol;

/// Comment prefix tagging rules owned by the fabric
pub const RULE_COMMENT_PREFIX: &str = "fabric:";

/// One `(protocol, external port) → destination` mapping
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DnatRule {
    pub protocol: Protocol,
    pub external_port: u16,
    pub destination_ip: String,
    pub destination_port: u16,
    /// Bridge of the zone the rule belongs to, from the rule comment
    pub bridge: Option<String>,
}

impl DnatRule {
    /// Parse one rule line; `None` for anything that is not a usable DNAT rule
    pub fn parse(line: &str) -> Option<Self> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if !tokens.windows(2).any(|w| w == ["-j", "DNAT"]) {
            return None;
        }

        let value_of = |flag: &str| {
            tokens
                .windows(2)
                .find(|w| w[0] == flag)
                .map(|w| w[1].trim_matches('"'))
        };

        let protocol = value_of("-p")?.parse().ok()?;
        let external_port = value_of("--dport")?.parse().ok()?;
        let (destination_ip, destination_port) = value_of("--to-destination")?.rsplit_once(':')?;
        let destination_port = destination_port.parse().ok()?;
        let bridge = value_of("--comment")
            .and_then(|c| c.strip_prefix(RULE_COMMENT_PREFIX))
            .map(str::to_string);

        Some(Self {
            protocol,
            external_port,
            destination_ip: destination_ip.to_string(),
            destination_port,
            bridge,
        })
    }
}

impl fmt::Display for DnatRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "-A PREROUTING -p {proto} -m {proto} --dport {port}",
            proto = self.protocol,
            port = self.external_port
        )?;
        if let Some(bridge) = &self.bridge {
            write!(f, " -m comment --comment {RULE_COMMENT_PREFIX}{bridge}")?;
        }
        write!(
            f,
            " -j DNAT --to-destination {}:{}",
            self.destination_ip, self.destination_port
        )
    }
}

/// Parse every DNAT rule out of a rule-set dump
pub fn parse_rules(dump: &str) -> Vec<DnatRule> {
    dump.lines().filter_map(DnatRule::parse).collect()
}
