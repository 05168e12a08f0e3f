// Copyright (c) 2025 - Cowboy AI, Inc.
//! Managed Resource Kinds
//!
//! The tag stored on every `EventResource` row. Processors locate "the Worker
//! this event concerns" by filtering an event's resources on this tag, so the
//! string form is part of the persisted format.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of record an event may point at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Virtual machine
    Worker,
    /// Network attachment point inside a zone
    Node,
    /// Virtual network segment (CIDR block + bridge)
    Zone,
    /// Port-forwarding rule towards a node
    Fiber,
    /// Reverse-proxy / dynamic DNS endpoint
    Portal,
    /// Routed path under a portal
    Transponder,
    /// Another event, used for audit back-references
    Event,
}

impl ResourceKind {
    /// Every kind carrying a lifecycle status
    pub const MANAGED: [ResourceKind; 6] = [
        ResourceKind::Worker,
        ResourceKind::Node,
        ResourceKind::Zone,
        ResourceKind::Fiber,
        ResourceKind::Portal,
        ResourceKind::Transponder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Worker => "worker",
            ResourceKind::Node => "node",
            ResourceKind::Zone => "zone",
            ResourceKind::Fiber => "fiber",
            ResourceKind::Portal => "portal",
            ResourceKind::Transponder => "transponder",
            ResourceKind::Event => "event",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "worker" => Ok(ResourceKind::Worker),
            "node" => Ok(ResourceKind::Node),
            "zone" => Ok(ResourceKind::Zone),
            "fiber" => Ok(ResourceKind::Fiber),
            "portal" => Ok(ResourceKind::Portal),
            "transponder" => Ok(ResourceKind::Transponder),
            "event" => Ok(ResourceKind::Event),
            other => Err(format!("unknown resource kind: {other}")),
        }
    }
}
