// Copyright (c) 2025 - Cowboy AI, Inc.
//! Host port allocation for port forwards
//!
//! Candidates are drawn uniformly at random from the configured range until
//! one is absent from the live rule set. The range is expected to be sparse,
//! so a hit is likely within a few draws; termination is probable, not
//! guaranteed, and near exhaustion the draw count grows without bound. The
//! allocator therefore stops after `max_attempts` draws and reports
//! [`AllocationError::PortRangeExhausted`] instead of spinning.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Mutex;

use super::AllocationError;
use crate::domain::Protocol;
use crate::drivers::firewall::DnatRule;

/// Inclusive host port range handed out to fibers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub min: u16,
    pub max: u16,
}

impl PortRange {
    pub fn new(min: u16, max: u16) -> Result<Self, AllocationError> {
        if min == 0 || min > max {
            return Err(AllocationError::InvalidPortRange { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, port: u16) -> bool {
        port >= self.min && port <= self.max
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            min: 20000,
            max: 40000,
        }
    }
}

/// True iff no DNAT rule already forwards `protocol` traffic to `ip:port`
pub fn is_port_available(rules: &[DnatRule], ip: &str, port: u16, protocol: Protocol) -> bool {
    !rules.iter().any(|rule| {
        rule.protocol == protocol && rule.destination_ip == ip && rule.destination_port == port
    })
}

/// Randomised host port allocator
pub struct PortAllocator {
    range: PortRange,
    max_attempts: u32,
    rng: Mutex<StdRng>,
}

impl PortAllocator {
    pub fn new(range: PortRange, max_attempts: u32) -> Self {
        Self::with_rng(range, max_attempts, StdRng::from_entropy())
    }

    /// Deterministic allocator for tests and simulations
    pub fn seeded(range: PortRange, max_attempts: u32, seed: u64) -> Self {
        Self::with_rng(range, max_attempts, StdRng::seed_from_u64(seed))
    }

    fn with_rng(range: PortRange, max_attempts: u32, rng: StdRng) -> Self {
        Self {
            range,
            max_attempts: max_attempts.max(1),
            rng: Mutex::new(rng),
        }
    }

    pub fn range(&self) -> PortRange {
        self.range
    }

    /// Draw a host port not used by any `protocol` DNAT rule in `rules`
    pub fn find_next_port(
        &self,
        rules: &[DnatRule],
        protocol: Protocol,
    ) -> Result<u16, AllocationError> {
        let used: HashSet<u16> = rules
            .iter()
            .filter(|rule| rule.protocol == protocol)
            .map(|rule| rule.external_port)
            .collect();

        let mut rng = self
            .rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        for _ in 0..self.max_attempts {
            let candidate = rng.gen_range(self.range.min..=self.range.max);
            if !used.contains(&candidate) {
                return Ok(candidate);
            }
        }

        Err(AllocationError::PortRangeExhausted {
            protocol: protocol.to_string(),
            min: self.range.min,
            max: self.range.max,
            attempts: self.max_attempts,
        })
    }
}

impl std::fmt::Debug for PortAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortAllocator")
            .field("range", &self.range)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}
