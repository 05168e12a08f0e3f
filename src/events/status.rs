// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource lifecycle status shared by every managed kind

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status carried by every managed resource
///
/// Not every kind uses every state (a Fiber never goes `Inactive`); the
/// per-kind tables in [`crate::state_machine::resource_lifecycle`] say which
/// moves are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceStatus {
    /// Recorded by the API layer, waiting for the queue
    Queued,
    /// Side effects for creation/start in flight
    Provisioning,
    /// Provisioned and serving
    Active,
    /// Provisioned but stopped or detached
    Inactive,
    /// Stop in flight
    Terminating,
    /// Removal in flight
    Deleting,
    /// Removed; purged later by the retention sweeper
    Deleted,
    /// Retries exhausted; waits for an operator
    Failed,
}

impl ResourceStatus {
    pub const ALL: [ResourceStatus; 8] = [
        ResourceStatus::Queued,
        ResourceStatus::Provisioning,
        ResourceStatus::Active,
        ResourceStatus::Inactive,
        ResourceStatus::Terminating,
        ResourceStatus::Deleting,
        ResourceStatus::Deleted,
        ResourceStatus::Failed,
    ];

    /// States entered before a driver call and left once it returns
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            ResourceStatus::Provisioning | ResourceStatus::Deleting | ResourceStatus::Terminating
        )
    }

    /// Settled states from which only the API layer may request a new move
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ResourceStatus::Active | ResourceStatus::Inactive | ResourceStatus::Deleted
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Queued => "QUEUED",
            ResourceStatus::Provisioning => "PROVISIONING",
            ResourceStatus::Active => "ACTIVE",
            ResourceStatus::Inactive => "INACTIVE",
            ResourceStatus::Terminating => "TERMINATING",
            ResourceStatus::Deleting => "DELETING",
            ResourceStatus::Deleted => "DELETED",
            ResourceStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown resource status: {s}"))
    }
}
