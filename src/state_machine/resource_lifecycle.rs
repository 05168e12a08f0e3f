// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Lifecycle State Machine
//!
//! One shared [`ResourceStatus`] enum, one allowed-transition table per
//! [`ResourceKind`]. Every status write made by a processor is validated here
//! rather than ad hoc in each processor.
//!
//! # Common shape
//!
//! ```text
//!            ┌──────────────► PROVISIONING ──► ACTIVE / INACTIVE
//!  QUEUED ───┼──────────────► TERMINATING  ──► INACTIVE          (worker)
//!    ▲       └──────────────► DELETING     ──► DELETED
//!    │                          │
//!    └──── revert (retry) ◄─────┴──► FAILED (retries exhausted) ──► QUEUED (operator)
//! ```
//!
//! Settled states (`ACTIVE`, `INACTIVE`) only move back to `QUEUED`, which is
//! how the API layer requests a new operation. `DELETED` is final.

use super::{StateMachine, TransitionError, TransitionResult};
use crate::domain::ResourceKind;
use crate::events::ResourceStatus;

use ResourceStatus::*;

const NONE: &[ResourceStatus] = &[];

fn worker_table(from: ResourceStatus) -> &'static [ResourceStatus] {
    match from {
        Queued => &[Provisioning, Terminating, Deleting],
        Provisioning => &[Active, Inactive, Queued, Failed],
        Terminating => &[Inactive, Queued, Failed],
        Deleting => &[Deleted, Queued, Failed],
        Active | Inactive | Failed => &[Queued],
        Deleted => NONE,
    }
}

fn node_table(from: ResourceStatus) -> &'static [ResourceStatus] {
    match from {
        Queued => &[Provisioning, Deleting],
        Provisioning => &[Active, Inactive, Queued, Failed],
        Deleting => &[Deleted, Queued, Failed],
        Active | Inactive | Failed => &[Queued],
        Terminating | Deleted => NONE,
    }
}

fn zone_table(from: ResourceStatus) -> &'static [ResourceStatus] {
    match from {
        Queued => &[Provisioning, Deleting],
        Provisioning => &[Active, Queued, Failed],
        Deleting => &[Deleted, Queued, Failed],
        Active | Failed => &[Queued],
        Inactive | Terminating | Deleted => NONE,
    }
}

/// Fibers, portals and transponders: re-provisioned in place while active
fn endpoint_table(from: ResourceStatus) -> &'static [ResourceStatus] {
    match from {
        Queued => &[Provisioning, Deleting],
        Provisioning => &[Active, Queued, Failed],
        Active => &[Provisioning, Queued],
        Deleting => &[Deleted, Queued, Failed],
        Failed => &[Queued],
        Inactive | Terminating | Deleted => NONE,
    }
}

/// States a resource of `kind` may legally move to from `from`
pub fn allowed_transitions(kind: ResourceKind, from: ResourceStatus) -> &'static [ResourceStatus] {
    match kind {
        ResourceKind::Worker => worker_table(from),
        ResourceKind::Node => node_table(from),
        ResourceKind::Zone => zone_table(from),
        ResourceKind::Fiber | ResourceKind::Portal | ResourceKind::Transponder => {
            endpoint_table(from)
        }
        ResourceKind::Event => NONE,
    }
}

/// Validate a single status write
pub fn validate_transition(
    kind: ResourceKind,
    from: ResourceStatus,
    to: ResourceStatus,
) -> TransitionResult<()> {
    if allowed_transitions(kind, from).contains(&to) {
        Ok(())
    } else {
        Err(TransitionError::InvalidTransition {
            kind: kind.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Lifecycle of one resource, as a Mealy machine over target statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLifecycle {
    kind: ResourceKind,
    status: ResourceStatus,
}

/// Transition output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionOutput {
    /// The resource needs an operator (moved to `FAILED`)
    pub is_critical: bool,
}

impl ResourceLifecycle {
    pub fn new(kind: ResourceKind, status: ResourceStatus) -> Self {
        Self { kind, status }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn status(&self) -> ResourceStatus {
        self.status
    }
}

impl StateMachine for ResourceLifecycle {
    type Input = ResourceStatus;
    type Output = TransitionOutput;

    fn transition(&self, target: &ResourceStatus) -> TransitionResult<(Self, Self::Output)> {
        validate_transition(self.kind, self.status, *target)?;
        Ok((
            Self::new(self.kind, *target),
            TransitionOutput {
                is_critical: *target == Failed,
            },
        ))
    }

    fn valid_inputs(&self) -> Vec<ResourceStatus> {
        allowed_transitions(self.kind, self.status).to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(ResourceKind::Worker, Queued, Provisioning ; "worker create")]
    #[test_case(ResourceKind::Worker, Provisioning, Inactive ; "worker created stopped")]
    #[test_case(ResourceKind::Worker, Queued, Terminating ; "worker terminate")]
    #[test_case(ResourceKind::Node, Provisioning, Inactive ; "node unassigned")]
    #[test_case(ResourceKind::Fiber, Active, Provisioning ; "fiber update")]
    #[test_case(ResourceKind::Zone, Deleting, Deleted ; "zone deleted")]
    #[test_case(ResourceKind::Portal, Failed, Queued ; "operator requeue")]
    fn test_allowed(kind: ResourceKind, from: ResourceStatus, to: ResourceStatus) {
        assert!(validate_transition(kind, from, to).is_ok());
    }

    #[test_case(ResourceKind::Fiber, Provisioning, Inactive ; "fiber never inactive")]
    #[test_case(ResourceKind::Zone, Queued, Terminating ; "zone never terminates")]
    #[test_case(ResourceKind::Worker, Queued, Active ; "must pass through provisioning")]
    #[test_case(ResourceKind::Node, Deleted, Queued ; "deleted is final")]
    #[test_case(ResourceKind::Event, Queued, Provisioning ; "events have no lifecycle")]
    fn test_rejected(kind: ResourceKind, from: ResourceStatus, to: ResourceStatus) {
        assert!(matches!(
            validate_transition(kind, from, to),
            Err(TransitionError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_every_in_progress_state_can_revert_or_fail() {
        for kind in ResourceKind::MANAGED {
            for from in ResourceStatus::ALL.iter().filter(|s| s.is_in_progress()) {
                let allowed = allowed_transitions(kind, *from);
                if allowed.is_empty() {
                    continue;
                }
                assert!(allowed.contains(&Queued), "{kind} {from} cannot revert");
                assert!(allowed.contains(&Failed), "{kind} {from} cannot fail");
            }
        }
    }

    #[test]
    fn test_failed_transition_is_critical() {
        let lifecycle = ResourceLifecycle::new(ResourceKind::Worker, Provisioning);
        let (next, output) = lifecycle.transition(&Failed).unwrap();
        assert_eq!(next.status(), Failed);
        assert!(output.is_critical);
    }

    #[test]
    fn test_valid_inputs_match_table() {
        let lifecycle = ResourceLifecycle::new(ResourceKind::Zone, Queued);
        assert_eq!(lifecycle.valid_inputs(), vec![Provisioning, Deleting]);
    }
}
