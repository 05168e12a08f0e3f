// Copyright (c) 2025 - Cowboy AI, Inc.
//! Finite State Machine Abstractions
//!
//! Transitions are pure functions: `(State, Input) → (State, Output)`. The
//! processors never write a status without first asking the machine for the
//! resource's kind whether the move is legal.
//!
//! # Example
//!
//! ```rust
//! use cim_fabric::domain::ResourceKind;
//! use cim_fabric::events::ResourceStatus;
//! use cim_fabric::state_machine::{resource_lifecycle::ResourceLifecycle, StateMachine};
//!
//! let fiber = ResourceLifecycle::new(ResourceKind::Fiber, ResourceStatus::Queued);
//! let (next, _) = fiber.transition(&ResourceStatus::Provisioning).unwrap();
//! assert_eq!(next.status(), ResourceStatus::Provisioning);
//! assert!(!next.can_transition(&ResourceStatus::Inactive));
//! ```

pub mod resource_lifecycle;

pub use resource_lifecycle::{allowed_transitions, validate_transition, ResourceLifecycle};

/// Result of a state transition
pub type TransitionResult<S> = Result<S, TransitionError>;

/// Errors that can occur during state transitions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// Transition from current state to target state is not allowed
    #[error("Invalid {kind} transition from {from} to {to}")]
    InvalidTransition { kind: String, from: String, to: String },

    /// Precondition not met for transition
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// Business rule prevents transition
    #[error("Business rule violated: {0}")]
    BusinessRuleViolation(String),
}

/// Trait for finite state machines
pub trait StateMachine: Sized + Clone {
    /// Input type that triggers transitions
    type Input;

    /// Output type produced by transitions (use () if none)
    type Output;

    /// Attempt to transition to a new state given an input
    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)>;

    /// Check if a transition is valid without performing it
    fn can_transition(&self, input: &Self::Input) -> bool {
        self.transition(input).is_ok()
    }

    /// Get all valid inputs from current state (if enumerable)
    fn valid_inputs(&self) -> Vec<Self::Input>
    where
        Self::Input: Clone,
    {
        Vec::new()
    }
}
