// Copyright (c) 2025 - Cowboy AI, Inc.
//! Error types for fabric operations

use thiserror::Error;

use crate::allocator::AllocationError;
use crate::domain::NetworkError;
use crate::drivers::DriverError;
use crate::state_machine::TransitionError;

/// Errors that can occur while provisioning fabric resources
#[derive(Debug, Error)]
pub enum FabricError {
    /// Resource store error
    #[error("Store error: {0}")]
    Store(String),

    /// An external driver call failed
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// Subnet, address or port allocation failed
    #[error("Allocation error: {0}")]
    Allocation(#[from] AllocationError),

    /// A stored address, block or MAC failed to parse
    #[error("Network value error: {0}")]
    Network(#[from] NetworkError),

    /// A lifecycle transition was rejected by the state machine
    #[error("Transition error: {0}")]
    Transition(#[from] TransitionError),

    /// A record expected to exist was not found
    #[error("{kind} {id} not found")]
    NotFound { kind: String, id: String },

    /// Notification delivery error
    #[error("Notification error: {0}")]
    Notification(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Generic fabric error
    #[error("Fabric error: {0}")]
    Generic(String),
}

/// Result type for fabric operations
pub type FabricResult<T> = Result<T, FabricError>;

impl From<serde_json::Error> for FabricError {
    fn from(err: serde_json::Error) -> Self {
        FabricError::Serialization(err.to_string())
    }
}

impl From<async_nats::Error> for FabricError {
    fn from(err: async_nats::Error) -> Self {
        FabricError::Notification(err.to_string())
    }
}
