// Copyright (c) 2025 - Cowboy AI, Inc.
//! Address and Port Allocation
//!
//! - [`subnet`] - next zone CIDR block and next free host address
//! - [`port`] - free host port for a new port forward

pub mod port;
pub mod subnet;

pub use port::{is_port_available, PortAllocator, PortRange};
pub use subnet::{host_bits_for, next_cidr, next_ip};

use thiserror::Error;

/// Allocation failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("Invalid CIDR: {0}")]
    InvalidCidr(String),

    #[error("Invalid host count: {0}")]
    InvalidHostCount(u32),

    #[error("Address space exhausted after {0}")]
    AddressSpaceExhausted(String),

    #[error("No free address left in {0}")]
    SubnetExhausted(String),

    #[error("Invalid port range {min}-{max}")]
    InvalidPortRange { min: u16, max: u16 },

    #[error("No free {protocol} port found in {min}-{max} after {attempts} attempts")]
    PortRangeExhausted {
        protocol: String,
        min: u16,
        max: u16,
        attempts: u32,
    },
}
