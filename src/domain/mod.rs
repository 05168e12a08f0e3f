// Copyright (c) 2025 - Cowboy AI, Inc.
//! Fabric Domain Models
//!
//! # Value Objects with Invariants
//!
//! - [`Ipv4Cidr`] - IPv4 block, network address normalised
//! - [`MacAddress`] - 48-bit MAC address validation
//! - [`Protocol`] - transport protocol of a port forward
//! - [`ResourceKind`] - tag identifying what an event points at
//!
//! # Entities
//!
//! [`Worker`], [`Node`], [`Zone`], [`Fiber`], [`Portal`], [`Transponder`], all
//! implementing [`ManagedResource`].

pub mod network;
pub mod resource_type;
pub mod resources;

pub use network::{int_to_ip, ip_to_int, Ipv4Cidr, MacAddress, NetworkError, Protocol};
pub use resource_type::ResourceKind;
pub use resources::{
    Fiber, ManagedResource, Node, Portal, Transponder, TransponderTarget, Worker, Zone,
};
