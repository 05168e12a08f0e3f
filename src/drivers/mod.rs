// Copyright (c) 2025 - Cowboy AI, Inc.
//! External System Drivers
//!
//! Drivers are the only place external state changes. Every call is awaited
//! before the processor moves the resource on; there is no fire-and-forget
//! driver call on the success path.
//!
//! ```text
//! EventProcessor ──▶ HypervisorDriver   (VM lifecycle)
//!                ──▶ NetworkDriver      (bridges, DHCP reservations, DNAT rules)
//!                ──▶ DnsProxyDriver     (dynamic DNS records, reverse proxy)
//! ```
//!
//! The firewall rule set and reservation files behind [`NetworkDriver`] are
//! shared, non-transactional stores: each add/remove is a read-modify-persist
//! of the whole set. That is only safe because the queue runs one event at a
//! time.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::allocator::{is_port_available, AllocationError, PortAllocator};
use crate::domain::{Ipv4Cidr, MacAddress, Portal, Protocol};

#[cfg(feature = "dynamic-dns")]
pub mod dynamic_dns;
pub mod firewall;
pub mod memory;
pub mod proxy;

pub use firewall::DnatRule;
pub use proxy::ProxyRoute;

/// Driver failures; always treated as retryable hard failures
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("{operation} failed: {message}")]
    CommandFailed { operation: String, message: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Unknown {kind}: {id}")]
    NotFound { kind: String, id: String },

    #[error("Port allocation failed: {0}")]
    Allocation(#[from] AllocationError),
}

impl From<std::io::Error> for DriverError {
    fn from(err: std::io::Error) -> Self {
        DriverError::Io(err.to_string())
    }
}

pub type DriverResult<T> = Result<T, DriverError>;

/// Everything the hypervisor needs to define a new instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSpec {
    pub id: Uuid,
    pub name: String,
    pub mac: MacAddress,
    pub image: String,
    pub flavor: String,
    pub ssh_keys: Vec<String>,
}

/// VM lifecycle
#[async_trait]
pub trait HypervisorDriver: Send + Sync {
    /// Make `image` available locally; `false` if it cannot be obtained
    async fn ensure_image(&self, image: &str) -> DriverResult<bool>;

    async fn create_instance(&self, spec: &InstanceSpec) -> DriverResult<()>;

    async fn start(&self, id: Uuid) -> DriverResult<()>;

    /// Graceful shutdown
    async fn stop(&self, id: Uuid) -> DriverResult<()>;

    /// Hard power-off
    async fn force_stop(&self, id: Uuid) -> DriverResult<()>;

    async fn delete(&self, id: Uuid) -> DriverResult<()>;

    async fn is_running(&self, id: Uuid) -> DriverResult<bool>;

    /// Point the instance's NIC at `bridge` with `mac`; `None`s detach it
    async fn edit_network_attachment(
        &self,
        id: Uuid,
        bridge: Option<&str>,
        mac: Option<&MacAddress>,
    ) -> DriverResult<()>;

    /// Host-side name of the instance's virtual NIC on `bridge`, if any
    async fn virtual_nic_name(&self, id: Uuid, bridge: &str) -> DriverResult<Option<String>>;
}

/// One DNAT port forward
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortForward {
    pub bridge_id: String,
    pub protocol: Protocol,
    pub host_port: u16,
    pub target_ip: String,
    pub target_port: u16,
}

impl PortForward {
    pub fn to_rule(&self) -> DnatRule {
        DnatRule {
            protocol: self.protocol,
            external_port: self.host_port,
            destination_ip: self.target_ip.clone(),
            destination_port: self.target_port,
            bridge: Some(self.bridge_id.clone()),
        }
    }
}

/// Bridges, DHCP reservations and the NAT rule set
#[async_trait]
pub trait NetworkDriver: Send + Sync {
    async fn create_zone(&self, cidr: &Ipv4Cidr, bridge_id: &str) -> DriverResult<()>;

    async fn delete_zone(&self, bridge_id: &str, cidr: &Ipv4Cidr) -> DriverResult<()>;

    async fn add_reservation(&self, bridge_id: &str, mac: &MacAddress, ip: &str)
        -> DriverResult<()>;

    async fn remove_reservation(&self, bridge_id: &str, mac: &MacAddress) -> DriverResult<()>;

    async fn attach_nic(&self, nic: &str, bridge_id: &str) -> DriverResult<()>;

    async fn detach_nic(&self, nic: &str, bridge_id: &str) -> DriverResult<()>;

    async fn add_port_forward(&self, forward: &PortForward) -> DriverResult<()>;

    async fn remove_port_forward(&self, forward: &PortForward) -> DriverResult<()>;

    /// Current DNAT rules, re-read from the live rule set
    async fn dnat_rules(&self) -> DriverResult<Vec<DnatRule>>;

    /// Allocator used by [`NetworkDriver::find_next_port`]
    fn port_allocator(&self) -> &PortAllocator;

    /// True iff no rule already forwards `protocol` traffic to `ip:port`
    async fn is_port_available(&self, ip: &str, port: u16, protocol: Protocol) -> DriverResult<bool> {
        let rules = self.dnat_rules().await?;
        Ok(is_port_available(&rules, ip, port, protocol))
    }

    /// Free host port for a new `protocol` forward
    async fn find_next_port(&self, protocol: Protocol) -> DriverResult<u16> {
        let rules = self.dnat_rules().await?;
        Ok(self.port_allocator().find_next_port(&rules, protocol)?)
    }
}

/// Dynamic DNS records and the reverse proxy
#[async_trait]
pub trait DnsProxyDriver: Send + Sync {
    async fn upsert_dynamic_dns_record(&self, domain: &str, ip: &str, api_key: &str)
        -> DriverResult<()>;

    /// Write the portal's proxy config and reload the proxy
    ///
    /// Only active routes are rendered, plus `force_include` which lets a
    /// transponder that is still provisioning go live in the same pass.
    async fn render_proxy_config(
        &self,
        portal: &Portal,
        routes: &[ProxyRoute],
        force_include: Option<Uuid>,
    ) -> DriverResult<()>;
}

/// Lookup of the host's public address
#[async_trait]
pub trait PublicIpResolver: Send + Sync {
    async fn public_ip(&self) -> DriverResult<String>;
}
