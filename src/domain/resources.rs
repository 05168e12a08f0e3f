// Copyright (c) 2025 - Cowboy AI, Inc.
//! Managed Resource Entities
//!
//! Rows recorded by the API layer in `QUEUED` and advanced in place by the
//! event processors. Relationships:
//!
//! ```text
//! Zone 1──* Node 1──* Fiber
//!           Node 0/1──1 Worker
//! Portal 1──* Transponder 0/1──1 Node (or a raw external IP)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::network::{Ipv4Cidr, MacAddress, Protocol};
use super::resource_type::ResourceKind;
use crate::events::ResourceStatus;

/// Shared surface of every status-carrying entity
pub trait ManagedResource: Clone + Serialize + Send + Sync {
    /// Tag used in event resource pointers and notifier channels
    const KIND: ResourceKind;

    fn id(&self) -> Uuid;

    fn status(&self) -> ResourceStatus;

    fn set_status(&mut self, status: ResourceStatus, at: DateTime<Utc>);

    /// Owning company, used for per-owner notification channels
    fn company_id(&self) -> &str;
}

macro_rules! managed_resource {
    ($ty:ty, $kind:expr) => {
        impl ManagedResource for $ty {
            const KIND: ResourceKind = $kind;

            fn id(&self) -> Uuid {
                self.id
            }

            fn status(&self) -> ResourceStatus {
                self.status
            }

            fn set_status(&mut self, status: ResourceStatus, at: DateTime<Utc>) {
                self.status = status;
                self.updated_at = at;
            }

            fn company_id(&self) -> &str {
                &self.company_id
            }
        }
    };
}

/// A provisioned virtual machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    pub id: Uuid,
    pub name: String,
    pub image: String,
    pub flavor: String,
    pub mac: MacAddress,
    #[serde(default)]
    pub ssh_keys: Vec<String>,
    pub status: ResourceStatus,
    pub company_id: String,
    pub updated_at: DateTime<Utc>,
}

impl Worker {
    /// A freshly requested worker, as the API layer records it
    pub fn new(
        name: impl Into<String>,
        image: impl Into<String>,
        flavor: impl Into<String>,
        company_id: impl Into<String>,
    ) -> Self {
        let id = Uuid::now_v7();
        Self {
            id,
            name: name.into(),
            image: image.into(),
            flavor: flavor.into(),
            mac: MacAddress::for_guest(&id),
            ssh_keys: Vec::new(),
            status: ResourceStatus::Queued,
            company_id: company_id.into(),
            updated_at: Utc::now(),
        }
    }
}

managed_resource!(Worker, ResourceKind::Worker);

/// A network attachment point inside a zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: Uuid,
    pub zone_id: Uuid,
    pub mac: MacAddress,
    /// Dotted address, allocated on first worker assignment
    pub ip: Option<String>,
    pub worker_id: Option<Uuid>,
    pub status: ResourceStatus,
    pub company_id: String,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    pub fn new(zone_id: Uuid, company_id: impl Into<String>) -> Self {
        let id = Uuid::now_v7();
        Self {
            id,
            zone_id,
            mac: MacAddress::for_guest(&id),
            ip: None,
            worker_id: None,
            status: ResourceStatus::Queued,
            company_id: company_id.into(),
            updated_at: Utc::now(),
        }
    }
}

managed_resource!(Node, ResourceKind::Node);

/// A virtual network segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub id: Uuid,
    pub name: String,
    /// Allocated on zone creation when the API layer left it empty
    pub cidr: Option<Ipv4Cidr>,
    pub gateway: Option<String>,
    pub bridge_id: String,
    /// Usable addresses the zone must hold
    pub host_count: u32,
    pub status: ResourceStatus,
    pub company_id: String,
    pub updated_at: DateTime<Utc>,
}

impl Zone {
    pub fn new(name: impl Into<String>, host_count: u32, company_id: impl Into<String>) -> Self {
        let id = Uuid::now_v7();
        let simple = id.simple().to_string();
        Self {
            id,
            name: name.into(),
            cidr: None,
            gateway: None,
            // Linux interface names are capped at 15 bytes
            bridge_id: format!("br-{}", &simple[simple.len() - 8..]),
            host_count,
            status: ResourceStatus::Queued,
            company_id: company_id.into(),
            updated_at: Utc::now(),
        }
    }
}

managed_resource!(Zone, ResourceKind::Zone);

/// A port-forwarding rule from the zone's external side to a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fiber {
    pub id: Uuid,
    pub node_id: Uuid,
    pub protocol: Protocol,
    pub target_port: u16,
    /// Host-side port; drawn by the port allocator when absent
    pub host_port: Option<u16>,
    pub status: ResourceStatus,
    pub company_id: String,
    pub updated_at: DateTime<Utc>,
}

impl Fiber {
    pub fn new(
        node_id: Uuid,
        protocol: Protocol,
        target_port: u16,
        company_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            node_id,
            protocol,
            target_port,
            host_port: None,
            status: ResourceStatus::Queued,
            company_id: company_id.into(),
            updated_at: Utc::now(),
        }
    }
}

managed_resource!(Fiber, ResourceKind::Fiber);

/// A public hostname fronted by the reverse proxy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Portal {
    pub id: Uuid,
    pub domain: String,
    /// Credential for the dynamic DNS provider
    #[serde(skip_serializing)]
    #[serde(default)]
    pub api_key: String,
    pub status: ResourceStatus,
    pub company_id: String,
    pub updated_at: DateTime<Utc>,
}

impl Portal {
    pub fn new(
        domain: impl Into<String>,
        api_key: impl Into<String>,
        company_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            domain: domain.into(),
            api_key: api_key.into(),
            status: ResourceStatus::Queued,
            company_id: company_id.into(),
            updated_at: Utc::now(),
        }
    }
}

managed_resource!(Portal, ResourceKind::Portal);

/// Where a transponder routes its traffic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TransponderTarget {
    Node(Uuid),
    External(String),
}

/// One routed path under a portal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transponder {
    pub id: Uuid,
    pub portal_id: Uuid,
    pub path: String,
    pub target: TransponderTarget,
    pub target_port: u16,
    pub status: ResourceStatus,
    pub company_id: String,
    pub updated_at: DateTime<Utc>,
}

impl Transponder {
    pub fn new(
        portal_id: Uuid,
        path: impl Into<String>,
        target: TransponderTarget,
        target_port: u16,
        company_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            portal_id,
            path: path.into(),
            target,
            target_port,
            status: ResourceStatus::Queued,
            company_id: company_id.into(),
            updated_at: Utc::now(),
        }
    }
}

managed_resource!(Transponder, ResourceKind::Transponder);
