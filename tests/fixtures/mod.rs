// Copyright (c) 2025 - Cowboy AI, Inc.
//! Test Fixtures for cim-fabric
//!
//! Wires a queue processor over the in-memory store and drivers, and builds
//! request events with fixed ids and timestamps so selection order is
//! reproducible.
#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use uuid::Uuid;

use cim_fabric::allocator::{PortAllocator, PortRange};
use cim_fabric::cache::{CachedPublicIp, ManualClock};
use cim_fabric::domain::{Fiber, Node, Protocol, Worker, Zone};
use cim_fabric::drivers::memory::{MemoryDnsProxy, MemoryHypervisor, MemoryNetwork, StaticPublicIp};
use cim_fabric::drivers::DnatRule;
use cim_fabric::events::{Event, EventProperty, EventResource};
use cim_fabric::notifier::RecordingNotifier;
use cim_fabric::{
    EventType, FabricConfig, InMemoryStore, ProcessorContext, ProcessorRegistry, QueueProcessor,
    ResourceKind, ResourceStatus, ResourceStore,
};

// Fixed test timestamp (2026-01-19T12:00:00Z)
pub const FIXED_TIMESTAMP: &str = "2026-01-19T12:00:00Z";

pub const COMPANY: &str = "acme";

pub const PUBLIC_IP: &str = "203.0.113.7";

/// Parse the fixed timestamp
pub fn fixed_timestamp() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(FIXED_TIMESTAMP)
        .expect("Invalid timestamp in test fixture")
        .with_timezone(&Utc)
}

/// Deterministic event id for sequence number `seq`
pub fn event_id(seq: u32) -> Uuid {
    Uuid::from_u128(0x0193_4f4a_0000_7000_8000_0000_0000_0000 | u128::from(seq))
}

/// A queue processor and handles on everything behind it
pub struct Fabric {
    pub queue: QueueProcessor,
    pub store: Arc<InMemoryStore>,
    pub hypervisor: Arc<MemoryHypervisor>,
    pub network: Arc<MemoryNetwork>,
    pub dns: Arc<MemoryDnsProxy>,
    pub notifier: Arc<RecordingNotifier>,
    pub resolver: Arc<StaticPublicIp>,
    pub clock: Arc<ManualClock>,
}

pub fn fabric() -> Fabric {
    fabric_with_rules(Vec::new())
}

/// Fabric whose host already carries `rules`
pub fn fabric_with_rules(rules: Vec<DnatRule>) -> Fabric {
    let config = FabricConfig::default();
    let store = Arc::new(InMemoryStore::new());
    let hypervisor = Arc::new(MemoryHypervisor::new());
    let network = Arc::new(
        MemoryNetwork::new(PortAllocator::seeded(PortRange::default(), 1000, 42)).with_rules(rules),
    );
    let dns = Arc::new(MemoryDnsProxy::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let resolver = Arc::new(StaticPublicIp::new(PUBLIC_IP));
    let clock = Arc::new(ManualClock::new());
    let public_ip = Arc::new(CachedPublicIp::new(
        resolver.clone(),
        StdDuration::from_secs(config.public_ip_ttl_secs),
        clock.clone(),
    ));

    let ctx = ProcessorContext::new(
        store.clone(),
        hypervisor.clone(),
        network.clone(),
        dns.clone(),
        public_ip,
        notifier.clone(),
        &config,
    );
    let queue = QueueProcessor::new(Arc::new(ctx), Arc::new(ProcessorRegistry::with_defaults()));

    Fabric {
        queue,
        store,
        hypervisor,
        network,
        dns,
        notifier,
        resolver,
        clock,
    }
}

/// Builder for a request event with fixed id and timestamp
pub struct Request {
    event: Event,
}

impl Request {
    /// Event `seq` of type `ty`, created `seq` seconds after the fixed timestamp
    pub fn new(seq: u32, ty: EventType) -> Self {
        Self {
            event: Event {
                id: event_id(seq),
                event_type: ty,
                data: serde_json::Value::Null,
                retries: 0,
                processed_at: None,
                failed_at: None,
                created_by: "api".to_string(),
                company_id: COMPANY.to_string(),
                created_at: fixed_timestamp() + Duration::seconds(i64::from(seq)),
                notes: None,
                resources: Vec::new(),
                properties: Vec::new(),
            },
        }
    }

    pub fn resource(mut self, kind: ResourceKind, id: Uuid) -> Self {
        self.event.resources.push(EventResource {
            event_id: self.event.id,
            resource_type: kind,
            resource_id: id.to_string(),
        });
        self
    }

    pub fn property(mut self, key: &str, value: &str) -> Self {
        self.event.properties.push(EventProperty {
            event_id: self.event.id,
            key: key.to_string(),
            value: value.to_string(),
        });
        self
    }

    /// Record the event in `fabric`'s store
    pub fn insert(self, fabric: &Fabric) -> Event {
        fabric.store.insert_event(self.event.clone());
        self.event
    }
}

// ---- resources ----

pub async fn queued_worker(fabric: &Fabric, name: &str) -> Worker {
    let worker = Worker::new(name, "debian-12", "small", COMPANY);
    fabric.store.save_worker(&worker).await.unwrap();
    worker
}

pub async fn queued_zone(fabric: &Fabric, hosts: u32) -> Zone {
    let zone = Zone::new("lab", hosts, COMPANY);
    fabric.store.save_zone(&zone).await.unwrap();
    zone
}

/// Zone already provisioned as 10.10.1.0/24
pub async fn active_zone(fabric: &Fabric) -> Zone {
    let mut zone = Zone::new("lab", 254, COMPANY);
    zone.cidr = Some("10.10.1.0/24".parse().unwrap());
    zone.gateway = Some("10.10.1.1".to_string());
    zone.status = ResourceStatus::Active;
    fabric.store.save_zone(&zone).await.unwrap();
    zone
}

pub async fn queued_node(fabric: &Fabric, zone: &Zone) -> Node {
    let node = Node::new(zone.id, COMPANY);
    fabric.store.save_node(&node).await.unwrap();
    node
}

/// Active node holding `ip`
pub async fn addressed_node(fabric: &Fabric, zone: &Zone, ip: &str) -> Node {
    let mut node = Node::new(zone.id, COMPANY);
    node.ip = Some(ip.to_string());
    node.status = ResourceStatus::Active;
    fabric.store.save_node(&node).await.unwrap();
    node
}

pub async fn queued_fiber(fabric: &Fabric, node: &Node, protocol: Protocol, target_port: u16) -> Fiber {
    let fiber = Fiber::new(node.id, protocol, target_port, COMPANY);
    fabric.store.save_fiber(&fiber).await.unwrap();
    fiber
}

/// DNAT rule forwarding `external_port` to `ip:port`
pub fn rule(protocol: Protocol, external_port: u16, ip: &str, port: u16) -> DnatRule {
    DnatRule {
        protocol,
        external_port,
        destination_ip: ip.to_string(),
        destination_port: port,
        bridge: None,
    }
}

pub async fn event(fabric: &Fabric, id: Uuid) -> Event {
    fabric.store.get_event(id).await.unwrap().unwrap()
}
