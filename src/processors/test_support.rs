// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-memory wiring for processor unit tests

use std::sync::Arc;
use std::time::Duration;

use super::ProcessorContext;
use crate::allocator::{PortAllocator, PortRange};
use crate::cache::{CachedPublicIp, SystemClock};
use crate::config::FabricConfig;
use crate::drivers::memory::{MemoryDnsProxy, MemoryHypervisor, MemoryNetwork, StaticPublicIp};
use crate::notifier::RecordingNotifier;
use crate::store::InMemoryStore;

pub struct Harness {
    pub ctx: Arc<ProcessorContext>,
    pub store: Arc<InMemoryStore>,
    pub hypervisor: Arc<MemoryHypervisor>,
    pub network: Arc<MemoryNetwork>,
    pub dns: Arc<MemoryDnsProxy>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let hypervisor = Arc::new(MemoryHypervisor::new());
    let network = Arc::new(MemoryNetwork::new(PortAllocator::seeded(
        PortRange::default(),
        1000,
        7,
    )));
    let dns = Arc::new(MemoryDnsProxy::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let public_ip = Arc::new(CachedPublicIp::new(
        Arc::new(StaticPublicIp::new("203.0.113.7")),
        Duration::from_secs(300),
        Arc::new(SystemClock),
    ));

    let ctx = Arc::new(ProcessorContext::new(
        store.clone(),
        hypervisor.clone(),
        network.clone(),
        dns.clone(),
        public_ip,
        notifier.clone(),
        &FabricConfig::default(),
    ));

    Harness {
        ctx,
        store,
        hypervisor,
        network,
        dns,
        notifier,
    }
}

pub fn context() -> Arc<ProcessorContext> {
    harness().ctx
}
