// Copyright (c) 2025 - Cowboy AI, Inc.
//! Event Processors
//!
//! One processor per request type. Each follows the same protocol:
//!
//! ```text
//! resolve pointers ─▶ load + check precondition ─▶ persist in-progress state
//!        │                     │                            │
//!     (abort)               (abort)                  driver call(s)
//!                                                     │        │
//!                                                  success   error
//!                                                     │        │
//!                              persist terminal state ◀        ▶ revert to the
//!                              record follow-up event            precondition state,
//!                              notify                            or FAILED on the
//!                                                                last attempt
//! ```
//!
//! Aborts ([`Halt::Abort`]) are expected rejections: the event is marked
//! failed and never retried. Errors ([`Halt::Fail`]) are faults: the event
//! is retried by the queue.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::allocator::AllocationError;
use crate::cache::CachedPublicIp;
use crate::config::FabricConfig;
use crate::domain::{Ipv4Cidr, ManagedResource, NetworkError};
use crate::drivers::{DnsProxyDriver, DriverError, HypervisorDriver, NetworkDriver};
use crate::errors::{FabricError, FabricResult};
use crate::events::{Event, EventType, RetryPolicy};
use crate::notifier::{notify_resource, Notifier};
use crate::state_machine::TransitionError;
use crate::store::ResourceStore;

pub mod lifecycle;
pub mod node;
pub mod portal;
pub mod system;
pub mod worker;
pub mod zone;

#[cfg(test)]
pub(crate) mod test_support;

pub use lifecycle::InFlight;

/// What a processor made of an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The work is done; the event is marked processed
    Completed,
    /// Terminal rejection; the event is marked failed and `followup`, if
    /// any, is recorded pointing back at it
    Aborted {
        message: String,
        followup: Option<EventType>,
    },
}

/// Early exit from a processor
#[derive(Debug)]
pub enum Halt {
    /// Expected precondition or business-rule rejection
    Abort(String),
    /// Unexpected fault, retried by the queue
    Fail(FabricError),
}

/// Processor step result
pub type Step<T> = Result<T, Halt>;

/// Reject the event with `message`
pub fn abort<T>(message: impl Into<String>) -> Step<T> {
    Err(Halt::Abort(message.into()))
}

impl From<FabricError> for Halt {
    fn from(err: FabricError) -> Self {
        Halt::Fail(err)
    }
}

impl From<DriverError> for Halt {
    fn from(err: DriverError) -> Self {
        Halt::Fail(err.into())
    }
}

impl From<AllocationError> for Halt {
    fn from(err: AllocationError) -> Self {
        Halt::Fail(err.into())
    }
}

impl From<NetworkError> for Halt {
    fn from(err: NetworkError) -> Self {
        Halt::Fail(err.into())
    }
}

impl From<TransitionError> for Halt {
    fn from(err: TransitionError) -> Self {
        Halt::Fail(err.into())
    }
}

/// Map a processor run onto the queue's outcome channels
pub fn conclude(event: &Event, step: Step<()>) -> FabricResult<ProcessOutcome> {
    match step {
        Ok(()) => Ok(ProcessOutcome::Completed),
        Err(Halt::Abort(message)) => Ok(ProcessOutcome::Aborted {
            message,
            followup: event.event_type.failed(),
        }),
        Err(Halt::Fail(err)) => Err(err),
    }
}

/// Everything a processor may touch
///
/// One context per process: it carries the single-poller flag, so every
/// [`QueueProcessor`](crate::queue::QueueProcessor) built over it shares one
/// pass at a time.
pub struct ProcessorContext {
    pub store: Arc<dyn ResourceStore>,
    pub hypervisor: Arc<dyn HypervisorDriver>,
    pub network: Arc<dyn NetworkDriver>,
    pub dns: Arc<dyn DnsProxyDriver>,
    pub public_ip: Arc<CachedPublicIp>,
    pub notifier: Arc<dyn Notifier>,
    pub retry: RetryPolicy,
    /// Block the first zone is allocated after
    pub seed_cidr: Ipv4Cidr,
    pub default_zone_hosts: u32,
    /// Set while a queue pass is in flight
    pub(crate) pass_running: AtomicBool,
}

impl ProcessorContext {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        hypervisor: Arc<dyn HypervisorDriver>,
        network: Arc<dyn NetworkDriver>,
        dns: Arc<dyn DnsProxyDriver>,
        public_ip: Arc<CachedPublicIp>,
        notifier: Arc<dyn Notifier>,
        config: &FabricConfig,
    ) -> Self {
        Self {
            store,
            hypervisor,
            network,
            dns,
            public_ip,
            notifier,
            retry: config.retry_policy(),
            seed_cidr: config.seed_cidr,
            default_zone_hosts: config.default_zone_hosts,
            pass_running: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &dyn ResourceStore {
        self.store.as_ref()
    }

    pub async fn notify<R: ManagedResource>(&self, resource: &R) {
        notify_resource(self.notifier.as_ref(), resource).await;
    }
}

/// Handler for one request event type
#[async_trait]
pub trait EventProcessor: Send + Sync {
    /// Request type this processor is registered under
    fn event_type(&self) -> EventType;

    async fn process(&self, ctx: &ProcessorContext, event: &Event) -> FabricResult<ProcessOutcome>;
}

/// Explicit event type → processor dispatch table
#[derive(Default, Clone)]
pub struct ProcessorRegistry {
    processors: BTreeMap<EventType, Arc<dyn EventProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in processor installed
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.register(Arc::new(worker::WorkerCreate));
        registry.register(Arc::new(worker::WorkerDelete));
        registry.register(Arc::new(worker::WorkerStart));
        registry.register(Arc::new(worker::WorkerTerminate));
        registry.register(Arc::new(worker::WorkerImageCreate));

        registry.register(Arc::new(node::NodeAssignWorker));
        registry.register(Arc::new(node::NodeUnassignWorker));
        registry.register(Arc::new(node::NodeCreateFiber));
        registry.register(Arc::new(node::NodeUpdateFiber));
        registry.register(Arc::new(node::NodeDeleteFiber));

        registry.register(Arc::new(zone::ZoneCreate));
        registry.register(Arc::new(zone::ZoneDelete));

        registry.register(Arc::new(portal::PortalCreate));
        registry.register(Arc::new(portal::PortalUpdate));
        registry.register(Arc::new(portal::TransponderCreate));
        registry.register(Arc::new(portal::TransponderUpdate));
        registry.register(Arc::new(portal::TransponderDelete));

        registry.register(Arc::new(system::SystemReset));

        registry
    }

    /// Install `processor`, replacing any processor for the same type
    pub fn register(&mut self, processor: Arc<dyn EventProcessor>) {
        self.processors.insert(processor.event_type(), processor);
    }

    pub fn get(&self, event_type: EventType) -> Option<Arc<dyn EventProcessor>> {
        self.processors.get(&event_type).cloned()
    }

    /// Types with a processor installed; only these are ever selected
    pub fn event_types(&self) -> Vec<EventType> {
        self.processors.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_every_request() {
        let registry = ProcessorRegistry::with_defaults();
        assert_eq!(registry.len(), EventType::REQUESTS.len());
        for request in EventType::REQUESTS {
            let processor = registry.get(*request).unwrap();
            assert_eq!(processor.event_type(), *request);
        }
        assert!(registry.get(EventType::WorkerCreated).is_none());
    }
}
