// Copyright (c) 2025 - Cowboy AI, Inc.
//! Fabric control plane
//!
//! The API layer records *desired* state: a resource row in `QUEUED` plus a
//! request event pointing at it. This crate does the rest. The
//! [`QueueProcessor`] polls for eligible request events and hands each to
//! its [`EventProcessor`], which drives the hypervisor, host network and
//! DNS/proxy drivers, walks the resource through its lifecycle and records
//! the outcome event.
//!
//! ```text
//! ResourceStore ──▶ QueueProcessor ──▶ ProcessorRegistry ──▶ EventProcessor
//!       ▲                                                       │
//!       └──────── status / outcome events ◀─────────────────────┤
//!                                                               ├──▶ drivers
//!                                                               └──▶ Notifier
//! ```

pub mod allocator;
pub mod cache;
pub mod config;
pub mod domain;
pub mod drivers;
pub mod errors;
pub mod events;
pub mod nats;
pub mod notifier;
pub mod processors;
pub mod queue;
pub mod state_machine;
pub mod store;

// Re-export commonly used types
pub use cache::{CachedPublicIp, Clock, ManualClock, SystemClock, TtlCache};
pub use config::FabricConfig;
pub use domain::{Fiber, Ipv4Cidr, Node, Portal, ResourceKind, Transponder, Worker, Zone};
pub use errors::{FabricError, FabricResult};
pub use events::{Event, EventType, NewEvent, ResourceStatus, RetryPolicy};
pub use nats::{NatsClient, NatsConfig};
pub use notifier::Notifier;
pub use processors::{EventProcessor, ProcessOutcome, ProcessorContext, ProcessorRegistry};
pub use queue::{PassReport, QueueProcessor};
pub use store::{InMemoryStore, ResourceStore};
