// Copyright (c) 2025 - Cowboy AI, Inc.
//! Fabric Events
//!
//! The API layer records a resource row in `QUEUED` together with an
//! [`Event`] pointing at it. The queue processor later hands each eligible
//! event to the processor registered for its [`EventType`].
//!
//! # Event Flow
//!
//! ```text
//! API ─▶ Resource(QUEUED) + Event(WORKER_CREATE)
//!                               │
//!                               ▼
//!                         QueueProcessor ─▶ EventProcessor ─▶ Drivers
//!                               │                  │
//!                  processed_at / failed_at   Event(WORKER_CREATED)
//! ```
//!
//! # Module Organization
//!
//! - [`status`] - lifecycle status shared by all resource kinds
//! - [`types`] - persisted event type names and outcome mapping
//! - [`record`] - event rows, resource pointers, properties, retry policy

pub mod record;
pub mod status;
pub mod types;

pub use record::{
    property, Event, EventProperty, EventResource, NewEvent, RetryPolicy, DEFAULT_MAX_RETRIES,
};
pub use status::ResourceStatus;
pub use types::EventType;
