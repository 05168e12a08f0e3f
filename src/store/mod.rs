// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Store
//!
//! Repository over the event log and the managed resource rows. The API
//! layer writes rows in `QUEUED` plus the event that requests work on them;
//! the queue and processors read events, advance rows in place and record
//! follow-up events.
//!
//! Per-kind access goes through [`Persist`] so the lifecycle helpers in
//! [`crate::processors`] can stay generic over the resource kind.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    Fiber, Ipv4Cidr, ManagedResource, Node, Portal, ResourceKind, Transponder, Worker, Zone,
};
use crate::errors::FabricResult;
use crate::events::{Event, EventType, NewEvent, ResourceStatus, RetryPolicy};

pub mod memory;

pub use memory::InMemoryStore;

/// Durable records for events and managed resources
#[async_trait]
pub trait ResourceStore: Send + Sync {
    // ---- events ----

    /// Eligible events of the given types, hydrated, oldest first
    async fn find_eligible_events(
        &self,
        types: &[EventType],
        policy: &RetryPolicy,
    ) -> FabricResult<Vec<Event>>;

    /// Record an event together with its resources and properties
    async fn create_event(&self, event: NewEvent) -> FabricResult<Event>;

    async fn add_event_resource(
        &self,
        event_id: Uuid,
        kind: ResourceKind,
        resource_id: &str,
    ) -> FabricResult<()>;

    async fn add_event_property(&self, event_id: Uuid, key: &str, value: &str)
        -> FabricResult<()>;

    async fn get_event(&self, id: Uuid) -> FabricResult<Option<Event>>;

    /// Set `processed_at`; a no-op on an event that is already settled
    async fn mark_processed(&self, id: Uuid) -> FabricResult<()>;

    /// Set `failed_at`; a no-op on an event that is already settled
    async fn mark_failed(&self, id: Uuid) -> FabricResult<()>;

    async fn increment_retries(&self, id: Uuid) -> FabricResult<()>;

    // ---- resources ----

    async fn get_worker(&self, id: Uuid) -> FabricResult<Option<Worker>>;
    async fn save_worker(&self, worker: &Worker) -> FabricResult<()>;

    async fn get_node(&self, id: Uuid) -> FabricResult<Option<Node>>;
    async fn save_node(&self, node: &Node) -> FabricResult<()>;

    async fn get_zone(&self, id: Uuid) -> FabricResult<Option<Zone>>;
    async fn save_zone(&self, zone: &Zone) -> FabricResult<()>;

    async fn get_fiber(&self, id: Uuid) -> FabricResult<Option<Fiber>>;
    async fn save_fiber(&self, fiber: &Fiber) -> FabricResult<()>;

    async fn get_portal(&self, id: Uuid) -> FabricResult<Option<Portal>>;
    async fn save_portal(&self, portal: &Portal) -> FabricResult<()>;

    async fn get_transponder(&self, id: Uuid) -> FabricResult<Option<Transponder>>;
    async fn save_transponder(&self, transponder: &Transponder) -> FabricResult<()>;

    /// Status of any managed resource
    async fn status_of(&self, kind: ResourceKind, id: Uuid)
        -> FabricResult<Option<ResourceStatus>>;

    /// Overwrite the status of any managed resource
    async fn set_status(
        &self,
        kind: ResourceKind,
        id: Uuid,
        status: ResourceStatus,
    ) -> FabricResult<()>;

    // ---- queries ----

    /// CIDR of the most recently allocated zone, deleted zones included
    async fn latest_zone_cidr(&self) -> FabricResult<Option<Ipv4Cidr>>;

    async fn nodes_in_zone(&self, zone_id: Uuid) -> FabricResult<Vec<Node>>;

    /// Node the worker is currently assigned to
    async fn node_for_worker(&self, worker_id: Uuid) -> FabricResult<Option<Node>>;

    async fn transponders_for_portal(&self, portal_id: Uuid) -> FabricResult<Vec<Transponder>>;

    /// Every resource sitting in `PROVISIONING`, `DELETING` or `TERMINATING`
    async fn in_progress_resources(&self)
        -> FabricResult<Vec<(ResourceKind, Uuid, ResourceStatus)>>;
}

/// Kind-specific load/save on top of [`ResourceStore`]
#[async_trait]
pub trait Persist: ManagedResource + Sized {
    async fn load(store: &dyn ResourceStore, id: Uuid) -> FabricResult<Option<Self>>;

    async fn save(&self, store: &dyn ResourceStore) -> FabricResult<()>;
}

macro_rules! persist {
    ($ty:ty, $get:ident, $save:ident) => {
        #[async_trait]
        impl Persist for $ty {
            async fn load(store: &dyn ResourceStore, id: Uuid) -> FabricResult<Option<Self>> {
                store.$get(id).await
            }

            async fn save(&self, store: &dyn ResourceStore) -> FabricResult<()> {
                store.$save(self).await
            }
        }
    };
}

persist!(Worker, get_worker, save_worker);
persist!(Node, get_node, save_node);
persist!(Zone, get_zone, save_zone);
persist!(Fiber, get_fiber, save_fiber);
persist!(Portal, get_portal, save_portal);
persist!(Transponder, get_transponder, save_transponder);
