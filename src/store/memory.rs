// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-memory resource store
//!
//! Backs the queue binary when no database is wired in and every test.
//! All state sits behind one mutex; no lock is held across an await.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::ResourceStore;
use crate::domain::{
    Fiber, Ipv4Cidr, ManagedResource, Node, Portal, ResourceKind, Transponder, Worker, Zone,
};
use crate::errors::{FabricError, FabricResult};
use crate::events::{
    Event, EventProperty, EventResource, EventType, NewEvent, ResourceStatus, RetryPolicy,
};

#[derive(Debug, Default)]
struct State {
    events: HashMap<Uuid, Event>,
    workers: HashMap<Uuid, Worker>,
    nodes: HashMap<Uuid, Node>,
    zones: HashMap<Uuid, Zone>,
    fibers: HashMap<Uuid, Fiber>,
    portals: HashMap<Uuid, Portal>,
    transponders: HashMap<Uuid, Transponder>,
    /// Injected save failures left, per kind and status being written
    failing_saves: HashMap<(ResourceKind, ResourceStatus), u32>,
}

impl State {
    fn check_save(&mut self, kind: ResourceKind, status: ResourceStatus) -> FabricResult<()> {
        match self.failing_saves.get_mut(&(kind, status)) {
            Some(left) if *left > 0 => {
                *left -= 1;
                Err(FabricError::Store(format!(
                    "injected failure saving {kind} as {status}"
                )))
            }
            _ => Ok(()),
        }
    }

    fn event_mut(&mut self, id: Uuid) -> FabricResult<&mut Event> {
        self.events.get_mut(&id).ok_or_else(|| FabricError::NotFound {
            kind: "event".to_string(),
            id: id.to_string(),
        })
    }
}

/// Resource store held entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fail the next `times` saves of a `kind` resource in `status`
    pub fn fail_saves(&self, kind: ResourceKind, status: ResourceStatus, times: u32) {
        self.lock().failing_saves.insert((kind, status), times);
    }

    /// Insert a fully formed event, keeping its id and timestamps
    pub fn insert_event(&self, event: Event) {
        self.lock().events.insert(event.id, event);
    }

    /// Every event, oldest first
    pub fn events(&self) -> Vec<Event> {
        let mut events: Vec<Event> = self.lock().events.values().cloned().collect();
        events.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        events
    }

    pub fn events_of_type(&self, event_type: EventType) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }
}

fn not_found(kind: ResourceKind, id: Uuid) -> FabricError {
    FabricError::NotFound {
        kind: kind.to_string(),
        id: id.to_string(),
    }
}

fn set_in<R: ManagedResource>(
    map: &mut HashMap<Uuid, R>,
    id: Uuid,
    status: ResourceStatus,
) -> FabricResult<()> {
    let resource = map.get_mut(&id).ok_or_else(|| not_found(R::KIND, id))?;
    resource.set_status(status, Utc::now());
    Ok(())
}

fn in_progress<R: ManagedResource>(
    map: &HashMap<Uuid, R>,
) -> impl Iterator<Item = (ResourceKind, Uuid, ResourceStatus)> + '_ {
    map.values()
        .filter(|r| r.status().is_in_progress())
        .map(|r| (R::KIND, r.id(), r.status()))
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn find_eligible_events(
        &self,
        types: &[EventType],
        policy: &RetryPolicy,
    ) -> FabricResult<Vec<Event>> {
        Ok(self
            .events()
            .into_iter()
            .filter(|e| types.contains(&e.event_type) && e.is_eligible(policy))
            .collect())
    }

    async fn create_event(&self, new: NewEvent) -> FabricResult<Event> {
        let id = Uuid::now_v7();
        let event = Event {
            id,
            event_type: new.event_type,
            data: new.data,
            retries: 0,
            processed_at: None,
            failed_at: None,
            created_by: new.created_by,
            company_id: new.company_id,
            created_at: Utc::now(),
            notes: new.notes,
            resources: new
                .resources
                .into_iter()
                .map(|(resource_type, resource_id)| EventResource {
                    event_id: id,
                    resource_type,
                    resource_id,
                })
                .collect(),
            properties: new
                .properties
                .into_iter()
                .map(|(key, value)| EventProperty {
                    event_id: id,
                    key,
                    value,
                })
                .collect(),
        };
        self.lock().events.insert(id, event.clone());
        Ok(event)
    }

    async fn add_event_resource(
        &self,
        event_id: Uuid,
        kind: ResourceKind,
        resource_id: &str,
    ) -> FabricResult<()> {
        self.lock().event_mut(event_id)?.resources.push(EventResource {
            event_id,
            resource_type: kind,
            resource_id: resource_id.to_string(),
        });
        Ok(())
    }

    async fn add_event_property(
        &self,
        event_id: Uuid,
        key: &str,
        value: &str,
    ) -> FabricResult<()> {
        self.lock().event_mut(event_id)?.properties.push(EventProperty {
            event_id,
            key: key.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    async fn get_event(&self, id: Uuid) -> FabricResult<Option<Event>> {
        Ok(self.lock().events.get(&id).cloned())
    }

    async fn mark_processed(&self, id: Uuid) -> FabricResult<()> {
        let mut state = self.lock();
        let event = state.event_mut(id)?;
        if event.processed_at.is_none() && event.failed_at.is_none() {
            event.processed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid) -> FabricResult<()> {
        let mut state = self.lock();
        let event = state.event_mut(id)?;
        if event.processed_at.is_none() && event.failed_at.is_none() {
            event.failed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn increment_retries(&self, id: Uuid) -> FabricResult<()> {
        let mut state = self.lock();
        let event = state.event_mut(id)?;
        event.retries = event.retries.saturating_add(1);
        Ok(())
    }

    async fn get_worker(&self, id: Uuid) -> FabricResult<Option<Worker>> {
        Ok(self.lock().workers.get(&id).cloned())
    }

    async fn save_worker(&self, worker: &Worker) -> FabricResult<()> {
        let mut state = self.lock();
        state.check_save(ResourceKind::Worker, worker.status)?;
        state.workers.insert(worker.id, worker.clone());
        Ok(())
    }

    async fn get_node(&self, id: Uuid) -> FabricResult<Option<Node>> {
        Ok(self.lock().nodes.get(&id).cloned())
    }

    async fn save_node(&self, node: &Node) -> FabricResult<()> {
        let mut state = self.lock();
        state.check_save(ResourceKind::Node, node.status)?;
        state.nodes.insert(node.id, node.clone());
        Ok(())
    }

    async fn get_zone(&self, id: Uuid) -> FabricResult<Option<Zone>> {
        Ok(self.lock().zones.get(&id).cloned())
    }

    async fn save_zone(&self, zone: &Zone) -> FabricResult<()> {
        let mut state = self.lock();
        state.check_save(ResourceKind::Zone, zone.status)?;
        state.zones.insert(zone.id, zone.clone());
        Ok(())
    }

    async fn get_fiber(&self, id: Uuid) -> FabricResult<Option<Fiber>> {
        Ok(self.lock().fibers.get(&id).cloned())
    }

    async fn save_fiber(&self, fiber: &Fiber) -> FabricResult<()> {
        let mut state = self.lock();
        state.check_save(ResourceKind::Fiber, fiber.status)?;
        state.fibers.insert(fiber.id, fiber.clone());
        Ok(())
    }

    async fn get_portal(&self, id: Uuid) -> FabricResult<Option<Portal>> {
        Ok(self.lock().portals.get(&id).cloned())
    }

    async fn save_portal(&self, portal: &Portal) -> FabricResult<()> {
        let mut state = self.lock();
        state.check_save(ResourceKind::Portal, portal.status)?;
        state.portals.insert(portal.id, portal.clone());
        Ok(())
    }

    async fn get_transponder(&self, id: Uuid) -> FabricResult<Option<Transponder>> {
        Ok(self.lock().transponders.get(&id).cloned())
    }

    async fn save_transponder(&self, transponder: &Transponder) -> FabricResult<()> {
        let mut state = self.lock();
        state.check_save(ResourceKind::Transponder, transponder.status)?;
        state.transponders.insert(transponder.id, transponder.clone());
        Ok(())
    }

    async fn status_of(
        &self,
        kind: ResourceKind,
        id: Uuid,
    ) -> FabricResult<Option<ResourceStatus>> {
        let state = self.lock();
        Ok(match kind {
            ResourceKind::Worker => state.workers.get(&id).map(|r| r.status),
            ResourceKind::Node => state.nodes.get(&id).map(|r| r.status),
            ResourceKind::Zone => state.zones.get(&id).map(|r| r.status),
            ResourceKind::Fiber => state.fibers.get(&id).map(|r| r.status),
            ResourceKind::Portal => state.portals.get(&id).map(|r| r.status),
            ResourceKind::Transponder => state.transponders.get(&id).map(|r| r.status),
            ResourceKind::Event => None,
        })
    }

    async fn set_status(
        &self,
        kind: ResourceKind,
        id: Uuid,
        status: ResourceStatus,
    ) -> FabricResult<()> {
        let mut state = self.lock();
        match kind {
            ResourceKind::Worker => set_in(&mut state.workers, id, status),
            ResourceKind::Node => set_in(&mut state.nodes, id, status),
            ResourceKind::Zone => set_in(&mut state.zones, id, status),
            ResourceKind::Fiber => set_in(&mut state.fibers, id, status),
            ResourceKind::Portal => set_in(&mut state.portals, id, status),
            ResourceKind::Transponder => set_in(&mut state.transponders, id, status),
            ResourceKind::Event => Err(FabricError::Store(
                "events carry no resource status".to_string(),
            )),
        }
    }

    async fn latest_zone_cidr(&self) -> FabricResult<Option<Ipv4Cidr>> {
        // Blocks are handed out in ascending order, so the highest base is the latest
        Ok(self
            .lock()
            .zones
            .values()
            .filter_map(|z| z.cidr)
            .max_by_key(|c| c.base()))
    }

    async fn nodes_in_zone(&self, zone_id: Uuid) -> FabricResult<Vec<Node>> {
        let mut nodes: Vec<Node> = self
            .lock()
            .nodes
            .values()
            .filter(|n| n.zone_id == zone_id)
            .cloned()
            .collect();
        nodes.sort_by_key(|n| n.id);
        Ok(nodes)
    }

    async fn node_for_worker(&self, worker_id: Uuid) -> FabricResult<Option<Node>> {
        Ok(self
            .lock()
            .nodes
            .values()
            .find(|n| n.worker_id == Some(worker_id) && n.status != ResourceStatus::Deleted)
            .cloned())
    }

    async fn transponders_for_portal(&self, portal_id: Uuid) -> FabricResult<Vec<Transponder>> {
        let mut transponders: Vec<Transponder> = self
            .lock()
            .transponders
            .values()
            .filter(|t| t.portal_id == portal_id)
            .cloned()
            .collect();
        transponders.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(transponders)
    }

    async fn in_progress_resources(
        &self,
    ) -> FabricResult<Vec<(ResourceKind, Uuid, ResourceStatus)>> {
        let state = self.lock();
        let mut found: Vec<_> = in_progress(&state.workers)
            .chain(in_progress(&state.nodes))
            .chain(in_progress(&state.zones))
            .chain(in_progress(&state.fibers))
            .chain(in_progress(&state.portals))
            .chain(in_progress(&state.transponders))
            .collect();
        found.sort_by_key(|(_, id, _)| *id);
        Ok(found)
    }
}
