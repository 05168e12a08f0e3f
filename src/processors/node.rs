// Copyright (c) 2025 - Cowboy AI, Inc.
//! Node processors: worker assignment and fiber (port forward) management

use async_trait::async_trait;
use std::collections::BTreeSet;
use tracing::{error, info, instrument};
use uuid::Uuid;

use super::lifecycle::{expect_status, load, load_by_id};
use super::{abort, conclude, EventProcessor, InFlight, ProcessOutcome, ProcessorContext, Step};
use crate::allocator::next_ip;
use crate::domain::{int_to_ip, ip_to_int, Fiber, MacAddress, Node, ResourceKind, Worker, Zone};
use crate::drivers::PortForward;
use crate::errors::{FabricError, FabricResult};
use crate::events::{property, Event, EventType, ResourceStatus};

/// `NODE_ASSIGN_WORKER`: plug an inactive worker into a queued node
pub struct NodeAssignWorker;

/// `NODE_UNASSIGN_WORKER`: unplug the node's worker
pub struct NodeUnassignWorker;

/// `NODE_CREATE_FIBER`: forward a host port to the node
pub struct NodeCreateFiber;

/// `NODE_UPDATE_FIBER`: retarget an active fiber to `NEW_TARGET_PORT`
pub struct NodeUpdateFiber;

/// `NODE_DELETE_FIBER`: drop the forward
pub struct NodeDeleteFiber;

#[async_trait]
impl EventProcessor for NodeAssignWorker {
    fn event_type(&self) -> EventType {
        EventType::NodeAssignWorker
    }

    async fn process(&self, ctx: &ProcessorContext, event: &Event) -> FabricResult<ProcessOutcome> {
        conclude(event, assign_worker(ctx, event).await)
    }
}

#[async_trait]
impl EventProcessor for NodeUnassignWorker {
    fn event_type(&self) -> EventType {
        EventType::NodeUnassignWorker
    }

    async fn process(&self, ctx: &ProcessorContext, event: &Event) -> FabricResult<ProcessOutcome> {
        conclude(event, unassign_worker(ctx, event).await)
    }
}

#[async_trait]
impl EventProcessor for NodeCreateFiber {
    fn event_type(&self) -> EventType {
        EventType::NodeCreateFiber
    }

    async fn process(&self, ctx: &ProcessorContext, event: &Event) -> FabricResult<ProcessOutcome> {
        conclude(event, create_fiber(ctx, event).await)
    }
}

#[async_trait]
impl EventProcessor for NodeUpdateFiber {
    fn event_type(&self) -> EventType {
        EventType::NodeUpdateFiber
    }

    async fn process(&self, ctx: &ProcessorContext, event: &Event) -> FabricResult<ProcessOutcome> {
        conclude(event, update_fiber(ctx, event).await)
    }
}

#[async_trait]
impl EventProcessor for NodeDeleteFiber {
    fn event_type(&self) -> EventType {
        EventType::NodeDeleteFiber
    }

    async fn process(&self, ctx: &ProcessorContext, event: &Event) -> FabricResult<ProcessOutcome> {
        conclude(event, delete_fiber(ctx, event).await)
    }
}

// ---- worker assignment ----

/// Lowest free host address in the zone, skipping the gateway and live nodes
async fn allocate_node_ip(ctx: &ProcessorContext, zone: &Zone, node: &Node) -> FabricResult<String> {
    let Some(cidr) = zone.cidr else {
        return Err(FabricError::Generic(format!(
            "zone {} has no address block",
            zone.id
        )));
    };
    let gateway = match &zone.gateway {
        Some(gateway) => ip_to_int(gateway)?,
        None => cidr.gateway(),
    };

    let mut used = BTreeSet::new();
    for other in ctx.store().nodes_in_zone(zone.id).await? {
        if other.id == node.id || other.status == ResourceStatus::Deleted {
            continue;
        }
        if let Some(ip) = &other.ip {
            used.insert(ip_to_int(ip)?);
        }
    }

    Ok(int_to_ip(next_ip(&cidr, gateway, &used)?))
}

async fn attach(
    ctx: &ProcessorContext,
    zone: &Zone,
    worker: &Worker,
    mac: &MacAddress,
    ip: &str,
) -> FabricResult<()> {
    ctx.network.add_reservation(&zone.bridge_id, mac, ip).await?;
    ctx.hypervisor
        .edit_network_attachment(worker.id, Some(&zone.bridge_id), Some(mac))
        .await?;

    // A running guest only picks the bridge up once its tap device is enslaved
    if ctx.hypervisor.is_running(worker.id).await? {
        if let Some(nic) = ctx.hypervisor.virtual_nic_name(worker.id, &zone.bridge_id).await? {
            ctx.network.attach_nic(&nic, &zone.bridge_id).await?;
        }
    }
    Ok(())
}

async fn detach(
    ctx: &ProcessorContext,
    zone: &Zone,
    node: &Node,
    worker_id: Uuid,
) -> FabricResult<()> {
    if ctx.hypervisor.is_running(worker_id).await? {
        if let Some(nic) = ctx.hypervisor.virtual_nic_name(worker_id, &zone.bridge_id).await? {
            ctx.network.detach_nic(&nic, &zone.bridge_id).await?;
        }
    }
    ctx.hypervisor
        .edit_network_attachment(worker_id, None, None)
        .await?;
    ctx.network.remove_reservation(&zone.bridge_id, &node.mac).await?;
    Ok(())
}

#[instrument(skip_all, fields(event_id = %event.id))]
async fn assign_worker(ctx: &ProcessorContext, event: &Event) -> Step<()> {
    let node: Node = load(ctx, event).await?;
    let worker: Worker = load(ctx, event).await?;
    expect_status(&node, ResourceStatus::Queued)?;
    expect_status(&worker, ResourceStatus::Inactive)?;

    if let Some(current) = node.worker_id.filter(|id| *id != worker.id) {
        return abort(format!("node {} already holds worker {}", node.id, current));
    }
    if let Some(other) = ctx.store().node_for_worker(worker.id).await? {
        if other.id != node.id {
            return abort(format!("worker {} is already on node {}", worker.id, other.id));
        }
    }

    let zone: Zone = load_by_id(ctx, node.zone_id).await?;
    expect_status(&zone, ResourceStatus::Active)?;
    if zone.cidr.is_none() {
        return abort(format!("zone {} has no address block", zone.id));
    }

    let mut flight = InFlight::begin(ctx, node, ResourceStatus::Provisioning).await?;

    let ip = match flight.resource().ip.clone() {
        Some(ip) => ip,
        None => {
            let allocated = allocate_node_ip(ctx, &zone, flight.resource()).await;
            let ip = flight.guard(ctx, event, allocated).await?;
            flight.resource_mut().ip = Some(ip.clone());
            let saved = flight.checkpoint(ctx).await;
            flight.guard(ctx, event, saved).await?;
            ip
        }
    };

    let mac = flight.resource().mac;
    let result = attach(ctx, &zone, &worker, &mac, &ip).await;
    flight.guard(ctx, event, result).await?;

    flight.resource_mut().worker_id = Some(worker.id);
    let node_id = flight.resource().id;
    let node = flight
        .complete(
            ctx,
            event,
            ResourceStatus::Active,
            &[(ResourceKind::Node, node_id), (ResourceKind::Worker, worker.id)],
        )
        .await?;
    info!(node_id = %node.id, worker_id = %worker.id, %ip, "worker assigned");
    ctx.notify(&node).await;
    Ok(())
}

#[instrument(skip_all, fields(event_id = %event.id))]
async fn unassign_worker(ctx: &ProcessorContext, event: &Event) -> Step<()> {
    let node: Node = load(ctx, event).await?;
    expect_status(&node, ResourceStatus::Queued)?;
    let Some(worker_id) = node.worker_id else {
        return abort(format!("node {} has no worker", node.id));
    };
    let zone: Zone = load_by_id(ctx, node.zone_id).await?;

    let mut flight = InFlight::begin(ctx, node, ResourceStatus::Provisioning).await?;
    let result = detach(ctx, &zone, flight.resource(), worker_id).await;
    flight.guard(ctx, event, result).await?;

    flight.resource_mut().worker_id = None;
    let node_id = flight.resource().id;
    let node = flight
        .complete(
            ctx,
            event,
            ResourceStatus::Inactive,
            &[(ResourceKind::Node, node_id), (ResourceKind::Worker, worker_id)],
        )
        .await?;
    info!(node_id = %node.id, %worker_id, "worker unassigned");
    ctx.notify(&node).await;
    Ok(())
}

// ---- fibers ----

/// Where a fiber's traffic lands
struct Endpoint {
    node: Node,
    ip: String,
    bridge_id: String,
}

impl Endpoint {
    fn forward(&self, fiber: &Fiber, host_port: u16, target_port: u16) -> PortForward {
        PortForward {
            bridge_id: self.bridge_id.clone(),
            protocol: fiber.protocol,
            host_port,
            target_ip: self.ip.clone(),
            target_port,
        }
    }
}

async fn endpoint(ctx: &ProcessorContext, fiber: &Fiber) -> Step<Endpoint> {
    let node: Node = load_by_id(ctx, fiber.node_id).await?;
    let Some(ip) = node.ip.clone() else {
        return abort(format!("node {} has no address yet", node.id));
    };
    let zone: Zone = load_by_id(ctx, node.zone_id).await?;
    Ok(Endpoint {
        node,
        ip,
        bridge_id: zone.bridge_id,
    })
}

async fn finish_fiber(
    ctx: &ProcessorContext,
    event: &Event,
    flight: InFlight<Fiber>,
    to: ResourceStatus,
    node: &Node,
) -> Step<()> {
    let id = flight.resource().id;
    let fiber = flight
        .complete(
            ctx,
            event,
            to,
            &[(ResourceKind::Fiber, id), (ResourceKind::Node, node.id)],
        )
        .await?;
    info!(
        fiber_id = %fiber.id,
        host_port = ?fiber.host_port,
        target_port = fiber.target_port,
        status = %fiber.status,
        "{} done", event.event_type
    );
    ctx.notify(&fiber).await;
    Ok(())
}

#[instrument(skip_all, fields(event_id = %event.id))]
async fn create_fiber(ctx: &ProcessorContext, event: &Event) -> Step<()> {
    let fiber: Fiber = load(ctx, event).await?;
    expect_status(&fiber, ResourceStatus::Queued)?;
    let ep = endpoint(ctx, &fiber).await?;

    if !ctx
        .network
        .is_port_available(&ep.ip, fiber.target_port, fiber.protocol)
        .await?
    {
        return abort(format!(
            "{}:{}/{} is already forwarded",
            ep.ip, fiber.target_port, fiber.protocol
        ));
    }

    let mut flight = InFlight::begin(ctx, fiber, ResourceStatus::Provisioning).await?;

    let host_port = match flight.resource().host_port {
        Some(port) => port,
        None => {
            let drawn = ctx
                .network
                .find_next_port(flight.resource().protocol)
                .await
                .map_err(Into::into);
            let port = flight.guard(ctx, event, drawn).await?;
            flight.resource_mut().host_port = Some(port);
            let saved = flight.checkpoint(ctx).await;
            flight.guard(ctx, event, saved).await?;
            port
        }
    };

    let forward = ep.forward(flight.resource(), host_port, flight.resource().target_port);
    let result = ctx.network.add_port_forward(&forward).await;
    flight.guard(ctx, event, result.map_err(Into::into)).await?;

    finish_fiber(ctx, event, flight, ResourceStatus::Active, &ep.node).await
}

/// Swap `old` for `new`, putting `old` back when `new` cannot be added
///
/// Remove-then-add is not atomic: if the restore fails too, the fiber is
/// left with no forward until a retry installs `new`.
async fn retarget(ctx: &ProcessorContext, old: &PortForward, new: &PortForward) -> FabricResult<()> {
    ctx.network.remove_port_forward(old).await?;
    if let Err(e) = ctx.network.add_port_forward(new).await {
        if let Err(restore) = ctx.network.add_port_forward(old).await {
            error!(host_port = old.host_port, "Failed to restore previous forward: {}", restore);
        }
        return Err(e.into());
    }
    Ok(())
}

#[instrument(skip_all, fields(event_id = %event.id))]
async fn update_fiber(ctx: &ProcessorContext, event: &Event) -> Step<()> {
    let fiber: Fiber = load(ctx, event).await?;
    expect_status(&fiber, ResourceStatus::Active)?;

    let Some(raw) = event.property(property::NEW_TARGET_PORT) else {
        return abort(format!("{} has no {} property", event.event_type, property::NEW_TARGET_PORT));
    };
    let new_port = match raw.trim().parse::<u16>() {
        Ok(port) if port > 0 => port,
        _ => return abort(format!("invalid target port {raw:?}")),
    };
    let Some(host_port) = fiber.host_port else {
        return abort(format!("fiber {} has no host port", fiber.id));
    };

    let ep = endpoint(ctx, &fiber).await?;
    if !ctx
        .network
        .is_port_available(&ep.ip, new_port, fiber.protocol)
        .await?
    {
        return abort(format!(
            "{}:{}/{} is already forwarded",
            ep.ip, new_port, fiber.protocol
        ));
    }

    let old = ep.forward(&fiber, host_port, fiber.target_port);
    let new = ep.forward(&fiber, host_port, new_port);

    let mut flight = InFlight::begin(ctx, fiber, ResourceStatus::Provisioning).await?;
    let result = retarget(ctx, &old, &new).await;
    flight.guard(ctx, event, result).await?;

    flight.resource_mut().target_port = new_port;
    finish_fiber(ctx, event, flight, ResourceStatus::Active, &ep.node).await
}

#[instrument(skip_all, fields(event_id = %event.id))]
async fn delete_fiber(ctx: &ProcessorContext, event: &Event) -> Step<()> {
    let fiber: Fiber = load(ctx, event).await?;
    expect_status(&fiber, ResourceStatus::Queued)?;
    let ep = endpoint(ctx, &fiber).await?;
    let forward = fiber
        .host_port
        .map(|host_port| ep.forward(&fiber, host_port, fiber.target_port));

    let flight = InFlight::begin(ctx, fiber, ResourceStatus::Deleting).await?;
    if let Some(forward) = forward {
        let result = ctx.network.remove_port_forward(&forward).await;
        flight.guard(ctx, event, result.map_err(Into::into)).await?;
    }

    finish_fiber(ctx, event, flight, ResourceStatus::Deleted, &ep.node).await
}
