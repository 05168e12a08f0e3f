// Copyright (c) 2025 - Cowboy AI, Inc.
//! Worker (virtual machine) processors

use async_trait::async_trait;
use tracing::{info, instrument};

use super::lifecycle::{expect_status, load, record_completion};
use super::{abort, conclude, EventProcessor, InFlight, ProcessOutcome, ProcessorContext, Step};
use crate::domain::{ResourceKind, Worker};
use crate::drivers::{DriverError, InstanceSpec};
use crate::errors::FabricResult;
use crate::events::{property, Event, EventType, ResourceStatus};

/// `WORKER_CREATE`: define the VM; it is left stopped (`INACTIVE`)
pub struct WorkerCreate;

/// `WORKER_DELETE`: remove a stopped, unassigned VM
pub struct WorkerDelete;

/// `WORKER_START`: boot the VM (`ACTIVE`)
pub struct WorkerStart;

/// `WORKER_TERMINATE`: shut the VM down (`INACTIVE`), hard with `FORCE`
pub struct WorkerTerminate;

/// `WORKER_IMAGE_CREATE`: make the `IMAGE` property's image available locally
pub struct WorkerImageCreate;

#[async_trait]
impl EventProcessor for WorkerCreate {
    fn event_type(&self) -> EventType {
        EventType::WorkerCreate
    }

    async fn process(&self, ctx: &ProcessorContext, event: &Event) -> FabricResult<ProcessOutcome> {
        conclude(event, create(ctx, event).await)
    }
}

#[async_trait]
impl EventProcessor for WorkerDelete {
    fn event_type(&self) -> EventType {
        EventType::WorkerDelete
    }

    async fn process(&self, ctx: &ProcessorContext, event: &Event) -> FabricResult<ProcessOutcome> {
        conclude(event, delete(ctx, event).await)
    }
}

#[async_trait]
impl EventProcessor for WorkerStart {
    fn event_type(&self) -> EventType {
        EventType::WorkerStart
    }

    async fn process(&self, ctx: &ProcessorContext, event: &Event) -> FabricResult<ProcessOutcome> {
        conclude(event, start(ctx, event).await)
    }
}

#[async_trait]
impl EventProcessor for WorkerTerminate {
    fn event_type(&self) -> EventType {
        EventType::WorkerTerminate
    }

    async fn process(&self, ctx: &ProcessorContext, event: &Event) -> FabricResult<ProcessOutcome> {
        conclude(event, terminate(ctx, event).await)
    }
}

#[async_trait]
impl EventProcessor for WorkerImageCreate {
    fn event_type(&self) -> EventType {
        EventType::WorkerImageCreate
    }

    async fn process(&self, ctx: &ProcessorContext, event: &Event) -> FabricResult<ProcessOutcome> {
        conclude(event, create_image(ctx, event).await)
    }
}

async fn ensure_image(ctx: &ProcessorContext, image: &str) -> FabricResult<()> {
    if ctx.hypervisor.ensure_image(image).await? {
        Ok(())
    } else {
        Err(DriverError::NotFound {
            kind: "image".to_string(),
            id: image.to_string(),
        }
        .into())
    }
}

async fn define_instance(ctx: &ProcessorContext, spec: &InstanceSpec) -> FabricResult<()> {
    ensure_image(ctx, &spec.image).await?;
    ctx.hypervisor.create_instance(spec).await?;
    Ok(())
}

async fn finish(
    ctx: &ProcessorContext,
    event: &Event,
    flight: InFlight<Worker>,
    to: ResourceStatus,
) -> Step<()> {
    let id = flight.resource().id;
    let worker = flight
        .complete(ctx, event, to, &[(ResourceKind::Worker, id)])
        .await?;
    info!(worker_id = %worker.id, status = %worker.status, "{} done", event.event_type);
    ctx.notify(&worker).await;
    Ok(())
}

#[instrument(skip_all, fields(event_id = %event.id))]
async fn create(ctx: &ProcessorContext, event: &Event) -> Step<()> {
    let worker: Worker = load(ctx, event).await?;
    expect_status(&worker, ResourceStatus::Queued)?;

    let mut ssh_keys = worker.ssh_keys.clone();
    if let Some(key) = event.property(property::PUBLIC_SSH) {
        let key = key.trim().to_string();
        if !key.is_empty() && !ssh_keys.contains(&key) {
            ssh_keys.push(key);
        }
    }
    let spec = InstanceSpec {
        id: worker.id,
        name: worker.name.clone(),
        mac: worker.mac,
        image: worker.image.clone(),
        flavor: worker.flavor.clone(),
        ssh_keys,
    };

    let mut flight = InFlight::begin(ctx, worker, ResourceStatus::Provisioning).await?;
    let result = define_instance(ctx, &spec).await;
    flight.guard(ctx, event, result).await?;

    flight.resource_mut().ssh_keys = spec.ssh_keys;
    finish(ctx, event, flight, ResourceStatus::Inactive).await
}

#[instrument(skip_all, fields(event_id = %event.id))]
async fn delete(ctx: &ProcessorContext, event: &Event) -> Step<()> {
    let worker: Worker = load(ctx, event).await?;
    expect_status(&worker, ResourceStatus::Queued)?;

    if ctx.hypervisor.is_running(worker.id).await? {
        return abort(format!("worker {} is still running", worker.id));
    }
    if let Some(node) = ctx.store().node_for_worker(worker.id).await? {
        return abort(format!("worker {} is attached to node {}", worker.id, node.id));
    }

    let flight = InFlight::begin(ctx, worker, ResourceStatus::Deleting).await?;
    let result = ctx.hypervisor.delete(flight.resource().id).await;
    flight.guard(ctx, event, result.map_err(Into::into)).await?;

    finish(ctx, event, flight, ResourceStatus::Deleted).await
}

#[instrument(skip_all, fields(event_id = %event.id))]
async fn start(ctx: &ProcessorContext, event: &Event) -> Step<()> {
    let worker: Worker = load(ctx, event).await?;
    expect_status(&worker, ResourceStatus::Queued)?;

    let flight = InFlight::begin(ctx, worker, ResourceStatus::Provisioning).await?;
    let result = ctx.hypervisor.start(flight.resource().id).await;
    flight.guard(ctx, event, result.map_err(Into::into)).await?;

    finish(ctx, event, flight, ResourceStatus::Active).await
}

#[instrument(skip_all, fields(event_id = %event.id))]
async fn terminate(ctx: &ProcessorContext, event: &Event) -> Step<()> {
    let worker: Worker = load(ctx, event).await?;
    expect_status(&worker, ResourceStatus::Queued)?;
    let force = event.flag(property::FORCE);

    let flight = InFlight::begin(ctx, worker, ResourceStatus::Terminating).await?;
    let id = flight.resource().id;
    let result = if force {
        ctx.hypervisor.force_stop(id).await
    } else {
        ctx.hypervisor.stop(id).await
    };
    flight.guard(ctx, event, result.map_err(Into::into)).await?;

    finish(ctx, event, flight, ResourceStatus::Inactive).await
}

#[instrument(skip_all, fields(event_id = %event.id))]
async fn create_image(ctx: &ProcessorContext, event: &Event) -> Step<()> {
    let Some(image) = event.property(property::IMAGE).map(str::trim) else {
        return abort(format!("{} has no {} property", event.event_type, property::IMAGE));
    };
    if image.is_empty() {
        return abort("empty image reference");
    }

    ensure_image(ctx, image).await?;
    record_completion(ctx, event, &[]).await?;
    info!(%image, "image available");
    Ok(())
}
