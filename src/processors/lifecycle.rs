// Copyright (c) 2025 - Cowboy AI, Inc.
//! Guarded lifecycle helpers shared by every processor

use chrono::Utc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::{abort, ProcessorContext, Step};
use crate::domain::ResourceKind;
use crate::errors::{FabricError, FabricResult};
use crate::events::{Event, NewEvent, ResourceStatus};
use crate::state_machine::validate_transition;
use crate::store::Persist;

/// Load the resource of kind `R` the event points at
pub async fn load<R: Persist>(ctx: &ProcessorContext, event: &Event) -> Step<R> {
    let Some(id) = event.resource_id(R::KIND) else {
        return abort(format!("{} has no {} resource", event.event_type, R::KIND));
    };
    load_by_id(ctx, id).await
}

pub async fn load_by_id<R: Persist>(ctx: &ProcessorContext, id: Uuid) -> Step<R> {
    match R::load(ctx.store(), id).await? {
        Some(resource) => Ok(resource),
        None => abort(format!("{} {} not found", R::KIND, id)),
    }
}

/// Abort unless the resource is exactly in `expected`
pub fn expect_status<R: Persist>(resource: &R, expected: ResourceStatus) -> Step<()> {
    if resource.status() == expected {
        Ok(())
    } else {
        abort(format!(
            "{} {} is {}, expected {}",
            R::KIND,
            resource.id(),
            resource.status(),
            expected
        ))
    }
}

fn apply<R: Persist>(resource: &mut R, to: ResourceStatus) -> FabricResult<()> {
    validate_transition(R::KIND, resource.status(), to)?;
    resource.set_status(to, Utc::now());
    Ok(())
}

/// A resource persisted in an in-progress state
///
/// Holds the precondition state so any fault between [`InFlight::begin`]
/// and the end of [`InFlight::complete`] puts the resource back where the
/// retry expects to find it.
#[derive(Debug)]
pub struct InFlight<R> {
    resource: R,
    /// Last copy written to the store; a revert restores it
    persisted: R,
    revert_to: ResourceStatus,
}

impl<R: Persist> InFlight<R> {
    /// Move to `to` and persist it before any driver is called
    pub async fn begin(ctx: &ProcessorContext, mut resource: R, to: ResourceStatus) -> FabricResult<Self> {
        let revert_to = resource.status();
        apply(&mut resource, to)?;
        resource.save(ctx.store()).await?;
        debug!(kind = %R::KIND, resource_id = %resource.id(), status = %to, "in progress");
        Ok(Self {
            persisted: resource.clone(),
            resource,
            revert_to,
        })
    }

    pub fn resource(&self) -> &R {
        &self.resource
    }

    pub fn resource_mut(&mut self) -> &mut R {
        &mut self.resource
    }

    /// Persist field changes made while in flight
    pub async fn checkpoint(&mut self, ctx: &ProcessorContext) -> FabricResult<()> {
        self.resource.save(ctx.store()).await?;
        self.persisted = self.resource.clone();
        Ok(())
    }

    /// Pass `result` through, reverting the resource first when it failed
    pub async fn guard<T>(
        &self,
        ctx: &ProcessorContext,
        event: &Event,
        result: FabricResult<T>,
    ) -> FabricResult<T> {
        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                self.revert(ctx, event, &err).await;
                Err(err)
            }
        }
    }

    async fn revert(&self, ctx: &ProcessorContext, event: &Event, cause: &FabricError) {
        let current = self.persisted.status();
        let mut target = if ctx.retry.exhausts_resource(event.retries) {
            ResourceStatus::Failed
        } else {
            self.revert_to
        };
        if validate_transition(R::KIND, current, target).is_err() {
            target = ResourceStatus::Failed;
        }

        warn!(
            event_id = %event.id,
            kind = %R::KIND,
            resource_id = %self.resource.id(),
            retries = event.retries,
            status = %target,
            "reverting after failure: {}", cause
        );

        // Unsaved in-flight edits are dropped with the attempt
        let mut resource = self.persisted.clone();
        resource.set_status(target, Utc::now());
        if let Err(e) = resource.save(ctx.store()).await {
            error!(resource_id = %resource.id(), "failed to persist revert: {}", e);
            return;
        }
        ctx.notify(&resource).await;
    }

    /// Record the completion event, then persist the terminal state `to`
    ///
    /// Both writes run under [`InFlight::guard`], so a store fault here
    /// reverts the resource like a driver fault. When the terminal write
    /// fails after the event was recorded, the retry records it again.
    pub async fn complete(
        self,
        ctx: &ProcessorContext,
        event: &Event,
        to: ResourceStatus,
        resources: &[(ResourceKind, Uuid)],
    ) -> FabricResult<R> {
        let mut settled = self.resource.clone();
        let applied = apply(&mut settled, to);
        self.guard(ctx, event, applied).await?;

        let recorded = record_completion(ctx, event, resources).await;
        self.guard(ctx, event, recorded).await?;

        let saved = settled.save(ctx.store()).await;
        self.guard(ctx, event, saved).await?;
        debug!(kind = %R::KIND, resource_id = %settled.id(), status = %to, "settled");
        Ok(settled)
    }
}

/// Record the request's completion event pointing at the origin and `resources`
pub async fn record_completion(
    ctx: &ProcessorContext,
    event: &Event,
    resources: &[(ResourceKind, Uuid)],
) -> FabricResult<Event> {
    let Some(completed) = event.event_type.completed() else {
        return Err(FabricError::Generic(format!(
            "{} is not a request type",
            event.event_type
        )));
    };
    let mut followup = NewEvent::follow_up(completed, event);
    for (kind, id) in resources {
        followup = followup.with_resource(*kind, id);
    }
    ctx.store().create_event(followup).await
}
