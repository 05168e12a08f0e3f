// Copyright (c) 2025 - Cowboy AI, Inc.
//! Operator recovery

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, instrument, warn};

use super::{conclude, EventProcessor, ProcessOutcome, ProcessorContext, Step};
use crate::errors::FabricResult;
use crate::events::{Event, EventType, NewEvent, ResourceStatus};
use crate::notifier::{resource_channel, STATUS_MESSAGE};
use crate::state_machine::validate_transition;

/// `SYSTEM_RESET`: move every resource stuck in an in-progress state back to `QUEUED`
///
/// A crash between persisting `PROVISIONING` and settling leaves the
/// resource where no precondition accepts it. After the sweep a re-issued
/// lifecycle event can run again.
pub struct SystemReset;

#[async_trait]
impl EventProcessor for SystemReset {
    fn event_type(&self) -> EventType {
        EventType::SystemReset
    }

    async fn process(&self, ctx: &ProcessorContext, event: &Event) -> FabricResult<ProcessOutcome> {
        conclude(event, reset(ctx, event).await)
    }
}

#[instrument(skip_all, fields(event_id = %event.id))]
async fn reset(ctx: &ProcessorContext, event: &Event) -> Step<()> {
    let stuck = ctx.store().in_progress_resources().await?;

    let mut reset = 0usize;
    for (kind, id, status) in stuck {
        if let Err(e) = validate_transition(kind, status, ResourceStatus::Queued) {
            warn!(%kind, %id, %status, "left in place: {}", e);
            continue;
        }
        ctx.store().set_status(kind, id, ResourceStatus::Queued).await?;
        info!(%kind, %id, from = %status, "requeued");

        let payload = json!({ "id": id, "status": ResourceStatus::Queued });
        if let Err(e) = ctx
            .notifier
            .publish(&resource_channel(kind, id), STATUS_MESSAGE, &payload)
            .await
        {
            warn!(%kind, %id, "Notification dropped: {}", e);
        }
        reset += 1;
    }

    ctx.store()
        .create_event(
            NewEvent::follow_up(EventType::SystemResetCompleted, event)
                .with_data(json!({ "reset": reset })),
        )
        .await?;
    info!(reset, "system reset complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Fiber, Protocol, ResourceKind, Worker};
    use crate::processors::test_support::harness;
    use crate::store::ResourceStore;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_reset_requeues_in_progress_resources() {
        let h = harness();

        let mut stuck = Worker::new("web", "debian-12", "small", "acme");
        stuck.status = ResourceStatus::Provisioning;
        h.store.save_worker(&stuck).await.unwrap();

        let mut deleting = Fiber::new(Uuid::now_v7(), Protocol::Tcp, 22, "acme");
        deleting.status = ResourceStatus::Deleting;
        h.store.save_fiber(&deleting).await.unwrap();

        let mut settled = Worker::new("db", "debian-12", "small", "acme");
        settled.status = ResourceStatus::Active;
        h.store.save_worker(&settled).await.unwrap();

        let e = h
            .store
            .create_event(NewEvent::new(EventType::SystemReset, "operator", "acme"))
            .await
            .unwrap();
        assert_eq!(SystemReset.process(&h.ctx, &e).await.unwrap(), ProcessOutcome::Completed);

        assert_eq!(
            h.store.get_worker(stuck.id).await.unwrap().unwrap().status,
            ResourceStatus::Queued
        );
        assert_eq!(
            h.store.get_fiber(deleting.id).await.unwrap().unwrap().status,
            ResourceStatus::Queued
        );
        assert_eq!(
            h.store.get_worker(settled.id).await.unwrap().unwrap().status,
            ResourceStatus::Active
        );

        let completed = h.store.events_of_type(EventType::SystemResetCompleted);
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].data, json!({ "reset": 2 }));
        assert_eq!(completed[0].resource_id(ResourceKind::Event), Some(e.id));
        assert_eq!(
            h.notifier.statuses(&resource_channel(ResourceKind::Worker, stuck.id)),
            vec!["QUEUED".to_string()]
        );
    }
}
