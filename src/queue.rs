// Copyright (c) 2025 - Cowboy AI, Inc.
//! Queue Processor
//!
//! Polls the store for eligible request events and dispatches each to its
//! processor, strictly one at a time, oldest first.
//!
//! ```text
//! find_eligible_events ─▶ processor.process(event)
//!                              │
//!          ┌───────────────────┼────────────────────┐
//!      Completed            Aborted               Err
//!          │                   │                    │
//!   mark_processed    record <TYPE>_FAILED    increment_retries
//!                        mark_failed          (eligible again until
//!                                              the retry ceiling)
//! ```
//!
//! The DNAT rule set and DHCP reservation files are rewritten whole on every
//! change, so only one poller may run against a host. The running flag lives
//! on the shared [`ProcessorContext`]: a call to
//! [`QueueProcessor::process_queue`] on any queue over that context while a
//! pass is in flight returns at once with [`PassReport::skipped`] set. The
//! flag does not reach other processes.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, instrument, warn};

use crate::errors::FabricResult;
use crate::events::{Event, NewEvent};
use crate::processors::{ProcessOutcome, ProcessorContext, ProcessorRegistry};

/// Tally of one pass over the queue
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Events marked processed
    pub processed: usize,
    /// Events aborted and marked failed
    pub failed: usize,
    /// Events that hit a fault and had their retry count bumped
    pub retried: usize,
    /// Another pass was already running; nothing was selected
    pub skipped: bool,
}

impl PassReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    pub fn total(&self) -> usize {
        self.processed + self.failed + self.retried
    }
}

/// Clears the running flag however the pass ends
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

enum Disposition {
    Processed,
    Failed,
    Retried,
}

/// Sequential event dispatcher
pub struct QueueProcessor {
    ctx: Arc<ProcessorContext>,
    registry: Arc<ProcessorRegistry>,
}

impl QueueProcessor {
    pub fn new(ctx: Arc<ProcessorContext>, registry: Arc<ProcessorRegistry>) -> Self {
        Self { ctx, registry }
    }

    pub fn context(&self) -> &ProcessorContext {
        &self.ctx
    }

    /// Process every eligible event once
    ///
    /// Per-event errors are logged and counted; only a failure to select
    /// events at all is returned.
    #[instrument(skip(self))]
    pub async fn process_queue(&self) -> FabricResult<PassReport> {
        if self
            .ctx
            .pass_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("pass already running; skipping");
            return Ok(PassReport::skipped());
        }
        let _guard = PassGuard(&self.ctx.pass_running);

        let types = self.registry.event_types();
        let events = self
            .ctx
            .store()
            .find_eligible_events(&types, &self.ctx.retry)
            .await?;
        if events.is_empty() {
            return Ok(PassReport::default());
        }
        debug!(count = events.len(), "eligible events selected");

        let mut report = PassReport::default();
        for event in events {
            match self.dispatch(&event).await {
                Ok(Disposition::Processed) => report.processed += 1,
                Ok(Disposition::Failed) => report.failed += 1,
                Ok(Disposition::Retried) => report.retried += 1,
                Err(e) => {
                    error!(event_id = %event.id, event_type = %event.event_type, "Failed to settle event: {}", e);
                }
            }
        }

        info!(
            processed = report.processed,
            failed = report.failed,
            retried = report.retried,
            "queue pass complete"
        );
        Ok(report)
    }

    async fn dispatch(&self, event: &Event) -> FabricResult<Disposition> {
        let Some(processor) = self.registry.get(event.event_type) else {
            // Only registered types are selected, so this is a registry swap mid-pass
            warn!(event_id = %event.id, event_type = %event.event_type, "no processor installed");
            self.ctx.store().increment_retries(event.id).await?;
            return Ok(Disposition::Retried);
        };

        match processor.process(&self.ctx, event).await {
            Ok(ProcessOutcome::Completed) => {
                self.ctx.store().mark_processed(event.id).await?;
                debug!(event_id = %event.id, event_type = %event.event_type, "processed");
                Ok(Disposition::Processed)
            }
            Ok(ProcessOutcome::Aborted { message, followup }) => {
                warn!(event_id = %event.id, event_type = %event.event_type, "aborted: {}", message);
                if let Some(followup) = followup {
                    let mut failed = NewEvent::follow_up(followup, event).with_notes(message);
                    for resource in &event.resources {
                        failed = failed.with_resource(resource.resource_type, &resource.resource_id);
                    }
                    self.ctx.store().create_event(failed).await?;
                }
                self.ctx.store().mark_failed(event.id).await?;
                Ok(Disposition::Failed)
            }
            Err(e) => {
                error!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    retries = event.retries + 1,
                    max_retries = self.ctx.retry.max_retries,
                    "processing failed: {}", e
                );
                self.ctx.store().increment_retries(event.id).await?;
                Ok(Disposition::Retried)
            }
        }
    }

    /// Run passes every `interval` until `shutdown` resolves
    ///
    /// The interval is measured from the start of one pass to the start of
    /// the next; a pass that overruns it is followed immediately by the next.
    /// A pass in progress is allowed to finish before returning.
    pub async fn start<F>(&self, interval: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(interval_ms = interval.as_millis() as u64, "queue processor started");

        loop {
            let started = Instant::now();
            if let Err(e) = self.process_queue().await {
                error!("Queue pass failed: {}", e);
            }

            let delay = interval.saturating_sub(started.elapsed());
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("queue processor stopped");
    }
}
