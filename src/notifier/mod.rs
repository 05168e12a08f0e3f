// Copyright (c) 2025 - Cowboy AI, Inc.
//! Client Notifications
//!
//! Best-effort push of resource state changes. A failed publish is logged
//! and dropped; it never fails the event that caused it.

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::ManagedResource;
use crate::errors::FabricResult;
use crate::nats::NatsClient;

pub mod channels;

pub use channels::{company_channel, resource_channel, subject_for, STATUS_MESSAGE};

/// Envelope delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub channel: String,
    #[serde(rename = "type")]
    pub message_type: String,
    pub payload: serde_json::Value,
}

/// Push channel to connected clients
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(
        &self,
        channel: &str,
        message_type: &str,
        payload: &serde_json::Value,
    ) -> FabricResult<()>;
}

/// Publish a resource's current state on its own and its owner's channel
pub async fn notify_resource<R: ManagedResource>(notifier: &dyn Notifier, resource: &R) {
    let payload = match serde_json::to_value(resource) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(resource_id = %resource.id(), "Failed to serialize notification: {}", e);
            return;
        }
    };

    let channels = [
        resource_channel(R::KIND, resource.id()),
        company_channel(resource.company_id(), R::KIND),
    ];
    let results = join_all(
        channels
            .iter()
            .map(|channel| notifier.publish(channel, STATUS_MESSAGE, &payload)),
    )
    .await;
    for (channel, result) in channels.iter().zip(results) {
        if let Err(e) = result {
            warn!(%channel, "Notification dropped: {}", e);
        }
    }
}

/// Publishes notifications on NATS
pub struct NatsNotifier {
    client: NatsClient,
}

impl NatsNotifier {
    pub fn new(client: NatsClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Notifier for NatsNotifier {
    async fn publish(
        &self,
        channel: &str,
        message_type: &str,
        payload: &serde_json::Value,
    ) -> FabricResult<()> {
        let message = Notification {
            channel: channel.to_string(),
            message_type: message_type.to_string(),
            payload: payload.clone(),
        };
        self.client.publish(&subject_for(channel), &message).await
    }
}

/// Writes notifications to the log only
#[derive(Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn publish(
        &self,
        channel: &str,
        message_type: &str,
        payload: &serde_json::Value,
    ) -> FabricResult<()> {
        let status = payload.get("status").and_then(|s| s.as_str()).unwrap_or("-");
        info!(%channel, %message_type, %status, "notification");
        Ok(())
    }
}

/// Keeps every notification, for assertions
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<Notification> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Statuses published on `channel`, in order
    pub fn statuses(&self, channel: &str) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|m| m.channel == channel)
            .filter_map(|m| m.payload.get("status").and_then(|s| s.as_str()).map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn publish(
        &self,
        channel: &str,
        message_type: &str,
        payload: &serde_json::Value,
    ) -> FabricResult<()> {
        debug!(%channel, "recorded notification");
        let message = Notification {
            channel: channel.to_string(),
            message_type: message_type.to_string(),
            payload: payload.clone(),
        };
        match self.messages.lock() {
            Ok(mut messages) => messages.push(message),
            Err(poisoned) => poisoned.into_inner().push(message),
        }
        Ok(())
    }
}
