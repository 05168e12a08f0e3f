// Copyright (c) 2025 - Cowboy AI, Inc.
//! Event rows, their typed resource pointers and key/value properties

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::EventType;
use crate::domain::ResourceKind;

/// Event-level retry ceiling; the resource-level ceiling is derived from it
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Well-known property keys
pub mod property {
    /// New target port for `NODE_UPDATE_FIBER`
    pub const NEW_TARGET_PORT: &str = "NEW_TARGET_PORT";
    /// Forces a driver sync on portal/transponder updates
    pub const FORCE_SYNC: &str = "FORCE_SYNC";
    /// Extra SSH public key injected on worker creation
    pub const PUBLIC_SSH: &str = "PublicSSH";
    /// Hard power-off on worker termination
    pub const FORCE: &str = "FORCE";
    /// Image reference for `WORKER_IMAGE_CREATE`
    pub const IMAGE: &str = "IMAGE";
}

/// Typed pointer from an event to a resource it concerns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventResource {
    pub event_id: Uuid,
    pub resource_type: ResourceKind,
    pub resource_id: String,
}

/// Ad hoc parameter attached to an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventProperty {
    pub event_id: Uuid,
    pub key: String,
    pub value: String,
}

/// A recorded event, hydrated with its resources and properties
///
/// At most one of `processed_at` / `failed_at` is ever set and neither
/// reverts; `retries` only increases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub event_type: EventType,
    #[serde(default)]
    pub data: serde_json::Value,
    pub retries: u32,
    pub processed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub created_by: String,
    pub company_id: String,
    pub created_at: DateTime<Utc>,
    pub notes: Option<String>,
    #[serde(default)]
    pub resources: Vec<EventResource>,
    #[serde(default)]
    pub properties: Vec<EventProperty>,
}

impl Event {
    /// First resource of the given kind whose id parses as a UUID
    pub fn resource_id(&self, kind: ResourceKind) -> Option<Uuid> {
        self.resources
            .iter()
            .filter(|r| r.resource_type == kind)
            .find_map(|r| Uuid::parse_str(&r.resource_id).ok())
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.value.as_str())
    }

    /// Property present with any value other than `false`/`0`
    pub fn flag(&self, key: &str) -> bool {
        self.property(key)
            .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "false" | "0"))
            .unwrap_or(false)
    }

    /// Neither settled nor out of retries
    pub fn is_eligible(&self, policy: &RetryPolicy) -> bool {
        self.processed_at.is_none() && self.failed_at.is_none() && self.retries < policy.max_retries
    }
}

/// Parameters for recording a new event
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub event_type: EventType,
    pub created_by: String,
    pub company_id: String,
    pub data: serde_json::Value,
    pub notes: Option<String>,
    pub resources: Vec<(ResourceKind, String)>,
    pub properties: Vec<(String, String)>,
}

impl NewEvent {
    pub fn new(
        event_type: EventType,
        created_by: impl Into<String>,
        company_id: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            created_by: created_by.into(),
            company_id: company_id.into(),
            data: serde_json::Value::Null,
            notes: None,
            resources: Vec::new(),
            properties: Vec::new(),
        }
    }

    /// Follow-up event inheriting the originator and company of `origin`
    pub fn follow_up(event_type: EventType, origin: &Event) -> Self {
        Self::new(event_type, origin.created_by.clone(), origin.company_id.clone())
            .with_resource(ResourceKind::Event, origin.id)
    }

    pub fn with_resource(mut self, kind: ResourceKind, id: impl ToString) -> Self {
        self.resources.push((kind, id.to_string()));
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.push((key.into(), value.into()));
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Retry ceilings for events and the resources they drive
///
/// An event is retried while `retries < max_retries`. The resource an event
/// drives is forced to `FAILED` instead of back to its retry state once the
/// event has already failed `max_retries - 1` times, so both ceilings come
/// from the one number: an event fails at most `max_retries` times before
/// its resource is marked `FAILED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Whether a hard failure on an event with `retries` prior failures is its last
    pub fn exhausts_resource(&self, retries: u32) -> bool {
        retries >= self.max_retries.saturating_sub(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(retries: u32) -> Event {
        Event {
            id: Uuid::now_v7(),
            event_type: EventType::WorkerCreate,
            data: serde_json::Value::Null,
            retries,
            processed_at: None,
            failed_at: None,
            created_by: "api".to_string(),
            company_id: "acme".to_string(),
            created_at: Utc::now(),
            notes: None,
            resources: Vec::new(),
            properties: Vec::new(),
        }
    }

    #[test]
    fn test_eligibility() {
        let policy = RetryPolicy::default();
        assert!(event(0).is_eligible(&policy));
        assert!(event(4).is_eligible(&policy));
        assert!(!event(5).is_eligible(&policy));

        let mut processed = event(0);
        processed.processed_at = Some(Utc::now());
        assert!(!processed.is_eligible(&policy));

        let mut failed = event(0);
        failed.failed_at = Some(Utc::now());
        assert!(!failed.is_eligible(&policy));
    }

    #[test]
    fn test_resource_ceiling_tracks_event_ceiling() {
        let policy = RetryPolicy::default();
        assert!(!policy.exhausts_resource(3));
        assert!(policy.exhausts_resource(4));
    }

    #[test]
    fn test_resource_lookup_by_kind() {
        let worker_id = Uuid::now_v7();
        let mut e = event(0);
        e.resources.push(EventResource {
            event_id: e.id,
            resource_type: ResourceKind::Node,
            resource_id: "not-a-uuid".to_string(),
        });
        e.resources.push(EventResource {
            event_id: e.id,
            resource_type: ResourceKind::Worker,
            resource_id: worker_id.to_string(),
        });

        assert_eq!(e.resource_id(ResourceKind::Worker), Some(worker_id));
        assert_eq!(e.resource_id(ResourceKind::Node), None);
        assert_eq!(e.resource_id(ResourceKind::Fiber), None);
    }

    #[test]
    fn test_flag_property() {
        let mut e = event(0);
        assert!(!e.flag(property::FORCE_SYNC));
        e.properties.push(EventProperty {
            event_id: e.id,
            key: property::FORCE_SYNC.to_string(),
            value: "true".to_string(),
        });
        assert!(e.flag(property::FORCE_SYNC));
    }
}
