// Copyright (c) 2025 - Cowboy AI, Inc.

//! Notification channel naming
//!
//! Clients subscribe either to one resource or to everything of one kind
//! their company owns:
//!
//! ```text
//! {kind}:{id}                  worker:0192f1c4-...
//! company:{companyId}:{kind}   company:acme:worker
//! ```
//!
//! On NATS the same channels are carried under the `fabric` root with `:`
//! mapped to `.`, so `company:acme:worker` becomes
//! `fabric.company.acme.worker` and `fabric.company.acme.>` receives every
//! kind for one company.
//!
//! # Examples
//!
//! ```rust
//! use cim_fabric::domain::ResourceKind;
//! use cim_fabric::notifier::channels::{company_channel, subject_for};
//!
//! let channel = company_channel("acme", ResourceKind::Fiber);
//! assert_eq!(channel, "company:acme:fiber");
//! assert_eq!(subject_for(&channel), "fabric.company.acme.fiber");
//! ```

use uuid::Uuid;

use crate::domain::ResourceKind;

/// Root namespace for notification subjects
pub const FABRIC_ROOT: &str = "fabric";

/// Message type carried by resource state notifications
pub const STATUS_MESSAGE: &str = "status";

/// Per-resource channel
pub fn resource_channel(kind: ResourceKind, id: Uuid) -> String {
    format!("{}:{}", kind, id)
}

/// Per-owner channel
pub fn company_channel(company_id: &str, kind: ResourceKind) -> String {
    format!("company:{}:{}", company_id, kind)
}

/// NATS subject a channel is published on
pub fn subject_for(channel: &str) -> String {
    format!("{}.{}", FABRIC_ROOT, channel.replace(':', "."))
}

/// Wildcard subscription for all notifications of one company
pub fn company_wildcard(company_id: &str) -> String {
    format!("{}.company.{}.>", FABRIC_ROOT, company_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_channel() {
        let id = Uuid::nil();
        assert_eq!(
            resource_channel(ResourceKind::Zone, id),
            "zone:00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_subject_mapping() {
        let channel = resource_channel(ResourceKind::Worker, Uuid::nil());
        assert_eq!(
            subject_for(&channel),
            "fabric.worker.00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(company_wildcard("acme"), "fabric.company.acme.>");
    }
}
