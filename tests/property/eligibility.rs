// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Queue Event Selection
//!
//! An event is selected iff it is neither processed nor failed and has been
//! retried fewer than `max_retries` times; selection is oldest first.

use chrono::{Duration, TimeZone, Utc};
use cim_fabric::events::Event;
use cim_fabric::{EventType, InMemoryStore, ResourceStore, RetryPolicy};
use proptest::prelude::*;
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
enum Settled {
    Open,
    Processed,
    Failed,
}

fn settled() -> impl Strategy<Value = Settled> {
    prop_oneof![Just(Settled::Open), Just(Settled::Processed), Just(Settled::Failed)]
}

fn request_type() -> impl Strategy<Value = EventType> {
    prop::sample::select(EventType::REQUESTS.to_vec())
}

fn event(seq: usize, event_type: EventType, retries: u32, settled: Settled) -> Event {
    let created_at = Utc.with_ymd_and_hms(2026, 1, 19, 12, 0, 0).unwrap();
    // Reverse-chronological insertion so ordering cannot come from insertion
    let created_at = created_at - Duration::seconds(seq as i64);
    let settled_at = created_at + Duration::seconds(1);
    Event {
        id: Uuid::from_u128(seq as u128 + 1),
        event_type,
        data: serde_json::Value::Null,
        retries,
        processed_at: matches!(settled, Settled::Processed).then_some(settled_at),
        failed_at: matches!(settled, Settled::Failed).then_some(settled_at),
        created_by: "api".to_string(),
        company_id: "acme".to_string(),
        created_at,
        notes: None,
        resources: Vec::new(),
        properties: Vec::new(),
    }
}

proptest! {
    #[test]
    fn prop_selection_matches_eligibility(
        rows in proptest::collection::vec((request_type(), 0u32..8, settled()), 0..40),
        max_retries in 1u32..7,
    ) {
        let policy = RetryPolicy::new(max_retries);
        let store = InMemoryStore::new();
        let events: Vec<Event> = rows
            .iter()
            .enumerate()
            .map(|(seq, (ty, retries, settled))| event(seq, *ty, *retries, *settled))
            .collect();
        for e in &events {
            store.insert_event(e.clone());
        }

        let selected = tokio_test::block_on(
            store.find_eligible_events(EventType::REQUESTS, &policy),
        )
        .unwrap();

        let mut expected: Vec<&Event> = events
            .iter()
            .filter(|e| e.processed_at.is_none() && e.failed_at.is_none() && e.retries < max_retries)
            .collect();
        expected.sort_by_key(|e| e.created_at);

        let selected_ids: Vec<Uuid> = selected.iter().map(|e| e.id).collect();
        let expected_ids: Vec<Uuid> = expected.iter().map(|e| e.id).collect();
        prop_assert_eq!(selected_ids, expected_ids);
    }

    #[test]
    fn prop_unregistered_types_are_never_selected(
        rows in proptest::collection::vec(request_type(), 1..20),
    ) {
        let store = InMemoryStore::new();
        for (seq, ty) in rows.iter().enumerate() {
            store.insert_event(event(seq, *ty, 0, Settled::Open));
        }

        let only = [EventType::ZoneCreate];
        let selected = tokio_test::block_on(
            store.find_eligible_events(&only, &RetryPolicy::default()),
        )
        .unwrap();

        prop_assert!(selected.iter().all(|e| e.event_type == EventType::ZoneCreate));
        prop_assert_eq!(
            selected.len(),
            rows.iter().filter(|ty| **ty == EventType::ZoneCreate).count()
        );
    }

    /// The resource is forced to FAILED exactly on the event's last permitted failure
    #[test]
    fn prop_resource_ceiling_is_last_event_attempt(max_retries in 1u32..10, retries in 0u32..12) {
        let policy = RetryPolicy::new(max_retries);
        prop_assert_eq!(policy.exhausts_resource(retries), retries + 1 >= max_retries);
    }
}
