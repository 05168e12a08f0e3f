// Copyright (c) 2025 - Cowboy AI, Inc.
//! Queue Processor Integration Tests
//!
//! Drives request events through full queue passes against the in-memory
//! store and drivers.

mod fixtures;

use fixtures::*;
use pretty_assertions::assert_eq;

use cim_fabric::domain::Protocol;
use cim_fabric::drivers::DnatRule;
use cim_fabric::events::property;
use cim_fabric::notifier::{company_channel, resource_channel};
use cim_fabric::{EventType, Portal, ResourceKind, ResourceStatus, ResourceStore};
use std::time::Duration;

#[tokio::test]
async fn test_bootstrap_zone_worker_and_node_in_one_pass() {
    let f = fabric();
    let zone = queued_zone(&f, 254).await;
    let worker = queued_worker(&f, "web-1").await;
    let node = queued_node(&f, &zone).await;

    // Selected oldest first, so each request sees the state the previous one left
    Request::new(1, EventType::ZoneCreate)
        .resource(ResourceKind::Zone, zone.id)
        .insert(&f);
    Request::new(2, EventType::WorkerCreate)
        .resource(ResourceKind::Worker, worker.id)
        .insert(&f);
    Request::new(3, EventType::NodeAssignWorker)
        .resource(ResourceKind::Node, node.id)
        .resource(ResourceKind::Worker, worker.id)
        .insert(&f);

    let report = f.queue.process_queue().await.unwrap();
    assert_eq!(report.processed, 3);
    assert_eq!(report.failed + report.retried, 0);

    let zone = f.store.get_zone(zone.id).await.unwrap().unwrap();
    assert_eq!(zone.cidr.unwrap().to_string(), "10.10.1.0/24");
    assert_eq!(zone.status, ResourceStatus::Active);

    let node = f.store.get_node(node.id).await.unwrap().unwrap();
    assert_eq!(node.ip.as_deref(), Some("10.10.1.2"));
    assert_eq!(node.worker_id, Some(worker.id));
    assert_eq!(node.status, ResourceStatus::Active);
    assert_eq!(
        f.network.reservation(&zone.bridge_id, &node.mac).as_deref(),
        Some("10.10.1.2")
    );

    assert_eq!(
        f.store.get_worker(worker.id).await.unwrap().unwrap().status,
        ResourceStatus::Inactive
    );
    assert_eq!(
        f.notifier.statuses(&resource_channel(ResourceKind::Worker, worker.id)),
        vec!["INACTIVE".to_string()]
    );
    assert_eq!(
        f.notifier.statuses(&company_channel(COMPANY, ResourceKind::Zone)),
        vec!["ACTIVE".to_string()]
    );

    for ty in [
        EventType::ZoneCreated,
        EventType::WorkerCreated,
        EventType::NodeWorkerAssigned,
    ] {
        assert_eq!(f.store.events_of_type(ty).len(), 1, "{ty}");
    }
}

#[tokio::test]
async fn test_replayed_request_has_no_side_effects() {
    let f = fabric();
    let worker = queued_worker(&f, "web-1").await;

    let first = Request::new(1, EventType::WorkerCreate)
        .resource(ResourceKind::Worker, worker.id)
        .insert(&f);
    f.queue.process_queue().await.unwrap();
    assert!(event(&f, first.id).await.processed_at.is_some());

    // Same request delivered again after the resource settled
    let replay = Request::new(2, EventType::WorkerCreate)
        .resource(ResourceKind::Worker, worker.id)
        .insert(&f);
    let report = f.queue.process_queue().await.unwrap();
    assert_eq!(report.failed, 1);

    assert!(event(&f, replay.id).await.failed_at.is_some());
    assert_eq!(f.hypervisor.call_count("create_instance"), 1);
    assert_eq!(
        f.store.get_worker(worker.id).await.unwrap().unwrap().status,
        ResourceStatus::Inactive
    );
}

#[tokio::test]
async fn test_retry_ceiling_fails_resource_then_stops_selecting() {
    let f = fabric();
    f.hypervisor.set_failing("create_instance", true);
    let worker = queued_worker(&f, "web-1").await;
    let e = Request::new(1, EventType::WorkerCreate)
        .resource(ResourceKind::Worker, worker.id)
        .insert(&f);

    for pass in 1..=4 {
        let report = f.queue.process_queue().await.unwrap();
        assert_eq!(report.retried, 1, "pass {pass}");
        assert_eq!(
            f.store.get_worker(worker.id).await.unwrap().unwrap().status,
            ResourceStatus::Queued,
            "pass {pass}"
        );
    }

    // Fifth failure is the last: the worker is parked in FAILED
    let report = f.queue.process_queue().await.unwrap();
    assert_eq!(report.retried, 1);
    assert_eq!(
        f.store.get_worker(worker.id).await.unwrap().unwrap().status,
        ResourceStatus::Failed
    );

    let stored = event(&f, e.id).await;
    assert_eq!(stored.retries, 5);
    assert!(stored.processed_at.is_none() && stored.failed_at.is_none());

    let report = f.queue.process_queue().await.unwrap();
    assert_eq!(report.total(), 0);
}

#[tokio::test]
async fn test_failed_terminal_save_is_retried_to_completion() {
    let f = fabric();
    let worker = queued_worker(&f, "web-1").await;
    f.store
        .fail_saves(ResourceKind::Worker, ResourceStatus::Inactive, 1);
    let e = Request::new(1, EventType::WorkerCreate)
        .resource(ResourceKind::Worker, worker.id)
        .insert(&f);

    let report = f.queue.process_queue().await.unwrap();
    assert_eq!(report.retried, 1);
    assert_eq!(
        f.store.get_worker(worker.id).await.unwrap().unwrap().status,
        ResourceStatus::Queued
    );
    let stored = event(&f, e.id).await;
    assert!(stored.processed_at.is_none() && stored.failed_at.is_none());

    let report = f.queue.process_queue().await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(
        f.store.get_worker(worker.id).await.unwrap().unwrap().status,
        ResourceStatus::Inactive
    );
    let stored = event(&f, e.id).await;
    assert!(stored.processed_at.is_some() && stored.failed_at.is_none());

    // Completion is recorded before the terminal save, so the retry records it again
    assert_eq!(f.store.events_of_type(EventType::WorkerCreated).len(), 2);
    assert!(f.store.events_of_type(EventType::WorkerCreateFailed).is_empty());
}

#[tokio::test]
async fn test_fiber_create_draws_host_port_and_forwards() {
    let f = fabric();
    let zone = active_zone(&f).await;
    let node = addressed_node(&f, &zone, "10.10.1.2").await;
    let fiber = queued_fiber(&f, &node, Protocol::Tcp, 8080).await;

    Request::new(1, EventType::NodeCreateFiber)
        .resource(ResourceKind::Fiber, fiber.id)
        .insert(&f);
    assert_eq!(f.queue.process_queue().await.unwrap().processed, 1);

    let fiber = f.store.get_fiber(fiber.id).await.unwrap().unwrap();
    assert_eq!(fiber.status, ResourceStatus::Active);
    let host_port = fiber.host_port.unwrap();
    assert!((20000..=40000).contains(&host_port));

    assert_eq!(
        f.network.rules(),
        vec![DnatRule {
            bridge: Some(zone.bridge_id.clone()),
            ..rule(Protocol::Tcp, host_port, "10.10.1.2", 8080)
        }]
    );

    let created = f.store.events_of_type(EventType::NodeFiberCreated);
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].resource_id(ResourceKind::Fiber), Some(fiber.id));
    assert_eq!(created[0].resource_id(ResourceKind::Node), Some(node.id));
}

#[tokio::test]
async fn test_fiber_create_rejects_forwarded_target() {
    let f = fabric_with_rules(vec![rule(Protocol::Tcp, 20022, "10.10.1.2", 22)]);
    let zone = active_zone(&f).await;
    let node = addressed_node(&f, &zone, "10.10.1.2").await;
    let fiber = queued_fiber(&f, &node, Protocol::Tcp, 22).await;

    let e = Request::new(1, EventType::NodeCreateFiber)
        .resource(ResourceKind::Fiber, fiber.id)
        .insert(&f);
    assert_eq!(f.queue.process_queue().await.unwrap().failed, 1);

    assert!(event(&f, e.id).await.failed_at.is_some());
    assert_eq!(f.network.call_count("add_port_forward"), 0);
    assert_eq!(
        f.store.get_fiber(fiber.id).await.unwrap().unwrap().status,
        ResourceStatus::Queued
    );

    let failed = f.store.events_of_type(EventType::NodeCreateFiberFailed);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].resource_id(ResourceKind::Event), Some(e.id));
    assert_eq!(failed[0].resource_id(ResourceKind::Fiber), Some(fiber.id));
}

#[tokio::test]
async fn test_fiber_create_same_port_other_protocol_is_allowed() {
    let f = fabric_with_rules(vec![rule(Protocol::Tcp, 20053, "10.10.1.2", 53)]);
    let zone = active_zone(&f).await;
    let node = addressed_node(&f, &zone, "10.10.1.2").await;
    let fiber = queued_fiber(&f, &node, Protocol::Udp, 53).await;

    Request::new(1, EventType::NodeCreateFiber)
        .resource(ResourceKind::Fiber, fiber.id)
        .insert(&f);
    assert_eq!(f.queue.process_queue().await.unwrap().processed, 1);
    assert_eq!(f.network.rules().len(), 2);
}

#[tokio::test]
async fn test_worker_delete_refused_while_assigned() {
    let f = fabric();
    let zone = active_zone(&f).await;
    let worker = queued_worker(&f, "web-1").await;
    let mut node = addressed_node(&f, &zone, "10.10.1.2").await;
    node.worker_id = Some(worker.id);
    f.store.save_node(&node).await.unwrap();

    let e = Request::new(1, EventType::WorkerDelete)
        .resource(ResourceKind::Worker, worker.id)
        .insert(&f);
    assert_eq!(f.queue.process_queue().await.unwrap().failed, 1);

    assert!(event(&f, e.id).await.failed_at.is_some());
    assert_eq!(f.hypervisor.call_count("delete"), 0);
    assert_eq!(
        f.store.get_worker(worker.id).await.unwrap().unwrap().status,
        ResourceStatus::Queued
    );
    assert_eq!(f.store.events_of_type(EventType::WorkerDeleteFailed).len(), 1);
}

#[tokio::test]
async fn test_fiber_update_then_delete() {
    let f = fabric();
    let zone = active_zone(&f).await;
    let node = addressed_node(&f, &zone, "10.10.1.2").await;
    let fiber = queued_fiber(&f, &node, Protocol::Tcp, 8080).await;

    Request::new(1, EventType::NodeCreateFiber)
        .resource(ResourceKind::Fiber, fiber.id)
        .insert(&f);
    Request::new(2, EventType::NodeUpdateFiber)
        .resource(ResourceKind::Fiber, fiber.id)
        .property(property::NEW_TARGET_PORT, "9090")
        .insert(&f);
    assert_eq!(f.queue.process_queue().await.unwrap().processed, 2);

    let updated = f.store.get_fiber(fiber.id).await.unwrap().unwrap();
    assert_eq!(updated.target_port, 9090);
    let rules = f.network.rules();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].destination_port, 9090);
    assert_eq!(Some(rules[0].external_port), updated.host_port);

    // The API layer requeues the fiber before asking for deletion
    f.store
        .set_status(ResourceKind::Fiber, fiber.id, ResourceStatus::Queued)
        .await
        .unwrap();
    Request::new(3, EventType::NodeDeleteFiber)
        .resource(ResourceKind::Fiber, fiber.id)
        .insert(&f);
    assert_eq!(f.queue.process_queue().await.unwrap().processed, 1);
    assert!(f.network.rules().is_empty());
    assert_eq!(
        f.store.get_fiber(fiber.id).await.unwrap().unwrap().status,
        ResourceStatus::Deleted
    );
}

#[tokio::test]
async fn test_portals_share_cached_public_ip_until_ttl() {
    let f = fabric();
    let mut portals = Vec::new();
    for domain in ["app.example.com", "api.example.com", "docs.example.com"] {
        let portal = Portal::new(domain, "secret", COMPANY);
        f.store.save_portal(&portal).await.unwrap();
        portals.push(portal);
    }

    Request::new(1, EventType::PortalCreate)
        .resource(ResourceKind::Portal, portals[0].id)
        .insert(&f);
    Request::new(2, EventType::PortalCreate)
        .resource(ResourceKind::Portal, portals[1].id)
        .insert(&f);
    assert_eq!(f.queue.process_queue().await.unwrap().processed, 2);
    assert_eq!(f.resolver.lookups(), 1);
    assert_eq!(f.dns.record("api.example.com").as_deref(), Some(PUBLIC_IP));

    f.clock.advance(Duration::from_secs(301));
    Request::new(3, EventType::PortalCreate)
        .resource(ResourceKind::Portal, portals[2].id)
        .insert(&f);
    assert_eq!(f.queue.process_queue().await.unwrap().processed, 1);
    assert_eq!(f.resolver.lookups(), 2);
}
