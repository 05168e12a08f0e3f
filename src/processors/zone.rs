// Copyright (c) 2025 - Cowboy AI, Inc.
//! Zone processors

use async_trait::async_trait;
use tracing::{info, instrument};

use super::lifecycle::{expect_status, load};
use super::{abort, conclude, EventProcessor, InFlight, ProcessOutcome, ProcessorContext, Step};
use crate::allocator::next_cidr;
use crate::domain::{int_to_ip, Ipv4Cidr, ResourceKind, Zone};
use crate::errors::FabricResult;
use crate::events::{Event, EventType, ResourceStatus};

/// `ZONE_CREATE`: allocate the zone's block if needed and bring its bridge up
pub struct ZoneCreate;

/// `ZONE_DELETE`: tear an empty zone down
pub struct ZoneDelete;

#[async_trait]
impl EventProcessor for ZoneCreate {
    fn event_type(&self) -> EventType {
        EventType::ZoneCreate
    }

    async fn process(&self, ctx: &ProcessorContext, event: &Event) -> FabricResult<ProcessOutcome> {
        conclude(event, create(ctx, event).await)
    }
}

#[async_trait]
impl EventProcessor for ZoneDelete {
    fn event_type(&self) -> EventType {
        EventType::ZoneDelete
    }

    async fn process(&self, ctx: &ProcessorContext, event: &Event) -> FabricResult<ProcessOutcome> {
        conclude(event, delete(ctx, event).await)
    }
}

/// Next block after the latest zone (or the seed), with its gateway
async fn allocate_block(ctx: &ProcessorContext, zone: &Zone) -> FabricResult<(Ipv4Cidr, String)> {
    let last = ctx
        .store()
        .latest_zone_cidr()
        .await?
        .unwrap_or(ctx.seed_cidr);
    let hosts = if zone.host_count == 0 {
        ctx.default_zone_hosts
    } else {
        zone.host_count
    };
    let (cidr, gateway) = next_cidr(&last, hosts)?;
    Ok((cidr, int_to_ip(gateway)))
}

#[instrument(skip_all, fields(event_id = %event.id))]
async fn create(ctx: &ProcessorContext, event: &Event) -> Step<()> {
    let zone: Zone = load(ctx, event).await?;
    expect_status(&zone, ResourceStatus::Queued)?;

    let mut flight = InFlight::begin(ctx, zone, ResourceStatus::Provisioning).await?;

    let cidr = match flight.resource().cidr {
        Some(cidr) => cidr,
        None => {
            let allocated = allocate_block(ctx, flight.resource()).await;
            let (cidr, gateway) = flight.guard(ctx, event, allocated).await?;
            let zone = flight.resource_mut();
            zone.cidr = Some(cidr);
            zone.gateway = Some(gateway);
            let saved = flight.checkpoint(ctx).await;
            flight.guard(ctx, event, saved).await?;
            cidr
        }
    };
    if flight.resource().gateway.is_none() {
        flight.resource_mut().gateway = Some(int_to_ip(cidr.gateway()));
    }

    let bridge_id = flight.resource().bridge_id.clone();
    let result = ctx.network.create_zone(&cidr, &bridge_id).await;
    flight.guard(ctx, event, result.map_err(Into::into)).await?;

    let zone_id = flight.resource().id;
    let zone = flight
        .complete(ctx, event, ResourceStatus::Active, &[(ResourceKind::Zone, zone_id)])
        .await?;
    info!(zone_id = %zone.id, %cidr, bridge = %zone.bridge_id, "zone created");
    ctx.notify(&zone).await;
    Ok(())
}

#[instrument(skip_all, fields(event_id = %event.id))]
async fn delete(ctx: &ProcessorContext, event: &Event) -> Step<()> {
    let zone: Zone = load(ctx, event).await?;
    expect_status(&zone, ResourceStatus::Queued)?;

    let attached = ctx
        .store()
        .nodes_in_zone(zone.id)
        .await?
        .into_iter()
        .filter(|n| n.status != ResourceStatus::Deleted)
        .count();
    if attached > 0 {
        return abort(format!("zone {} still has {} node(s)", zone.id, attached));
    }

    let flight = InFlight::begin(ctx, zone, ResourceStatus::Deleting).await?;
    if let Some(cidr) = flight.resource().cidr {
        let result = ctx
            .network
            .delete_zone(&flight.resource().bridge_id, &cidr)
            .await;
        flight.guard(ctx, event, result.map_err(Into::into)).await?;
    }

    let zone_id = flight.resource().id;
    let zone = flight
        .complete(ctx, event, ResourceStatus::Deleted, &[(ResourceKind::Zone, zone_id)])
        .await?;
    info!(zone_id = %zone.id, "zone deleted");
    ctx.notify(&zone).await;
    Ok(())
}
