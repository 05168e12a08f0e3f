// Copyright (c) 2025 - Cowboy AI, Inc.
//! Portal and transponder processors
//!
//! A portal is a public hostname: a dynamic DNS record pointing at the
//! host's public address plus a reverse proxy site block. Transponders are
//! the routed paths inside that block, so every transponder change
//! re-renders the whole portal config.

use async_trait::async_trait;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::lifecycle::{expect_status, load, load_by_id, record_completion};
use super::{abort, conclude, EventProcessor, InFlight, ProcessOutcome, ProcessorContext, Step};
use crate::domain::{Node, Portal, ResourceKind, Transponder, TransponderTarget};
use crate::drivers::proxy::ProxyRoute;
use crate::errors::FabricResult;
use crate::events::{property, Event, EventType, ResourceStatus};

/// `PORTAL_CREATE`: publish the DNS record and the proxy site
pub struct PortalCreate;

/// `PORTAL_UPDATE`: resync DNS and proxy when `FORCE_SYNC` is set
pub struct PortalUpdate;

/// `TRANSPONDER_CREATE`: add a routed path to its portal
pub struct TransponderCreate;

/// `TRANSPONDER_UPDATE`: re-render the portal when `FORCE_SYNC` is set
pub struct TransponderUpdate;

/// `TRANSPONDER_DELETE`: drop a routed path from its portal
pub struct TransponderDelete;

macro_rules! processor {
    ($ty:ident, $event:ident, $handler:ident) => {
        #[async_trait]
        impl EventProcessor for $ty {
            fn event_type(&self) -> EventType {
                EventType::$event
            }

            async fn process(
                &self,
                ctx: &ProcessorContext,
                event: &Event,
            ) -> FabricResult<ProcessOutcome> {
                conclude(event, $handler(ctx, event).await)
            }
        }
    };
}

processor!(PortalCreate, PortalCreate, create_portal);
processor!(PortalUpdate, PortalUpdate, update_portal);
processor!(TransponderCreate, TransponderCreate, create_transponder);
processor!(TransponderUpdate, TransponderUpdate, update_transponder);
processor!(TransponderDelete, TransponderDelete, delete_transponder);

/// Resolve every transponder of `portal_id` to a proxy route
///
/// Node targets without an address yet have nowhere to forward to and are
/// left out.
async fn routes(ctx: &ProcessorContext, portal_id: Uuid) -> FabricResult<Vec<ProxyRoute>> {
    let mut routes = Vec::new();
    for transponder in ctx.store().transponders_for_portal(portal_id).await? {
        let host = match &transponder.target {
            TransponderTarget::External(ip) => ip.clone(),
            TransponderTarget::Node(node_id) => match ctx.store().get_node(*node_id).await? {
                Some(node) => match node.ip {
                    Some(ip) => ip,
                    None => {
                        debug!(transponder_id = %transponder.id, %node_id, "node has no address; route skipped");
                        continue;
                    }
                },
                None => {
                    debug!(transponder_id = %transponder.id, %node_id, "node missing; route skipped");
                    continue;
                }
            },
        };
        routes.push(ProxyRoute {
            transponder_id: transponder.id,
            path: transponder.path.clone(),
            upstream: format!("{}:{}", host, transponder.target_port),
            status: transponder.status,
        });
    }
    Ok(routes)
}

/// Point the portal's domain at the public address and render its site
async fn sync_portal(ctx: &ProcessorContext, portal: &Portal) -> FabricResult<()> {
    let ip = ctx.public_ip.get().await?;
    ctx.dns
        .upsert_dynamic_dns_record(&portal.domain, &ip, &portal.api_key)
        .await?;
    let routes = routes(ctx, portal.id).await?;
    ctx.dns.render_proxy_config(portal, &routes, None).await?;
    Ok(())
}

async fn render(ctx: &ProcessorContext, portal: &Portal, force_include: Option<Uuid>) -> FabricResult<()> {
    let routes = routes(ctx, portal.id).await?;
    ctx.dns
        .render_proxy_config(portal, &routes, force_include)
        .await?;
    Ok(())
}

async fn finish_portal(ctx: &ProcessorContext, event: &Event, flight: InFlight<Portal>) -> Step<Portal> {
    let id = flight.resource().id;
    Ok(flight
        .complete(ctx, event, ResourceStatus::Active, &[(ResourceKind::Portal, id)])
        .await?)
}

async fn active_portal(ctx: &ProcessorContext, transponder: &Transponder) -> Step<Portal> {
    let portal: Portal = load_by_id(ctx, transponder.portal_id).await?;
    if portal.status != ResourceStatus::Active {
        return abort(format!(
            "portal {} is {}, transponder {} needs it active",
            portal.id, portal.status, transponder.id
        ));
    }
    Ok(portal)
}

#[instrument(skip_all, fields(event_id = %event.id))]
async fn create_portal(ctx: &ProcessorContext, event: &Event) -> Step<()> {
    let portal: Portal = load(ctx, event).await?;
    expect_status(&portal, ResourceStatus::Queued)?;

    let flight = InFlight::begin(ctx, portal, ResourceStatus::Provisioning).await?;
    let result = sync_portal(ctx, flight.resource()).await;
    flight.guard(ctx, event, result).await?;

    let portal = finish_portal(ctx, event, flight).await?;
    info!(portal_id = %portal.id, domain = %portal.domain, "portal published");
    ctx.notify(&portal).await;
    Ok(())
}

#[instrument(skip_all, fields(event_id = %event.id))]
async fn update_portal(ctx: &ProcessorContext, event: &Event) -> Step<()> {
    let portal: Portal = load(ctx, event).await?;
    expect_status(&portal, ResourceStatus::Active)?;

    if !event.flag(property::FORCE_SYNC) {
        record_completion(ctx, event, &[(ResourceKind::Portal, portal.id)]).await?;
        debug!(portal_id = %portal.id, "portal touched");
        return Ok(());
    }

    let flight = InFlight::begin(ctx, portal, ResourceStatus::Provisioning).await?;
    let result = sync_portal(ctx, flight.resource()).await;
    flight.guard(ctx, event, result).await?;

    let portal = finish_portal(ctx, event, flight).await?;
    info!(portal_id = %portal.id, domain = %portal.domain, "portal resynced");
    ctx.notify(&portal).await;
    Ok(())
}

#[instrument(skip_all, fields(event_id = %event.id))]
async fn create_transponder(ctx: &ProcessorContext, event: &Event) -> Step<()> {
    let transponder: Transponder = load(ctx, event).await?;
    expect_status(&transponder, ResourceStatus::Queued)?;
    let portal = active_portal(ctx, &transponder).await?;

    if let TransponderTarget::Node(node_id) = transponder.target {
        let node: Node = load_by_id(ctx, node_id).await?;
        if node.ip.is_none() {
            return abort(format!("node {} has no address to route to", node.id));
        }
    }

    let flight = InFlight::begin(ctx, transponder, ResourceStatus::Provisioning).await?;
    let result = render(ctx, &portal, Some(flight.resource().id)).await;
    flight.guard(ctx, event, result).await?;

    finish_transponder(ctx, event, flight, ResourceStatus::Active, &portal).await
}

#[instrument(skip_all, fields(event_id = %event.id))]
async fn update_transponder(ctx: &ProcessorContext, event: &Event) -> Step<()> {
    let transponder: Transponder = load(ctx, event).await?;
    expect_status(&transponder, ResourceStatus::Active)?;

    if !event.flag(property::FORCE_SYNC) {
        record_completion(
            ctx,
            event,
            &[
                (ResourceKind::Transponder, transponder.id),
                (ResourceKind::Portal, transponder.portal_id),
            ],
        )
        .await?;
        debug!(transponder_id = %transponder.id, "transponder touched");
        return Ok(());
    }

    let portal = active_portal(ctx, &transponder).await?;
    let flight = InFlight::begin(ctx, transponder, ResourceStatus::Provisioning).await?;
    let result = render(ctx, &portal, Some(flight.resource().id)).await;
    flight.guard(ctx, event, result).await?;

    finish_transponder(ctx, event, flight, ResourceStatus::Active, &portal).await
}

#[instrument(skip_all, fields(event_id = %event.id))]
async fn delete_transponder(ctx: &ProcessorContext, event: &Event) -> Step<()> {
    let transponder: Transponder = load(ctx, event).await?;
    expect_status(&transponder, ResourceStatus::Queued)?;
    let portal: Portal = load_by_id(ctx, transponder.portal_id).await?;

    let flight = InFlight::begin(ctx, transponder, ResourceStatus::Deleting).await?;
    // The transponder is DELETING now, so the render leaves it out
    let result = render(ctx, &portal, None).await;
    flight.guard(ctx, event, result).await?;

    finish_transponder(ctx, event, flight, ResourceStatus::Deleted, &portal).await
}

async fn finish_transponder(
    ctx: &ProcessorContext,
    event: &Event,
    flight: InFlight<Transponder>,
    to: ResourceStatus,
    portal: &Portal,
) -> Step<()> {
    let id = flight.resource().id;
    let transponder = flight
        .complete(
            ctx,
            event,
            to,
            &[(ResourceKind::Transponder, id), (ResourceKind::Portal, portal.id)],
        )
        .await?;
    info!(
        transponder_id = %transponder.id,
        portal = %portal.domain,
        path = %transponder.path,
        status = %to,
        "transponder settled"
    );
    ctx.notify(&transponder).await;
    Ok(())
}
