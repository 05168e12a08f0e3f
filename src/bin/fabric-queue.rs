// Copyright (c) 2025 - Cowboy AI, Inc.
//! Fabric Queue Service
//!
//! Polls the resource store for request events and drives them through
//! their processors until interrupted.
//!
//! Run with: cargo run --bin fabric-queue [--features dynamic-dns]
//!
//! Environment:
//! - `FABRIC_POLL_INTERVAL_MS`, `FABRIC_MAX_RETRIES`, `FABRIC_PORT_MIN`/`MAX`,
//!   `FABRIC_SEED_CIDR` and friends (see `FabricConfig::from_env`)
//! - `NATS_URL` to publish status notifications over NATS
//! - `FABRIC_DNS_ENDPOINT` to use the HTTP dynamic DNS provider
//!   (requires the `dynamic-dns` feature)

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use cim_fabric::{
    allocator::PortAllocator,
    cache::{CachedPublicIp, SystemClock},
    drivers::{
        memory::{MemoryDnsProxy, MemoryHypervisor, MemoryNetwork, StaticPublicIp},
        DnsProxyDriver, PublicIpResolver,
    },
    notifier::{NatsNotifier, Notifier, TracingNotifier},
    FabricConfig, InMemoryStore, NatsClient, NatsConfig, ProcessorContext, ProcessorRegistry,
    QueueProcessor,
};

fn dns_drivers(
    config: &FabricConfig,
) -> Result<(Arc<dyn DnsProxyDriver>, Arc<dyn PublicIpResolver>)> {
    #[cfg(feature = "dynamic-dns")]
    if let Some(dns) = &config.dns {
        use cim_fabric::drivers::dynamic_dns::{HttpDnsProxyDriver, HttpPublicIpResolver};

        let timeout = std::time::Duration::from_secs(dns.timeout_secs);
        let driver = HttpDnsProxyDriver::new(dns.clone())
            .context("Failed to create dynamic DNS driver")?;
        let resolver = HttpPublicIpResolver::new(config.public_ip_url.clone(), timeout)
            .context("Failed to create public IP resolver")?;
        info!("  - DNS provider: {}", dns.endpoint);
        return Ok((Arc::new(driver), Arc::new(resolver)));
    }

    if config.dns.is_some() {
        warn!("FABRIC_DNS_ENDPOINT set but built without the dynamic-dns feature; using in-memory DNS");
    }
    Ok((
        Arc::new(MemoryDnsProxy::new()),
        Arc::new(StaticPublicIp::new("127.0.0.1")),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting fabric queue processor");

    let config = FabricConfig::from_env().context("Invalid fabric configuration")?;
    info!("Configuration loaded:");
    info!("  - Poll interval: {}ms", config.poll_interval_ms);
    info!("  - Max retries: {}", config.max_event_retries);
    info!("  - Host ports: {}-{}", config.ports.min, config.ports.max);
    info!("  - Seed CIDR: {}", config.seed_cidr);

    let notifier: Arc<dyn Notifier> = match &config.nats_url {
        Some(url) => {
            info!("Connecting to NATS at {}", url);
            let client = NatsClient::new(NatsConfig::from_url(url))
                .await
                .context("Failed to connect to NATS")?;
            Arc::new(NatsNotifier::new(client))
        }
        None => {
            info!("NATS_URL not set; notifications go to the log");
            Arc::new(TracingNotifier)
        }
    };

    let (dns, resolver) = dns_drivers(&config)?;
    let public_ip = Arc::new(CachedPublicIp::new(
        resolver,
        config.public_ip_ttl(),
        Arc::new(SystemClock),
    ));

    let network = MemoryNetwork::new(PortAllocator::new(config.ports, config.max_port_attempts));
    let ctx = ProcessorContext::new(
        Arc::new(InMemoryStore::new()),
        Arc::new(MemoryHypervisor::new()),
        Arc::new(network),
        dns,
        public_ip,
        notifier,
        &config,
    );

    let registry = ProcessorRegistry::with_defaults();
    info!("{} processors installed", registry.len());

    let queue = QueueProcessor::new(Arc::new(ctx), Arc::new(registry));
    queue
        .start(config.poll_interval(), async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!("Fabric queue processor stopped");
    Ok(())
}
