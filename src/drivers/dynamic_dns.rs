// Copyright (c) 2025 - Cowboy AI, Inc.
//! HTTP dynamic DNS provider, file-backed reverse proxy and public IP lookup
//!
//! Enabled with the `dynamic-dns` feature.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};
use uuid::Uuid;

use super::proxy::{render_portal_config, ProxyRoute};
use super::{DnsProxyDriver, DriverError, DriverResult, PublicIpResolver};
use crate::config::DynamicDnsConfig;
use crate::domain::{ip_to_int, Portal};

#[derive(Debug, Serialize)]
struct DnsRecord<'a> {
    domain: &'a str,
    ip: &'a str,
    #[serde(rename = "type")]
    record_type: &'static str,
}

/// Upserts A records over HTTP and renders one proxy config file per portal
pub struct HttpDnsProxyDriver {
    config: DynamicDnsConfig,
    client: Client,
}

impl HttpDnsProxyDriver {
    pub fn new(config: DynamicDnsConfig) -> DriverResult<Self> {
        info!("Using dynamic DNS provider at {}", config.endpoint);

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DriverError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn config_path(&self, portal_id: Uuid) -> PathBuf {
        PathBuf::from(&self.config.proxy_config_dir).join(format!("{portal_id}.conf"))
    }

    async fn reload_proxy(&self) -> DriverResult<()> {
        let Some((program, args)) = self.config.reload_command.split_first() else {
            return Ok(());
        };

        let output = Command::new(program).args(args).output().await?;
        if !output.status.success() {
            return Err(DriverError::CommandFailed {
                operation: "reload_proxy".to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        debug!("Reloaded proxy with {:?}", self.config.reload_command);
        Ok(())
    }
}

#[async_trait]
impl DnsProxyDriver for HttpDnsProxyDriver {
    async fn upsert_dynamic_dns_record(
        &self,
        domain: &str,
        ip: &str,
        api_key: &str,
    ) -> DriverResult<()> {
        let record = DnsRecord {
            domain,
            ip,
            record_type: "A",
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(api_key)
            .json(&record)
            .send()
            .await
            .map_err(|e| DriverError::Http(format!("DNS provider error: {}", e)))?;

        let status = response.status();
        if status == StatusCode::OK || status == StatusCode::CREATED || status == StatusCode::NO_CONTENT
        {
            debug!(domain, ip, "Upserted dynamic DNS record");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(DriverError::Http(format!(
                "DNS provider returned {}: {}",
                status, body
            )))
        }
    }

    async fn render_proxy_config(
        &self,
        portal: &Portal,
        routes: &[ProxyRoute],
        force_include: Option<Uuid>,
    ) -> DriverResult<()> {
        let rendered = render_portal_config(portal, routes, force_include);
        let path = self.config_path(portal.id);

        tokio::fs::create_dir_all(&self.config.proxy_config_dir).await?;
        tokio::fs::write(&path, rendered).await?;
        debug!("Wrote proxy config {}", path.display());

        self.reload_proxy().await
    }
}

/// Looks the host's public address up from a plain-text echo service
pub struct HttpPublicIpResolver {
    client: Client,
    url: String,
}

impl HttpPublicIpResolver {
    pub fn new(url: impl Into<String>, timeout: Duration) -> DriverResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DriverError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl PublicIpResolver for HttpPublicIpResolver {
    async fn public_ip(&self) -> DriverResult<String> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| DriverError::Http(format!("Public IP lookup failed: {}", e)))?
            .text()
            .await
            .map_err(|e| DriverError::Http(e.to_string()))?;

        let ip = body.trim().to_string();
        ip_to_int(&ip).map_err(|e| DriverError::Http(e.to_string()))?;
        Ok(ip)
    }
}
