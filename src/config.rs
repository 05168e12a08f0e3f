// Copyright (c) 2025 - Cowboy AI, Inc.
//! Fabric configuration
//!
//! Loaded from `FABRIC_*` environment variables by the queue binary, or
//! deserialized from JSON; every field has a default.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::allocator::PortRange;
use crate::domain::Ipv4Cidr;
use crate::errors::{FabricError, FabricResult};
use crate::events::{RetryPolicy, DEFAULT_MAX_RETRIES};

/// Dynamic DNS provider and reverse proxy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicDnsConfig {
    /// Provider endpoint records are upserted against
    pub endpoint: String,

    /// Directory the per-portal proxy configs are written to
    pub proxy_config_dir: String,

    /// Command run after a config is written, e.g. `["caddy", "reload"]`
    #[serde(default)]
    pub reload_command: Vec<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    30
}

fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_max_port_attempts() -> u32 {
    1000
}

fn default_seed_cidr() -> Ipv4Cidr {
    Ipv4Cidr::DEFAULT_SEED
}

fn default_zone_hosts() -> u32 {
    254
}

fn default_public_ip_ttl_secs() -> u64 {
    300
}

fn default_public_ip_url() -> String {
    "https://api.ipify.org".to_string()
}

/// Queue processor and allocator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FabricConfig {
    /// Delay between the starts of two queue passes
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Event-level retry ceiling; the resource ceiling derives from it
    #[serde(default = "default_max_retries")]
    pub max_event_retries: u32,

    /// Host ports handed out to fibers
    #[serde(default)]
    pub ports: PortRange,

    /// Random draws before port allocation gives up
    #[serde(default = "default_max_port_attempts")]
    pub max_port_attempts: u32,

    /// Block the first zone is allocated after
    #[serde(default = "default_seed_cidr")]
    pub seed_cidr: Ipv4Cidr,

    /// Host count for zones recorded without one
    #[serde(default = "default_zone_hosts")]
    pub default_zone_hosts: u32,

    /// How long a looked-up public IP is reused
    #[serde(default = "default_public_ip_ttl_secs")]
    pub public_ip_ttl_secs: u64,

    /// Plain-text public IP lookup service
    #[serde(default = "default_public_ip_url")]
    pub public_ip_url: String,

    /// NATS server for client notifications
    #[serde(default)]
    pub nats_url: Option<String>,

    #[serde(default)]
    pub dns: Option<DynamicDnsConfig>,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_event_retries: default_max_retries(),
            ports: PortRange::default(),
            max_port_attempts: default_max_port_attempts(),
            seed_cidr: default_seed_cidr(),
            default_zone_hosts: default_zone_hosts(),
            public_ip_ttl_secs: default_public_ip_ttl_secs(),
            public_ip_url: default_public_ip_url(),
            nats_url: None,
            dns: None,
        }
    }
}

fn env_or<T>(key: &str, default: T) -> FabricResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| FabricError::Configuration(format!("{key}={raw}: {e}"))),
        Err(_) => Ok(default),
    }
}

impl FabricConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> FabricResult<Self> {
        let defaults = Self::default();

        let ports = PortRange {
            min: env_or("FABRIC_PORT_MIN", defaults.ports.min)?,
            max: env_or("FABRIC_PORT_MAX", defaults.ports.max)?,
        };

        let dns = match std::env::var("FABRIC_DNS_ENDPOINT") {
            Ok(endpoint) => Some(DynamicDnsConfig {
                endpoint,
                proxy_config_dir: std::env::var("FABRIC_PROXY_CONFIG_DIR")
                    .unwrap_or_else(|_| "/etc/caddy/portals".to_string()),
                reload_command: std::env::var("FABRIC_PROXY_RELOAD")
                    .map(|cmd| cmd.split_whitespace().map(str::to_string).collect())
                    .unwrap_or_default(),
                timeout_secs: env_or("FABRIC_DNS_TIMEOUT_SECS", default_timeout())?,
            }),
            Err(_) => None,
        };

        let config = Self {
            poll_interval_ms: env_or("FABRIC_POLL_INTERVAL_MS", defaults.poll_interval_ms)?,
            max_event_retries: env_or("FABRIC_MAX_RETRIES", defaults.max_event_retries)?,
            ports,
            max_port_attempts: env_or("FABRIC_MAX_PORT_ATTEMPTS", defaults.max_port_attempts)?,
            seed_cidr: env_or("FABRIC_SEED_CIDR", defaults.seed_cidr)?,
            default_zone_hosts: env_or("FABRIC_ZONE_HOSTS", defaults.default_zone_hosts)?,
            public_ip_ttl_secs: env_or("FABRIC_PUBLIC_IP_TTL_SECS", defaults.public_ip_ttl_secs)?,
            public_ip_url: std::env::var("FABRIC_PUBLIC_IP_URL")
                .unwrap_or(defaults.public_ip_url),
            nats_url: std::env::var("NATS_URL").ok(),
            dns,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the allocators and queue cannot work with
    pub fn validate(&self) -> FabricResult<()> {
        PortRange::new(self.ports.min, self.ports.max)
            .map_err(|e| FabricError::Configuration(e.to_string()))?;

        if self.max_port_attempts == 0 {
            return Err(FabricError::Configuration(
                "max_port_attempts must be at least 1".to_string(),
            ));
        }
        if self.max_event_retries == 0 {
            return Err(FabricError::Configuration(
                "max_event_retries must be at least 1".to_string(),
            ));
        }
        if self.default_zone_hosts == 0 {
            return Err(FabricError::Configuration(
                "default_zone_hosts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn public_ip_ttl(&self) -> Duration {
        Duration::from_secs(self.public_ip_ttl_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_event_retries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = FabricConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.seed_cidr.to_string(), "10.10.0.0/24");
        assert_eq!(config.retry_policy().max_retries, 5);
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_json_fills_defaults() {
        let config: FabricConfig = serde_json::from_str(
            r#"{"ports": {"min": 30000, "max": 30100}, "seed_cidr": "172.20.0.0/16"}"#,
        )
        .unwrap();
        assert_eq!(config.ports.min, 30000);
        assert_eq!(config.seed_cidr.prefix_length(), 16);
        assert_eq!(config.max_port_attempts, 1000);
        assert!(config.dns.is_none());
    }

    #[test]
    fn test_validate_rejects_inverted_port_range() {
        let config = FabricConfig {
            ports: PortRange { min: 40000, max: 20000 },
            ..FabricConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(FabricError::Configuration(_))
        ));
    }
}
