// Copyright (c) 2025 - Cowboy AI, Inc.
//! Single-value TTL cache with an injected clock
//!
//! The public IP of the host changes rarely but is needed on every portal
//! sync, so lookups are reused for a configurable window. Time comes from a
//! [`Clock`] so tests can step it with [`ManualClock`].

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::drivers::{DriverResult, PublicIpResolver};

/// Monotonic time source
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self
            .offset
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = self
            .offset
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.origin + *offset
    }
}

struct Entry<T> {
    value: T,
    stored_at: Instant,
}

/// Holds one value for `ttl` after it was stored
pub struct TtlCache<T> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entry: Mutex<Option<Entry<T>>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entry: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Entry<T>>> {
        self.entry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The stored value, if it is younger than the TTL
    pub fn get(&self) -> Option<T> {
        let now = self.clock.now();
        self.lock()
            .as_ref()
            .filter(|e| now.saturating_duration_since(e.stored_at) < self.ttl)
            .map(|e| e.value.clone())
    }

    pub fn put(&self, value: T) {
        let stored_at = self.clock.now();
        *self.lock() = Some(Entry { value, stored_at });
    }

    /// Drop the stored value
    pub fn reset(&self) {
        *self.lock() = None;
    }
}

/// [`PublicIpResolver`] front that reuses a lookup while it is fresh
pub struct CachedPublicIp {
    resolver: Arc<dyn PublicIpResolver>,
    cache: TtlCache<String>,
}

impl CachedPublicIp {
    pub fn new(resolver: Arc<dyn PublicIpResolver>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            resolver,
            cache: TtlCache::new(ttl, clock),
        }
    }

    pub async fn get(&self) -> DriverResult<String> {
        if let Some(ip) = self.cache.get() {
            return Ok(ip);
        }
        let ip = self.resolver.public_ip().await?;
        debug!(%ip, "Resolved public IP");
        self.cache.put(ip.clone());
        Ok(ip)
    }

    pub fn reset(&self) {
        self.cache.reset();
    }
}
