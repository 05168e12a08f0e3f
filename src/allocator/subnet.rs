// Copyright (c) 2025 - Cowboy AI, Inc.
//! Subnet and host address allocation
//!
//! Zone blocks are handed out append-only: each new block starts right after
//! the most recently allocated one and space freed by a deleted zone is never
//! reused. There is no free list to keep consistent, and a range that may
//! still be referenced by a lingering rule or lease is never issued twice.

use std::collections::BTreeSet;

use super::AllocationError;
use crate::domain::{int_to_ip, Ipv4Cidr};

/// Smallest block handed out: a /30 (network, gateway, one host, broadcast)
const MIN_HOST_BITS: u32 = 2;

/// Host bits for a block of `host_count` addresses: `ceil(log2(host_count))`
pub fn host_bits_for(host_count: u32) -> Result<u32, AllocationError> {
    if host_count == 0 {
        return Err(AllocationError::InvalidHostCount(host_count));
    }
    let bits = 32 - (host_count - 1).leading_zeros();
    if bits > 31 {
        return Err(AllocationError::InvalidHostCount(host_count));
    }
    Ok(bits.max(MIN_HOST_BITS))
}

/// Compute the block following `last`, sized for `host_count` addresses
///
/// `last` is the most recently allocated zone CIDR, or the configured seed
/// when no zone exists yet. The new block starts at the first address past
/// `last` aligned to its own size, so consecutive results never intersect.
///
/// Returns the block and its gateway (`base + 1`).
pub fn next_cidr(last: &Ipv4Cidr, host_count: u32) -> Result<(Ipv4Cidr, u32), AllocationError> {
    let bits = host_bits_for(host_count)?;
    let size = 1u64 << bits;

    let after_last = u64::from(last.broadcast()) + 1;
    let base = after_last.div_ceil(size) * size;
    if base + size - 1 > u64::from(u32::MAX) {
        return Err(AllocationError::AddressSpaceExhausted(last.to_string()));
    }

    // base fits in u32 per the check above
    let cidr = Ipv4Cidr::from_parts(base as u32, (32 - bits) as u8)
        .map_err(|e| AllocationError::InvalidCidr(e.to_string()))?;
    Ok((cidr, cidr.gateway()))
}

/// First host address in `cidr` that is neither the gateway nor in `used`
///
/// Scans upward from `base + 1`; the broadcast address is never returned.
pub fn next_ip(cidr: &Ipv4Cidr, gateway: u32, used: &BTreeSet<u32>) -> Result<u32, AllocationError> {
    let broadcast = cidr.broadcast();
    let mut candidate = cidr.base().saturating_add(1);

    while candidate < broadcast {
        if candidate != gateway && !used.contains(&candidate) {
            return Ok(candidate);
        }
        candidate += 1;
    }

    Err(AllocationError::SubnetExhausted(format!(
        "{} (gateway {})",
        cidr,
        int_to_ip(gateway)
    )))
}
