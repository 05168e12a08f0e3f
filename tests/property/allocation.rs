// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Subnet, Address and Port Allocation

use cim_fabric::allocator::{is_port_available, next_cidr, next_ip, PortAllocator, PortRange};
use cim_fabric::domain::{Ipv4Cidr, Protocol};
use cim_fabric::drivers::DnatRule;
use proptest::prelude::*;
use std::collections::BTreeSet;

fn protocol() -> impl Strategy<Value = Protocol> {
    prop_oneof![Just(Protocol::Tcp), Just(Protocol::Udp)]
}

fn rule(protocol: Protocol, external_port: u16, destination_port: u16) -> DnatRule {
    DnatRule {
        protocol,
        external_port,
        destination_ip: "10.10.1.2".to_string(),
        destination_port,
        bridge: None,
    }
}

proptest! {
    /// Chained zone blocks never intersect each other or the seed
    #[test]
    fn prop_zone_blocks_never_overlap(hosts in proptest::collection::vec(1u32..=4096, 1..24)) {
        let mut allocated = vec![Ipv4Cidr::DEFAULT_SEED];

        for count in hosts {
            let last = *allocated.last().unwrap();
            let (cidr, gateway) = next_cidr(&last, count).unwrap();

            prop_assert!(cidr.size() >= u64::from(count));
            prop_assert_eq!(u64::from(cidr.base()) % cidr.size(), 0);
            prop_assert_eq!(gateway, cidr.base() + 1);
            prop_assert!(cidr.base() > last.broadcast());
            for earlier in &allocated {
                prop_assert!(!cidr.overlaps(earlier), "{} overlaps {}", cidr, earlier);
            }
            allocated.push(cidr);
        }
    }

    /// The first free host is returned, never the gateway, a used address,
    /// the network address or the broadcast
    #[test]
    fn prop_next_ip_skips_used_and_gateway(
        used_offsets in proptest::collection::btree_set(2u32..254, 0..200),
    ) {
        let cidr: Ipv4Cidr = "10.10.1.0/24".parse().unwrap();
        let gateway = cidr.gateway();
        let used: BTreeSet<u32> = used_offsets.iter().map(|o| cidr.base() + o).collect();

        let ip = next_ip(&cidr, gateway, &used).unwrap();

        prop_assert!(cidr.contains(ip));
        prop_assert!(ip != cidr.base() && ip != cidr.broadcast());
        prop_assert!(ip != gateway);
        prop_assert!(!used.contains(&ip));
        for lower in (cidr.base() + 1)..ip {
            prop_assert!(lower == gateway || used.contains(&lower));
        }
    }

    /// A drawn host port collides with no rule of the same protocol
    #[test]
    fn prop_drawn_port_is_free_for_protocol(
        proto in protocol(),
        taken in proptest::collection::vec((protocol(), 20000u16..=20100), 0..60),
        seed in any::<u64>(),
    ) {
        let range = PortRange::new(20000, 20100).unwrap();
        let allocator = PortAllocator::seeded(range, 10_000, seed);
        let rules: Vec<DnatRule> = taken.iter().map(|(p, port)| rule(*p, *port, 80)).collect();

        let port = allocator.find_next_port(&rules, proto).unwrap();

        prop_assert!(range.contains(port));
        prop_assert!(!rules.iter().any(|r| r.protocol == proto && r.external_port == port));
    }

    /// A target is unavailable exactly when a same-protocol rule forwards to it
    #[test]
    fn prop_port_availability_matches_rules(
        taken in proptest::collection::vec((protocol(), 1u16..=64), 0..20),
        proto in protocol(),
        port in 1u16..=64,
    ) {
        let rules: Vec<DnatRule> = taken
            .iter()
            .enumerate()
            .map(|(i, (p, target))| rule(*p, 20000 + i as u16, *target))
            .collect();
        let expected = !taken.iter().any(|(p, target)| *p == proto && *target == port);

        prop_assert_eq!(is_port_available(&rules, "10.10.1.2", port, proto), expected);
        prop_assert!(is_port_available(&rules, "10.10.9.9", port, proto));
    }
}
