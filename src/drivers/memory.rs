// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-memory drivers
//!
//! Stand-ins for the hypervisor, the host network stack and the DNS/proxy
//! layer. They keep just enough state to answer queries consistently
//! (`is_running`, the DNAT rule set), log every mutating call, and can be
//! told to fail named operations so retry paths can be exercised.
//!
//! The network keeps its NAT table the way the host does, as
//! `iptables -t nat -S` text. Every change re-reads the table, edits it and
//! writes the whole table back.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

use super::proxy::{select_routes, ProxyRoute};
use super::firewall::parse_rules;
use super::{
    DnatRule, DnsProxyDriver, DriverError, DriverResult, HypervisorDriver, InstanceSpec,
    NetworkDriver, PortForward, PublicIpResolver,
};
use crate::allocator::PortAllocator;
use crate::domain::{Ipv4Cidr, MacAddress, Portal};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Mutating-call journal plus injected failures
#[derive(Debug, Default)]
struct CallLog {
    calls: Vec<String>,
    failing: HashSet<String>,
    /// Operations failing only for their next few calls
    failing_next: HashMap<String, u32>,
}

impl CallLog {
    fn record(&mut self, operation: &str, detail: String) -> DriverResult<()> {
        let once = match self.failing_next.get_mut(operation) {
            Some(left) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        };
        if once || self.failing.contains(operation) {
            return Err(DriverError::CommandFailed {
                operation: operation.to_string(),
                message: "injected failure".to_string(),
            });
        }
        debug!(operation, %detail, "driver call");
        self.calls.push(format!("{operation} {detail}"));
        Ok(())
    }

    fn count(&self, operation: &str) -> usize {
        let prefix = format!("{operation} ");
        self.calls.iter().filter(|c| c.starts_with(&prefix)).count()
    }
}

#[derive(Debug, Clone)]
struct Instance {
    spec: InstanceSpec,
    running: bool,
    bridge: Option<String>,
}

#[derive(Debug, Default)]
struct HypervisorState {
    log: CallLog,
    images: HashSet<String>,
    unavailable_images: HashSet<String>,
    instances: HashMap<Uuid, Instance>,
}

/// In-memory hypervisor
#[derive(Debug, Default)]
pub struct MemoryHypervisor {
    state: Mutex<HypervisorState>,
}

impl MemoryHypervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `ensure_image` report `image` as unobtainable
    pub fn mark_image_unavailable(&self, image: &str) {
        lock(&self.state).unavailable_images.insert(image.to_string());
    }

    /// Make every call to `operation` fail until cleared
    pub fn set_failing(&self, operation: &str, failing: bool) {
        let mut state = lock(&self.state);
        if failing {
            state.log.failing.insert(operation.to_string());
        } else {
            state.log.failing.remove(operation);
        }
    }

    /// Register an already-running instance
    pub fn insert_running(&self, spec: InstanceSpec) {
        let id = spec.id;
        lock(&self.state).instances.insert(
            id,
            Instance {
                spec,
                running: true,
                bridge: None,
            },
        );
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).log.calls.clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        lock(&self.state).log.count(operation)
    }

    pub fn has_instance(&self, id: Uuid) -> bool {
        lock(&self.state).instances.contains_key(&id)
    }

    pub fn instance_bridge(&self, id: Uuid) -> Option<String> {
        lock(&self.state)
            .instances
            .get(&id)
            .and_then(|i| i.bridge.clone())
    }

    fn with_instance<F>(&self, operation: &str, id: Uuid, f: F) -> DriverResult<()>
    where
        F: FnOnce(&mut Instance),
    {
        let mut state = lock(&self.state);
        state.log.record(operation, id.to_string())?;
        let instance = state.instances.get_mut(&id).ok_or(DriverError::NotFound {
            kind: "instance".to_string(),
            id: id.to_string(),
        })?;
        f(instance);
        Ok(())
    }
}

#[async_trait]
impl HypervisorDriver for MemoryHypervisor {
    async fn ensure_image(&self, image: &str) -> DriverResult<bool> {
        let mut state = lock(&self.state);
        if state.unavailable_images.contains(image) {
            return Ok(false);
        }
        if !state.images.contains(image) {
            state.log.record("ensure_image", image.to_string())?;
            state.images.insert(image.to_string());
        }
        Ok(true)
    }

    async fn create_instance(&self, spec: &InstanceSpec) -> DriverResult<()> {
        let mut state = lock(&self.state);
        state.log.record("create_instance", spec.id.to_string())?;
        state.instances.insert(
            spec.id,
            Instance {
                spec: spec.clone(),
                running: false,
                bridge: None,
            },
        );
        Ok(())
    }

    async fn start(&self, id: Uuid) -> DriverResult<()> {
        self.with_instance("start", id, |i| i.running = true)
    }

    async fn stop(&self, id: Uuid) -> DriverResult<()> {
        self.with_instance("stop", id, |i| i.running = false)
    }

    async fn force_stop(&self, id: Uuid) -> DriverResult<()> {
        self.with_instance("force_stop", id, |i| i.running = false)
    }

    async fn delete(&self, id: Uuid) -> DriverResult<()> {
        let mut state = lock(&self.state);
        state.log.record("delete", id.to_string())?;
        state.instances.remove(&id);
        Ok(())
    }

    async fn is_running(&self, id: Uuid) -> DriverResult<bool> {
        Ok(lock(&self.state)
            .instances
            .get(&id)
            .map(|i| i.running)
            .unwrap_or(false))
    }

    async fn edit_network_attachment(
        &self,
        id: Uuid,
        bridge: Option<&str>,
        mac: Option<&MacAddress>,
    ) -> DriverResult<()> {
        let bridge = bridge.map(str::to_string);
        let mac = mac.copied();
        self.with_instance("edit_network_attachment", id, move |i| {
            i.bridge = bridge;
            if let Some(mac) = mac {
                i.spec.mac = mac;
            }
        })
    }

    async fn virtual_nic_name(&self, id: Uuid, bridge: &str) -> DriverResult<Option<String>> {
        let state = lock(&self.state);
        Ok(state.instances.get(&id).and_then(|i| {
            let attached = i.running && i.bridge.as_deref() == Some(bridge);
            let simple = id.simple().to_string();
            attached.then(|| format!("vnet-{}", &simple[simple.len() - 6..]))
        }))
    }
}

#[derive(Debug, Default)]
struct NetworkState {
    log: CallLog,
    zones: HashMap<String, Ipv4Cidr>,
    reservations: HashMap<(String, MacAddress), String>,
    attached_nics: HashSet<(String, String)>,
    nat_table: String,
}

const NAT_TABLE_HEADER: &str = "-P PREROUTING ACCEPT\n-P POSTROUTING ACCEPT\n";

impl NetworkState {
    /// Rewrite the NAT table keeping only the lines `keep` accepts
    ///
    /// Lines that are not DNAT rules always survive.
    fn retain_rules<F>(&mut self, keep: F)
    where
        F: Fn(&DnatRule) -> bool,
    {
        let mut table = String::with_capacity(self.nat_table.len());
        for line in self.nat_table.lines() {
            if DnatRule::parse(line).map_or(true, |rule| keep(&rule)) {
                table.push_str(line);
                table.push('\n');
            }
        }
        self.nat_table = table;
    }

    fn append_rule(&mut self, rule: &DnatRule) {
        self.nat_table.push_str(&rule.to_string());
        self.nat_table.push('\n');
    }
}

/// In-memory network stack with a live DNAT rule set
#[derive(Debug)]
pub struct MemoryNetwork {
    state: Mutex<NetworkState>,
    ports: PortAllocator,
}

impl MemoryNetwork {
    pub fn new(ports: PortAllocator) -> Self {
        Self {
            state: Mutex::new(NetworkState {
                nat_table: NAT_TABLE_HEADER.to_string(),
                ..NetworkState::default()
            }),
            ports,
        }
    }

    /// Seed the rule set, as if read from the host
    pub fn with_rules(self, rules: Vec<DnatRule>) -> Self {
        {
            let mut state = lock(&self.state);
            for rule in &rules {
                state.append_rule(rule);
            }
        }
        self
    }

    /// Replace the NAT table with a raw `iptables -t nat -S` dump
    pub fn with_nat_table(self, dump: &str) -> Self {
        lock(&self.state).nat_table = dump.to_string();
        self
    }

    pub fn nat_table(&self) -> String {
        lock(&self.state).nat_table.clone()
    }

    pub fn set_failing(&self, operation: &str, failing: bool) {
        let mut state = lock(&self.state);
        if failing {
            state.log.failing.insert(operation.to_string());
        } else {
            state.log.failing.remove(operation);
        }
    }

    /// Make only the next `times` calls to `operation` fail
    pub fn fail_next(&self, operation: &str, times: u32) {
        lock(&self.state)
            .log
            .failing_next
            .insert(operation.to_string(), times);
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).log.calls.clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        lock(&self.state).log.count(operation)
    }

    pub fn rules(&self) -> Vec<DnatRule> {
        parse_rules(&lock(&self.state).nat_table)
    }

    pub fn reservation(&self, bridge_id: &str, mac: &MacAddress) -> Option<String> {
        lock(&self.state)
            .reservations
            .get(&(bridge_id.to_string(), *mac))
            .cloned()
    }

    pub fn has_zone(&self, bridge_id: &str) -> bool {
        lock(&self.state).zones.contains_key(bridge_id)
    }
}

#[async_trait]
impl NetworkDriver for MemoryNetwork {
    async fn create_zone(&self, cidr: &Ipv4Cidr, bridge_id: &str) -> DriverResult<()> {
        let mut state = lock(&self.state);
        state.log.record("create_zone", format!("{bridge_id} {cidr}"))?;
        state.zones.insert(bridge_id.to_string(), *cidr);
        Ok(())
    }

    async fn delete_zone(&self, bridge_id: &str, cidr: &Ipv4Cidr) -> DriverResult<()> {
        let mut state = lock(&self.state);
        state.log.record("delete_zone", format!("{bridge_id} {cidr}"))?;
        state.zones.remove(bridge_id);
        state.retain_rules(|r| r.bridge.as_deref() != Some(bridge_id));
        Ok(())
    }

    async fn add_reservation(
        &self,
        bridge_id: &str,
        mac: &MacAddress,
        ip: &str,
    ) -> DriverResult<()> {
        let mut state = lock(&self.state);
        state.log.record("add_reservation", format!("{bridge_id} {mac} {ip}"))?;
        state
            .reservations
            .insert((bridge_id.to_string(), *mac), ip.to_string());
        Ok(())
    }

    async fn remove_reservation(&self, bridge_id: &str, mac: &MacAddress) -> DriverResult<()> {
        let mut state = lock(&self.state);
        state.log.record("remove_reservation", format!("{bridge_id} {mac}"))?;
        state.reservations.remove(&(bridge_id.to_string(), *mac));
        Ok(())
    }

    async fn attach_nic(&self, nic: &str, bridge_id: &str) -> DriverResult<()> {
        let mut state = lock(&self.state);
        state.log.record("attach_nic", format!("{nic} {bridge_id}"))?;
        state
            .attached_nics
            .insert((nic.to_string(), bridge_id.to_string()));
        Ok(())
    }

    async fn detach_nic(&self, nic: &str, bridge_id: &str) -> DriverResult<()> {
        let mut state = lock(&self.state);
        state.log.record("detach_nic", format!("{nic} {bridge_id}"))?;
        state
            .attached_nics
            .remove(&(nic.to_string(), bridge_id.to_string()));
        Ok(())
    }

    async fn add_port_forward(&self, forward: &PortForward) -> DriverResult<()> {
        let rule = forward.to_rule();
        let mut state = lock(&self.state);
        state.log.record("add_port_forward", rule.to_string())?;
        state.append_rule(&rule);
        Ok(())
    }

    async fn remove_port_forward(&self, forward: &PortForward) -> DriverResult<()> {
        let rule = forward.to_rule();
        let mut state = lock(&self.state);
        state.log.record("remove_port_forward", rule.to_string())?;
        state.retain_rules(|r| {
            !(r.protocol == rule.protocol
                && r.external_port == rule.external_port
                && r.destination_ip == rule.destination_ip
                && r.destination_port == rule.destination_port)
        });
        Ok(())
    }

    async fn dnat_rules(&self) -> DriverResult<Vec<DnatRule>> {
        Ok(self.rules())
    }

    fn port_allocator(&self) -> &PortAllocator {
        &self.ports
    }
}

#[derive(Debug, Default)]
struct DnsProxyState {
    log: CallLog,
    records: HashMap<String, String>,
    rendered: HashMap<Uuid, Vec<ProxyRoute>>,
}

/// In-memory DNS provider and reverse proxy
#[derive(Debug, Default)]
pub struct MemoryDnsProxy {
    state: Mutex<DnsProxyState>,
}

impl MemoryDnsProxy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, operation: &str, failing: bool) {
        let mut state = lock(&self.state);
        if failing {
            state.log.failing.insert(operation.to_string());
        } else {
            state.log.failing.remove(operation);
        }
    }

    pub fn call_count(&self, operation: &str) -> usize {
        lock(&self.state).log.count(operation)
    }

    pub fn record(&self, domain: &str) -> Option<String> {
        lock(&self.state).records.get(domain).cloned()
    }

    /// Routes live in the last config rendered for `portal_id`
    pub fn rendered_routes(&self, portal_id: Uuid) -> Option<Vec<ProxyRoute>> {
        lock(&self.state).rendered.get(&portal_id).cloned()
    }
}

#[async_trait]
impl DnsProxyDriver for MemoryDnsProxy {
    async fn upsert_dynamic_dns_record(
        &self,
        domain: &str,
        ip: &str,
        _api_key: &str,
    ) -> DriverResult<()> {
        let mut state = lock(&self.state);
        state
            .log
            .record("upsert_dynamic_dns_record", format!("{domain} {ip}"))?;
        state.records.insert(domain.to_string(), ip.to_string());
        Ok(())
    }

    async fn render_proxy_config(
        &self,
        portal: &Portal,
        routes: &[ProxyRoute],
        force_include: Option<Uuid>,
    ) -> DriverResult<()> {
        let selected: Vec<ProxyRoute> = select_routes(routes, force_include)
            .into_iter()
            .cloned()
            .collect();
        let mut state = lock(&self.state);
        state
            .log
            .record("render_proxy_config", format!("{} {}", portal.domain, selected.len()))?;
        state.rendered.insert(portal.id, selected);
        Ok(())
    }
}

/// Resolver answering with a fixed address, counting lookups
#[derive(Debug)]
pub struct StaticPublicIp {
    ip: String,
    lookups: Mutex<u32>,
}

impl StaticPublicIp {
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            lookups: Mutex::new(0),
        }
    }

    pub fn lookups(&self) -> u32 {
        *lock(&self.lookups)
    }
}

#[async_trait]
impl PublicIpResolver for StaticPublicIp {
    async fn public_ip(&self) -> DriverResult<String> {
        *lock(&self.lookups) += 1;
        Ok(self.ip.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::PortRange;
    use crate::domain::Protocol;

    fn spec() -> InstanceSpec {
        let id = Uuid::now_v7();
        InstanceSpec {
            id,
            name: "web-1".to_string(),
            mac: MacAddress::for_guest(&id),
            image: "debian-12".to_string(),
            flavor: "small".to_string(),
            ssh_keys: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_hypervisor_lifecycle() {
        let hv = MemoryHypervisor::new();
        let spec = spec();

        assert!(hv.ensure_image("debian-12").await.unwrap());
        hv.create_instance(&spec).await.unwrap();
        assert!(!hv.is_running(spec.id).await.unwrap());

        hv.start(spec.id).await.unwrap();
        assert!(hv.is_running(spec.id).await.unwrap());

        hv.edit_network_attachment(spec.id, Some("br-1"), None).await.unwrap();
        assert!(hv.virtual_nic_name(spec.id, "br-1").await.unwrap().is_some());
        assert!(hv.virtual_nic_name(spec.id, "br-2").await.unwrap().is_none());

        hv.stop(spec.id).await.unwrap();
        hv.delete(spec.id).await.unwrap();
        assert!(!hv.has_instance(spec.id));
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let hv = MemoryHypervisor::new();
        hv.set_failing("create_instance", true);
        assert!(hv.create_instance(&spec()).await.is_err());
        assert_eq!(hv.call_count("create_instance"), 0);
    }

    #[tokio::test]
    async fn test_network_port_forward_updates_rule_set() {
        let net = MemoryNetwork::new(PortAllocator::seeded(PortRange::default(), 100, 1));
        let forward = PortForward {
            bridge_id: "br-1".to_string(),
            protocol: Protocol::Tcp,
            host_port: 20001,
            target_ip: "10.10.1.2".to_string(),
            target_port: 8080,
        };

        net.add_port_forward(&forward).await.unwrap();
        assert!(!net.is_port_available("10.10.1.2", 8080, Protocol::Tcp).await.unwrap());

        net.remove_port_forward(&forward).await.unwrap();
        assert!(net.is_port_available("10.10.1.2", 8080, Protocol::Tcp).await.unwrap());
        assert!(net.rules().is_empty());
    }

    const HOST_TABLE: &str = "\
-P PREROUTING ACCEPT
-N DOCKER
-A PREROUTING -p tcp -m tcp --dport 20001 -j DNAT --to-destination 172.17.0.2:22
-A POSTROUTING -s 10.10.1.0/24 -j MASQUERADE
";

    #[tokio::test]
    async fn test_port_lookups_read_the_host_nat_table() {
        // Range of one port, already taken by a rule the fabric did not write
        let ports = PortAllocator::seeded(PortRange::new(20001, 20001).unwrap(), 50, 3);
        let net = MemoryNetwork::new(ports).with_nat_table(HOST_TABLE);

        assert!(!net.is_port_available("172.17.0.2", 22, Protocol::Tcp).await.unwrap());
        assert!(net.is_port_available("172.17.0.2", 22, Protocol::Udp).await.unwrap());
        assert!(net.find_next_port(Protocol::Tcp).await.is_err());
        assert_eq!(net.find_next_port(Protocol::Udp).await.unwrap(), 20001);
    }

    #[tokio::test]
    async fn test_rewrites_keep_foreign_lines() {
        let net = MemoryNetwork::new(PortAllocator::seeded(PortRange::default(), 100, 1))
            .with_nat_table(HOST_TABLE);
        let forward = PortForward {
            bridge_id: "br-1".to_string(),
            protocol: Protocol::Udp,
            host_port: 20002,
            target_ip: "10.10.1.2".to_string(),
            target_port: 53,
        };

        net.add_port_forward(&forward).await.unwrap();
        assert_eq!(net.rules().len(), 2);
        assert!(net
            .nat_table()
            .contains("--comment fabric:br-1 -j DNAT --to-destination 10.10.1.2:53"));

        net.delete_zone("br-1", &"10.10.1.0/24".parse().unwrap()).await.unwrap();
        let table = net.nat_table();
        assert_eq!(net.rules().len(), 1);
        assert!(table.contains("-N DOCKER"));
        assert!(table.contains("-j MASQUERADE"));
    }
}
