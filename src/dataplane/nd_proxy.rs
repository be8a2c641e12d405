//! 6LoWPAN-ND proxy logic
//!
//! Handles mesh-side RS, NS+ARO and NA (RFC 6775) and classic-link RA, NS and
//! NA (RFC 4861, RFC 4389). Handlers update the neighbor cache and context
//! table and return the `NdAction`s the gateway turns into frames; nothing
//! here touches a socket or reads the clock.

use super::context_table::{ContextTable, LIFETIME_UNIT};
use super::neighbor_cache::{NeighborCache, NeighborEntry, RegistrationState};
use super::timer::Timer;
use crate::config::RaForwardPolicyKind;
use crate::protocol::icmpv6::{
    AddressRegistration, AroStatus, LinkAddr, NdMessage, NeighborAdvertisement,
    NeighborSolicitation, PrefixInformation, RouterAdvertisement, RouterSolicitation,
};
use crate::protocol::ipv6::is_link_local;
use crate::protocol::{Eui64, LinkLayer, MacAddr};
use crate::telemetry::MetricsRegistry;
use crate::{Error, Result};
use std::fmt;
use std::net::Ipv6Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// ff02::1
pub const ALL_NODES: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 1);
/// ff02::2
pub const ALL_ROUTERS: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 2);
/// Minimum spacing of upstream Router Solicitations (RFC 4861 §10)
pub const RTR_SOLICITATION_INTERVAL: Duration = Duration::from_secs(4);

/// Work the gateway owes the network after a packet or a maintenance tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NdAction {
    /// Proxied DAD probe for `target` on the classic link
    SendDadProbe { target: Ipv6Addr },
    /// NA carrying an ARO back to a registering mesh node
    SendAroReply {
        address: Ipv6Addr,
        eui64: Eui64,
        status: AroStatus,
        /// ARO lifetime field (minutes)
        lifetime: u16,
    },
    /// Unicast RA into the mesh
    SendRouterAdvertisement { destination: Ipv6Addr, eui64: Eui64 },
    /// RS to all-routers on the classic link
    SolicitRouter,
    /// NA on the classic link answering for a registered mesh address
    SendProxyAdvertisement {
        target: Ipv6Addr,
        destination: Ipv6Addr,
        dst_mac: MacAddr,
        solicited: bool,
    },
    /// NA for one of the gateway's own addresses
    SendNeighborAdvertisement {
        link: LinkLayer,
        target: Ipv6Addr,
        destination: Ipv6Addr,
        link_dst: Option<LinkAddr>,
    },
}

impl NdAction {
    pub(crate) fn aro_reply(address: Ipv6Addr, eui64: Eui64, status: AroStatus, lifetime: u16) -> Self {
        NdAction::SendAroReply {
            address,
            eui64,
            status,
            lifetime,
        }
    }
}

/// Upstream router state learned from the classic link
#[derive(Debug, Clone)]
pub struct RouterInfo {
    pub address: Ipv6Addr,
    pub mac: MacAddr,
    pub cur_hop_limit: u8,
    pub managed: bool,
    pub other: bool,
    pub lifetime: Timer,
    pub reachable_time: u32,
    pub retrans_timer: u32,
    pub mtu: Option<u32>,
    pub prefixes: Vec<PrefixInformation>,
}

impl RouterInfo {
    fn from_advertisement(address: Ipv6Addr, mac: MacAddr, ra: &RouterAdvertisement, now: Instant) -> Self {
        Self {
            address,
            mac,
            cur_hop_limit: ra.cur_hop_limit,
            managed: ra.managed,
            other: ra.other,
            lifetime: Timer::new(now, Duration::from_secs(ra.router_lifetime as u64)),
            reachable_time: ra.reachable_time,
            retrans_timer: ra.retrans_timer,
            mtu: ra.options.mtu,
            prefixes: ra.options.prefixes.clone(),
        }
    }

    /// A zero router lifetime means "not a default router" and is expired at once
    pub fn expired(&self, now: Instant) -> bool {
        self.lifetime.expired(now)
    }
}

/// Decides which neighbors get an RA after an upstream RA arrives
pub trait RaForwardPolicy: Send + fmt::Debug {
    fn forward_to(&self, entry: &NeighborEntry) -> bool;
}

/// Only neighbors that sent an RS while no router was known
#[derive(Debug, Default)]
pub struct PendingOnly;

impl RaForwardPolicy for PendingOnly {
    fn forward_to(&self, entry: &NeighborEntry) -> bool {
        entry.ra_pending
    }
}

/// Pending neighbors plus every registered mesh router
#[derive(Debug, Default)]
pub struct PendingAndRouters;

impl RaForwardPolicy for PendingAndRouters {
    fn forward_to(&self, entry: &NeighborEntry) -> bool {
        entry.ra_pending || (entry.is_router && entry.state == RegistrationState::Registered)
    }
}

pub fn policy_for(kind: RaForwardPolicyKind) -> Box<dyn RaForwardPolicy> {
    match kind {
        RaForwardPolicyKind::PendingOnly => Box::new(PendingOnly),
        RaForwardPolicyKind::PendingAndRouters => Box::new(PendingAndRouters),
    }
}

#[derive(Debug, Clone)]
pub struct ProxySettings {
    /// DAD probes per registration; 0 accepts registrations without DAD
    pub max_dad_ns: u8,
    /// Store 6COs from upstream RAs
    pub accept_contexts: bool,
    /// Router lifetime the gateway advertises into the mesh
    pub default_router_lifetime: Duration,
    /// Addresses the gateway answers for itself (both links)
    pub own_addresses: Vec<Ipv6Addr>,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            max_dad_ns: 4,
            accept_contexts: true,
            default_router_lifetime: Duration::from_secs(1800),
            own_addresses: Vec::new(),
        }
    }
}

/// ARO lifetime field for a duration, saturating
pub(crate) fn lifetime_minutes(lifetime: Duration) -> u16 {
    (lifetime.as_secs() / LIFETIME_UNIT.as_secs()).min(u16::MAX as u64) as u16
}

/// Proxy state: both tables plus what was learned from the upstream router
#[derive(Debug)]
pub struct NdProxy {
    pub(crate) cache: NeighborCache,
    pub(crate) contexts: ContextTable,
    pub(crate) router: Option<RouterInfo>,
    settings: ProxySettings,
    policy: Box<dyn RaForwardPolicy>,
    metrics: Arc<MetricsRegistry>,
    last_solicit: Option<Instant>,
    /// Bumped whenever the context table changes
    pub(crate) context_generation: u32,
}

impl NdProxy {
    pub fn new(
        cache: NeighborCache,
        contexts: ContextTable,
        settings: ProxySettings,
        policy: Box<dyn RaForwardPolicy>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            cache,
            contexts,
            router: None,
            settings,
            policy,
            metrics,
            last_solicit: None,
            context_generation: 0,
        }
    }

    pub fn neighbors(&self) -> &NeighborCache {
        &self.cache
    }

    pub fn contexts(&self) -> &ContextTable {
        &self.contexts
    }

    pub fn settings(&self) -> &ProxySettings {
        &self.settings
    }

    pub(crate) fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    /// Upstream router, if one is currently valid
    pub fn router(&self, now: Instant) -> Option<&RouterInfo> {
        self.router.as_ref().filter(|r| !r.expired(now))
    }

    pub fn is_own_address(&self, addr: &Ipv6Addr) -> bool {
        self.settings.own_addresses.contains(addr)
    }

    /// Empty both tables and forget the upstream router
    pub fn clear(&mut self) {
        self.cache.clear();
        self.contexts.clear();
        self.router = None;
        self.last_solicit = None;
        self.context_generation = self.context_generation.wrapping_add(1);
    }

    /// Handle an ND message received from the mesh
    pub fn handle_mesh(
        &mut self,
        src: Ipv6Addr,
        message: &NdMessage,
        now: Instant,
    ) -> Result<Vec<NdAction>> {
        match message {
            NdMessage::RouterSolicitation(rs) => Ok(self.mesh_router_solicitation(src, rs, now)),
            NdMessage::NeighborSolicitation(ns) => self.mesh_neighbor_solicitation(src, ns, now),
            NdMessage::NeighborAdvertisement(na) => {
                self.mesh_neighbor_advertisement(na, now);
                Ok(Vec::new())
            }
            NdMessage::RouterAdvertisement(_) => {
                trace!(%src, "ignoring RA from the mesh");
                Ok(Vec::new())
            }
        }
    }

    /// Handle an ND message received on the classic link
    pub fn handle_ethernet(
        &mut self,
        src: Ipv6Addr,
        src_mac: MacAddr,
        message: &NdMessage,
        now: Instant,
    ) -> Result<Vec<NdAction>> {
        match message {
            NdMessage::RouterAdvertisement(ra) => self.ethernet_router_advertisement(src, src_mac, ra, now),
            NdMessage::NeighborSolicitation(ns) => Ok(self.ethernet_neighbor_solicitation(src, src_mac, ns, now)),
            NdMessage::NeighborAdvertisement(na) => Ok(self.ethernet_neighbor_advertisement(na)),
            NdMessage::RouterSolicitation(_) => {
                trace!(%src, "ignoring RS on the classic link");
                Ok(Vec::new())
            }
        }
    }

    /// Apply an Address Registration Option sent by `address`
    ///
    /// Returns the ARO reply, a DAD probe when the registration has to be
    /// checked on the classic link first, or nothing while DAD is already in
    /// progress for the same owner.
    pub fn process_aro(
        &mut self,
        address: Ipv6Addr,
        aro: &AddressRegistration,
        now: Instant,
    ) -> Vec<NdAction> {
        let eui64 = aro.eui64;
        if let Err(e) = self.cache.check_owner(&address, eui64) {
            debug!(%address, requester = %eui64, error = %e, "registration refused");
            return vec![NdAction::aro_reply(address, eui64, AroStatus::from(&e), aro.lifetime)];
        }
        if aro.lifetime == 0 {
            return self.deregister(address, eui64);
        }
        let lifetime = LIFETIME_UNIT * aro.lifetime as u32;

        let existing = self
            .cache
            .lookup(&address)
            .map(|e| (e.state, e.link_layer_address));
        match existing {
            Some((RegistrationState::Tentative, _)) => {
                // DAD keeps running; the answer waits for its outcome
                if let Some(entry) = self.cache.lookup_mut(&address) {
                    entry.registration_lifetime = lifetime;
                    entry.touch(now);
                }
                return Vec::new();
            }
            Some((_, owner)) if owner == eui64 => {
                if let Some(entry) = self.cache.lookup_mut(&address) {
                    entry.register(now, lifetime);
                    entry.touch(now);
                }
                debug!(%address, %eui64, lifetime = aro.lifetime, "registration refreshed");
                return vec![NdAction::aro_reply(address, eui64, AroStatus::Success, aro.lifetime)];
            }
            _ => {}
        }

        // Link-local addresses built from the registering EUI-64 are unique
        let skip_dad =
            self.settings.max_dad_ns == 0 || (is_link_local(&address) && eui64.derives(&address));
        let state = if skip_dad {
            RegistrationState::Registered
        } else {
            RegistrationState::Tentative
        };

        match self.cache.add(address, eui64, false, state, now) {
            Ok(entry) if skip_dad => {
                entry.register(now, lifetime);
                info!(%address, %eui64, lifetime = aro.lifetime, "address registered");
                vec![NdAction::aro_reply(address, eui64, AroStatus::Success, aro.lifetime)]
            }
            Ok(entry) => {
                entry.registration_lifetime = lifetime;
                entry.dad_ns_count = 1;
                debug!(%address, %eui64, "starting proxied DAD");
                vec![NdAction::SendDadProbe { target: address }]
            }
            Err(e) => {
                warn!(%address, %eui64, error = %e, "cannot register address");
                vec![NdAction::aro_reply(address, eui64, AroStatus::from(&e), aro.lifetime)]
            }
        }
    }

    fn deregister(&mut self, address: Ipv6Addr, eui64: Eui64) -> Vec<NdAction> {
        if self.cache.remove(&address).is_some() {
            info!(%address, %eui64, "address deregistered");
        }
        vec![NdAction::aro_reply(address, eui64, AroStatus::Success, 0)]
    }

    fn mesh_router_solicitation(
        &mut self,
        src: Ipv6Addr,
        rs: &RouterSolicitation,
        now: Instant,
    ) -> Vec<NdAction> {
        let Some(lladdr) = rs.options.source_link_addr else {
            trace!(%src, "RS without SLLAO, nothing to answer");
            return Vec::new();
        };
        if src.is_unspecified() {
            trace!("RS from unspecified source");
            return Vec::new();
        }
        let eui64 = lladdr.eui64();
        let router_known = self.router(now).is_some();

        let entry = if self.cache.lookup(&src).is_some() {
            self.cache.lookup_mut(&src).map(|entry| {
                if entry.state == RegistrationState::GarbageCollectible {
                    entry.link_layer_address = eui64;
                    entry.reachable_timer.restart(now);
                }
                entry
            })
        } else {
            match self
                .cache
                .add(src, eui64, false, RegistrationState::GarbageCollectible, now)
            {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!(%src, error = %e, "no room to remember soliciting node");
                    None
                }
            }
        };

        if router_known {
            if let Some(entry) = entry {
                entry.touch(now);
            }
            return vec![NdAction::SendRouterAdvertisement {
                destination: src,
                eui64,
            }];
        }

        if let Some(entry) = entry {
            entry.touch(now);
            entry.ra_pending = true;
        }
        self.solicit_router(now)
    }

    fn solicit_router(&mut self, now: Instant) -> Vec<NdAction> {
        if let Some(last) = self.last_solicit {
            if now.saturating_duration_since(last) < RTR_SOLICITATION_INTERVAL {
                return Vec::new();
            }
        }
        self.last_solicit = Some(now);
        vec![NdAction::SolicitRouter]
    }

    fn mesh_neighbor_solicitation(
        &mut self,
        src: Ipv6Addr,
        ns: &NeighborSolicitation,
        now: Instant,
    ) -> Result<Vec<NdAction>> {
        if let Some(aro) = &ns.options.aro {
            if src.is_unspecified() {
                return Err(Error::MalformedOption("ARO from unspecified source".into()));
            }
            let sllao = ns
                .options
                .source_link_addr
                .ok_or_else(|| Error::MalformedOption("ARO without SLLAO".into()))?;
            if sllao.eui64() != aro.eui64 {
                return Err(Error::MalformedOption(format!(
                    "ARO EUI-64 {} differs from SLLAO {}",
                    aro.eui64,
                    sllao.eui64()
                )));
            }
            return Ok(self.process_aro(src, aro, now));
        }

        if self.is_own_address(&ns.target_addr) && !src.is_unspecified() {
            let link_dst = ns.options.source_link_addr.or_else(|| {
                self.cache
                    .lookup(&src)
                    .map(|e| LinkAddr::Eui64(e.link_layer_address))
            });
            return Ok(vec![NdAction::SendNeighborAdvertisement {
                link: LinkLayer::Lowpan,
                target: ns.target_addr,
                destination: src,
                link_dst,
            }]);
        }

        Ok(Vec::new())
    }

    fn mesh_neighbor_advertisement(&mut self, na: &NeighborAdvertisement, now: Instant) {
        if let Some(entry) = self.cache.lookup_mut(&na.target_addr) {
            if entry.is_router != na.router_flag {
                debug!(ip = %na.target_addr, router = na.router_flag, "neighbor router flag changed");
            }
            entry.is_router = na.router_flag;
            entry.touch(now);
        }
    }

    fn ethernet_router_advertisement(
        &mut self,
        src: Ipv6Addr,
        src_mac: MacAddr,
        ra: &RouterAdvertisement,
        now: Instant,
    ) -> Result<Vec<NdAction>> {
        if !is_link_local(&src) {
            return Err(Error::InvalidPacket(format!("RA from non-link-local {}", src)));
        }

        let mac = ra
            .options
            .source_link_addr
            .and_then(|l| l.mac())
            .unwrap_or(src_mac);
        let router = RouterInfo::from_advertisement(src, mac, ra, now);
        if self.router.as_ref().map(|r| r.address) != Some(src) {
            info!(router = %src, %mac, lifetime = ra.router_lifetime, "learned upstream router");
        }
        self.router = Some(router);

        if self.settings.accept_contexts {
            for option in &ra.options.contexts {
                match self
                    .contexts
                    .add_from_option(option, self.settings.default_router_lifetime, now)
                {
                    Ok(context) => {
                        trace!(cid = context.context_id, "context stored");
                        self.metrics.contexts_learned.inc();
                        self.context_generation = self.context_generation.wrapping_add(1);
                    }
                    Err(e) => {
                        debug!(cid = option.context_id, prefix = %option.prefix, error = %e, "6CO dropped");
                        self.metrics.contexts_dropped.inc();
                    }
                }
            }
        }

        if ra.router_lifetime == 0 {
            info!(router = %src, "upstream router is not a default router");
            return Ok(Vec::new());
        }

        for entry in self.cache.iter_mut() {
            if self.policy.forward_to(entry) {
                entry.ra_pending = true;
            }
        }
        Ok(Vec::new())
    }

    fn ethernet_neighbor_solicitation(
        &mut self,
        src: Ipv6Addr,
        src_mac: MacAddr,
        ns: &NeighborSolicitation,
        now: Instant,
    ) -> Vec<NdAction> {
        let target = ns.target_addr;
        let is_dad = src.is_unspecified();
        let sender_mac = ns
            .options
            .source_link_addr
            .and_then(|l| l.mac())
            .unwrap_or(src_mac);

        if self.is_own_address(&target) {
            if is_dad {
                warn!(%target, mac = %src_mac, "another node is probing one of our addresses");
            }
            let (destination, link_dst) = if is_dad {
                (ALL_NODES, None)
            } else {
                (src, Some(LinkAddr::Mac(sender_mac)))
            };
            return vec![NdAction::SendNeighborAdvertisement {
                link: LinkLayer::Ethernet,
                target,
                destination,
                link_dst,
            }];
        }

        let Some(entry) = self.cache.lookup_mut(&target) else {
            return Vec::new();
        };

        let state = entry.state;
        match state {
            RegistrationState::Registered => {
                entry.touch(now);
                if is_dad {
                    debug!(%target, "defending registered address");
                    vec![NdAction::SendProxyAdvertisement {
                        target,
                        destination: ALL_NODES,
                        dst_mac: MacAddr::ipv6_multicast(&ALL_NODES),
                        solicited: false,
                    }]
                } else {
                    vec![NdAction::SendProxyAdvertisement {
                        target,
                        destination: src,
                        dst_mac: sender_mac,
                        solicited: true,
                    }]
                }
            }
            RegistrationState::Tentative if is_dad => self.dad_conflict(target),
            _ => Vec::new(),
        }
    }

    fn ethernet_neighbor_advertisement(&mut self, na: &NeighborAdvertisement) -> Vec<NdAction> {
        let target = na.target_addr;
        match self.cache.lookup(&target).map(|e| e.state) {
            Some(RegistrationState::Tentative) => self.dad_conflict(target),
            Some(RegistrationState::Registered) => {
                warn!(%target, "classic-link node advertises a registered mesh address");
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    /// The classic link already uses `target`: drop the tentative entry and
    /// tell the requester
    fn dad_conflict(&mut self, target: Ipv6Addr) -> Vec<NdAction> {
        let Some(entry) = self.cache.remove(&target) else {
            return Vec::new();
        };
        info!(%target, eui64 = %entry.link_layer_address, "duplicate address on the classic link");
        vec![NdAction::aro_reply(
            target,
            entry.link_layer_address,
            AroStatus::Duplicate,
            lifetime_minutes(entry.registration_lifetime),
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataplane::context_table::ContextState;
    use crate::dataplane::neighbor_cache::NeighborLifetimes;
    use crate::protocol::icmpv6::{NdOptions, SixLowpanContext};

    const NODE: Eui64 = Eui64([0x02, 0x12, 0x4b, 0, 0, 0, 0, 0x01]);
    const OTHER: Eui64 = Eui64([0x02, 0x12, 0x4b, 0, 0, 0, 0, 0x02]);
    const HOST_MAC: MacAddr = MacAddr([0x02, 0xaa, 0, 0, 0, 0x10]);

    fn proxy_with(capacity: usize, max_dad_ns: u8) -> NdProxy {
        let settings = ProxySettings {
            max_dad_ns,
            own_addresses: vec!["fe80::1".parse().unwrap()],
            ..ProxySettings::default()
        };
        NdProxy::new(
            NeighborCache::new(capacity, NeighborLifetimes::default()),
            ContextTable::default(),
            settings,
            Box::new(PendingOnly),
            Arc::new(MetricsRegistry::new()),
        )
    }

    fn proxy() -> NdProxy {
        proxy_with(25, 4)
    }

    fn global(n: u16) -> Ipv6Addr {
        Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, n)
    }

    fn aro(eui64: Eui64, minutes: u16) -> AddressRegistration {
        AddressRegistration::new(AroStatus::Success, minutes, eui64)
    }

    fn ns_with_aro(target: Ipv6Addr, eui64: Eui64, minutes: u16) -> NdMessage {
        let mut ns = NeighborSolicitation::new(target, Some(LinkAddr::Eui64(eui64)));
        ns.options.aro = Some(aro(eui64, minutes));
        NdMessage::NeighborSolicitation(ns)
    }

    fn upstream_ra(lifetime: u16, contexts: Vec<SixLowpanContext>) -> NdMessage {
        NdMessage::RouterAdvertisement(RouterAdvertisement {
            cur_hop_limit: 64,
            managed: false,
            other: false,
            router_lifetime: lifetime,
            reachable_time: 0,
            retrans_timer: 0,
            options: NdOptions {
                contexts,
                ..NdOptions::default()
            },
        })
    }

    #[test]
    fn test_new_global_address_starts_dad() {
        let mut proxy = proxy();
        let now = Instant::now();

        let actions = proxy.process_aro(global(1), &aro(NODE, 10), now);
        assert_eq!(actions, vec![NdAction::SendDadProbe { target: global(1) }]);

        let entry = proxy.neighbors().lookup(&global(1)).unwrap();
        assert_eq!(entry.state, RegistrationState::Tentative);
        assert_eq!(entry.dad_ns_count, 1);
        assert_eq!(entry.registration_lifetime, Duration::from_secs(600));
    }

    #[test]
    fn test_eui64_link_local_skips_dad() {
        let mut proxy = proxy();
        let now = Instant::now();
        let address = NODE.link_local();

        let actions = proxy.process_aro(address, &aro(NODE, 10), now);
        assert_eq!(
            actions,
            vec![NdAction::aro_reply(address, NODE, AroStatus::Success, 10)]
        );

        let entry = proxy.neighbors().lookup(&address).unwrap();
        assert_eq!(entry.state, RegistrationState::Registered);
        assert_eq!(entry.reachable_timer.interval(), Duration::from_secs(600));
    }

    #[test]
    fn test_dad_disabled_registers_directly() {
        let mut proxy = proxy_with(25, 0);
        let actions = proxy.process_aro(global(1), &aro(NODE, 5), Instant::now());

        assert_eq!(
            actions,
            vec![NdAction::aro_reply(global(1), NODE, AroStatus::Success, 5)]
        );
        assert_eq!(
            proxy.neighbors().lookup(&global(1)).unwrap().state,
            RegistrationState::Registered
        );
    }

    #[test]
    fn test_second_owner_is_duplicate_and_first_unchanged() {
        let mut proxy = proxy_with(25, 0);
        let now = Instant::now();

        proxy.process_aro(global(1), &aro(NODE, 10), now);
        let before = proxy.neighbors().lookup(&global(1)).unwrap().clone();

        let later = now + Duration::from_secs(30);
        let actions = proxy.process_aro(global(1), &aro(OTHER, 20), later);
        assert_eq!(
            actions,
            vec![NdAction::aro_reply(global(1), OTHER, AroStatus::Duplicate, 20)]
        );

        let after = proxy.neighbors().lookup(&global(1)).unwrap();
        assert_eq!(after.link_layer_address, before.link_layer_address);
        assert_eq!(after.state, before.state);
        assert_eq!(after.reachable_timer, before.reachable_timer);
        assert_eq!(after.last_lookup, before.last_lookup);
    }

    #[test]
    fn test_duplicate_while_tentative() {
        let mut proxy = proxy();
        let now = Instant::now();

        proxy.process_aro(global(1), &aro(NODE, 10), now);
        let actions = proxy.process_aro(global(1), &aro(OTHER, 10), now);

        assert_eq!(
            actions,
            vec![NdAction::aro_reply(global(1), OTHER, AroStatus::Duplicate, 10)]
        );
        let entry = proxy.neighbors().lookup(&global(1)).unwrap();
        assert_eq!(entry.state, RegistrationState::Tentative);
        assert_eq!(entry.link_layer_address, NODE);
    }

    #[test]
    fn test_tentative_refresh_defers_answer() {
        let mut proxy = proxy();
        let now = Instant::now();

        proxy.process_aro(global(1), &aro(NODE, 10), now);
        let actions = proxy.process_aro(global(1), &aro(NODE, 30), now + Duration::from_secs(2));

        assert!(actions.is_empty());
        let entry = proxy.neighbors().lookup(&global(1)).unwrap();
        assert_eq!(entry.state, RegistrationState::Tentative);
        assert_eq!(entry.registration_lifetime, Duration::from_secs(1800));
        assert_eq!(entry.dad_ns_count, 1);
    }

    #[test]
    fn test_zero_lifetime_removes_in_every_state() {
        let now = Instant::now();
        for state in [
            RegistrationState::GarbageCollectible,
            RegistrationState::Tentative,
            RegistrationState::Registered,
        ] {
            let mut proxy = proxy();
            proxy.cache.add(global(1), NODE, false, state, now).unwrap();

            let actions = proxy.process_aro(global(1), &aro(NODE, 0), now);
            assert_eq!(
                actions,
                vec![NdAction::aro_reply(global(1), NODE, AroStatus::Success, 0)]
            );
            assert!(proxy.neighbors().lookup(&global(1)).is_none());
        }
    }

    #[test]
    fn test_zero_lifetime_for_unknown_address() {
        let mut proxy = proxy();
        let actions = proxy.process_aro(global(9), &aro(NODE, 0), Instant::now());
        assert_eq!(
            actions,
            vec![NdAction::aro_reply(global(9), NODE, AroStatus::Success, 0)]
        );
    }

    #[test]
    fn test_full_cache_reports_nc_full() {
        let mut proxy = proxy_with(1, 0);
        let now = Instant::now();

        proxy.process_aro(global(1), &aro(NODE, 10), now);
        let actions = proxy.process_aro(global(2), &aro(OTHER, 10), now);

        assert_eq!(
            actions,
            vec![NdAction::aro_reply(global(2), OTHER, AroStatus::RouterNcFull, 10)]
        );
        assert!(proxy.neighbors().lookup(&global(2)).is_none());
    }

    #[test]
    fn test_garbage_collectible_reregisters() {
        let mut proxy = proxy();
        let now = Instant::now();
        proxy
            .cache
            .add(global(1), NODE, false, RegistrationState::GarbageCollectible, now)
            .unwrap();

        let actions = proxy.process_aro(global(1), &aro(NODE, 10), now);
        assert_eq!(
            actions,
            vec![NdAction::aro_reply(global(1), NODE, AroStatus::Success, 10)]
        );
        assert_eq!(
            proxy.neighbors().lookup(&global(1)).unwrap().state,
            RegistrationState::Registered
        );
    }

    #[test]
    fn test_aro_without_sllao_is_malformed() {
        let mut proxy = proxy();
        let mut ns = NeighborSolicitation::new("fe80::1".parse().unwrap(), None);
        ns.options.aro = Some(aro(NODE, 10));

        let result = proxy.handle_mesh(global(1), &NdMessage::NeighborSolicitation(ns), Instant::now());
        assert!(matches!(result, Err(Error::MalformedOption(_))));
        assert!(proxy.neighbors().is_empty());
    }

    #[test]
    fn test_aro_eui_mismatch_is_malformed() {
        let mut proxy = proxy();
        let mut ns = NeighborSolicitation::new("fe80::1".parse().unwrap(), Some(LinkAddr::Eui64(OTHER)));
        ns.options.aro = Some(aro(NODE, 10));

        let result = proxy.handle_mesh(global(1), &NdMessage::NeighborSolicitation(ns), Instant::now());
        assert!(matches!(result, Err(Error::MalformedOption(_))));
    }

    #[test]
    fn test_mesh_ns_with_aro_registers() {
        let mut proxy = proxy();
        let actions = proxy
            .handle_mesh(global(1), &ns_with_aro("fe80::1".parse().unwrap(), NODE, 10), Instant::now())
            .unwrap();
        assert_eq!(actions, vec![NdAction::SendDadProbe { target: global(1) }]);
    }

    #[test]
    fn test_mesh_ns_for_own_address() {
        let mut proxy = proxy();
        let ns = NeighborSolicitation::new("fe80::1".parse().unwrap(), Some(LinkAddr::Eui64(NODE)));
        let actions = proxy
            .handle_mesh(NODE.link_local(), &NdMessage::NeighborSolicitation(ns), Instant::now())
            .unwrap();

        assert_eq!(
            actions,
            vec![NdAction::SendNeighborAdvertisement {
                link: LinkLayer::Lowpan,
                target: "fe80::1".parse().unwrap(),
                destination: NODE.link_local(),
                link_dst: Some(LinkAddr::Eui64(NODE)),
            }]
        );
    }

    #[test]
    fn test_rs_without_router_solicits_upstream() {
        let mut proxy = proxy();
        let now = Instant::now();
        let rs = NdMessage::RouterSolicitation(RouterSolicitation {
            options: NdOptions {
                source_link_addr: Some(LinkAddr::Eui64(NODE)),
                ..NdOptions::default()
            },
        });

        let actions = proxy.handle_mesh(NODE.link_local(), &rs, now).unwrap();
        assert_eq!(actions, vec![NdAction::SolicitRouter]);

        let entry = proxy.neighbors().lookup(&NODE.link_local()).unwrap();
        assert_eq!(entry.state, RegistrationState::GarbageCollectible);
        assert!(entry.ra_pending);

        // rate limited
        let actions = proxy.handle_mesh(NODE.link_local(), &rs, now + Duration::from_secs(1)).unwrap();
        assert!(actions.is_empty());
        let actions = proxy
            .handle_mesh(NODE.link_local(), &rs, now + RTR_SOLICITATION_INTERVAL)
            .unwrap();
        assert_eq!(actions, vec![NdAction::SolicitRouter]);
    }

    #[test]
    fn test_rs_with_router_answers_at_once() {
        let mut proxy = proxy();
        let now = Instant::now();
        proxy
            .handle_ethernet("fe80::99".parse().unwrap(), HOST_MAC, &upstream_ra(1800, vec![]), now)
            .unwrap();

        let rs = NdMessage::RouterSolicitation(RouterSolicitation {
            options: NdOptions {
                source_link_addr: Some(LinkAddr::Eui64(NODE)),
                ..NdOptions::default()
            },
        });
        let actions = proxy.handle_mesh(NODE.link_local(), &rs, now).unwrap();
        assert_eq!(
            actions,
            vec![NdAction::SendRouterAdvertisement {
                destination: NODE.link_local(),
                eui64: NODE,
            }]
        );
        assert!(!proxy.neighbors().lookup(&NODE.link_local()).unwrap().ra_pending);
    }

    #[test]
    fn test_ra_must_come_from_link_local() {
        let mut proxy = proxy();
        let result = proxy.handle_ethernet(global(99), HOST_MAC, &upstream_ra(1800, vec![]), Instant::now());
        assert!(result.is_err());
        assert!(proxy.router(Instant::now()).is_none());
    }

    #[test]
    fn test_ra_learns_router_and_contexts() {
        let mut proxy = proxy();
        let now = Instant::now();
        let context = SixLowpanContext {
            context_len: 64,
            compression: true,
            context_id: 3,
            lifetime: 10,
            prefix: "2001:db8::".parse().unwrap(),
        };

        proxy
            .handle_ethernet("fe80::99".parse().unwrap(), HOST_MAC, &upstream_ra(1800, vec![context]), now)
            .unwrap();

        let router = proxy.router(now).unwrap();
        assert_eq!(router.mac, HOST_MAC);
        assert_eq!(router.cur_hop_limit, 64);
        let stored = proxy.contexts().lookup_by_id(3).unwrap();
        assert_eq!(stored.state, ContextState::InUseCompress);
        assert_eq!(proxy.metrics().contexts_learned.get(), 1);

        assert!(proxy.router(now + Duration::from_secs(1800)).is_none());
    }

    #[test]
    fn test_ra_marks_routers_with_policy() {
        let now = Instant::now();
        let mut proxy = NdProxy::new(
            NeighborCache::default(),
            ContextTable::default(),
            ProxySettings::default(),
            policy_for(RaForwardPolicyKind::PendingAndRouters),
            Arc::new(MetricsRegistry::new()),
        );
        let entry = proxy
            .cache
            .add(global(1), NODE, true, RegistrationState::Registered, now)
            .unwrap();
        entry.register(now, Duration::from_secs(600));
        proxy
            .cache
            .add(global(2), OTHER, false, RegistrationState::Registered, now)
            .unwrap();

        proxy
            .handle_ethernet("fe80::99".parse().unwrap(), HOST_MAC, &upstream_ra(1800, vec![]), now)
            .unwrap();

        assert!(proxy.neighbors().lookup(&global(1)).unwrap().ra_pending);
        assert!(!proxy.neighbors().lookup(&global(2)).unwrap().ra_pending);
    }

    #[test]
    fn test_proxy_na_for_registered_address() {
        let mut proxy = proxy_with(25, 0);
        let now = Instant::now();
        proxy.process_aro(global(1), &aro(NODE, 10), now);

        let ns = NeighborSolicitation::new(global(1), Some(LinkAddr::Mac(HOST_MAC)));
        let actions = proxy
            .handle_ethernet(global(50), HOST_MAC, &NdMessage::NeighborSolicitation(ns), now)
            .unwrap();

        assert_eq!(
            actions,
            vec![NdAction::SendProxyAdvertisement {
                target: global(1),
                destination: global(50),
                dst_mac: HOST_MAC,
                solicited: true,
            }]
        );
    }

    #[test]
    fn test_dad_probe_for_registered_address_is_defended() {
        let mut proxy = proxy_with(25, 0);
        let now = Instant::now();
        proxy.process_aro(global(1), &aro(NODE, 10), now);

        let ns = NeighborSolicitation::new(global(1), None);
        let actions = proxy
            .handle_ethernet(Ipv6Addr::UNSPECIFIED, HOST_MAC, &NdMessage::NeighborSolicitation(ns), now)
            .unwrap();

        assert_eq!(
            actions,
            vec![NdAction::SendProxyAdvertisement {
                target: global(1),
                destination: ALL_NODES,
                dst_mac: MacAddr([0x33, 0x33, 0, 0, 0, 1]),
                solicited: false,
            }]
        );
    }

    #[test]
    fn test_classic_link_na_for_tentative_is_duplicate() {
        let mut proxy = proxy();
        let now = Instant::now();
        proxy.process_aro(global(1), &aro(NODE, 10), now);

        let na = NeighborAdvertisement::new(global(1), Some(LinkAddr::Mac(HOST_MAC)), false, false, true);
        let actions = proxy
            .handle_ethernet(global(1), HOST_MAC, &NdMessage::NeighborAdvertisement(na), now)
            .unwrap();

        assert_eq!(
            actions,
            vec![NdAction::aro_reply(global(1), NODE, AroStatus::Duplicate, 10)]
        );
        assert!(proxy.neighbors().lookup(&global(1)).is_none());
    }

    #[test]
    fn test_foreign_dad_probe_for_tentative_is_duplicate() {
        let mut proxy = proxy();
        let now = Instant::now();
        proxy.process_aro(global(1), &aro(NODE, 10), now);

        let ns = NeighborSolicitation::new(global(1), None);
        let actions = proxy
            .handle_ethernet(Ipv6Addr::UNSPECIFIED, HOST_MAC, &NdMessage::NeighborSolicitation(ns), now)
            .unwrap();

        assert_eq!(
            actions,
            vec![NdAction::aro_reply(global(1), NODE, AroStatus::Duplicate, 10)]
        );
    }

    #[test]
    fn test_mesh_na_updates_router_flag() {
        let mut proxy = proxy_with(25, 0);
        let now = Instant::now();
        proxy.process_aro(global(1), &aro(NODE, 10), now);

        let na = NeighborAdvertisement::new(global(1), None, true, false, false);
        proxy
            .handle_mesh(global(1), &NdMessage::NeighborAdvertisement(na), now)
            .unwrap();
        assert!(proxy.neighbors().lookup(&global(1)).unwrap().is_router);
    }

    #[test]
    fn test_lifetime_minutes_saturates() {
        assert_eq!(lifetime_minutes(Duration::from_secs(600)), 10);
        assert_eq!(lifetime_minutes(Duration::from_secs(u64::MAX / 2)), u16::MAX);
    }
}
