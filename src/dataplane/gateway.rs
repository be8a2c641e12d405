//! The gateway context
//!
//! `Gateway` owns the proxy state and everything needed to talk on both
//! links. Received frames go through `process_packet`, the maintenance tick
//! through `run_periodic`; both return the frames to transmit. Neither
//! awaits, so the daemon loop serializes them.

use super::context_table::ContextTable;
use super::maintenance::run_maintenance;
use super::nd_proxy::{policy_for, NdAction, NdProxy, ProxySettings, ALL_ROUTERS};
use super::neighbor_cache::{NeighborCache, NeighborLifetimes};
use crate::config::{ConfigLock, RaForwardPolicyKind};
use crate::protocol::ethernet::{Frame, FrameBuilder};
use crate::protocol::icmpv6::{
    self, AddressRegistration, AroStatus, AuthoritativeBorderRouter, Icmpv6Type, LinkAddr,
    NdMessage, NdOptions, NeighborAdvertisement, NeighborSolicitation, OptionNumbering,
    PrefixInformation, RouterAdvertisement, RouterSolicitation,
};
use crate::protocol::ipv6::{self, Ipv6Builder, NextHeader, ND_HOP_LIMIT};
use crate::protocol::{EtherType, Eui64, LinkLayer, MacAddr, PacketBuf};
use crate::telemetry::MetricsRegistry;
use crate::{Error, Result};
use std::net::Ipv6Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Hop limit advertised to mesh hosts when the upstream router gives none
const DEFAULT_CUR_HOP_LIMIT: u8 = 64;

/// Everything the gateway needs to know about itself
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub mesh_interface: String,
    pub ethernet_interface: String,
    pub ethernet_mac: MacAddr,
    pub mesh_eui64: Eui64,
    /// Global addresses; link-local ones are derived from the link addresses
    pub addresses: Vec<Ipv6Addr>,
    pub neighbor_capacity: usize,
    pub context_capacity: usize,
    pub lifetimes: NeighborLifetimes,
    pub max_dad_ns: u8,
    pub default_router_lifetime: Duration,
    pub context_lifetime: Duration,
    pub maintenance_interval: Duration,
    /// Advertise and learn 6COs
    pub sixlowpan_context_option: bool,
    /// Send an ABRO in mesh RAs
    pub authoritative_border_router: bool,
    /// ABRO valid lifetime in minutes
    pub abro_lifetime: u16,
    pub ra_forward_policy: RaForwardPolicyKind,
    /// ARO/6CO/ABRO type numbers spoken on the mesh; Ethernet always uses RFC 6775
    pub option_numbering: OptionNumbering,
    /// Contexts kept alive while configured
    pub local_contexts: Vec<(Ipv6Addr, u8)>,
}

impl GatewaySettings {
    pub fn new(
        mesh_interface: impl Into<String>,
        ethernet_interface: impl Into<String>,
        ethernet_mac: MacAddr,
        mesh_eui64: Eui64,
    ) -> Self {
        Self {
            mesh_interface: mesh_interface.into(),
            ethernet_interface: ethernet_interface.into(),
            ethernet_mac,
            mesh_eui64,
            addresses: Vec::new(),
            neighbor_capacity: super::neighbor_cache::MAX_6LOWPAN_NEIGHBORS,
            context_capacity: super::context_table::PGW_CONF_MAX_ADDR_CONTEXTS,
            lifetimes: NeighborLifetimes::default(),
            max_dad_ns: crate::config::DEFAULT_MAX_DAD_NS,
            default_router_lifetime: Duration::from_secs(crate::config::DEFAULT_ROUTER_LIFETIME),
            context_lifetime: super::context_table::DEFAULT_CONTEXT_LIFETIME,
            maintenance_interval: Duration::from_millis(crate::config::DEFAULT_MAINTENANCE_INTERVAL_MS),
            sixlowpan_context_option: true,
            authoritative_border_router: false,
            abro_lifetime: crate::config::DEFAULT_ABRO_LIFETIME,
            ra_forward_policy: RaForwardPolicyKind::default(),
            option_numbering: OptionNumbering::default(),
            local_contexts: Vec::new(),
        }
    }

    /// Settings from a lock file; link addresses are resolved by the caller
    pub fn from_lock(lock: &ConfigLock, ethernet_mac: MacAddr, mesh_eui64: Eui64) -> Self {
        let gw = &lock.gateway;
        Self {
            addresses: gw.addresses.clone(),
            neighbor_capacity: gw.neighbor_cache_capacity,
            context_capacity: gw.context_table_capacity,
            lifetimes: NeighborLifetimes {
                garbage_collectible: Duration::from_secs(gw.garbage_collectible_lifetime),
                tentative: Duration::from_secs(gw.tentative_lifetime),
                dad_retrans_interval: Duration::from_secs(gw.dad_retrans_interval),
            },
            max_dad_ns: gw.max_dad_ns,
            default_router_lifetime: Duration::from_secs(gw.default_router_lifetime),
            context_lifetime: Duration::from_secs(gw.context_lifetime),
            maintenance_interval: Duration::from_millis(gw.maintenance_interval_ms),
            sixlowpan_context_option: gw.sixlowpan_context_option,
            authoritative_border_router: gw.authoritative_border_router,
            abro_lifetime: gw.abro_lifetime,
            ra_forward_policy: gw.ra_forward_policy,
            option_numbering: gw.option_numbering,
            local_contexts: lock.contexts.iter().map(|c| (c.prefix, c.length)).collect(),
            ..Self::new(
                lock.interfaces.mesh.clone(),
                lock.interfaces.ethernet.clone(),
                ethernet_mac,
                mesh_eui64,
            )
        }
    }

    pub fn mesh_link_local(&self) -> Ipv6Addr {
        self.mesh_eui64.link_local()
    }

    pub fn ethernet_link_local(&self) -> Ipv6Addr {
        Eui64::from_mac(self.ethernet_mac).link_local()
    }

    fn own_addresses(&self) -> Vec<Ipv6Addr> {
        let mut own = vec![self.mesh_link_local(), self.ethernet_link_local()];
        own.extend(self.addresses.iter().copied());
        own
    }
}

/// A frame ready for a socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmit {
    pub interface: String,
    /// Link-layer destination for interfaces without a link header in the
    /// frame (the mesh); `None` on Ethernet
    pub link_dst: Option<LinkAddr>,
    pub data: Vec<u8>,
}

/// 6LoWPAN-ND proxy gateway
#[derive(Debug)]
pub struct Gateway {
    settings: GatewaySettings,
    proxy: NdProxy,
    metrics: Arc<MetricsRegistry>,
}

impl Gateway {
    /// Set up a gateway with empty tables
    pub fn new(settings: GatewaySettings, metrics: Arc<MetricsRegistry>) -> Self {
        metrics.register_interface(&settings.mesh_interface);
        metrics.register_interface(&settings.ethernet_interface);

        let proxy = NdProxy::new(
            NeighborCache::new(settings.neighbor_capacity, settings.lifetimes),
            ContextTable::new(settings.context_capacity, settings.context_lifetime),
            ProxySettings {
                max_dad_ns: settings.max_dad_ns,
                accept_contexts: settings.sixlowpan_context_option,
                default_router_lifetime: settings.default_router_lifetime,
                own_addresses: settings.own_addresses(),
            },
            policy_for(settings.ra_forward_policy),
            metrics.clone(),
        );

        info!(
            mesh = %settings.mesh_interface,
            ethernet = %settings.ethernet_interface,
            mac = %settings.ethernet_mac,
            eui64 = %settings.mesh_eui64,
            "gateway initialized"
        );

        Self {
            settings,
            proxy,
            metrics,
        }
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    pub fn proxy(&self) -> &NdProxy {
        &self.proxy
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Drop all neighbors, contexts and router state
    pub fn reset(&mut self) {
        self.proxy.clear();
        self.update_gauges();
        info!("gateway tables cleared");
    }

    /// Cadence at which `run_periodic` must be called
    pub fn periodic_interval(&self) -> Duration {
        self.settings.maintenance_interval
    }

    /// Handle one frame received on `interface`
    pub fn process_packet(&mut self, interface: &str, frame: &[u8], now: Instant) -> Vec<Transmit> {
        let link = if interface == self.settings.mesh_interface {
            LinkLayer::Lowpan
        } else if interface == self.settings.ethernet_interface {
            LinkLayer::Ethernet
        } else {
            debug!(interface, "frame from unknown interface");
            return Vec::new();
        };
        self.metrics.record_rx(interface, frame.len());

        let actions = match self.receive(link, frame, now) {
            Ok(actions) => actions,
            Err(Error::MalformedOption(reason)) => {
                debug!(interface, %reason, "dropping ND packet with malformed option");
                self.metrics.malformed_options.inc();
                self.metrics.record_rx_drop(interface);
                return Vec::new();
            }
            Err(e) => {
                debug!(interface, error = %e, "dropping ND packet");
                self.metrics.record_rx_drop(interface);
                return Vec::new();
            }
        };

        let out = self.transmit(actions, now);
        self.update_gauges();
        out
    }

    /// Maintenance tick
    pub fn run_periodic(&mut self, now: Instant) -> Vec<Transmit> {
        self.refresh_local_contexts(now);
        let report = run_maintenance(&mut self.proxy, now);
        if report.repairs > 0 {
            warn!(repairs = report.repairs, "maintenance removed inconsistent entries");
        }
        trace!(
            actions = report.actions.len(),
            dad_failures = report.dad_failures,
            lapsed = report.registrations_expired,
            collected = report.neighbors_removed,
            "maintenance pass"
        );

        let out = self.transmit(report.actions, now);
        self.update_gauges();
        out
    }

    fn update_gauges(&self) {
        self.metrics
            .set_table_sizes(self.proxy.neighbors().len(), self.proxy.contexts().len());
        self.metrics
            .set_neighbor_evictions(self.proxy.neighbors().evictions());
    }

    fn refresh_local_contexts(&mut self, now: Instant) {
        let default_router_lifetime = self.settings.default_router_lifetime;
        for &(prefix, length) in &self.settings.local_contexts {
            let existing = self
                .proxy
                .contexts
                .lookup_by_prefix(&prefix, length)
                .map(|c| c.context_id);
            match existing {
                Some(cid) => {
                    self.proxy.contexts.refresh(cid, now);
                }
                None => match self
                    .proxy
                    .contexts
                    .create(prefix, length, default_router_lifetime, now)
                {
                    Ok(context) => {
                        info!(cid = context.context_id, %prefix, length, "local context installed");
                        self.proxy.context_generation = self.proxy.context_generation.wrapping_add(1);
                    }
                    Err(e) => debug!(%prefix, length, error = %e, "cannot install local context"),
                },
            }
        }
    }

    fn receive(&mut self, link: LinkLayer, frame: &[u8], now: Instant) -> Result<Vec<NdAction>> {
        let src_mac = match link {
            LinkLayer::Ethernet => {
                let eth = Frame::parse(frame)?;
                if eth.ethertype() != EtherType::Ipv6 as u16 {
                    return Ok(Vec::new());
                }
                // our own transmissions come back on the promiscuous socket
                if eth.src_mac() == self.settings.ethernet_mac {
                    return Ok(Vec::new());
                }
                Some(eth.src_mac())
            }
            LinkLayer::Lowpan => None,
        };

        let buf = PacketBuf::parse(frame, link)?;
        if buf.upper_protocol() != NextHeader::Icmpv6 as u8 {
            return Ok(Vec::new());
        }
        let ip = buf.ip()?;
        let icmp = buf.icmpv6()?;
        if Icmpv6Type::from_u8(icmp.msg_type()).is_none() {
            return Ok(Vec::new());
        }

        if ip.hop_limit() != ND_HOP_LIMIT {
            return Err(Error::InvalidPacket(format!(
                "ND message with hop limit {}",
                ip.hop_limit()
            )));
        }
        let (src, dst) = (ip.src_addr(), ip.dst_addr());
        if !icmpv6::validate_checksum(&src, &dst, buf.upper_layer()) {
            return Err(Error::InvalidPacket("bad ICMPv6 checksum".into()));
        }

        let numbering = match link {
            LinkLayer::Lowpan => self.settings.option_numbering,
            LinkLayer::Ethernet => OptionNumbering::Rfc6775,
        };
        let Some(message) = NdMessage::parse_with(&icmp, numbering)? else {
            return Ok(Vec::new());
        };
        trace!(?link, %src, %dst, "ND message received");

        match (link, src_mac) {
            (LinkLayer::Ethernet, Some(mac)) => self.proxy.handle_ethernet(src, mac, &message, now),
            _ => self.proxy.handle_mesh(src, &message, now),
        }
    }

    fn transmit(&self, actions: Vec<NdAction>, now: Instant) -> Vec<Transmit> {
        actions
            .into_iter()
            .filter_map(|action| self.build(action, now))
            .collect()
    }

    fn build(&self, action: NdAction, now: Instant) -> Option<Transmit> {
        match action {
            NdAction::SendDadProbe { target } => {
                let ns = NeighborSolicitation::new(target, None);
                let dst = ipv6::solicited_node(&target);
                self.metrics.dad_probes_sent.inc();
                Some(self.ethernet_frame(Ipv6Addr::UNSPECIFIED, dst, None, ns.to_bytes()))
            }
            NdAction::SendAroReply {
                address,
                eui64,
                status,
                lifetime,
            } => {
                self.count_aro(status, lifetime);
                let aro = AddressRegistration::new(status, lifetime, eui64);
                let na = NeighborAdvertisement::aro_reply(address, aro);
                let dst = if status == AroStatus::Success {
                    address
                } else {
                    eui64.link_local()
                };
                debug!(%address, %eui64, ?status, lifetime, "ARO reply");
                let icmp = na.to_bytes_with(self.settings.option_numbering);
                Some(self.mesh_frame(dst, LinkAddr::Eui64(eui64), icmp))
            }
            NdAction::SendRouterAdvertisement { destination, eui64 } => {
                let Some(ra) = self.mesh_router_advertisement(now) else {
                    debug!(%destination, "no upstream router, RA not sent");
                    return None;
                };
                self.metrics.router_advertisements_sent.inc();
                Some(self.mesh_frame(
                    destination,
                    LinkAddr::Eui64(eui64),
                    ra.to_bytes_with(self.settings.option_numbering),
                ))
            }
            NdAction::SolicitRouter => {
                let rs = RouterSolicitation {
                    options: NdOptions {
                        source_link_addr: Some(LinkAddr::Mac(self.settings.ethernet_mac)),
                        ..NdOptions::default()
                    },
                };
                self.metrics.router_solicitations_sent.inc();
                Some(self.ethernet_frame(
                    self.settings.ethernet_link_local(),
                    ALL_ROUTERS,
                    None,
                    rs.to_bytes(),
                ))
            }
            NdAction::SendProxyAdvertisement {
                target,
                destination,
                dst_mac,
                solicited,
            } => {
                let mut na = NeighborAdvertisement::proxy_reply(target, self.settings.ethernet_mac);
                na.solicited_flag = solicited;
                self.metrics.proxy_advertisements_sent.inc();
                Some(self.ethernet_frame(
                    self.settings.ethernet_link_local(),
                    destination,
                    Some(dst_mac),
                    na.to_bytes(),
                ))
            }
            NdAction::SendNeighborAdvertisement {
                link,
                target,
                destination,
                link_dst,
            } => {
                let own = match link {
                    LinkLayer::Ethernet => LinkAddr::Mac(self.settings.ethernet_mac),
                    LinkLayer::Lowpan => LinkAddr::Eui64(self.settings.mesh_eui64),
                };
                let mut na = NeighborAdvertisement::solicited_reply(target, own, true);
                na.solicited_flag = !destination.is_multicast();

                match link {
                    LinkLayer::Ethernet => Some(self.ethernet_frame(
                        target,
                        destination,
                        link_dst.and_then(|l| l.mac()),
                        na.to_bytes(),
                    )),
                    LinkLayer::Lowpan => match link_dst {
                        Some(dst) => Some(self.mesh_frame(
                            destination,
                            dst,
                            na.to_bytes_with(self.settings.option_numbering),
                        )),
                        None => {
                            debug!(%destination, "no link-layer address for mesh NA");
                            None
                        }
                    },
                }
            }
        }
    }

    fn count_aro(&self, status: AroStatus, lifetime: u16) {
        let counter = match status {
            AroStatus::Success if lifetime == 0 => &self.metrics.aro_deregistrations,
            AroStatus::Success => &self.metrics.aro_success,
            AroStatus::Duplicate => &self.metrics.aro_duplicate,
            AroStatus::RouterNcFull => &self.metrics.aro_nc_full,
        };
        counter.inc();
    }

    /// RA the gateway sends into the mesh, built from what the upstream
    /// router advertised
    fn mesh_router_advertisement(&self, now: Instant) -> Option<RouterAdvertisement> {
        let router = self.proxy.router(now)?;

        let prefixes = router
            .prefixes
            .iter()
            .map(|p| PrefixInformation {
                on_link: false,
                ..p.clone()
            })
            .collect();

        let contexts = if self.settings.sixlowpan_context_option {
            self.proxy
                .contexts()
                .iter()
                .map(|c| c.to_option(now))
                .collect()
        } else {
            Vec::new()
        };

        let abro = self
            .settings
            .authoritative_border_router
            .then(|| AuthoritativeBorderRouter {
                version: self.proxy.context_generation,
                lifetime: self.settings.abro_lifetime,
                address: self
                    .settings
                    .addresses
                    .first()
                    .copied()
                    .unwrap_or_else(|| self.settings.mesh_link_local()),
            });

        Some(RouterAdvertisement {
            cur_hop_limit: if router.cur_hop_limit == 0 {
                DEFAULT_CUR_HOP_LIMIT
            } else {
                router.cur_hop_limit
            },
            managed: router.managed,
            other: router.other,
            router_lifetime: self
                .settings
                .default_router_lifetime
                .as_secs()
                .min(u16::MAX as u64) as u16,
            reachable_time: router.reachable_time,
            retrans_timer: router.retrans_timer,
            options: NdOptions {
                source_link_addr: Some(LinkAddr::Eui64(self.settings.mesh_eui64)),
                mtu: router.mtu,
                prefixes,
                contexts,
                abro,
                ..NdOptions::default()
            },
        })
    }

    fn ip_packet(src: Ipv6Addr, dst: Ipv6Addr, mut icmp: Vec<u8>) -> Vec<u8> {
        icmpv6::set_checksum(&mut icmp, &src, &dst);
        Ipv6Builder::new()
            .src_addr(src)
            .dst_addr(dst)
            .hop_limit(ND_HOP_LIMIT)
            .next_header(NextHeader::Icmpv6 as u8)
            .payload(&icmp)
            .build()
    }

    fn ethernet_frame(
        &self,
        src: Ipv6Addr,
        dst: Ipv6Addr,
        dst_mac: Option<MacAddr>,
        icmp: Vec<u8>,
    ) -> Transmit {
        let dst_mac = match dst_mac {
            Some(mac) if !dst.is_multicast() => mac,
            _ => MacAddr::ipv6_multicast(&dst),
        };
        let packet = Self::ip_packet(src, dst, icmp);
        let data = FrameBuilder::new()
            .dst_mac(dst_mac)
            .src_mac(self.settings.ethernet_mac)
            .ethertype(EtherType::Ipv6 as u16)
            .payload(&packet)
            .build();

        Transmit {
            interface: self.settings.ethernet_interface.clone(),
            link_dst: None,
            data,
        }
    }

    fn mesh_frame(&self, dst: Ipv6Addr, link_dst: LinkAddr, icmp: Vec<u8>) -> Transmit {
        Transmit {
            interface: self.settings.mesh_interface.clone(),
            link_dst: Some(link_dst),
            data: Self::ip_packet(self.settings.mesh_link_local(), dst, icmp),
        }
    }
}
