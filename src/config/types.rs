//! Configuration types

use crate::protocol::icmpv6::OptionNumbering;
use crate::telemetry::LogConfig;
use serde::{Deserialize, Serialize};
use std::net::Ipv6Addr;

/// User-defined configuration (config.toml)
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub interfaces: InterfacesConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub contexts: Vec<ContextConfig>,
    #[serde(default)]
    pub logging: Option<LogConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterfacesConfig {
    /// lowpan interface facing the mesh
    pub mesh: String,
    /// Classic IPv6 link
    pub ethernet: String,
    /// Overrides the MAC read from sysfs
    pub ethernet_mac: Option<String>,
    /// Overrides the EUI-64 read from sysfs
    pub mesh_eui64: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayConfig {
    /// Global addresses the gateway answers for itself
    #[serde(default)]
    pub addresses: Vec<Ipv6Addr>,
    pub neighbor_cache_capacity: Option<usize>,
    pub context_table_capacity: Option<usize>,
    /// Seconds
    pub garbage_collectible_lifetime: Option<u64>,
    /// Seconds; also the DAD window
    pub tentative_lifetime: Option<u64>,
    /// Seconds between proxied DAD probes
    pub dad_retrans_interval: Option<u64>,
    pub max_dad_ns: Option<u8>,
    /// Seconds; advertised into the mesh
    pub default_router_lifetime: Option<u64>,
    /// Seconds; lifetime of locally configured contexts
    pub context_lifetime: Option<u64>,
    pub maintenance_interval_ms: Option<u64>,
    pub sixlowpan_context_option: Option<bool>,
    pub authoritative_border_router: Option<bool>,
    /// Minutes
    pub abro_lifetime: Option<u16>,
    pub ra_forward_policy: Option<RaForwardPolicyKind>,
    /// Type numbers of ARO/6CO/ABRO on the mesh: "rfc6775" or "draft"
    pub option_numbering: Option<OptionNumbering>,
}

/// Locally configured compression context
#[derive(Debug, Clone, Deserialize)]
pub struct ContextConfig {
    pub prefix: Ipv6Addr,
    pub length: u8,
}

/// Which neighbors receive an RA when the upstream router advertises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaForwardPolicyKind {
    /// Neighbors that solicited while no router was known
    #[default]
    PendingOnly,
    /// Pending neighbors and every registered mesh router
    PendingAndRouters,
}

// Defaults

pub const DEFAULT_NEIGHBOR_CACHE_CAPACITY: usize = 25;
pub const DEFAULT_CONTEXT_TABLE_CAPACITY: usize = 4;
pub const DEFAULT_GARBAGE_COLLECTIBLE_LIFETIME: u64 = 600;
pub const DEFAULT_TENTATIVE_LIFETIME: u64 = 20;
pub const DEFAULT_DAD_RETRANS_INTERVAL: u64 = 5;
pub const DEFAULT_MAX_DAD_NS: u8 = 4;
pub const DEFAULT_ROUTER_LIFETIME: u64 = 1800;
pub const DEFAULT_CONTEXT_LIFETIME: u64 = 3600;
pub const DEFAULT_MAINTENANCE_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_ABRO_LIFETIME: u16 = 10000;

// ============================================================================
// Lock file types (generated, includes all defaults)
// ============================================================================

/// Generated lock file with all defaults filled in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigLock {
    pub generated_at: String,
    pub source: String,
    pub interfaces: InterfacesLock,
    pub gateway: GatewayLock,
    pub contexts: Vec<ContextLock>,
    pub logging: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfacesLock {
    pub mesh: String,
    pub ethernet: String,
    /// MAC or "auto"
    pub ethernet_mac: String,
    /// EUI-64 or "auto"
    pub mesh_eui64: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayLock {
    pub addresses: Vec<Ipv6Addr>,
    pub neighbor_cache_capacity: usize,
    pub context_table_capacity: usize,
    pub garbage_collectible_lifetime: u64,
    pub tentative_lifetime: u64,
    pub dad_retrans_interval: u64,
    pub max_dad_ns: u8,
    pub default_router_lifetime: u64,
    pub context_lifetime: u64,
    pub maintenance_interval_ms: u64,
    pub sixlowpan_context_option: bool,
    pub authoritative_border_router: bool,
    pub abro_lifetime: u16,
    pub ra_forward_policy: RaForwardPolicyKind,
    #[serde(default)]
    pub option_numbering: OptionNumbering,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextLock {
    pub prefix: Ipv6Addr,
    pub length: u8,
}

impl ConfigLock {
    pub fn from_config(config: &Config, source: &str) -> Self {
        let iface = &config.interfaces;
        let gw = &config.gateway;

        let interfaces = InterfacesLock {
            mesh: iface.mesh.clone(),
            ethernet: iface.ethernet.clone(),
            ethernet_mac: iface.ethernet_mac.clone().unwrap_or_else(|| "auto".to_string()),
            mesh_eui64: iface.mesh_eui64.clone().unwrap_or_else(|| "auto".to_string()),
        };

        let gateway = GatewayLock {
            addresses: gw.addresses.clone(),
            neighbor_cache_capacity: gw
                .neighbor_cache_capacity
                .unwrap_or(DEFAULT_NEIGHBOR_CACHE_CAPACITY),
            context_table_capacity: gw
                .context_table_capacity
                .unwrap_or(DEFAULT_CONTEXT_TABLE_CAPACITY),
            garbage_collectible_lifetime: gw
                .garbage_collectible_lifetime
                .unwrap_or(DEFAULT_GARBAGE_COLLECTIBLE_LIFETIME),
            tentative_lifetime: gw.tentative_lifetime.unwrap_or(DEFAULT_TENTATIVE_LIFETIME),
            dad_retrans_interval: gw
                .dad_retrans_interval
                .unwrap_or(DEFAULT_DAD_RETRANS_INTERVAL),
            max_dad_ns: gw.max_dad_ns.unwrap_or(DEFAULT_MAX_DAD_NS),
            default_router_lifetime: gw.default_router_lifetime.unwrap_or(DEFAULT_ROUTER_LIFETIME),
            context_lifetime: gw.context_lifetime.unwrap_or(DEFAULT_CONTEXT_LIFETIME),
            maintenance_interval_ms: gw
                .maintenance_interval_ms
                .unwrap_or(DEFAULT_MAINTENANCE_INTERVAL_MS),
            sixlowpan_context_option: gw.sixlowpan_context_option.unwrap_or(true),
            authoritative_border_router: gw.authoritative_border_router.unwrap_or(false),
            abro_lifetime: gw.abro_lifetime.unwrap_or(DEFAULT_ABRO_LIFETIME),
            ra_forward_policy: gw.ra_forward_policy.unwrap_or_default(),
            option_numbering: gw.option_numbering.unwrap_or_default(),
        };

        let contexts = config
            .contexts
            .iter()
            .map(|c| ContextLock {
                prefix: c.prefix,
                length: c.length,
            })
            .collect();

        ConfigLock {
            generated_at: chrono::Utc::now().to_rfc3339(),
            source: source.to_string(),
            interfaces,
            gateway,
            contexts,
            logging: config.logging.clone().unwrap_or_default(),
        }
    }
}
