//! Configuration validation

use super::{Config, DEFAULT_CONTEXT_TABLE_CAPACITY, DEFAULT_DAD_RETRANS_INTERVAL, DEFAULT_MAX_DAD_NS, DEFAULT_TENTATIVE_LIFETIME};
use crate::protocol::ipv6::{is_link_local, mask_prefix};
use crate::protocol::{Eui64, MacAddr};

/// Context identifiers are 4 bits on the wire
const MAX_CONTEXTS: usize = 16;

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn print_diagnostics(&self) {
        for warning in &self.warnings {
            println!("[WARN] {}", warning);
        }
        for error in &self.errors {
            println!("[ERROR] {}", error);
        }
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_interfaces(config, &mut result);
    validate_addresses(config, &mut result);
    validate_timing(config, &mut result);
    validate_contexts(config, &mut result);

    result
}

fn validate_interfaces(config: &Config, result: &mut ValidationResult) {
    let iface = &config.interfaces;

    if iface.mesh.is_empty() {
        result.error("interfaces.mesh: interface name required");
    }
    if iface.ethernet.is_empty() {
        result.error("interfaces.ethernet: interface name required");
    }
    if !iface.mesh.is_empty() && iface.mesh == iface.ethernet {
        result.error(format!(
            "interfaces: mesh and ethernet must differ (both '{}')",
            iface.mesh
        ));
    }

    match iface.ethernet_mac.as_deref().map(str::parse::<MacAddr>) {
        Some(Ok(mac)) if !mac.is_unicast() => {
            result.error(format!("interfaces.ethernet_mac: {} is not a unicast MAC", mac));
        }
        Some(Err(e)) => result.error(format!("interfaces.ethernet_mac: {}", e)),
        Some(Ok(_)) => {}
        None => result.warn(format!(
            "interfaces.ethernet_mac not specified, reading it from {} at startup",
            iface.ethernet
        )),
    }

    if let Some(Err(e)) = iface.mesh_eui64.as_deref().map(str::parse::<Eui64>) {
        result.error(format!("interfaces.mesh_eui64: {}", e));
    }
}

fn validate_addresses(config: &Config, result: &mut ValidationResult) {
    let gw = &config.gateway;

    for addr in &gw.addresses {
        if addr.is_unspecified() || addr.is_multicast() || addr.is_loopback() {
            result.error(format!("gateway.addresses: {} is not a unicast address", addr));
        } else if is_link_local(addr) {
            result.warn(format!(
                "gateway.addresses: {} is link-local; link-local addresses are derived automatically",
                addr
            ));
        }
    }

    if gw.authoritative_border_router.unwrap_or(false)
        && gw.addresses.iter().all(is_link_local)
    {
        result.warn("gateway.authoritative_border_router: no global address, ABRO will carry the link-local address");
    }
}

fn validate_timing(config: &Config, result: &mut ValidationResult) {
    let gw = &config.gateway;

    if gw.neighbor_cache_capacity == Some(0) {
        result.error("gateway.neighbor_cache_capacity: must be at least 1");
    }
    match gw.context_table_capacity {
        Some(0) => result.error("gateway.context_table_capacity: must be at least 1"),
        Some(n) if n > MAX_CONTEXTS => result.error(format!(
            "gateway.context_table_capacity: {} exceeds the {} available context identifiers",
            n, MAX_CONTEXTS
        )),
        _ => {}
    }

    let tentative = gw.tentative_lifetime.unwrap_or(DEFAULT_TENTATIVE_LIFETIME);
    let retrans = gw.dad_retrans_interval.unwrap_or(DEFAULT_DAD_RETRANS_INTERVAL);
    let max_dad_ns = gw.max_dad_ns.unwrap_or(DEFAULT_MAX_DAD_NS);

    if tentative == 0 {
        result.error("gateway.tentative_lifetime: must be at least 1 second");
    }
    if retrans == 0 {
        result.error("gateway.dad_retrans_interval: must be at least 1 second");
    }
    if max_dad_ns == 0 {
        result.warn("gateway.max_dad_ns = 0: registrations are accepted without DAD");
    } else if retrans > 0 && (max_dad_ns as u64).saturating_mul(retrans) < tentative {
        result.error(format!(
            "gateway: {} DAD probes every {}s run out before the {}s tentative window closes; every proxied registration would fail",
            max_dad_ns, retrans, tentative
        ));
    }

    if gw.default_router_lifetime == Some(0) {
        result.error("gateway.default_router_lifetime: 0 tells mesh nodes the gateway is not a router");
    } else if gw.default_router_lifetime.is_some_and(|l| l > u16::MAX as u64) {
        result.error("gateway.default_router_lifetime: must fit the 16-bit RA field (65535)");
    }

    match gw.maintenance_interval_ms {
        Some(0) => result.error("gateway.maintenance_interval_ms: must be positive"),
        Some(ms) if ms > retrans.saturating_mul(1000) => result.warn(format!(
            "gateway.maintenance_interval_ms: {}ms is coarser than the DAD retransmit interval",
            ms
        )),
        _ => {}
    }
}

fn validate_contexts(config: &Config, result: &mut ValidationResult) {
    let capacity = config
        .gateway
        .context_table_capacity
        .unwrap_or(DEFAULT_CONTEXT_TABLE_CAPACITY);

    if config.contexts.len() > capacity {
        result.error(format!(
            "contexts: {} configured but the context table holds {}",
            config.contexts.len(),
            capacity
        ));
    }
    if !config.contexts.is_empty() && config.gateway.sixlowpan_context_option == Some(false) {
        result.warn("contexts: configured but sixlowpan_context_option is off, they will not be advertised");
    }

    for (i, context) in config.contexts.iter().enumerate() {
        if context.length == 0 || context.length > 128 {
            result.error(format!(
                "contexts[{}]: length {} out of range 1..=128",
                i, context.length
            ));
            continue;
        }
        let masked = mask_prefix(&context.prefix, context.length);
        if masked != context.prefix {
            result.warn(format!(
                "contexts[{}]: {} has host bits set, using {}/{}",
                i, context.prefix, masked, context.length
            ));
        }
        let duplicate = config.contexts[..i].iter().any(|other| {
            other.length == context.length && mask_prefix(&other.prefix, other.length) == masked
        });
        if duplicate {
            result.error(format!(
                "contexts[{}]: {}/{} configured twice",
                i, masked, context.length
            ));
        }
    }
}
