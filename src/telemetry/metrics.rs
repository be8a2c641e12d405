//! Metrics collection for gateway statistics.
//!
//! Provides thread-safe counters for tracking Neighbor Discovery activity
//! at both the global and per-interface level.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard};

/// Atomic counter for thread-safe increment operations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Creates a new counter initialized to zero.
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Increments the counter by 1.
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds a value to the counter.
    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    /// Gets the current value of the counter.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-interface statistics.
#[derive(Debug, Default)]
pub struct InterfaceStats {
    /// Number of packets received.
    pub rx_packets: Counter,
    /// Number of bytes received.
    pub rx_bytes: Counter,
    /// Number of packets transmitted.
    pub tx_packets: Counter,
    /// Number of bytes transmitted.
    pub tx_bytes: Counter,
    /// Number of received packets dropped as invalid.
    pub rx_drops: Counter,
    /// Number of transmit errors.
    pub tx_errors: Counter,
}

impl InterfaceStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_rx(&self, bytes: usize) {
        self.rx_packets.inc();
        self.rx_bytes.add(bytes as u64);
    }

    pub fn record_tx(&self, bytes: usize) {
        self.tx_packets.inc();
        self.tx_bytes.add(bytes as u64);
    }
}

/// Global metrics registry for the gateway.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Per-interface statistics.
    interfaces: RwLock<HashMap<String, InterfaceStats>>,

    // Address registration
    /// Registrations accepted (ARO status Success).
    pub aro_success: Counter,
    /// Registrations refused as duplicates.
    pub aro_duplicate: Counter,
    /// Registrations refused because the neighbor cache was full.
    pub aro_nc_full: Counter,
    /// Deregistrations (ARO lifetime 0).
    pub aro_deregistrations: Counter,

    // Duplicate address detection
    /// DAD probes sent on the classic link.
    pub dad_probes_sent: Counter,
    /// Tentative entries dropped after the probe budget ran out.
    pub dad_failures: Counter,

    // Router discovery
    /// Router Advertisements sent into the mesh.
    pub router_advertisements_sent: Counter,
    /// Router Solicitations sent upstream.
    pub router_solicitations_sent: Counter,
    /// Proxy Neighbor Advertisements sent on the classic link.
    pub proxy_advertisements_sent: Counter,

    // Contexts
    /// Contexts stored or refreshed from 6COs.
    pub contexts_learned: Counter,
    /// Contexts freed after their grace period.
    pub contexts_expired: Counter,
    /// 6COs dropped because the context table was full.
    pub contexts_dropped: Counter,

    // Health
    /// Entries removed by maintenance for an inconsistent state.
    pub invariant_repairs: Counter,
    /// Packets dropped for malformed ND options.
    pub malformed_options: Counter,

    // Gauges
    /// Neighbors evicted under capacity pressure since start.
    pub neighbor_evictions: AtomicU64,
    /// Current number of neighbor cache entries.
    pub neighbor_cache_size: AtomicU64,
    /// Current number of contexts in use.
    pub context_table_size: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn interfaces(&self) -> RwLockReadGuard<'_, HashMap<String, InterfaceStats>> {
        self.interfaces.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers an interface for statistics tracking.
    pub fn register_interface(&self, name: &str) {
        let mut interfaces = self.interfaces.write().unwrap_or_else(|e| e.into_inner());
        interfaces.entry(name.to_string()).or_default();
    }

    pub fn record_rx(&self, interface: &str, bytes: usize) {
        if let Some(stats) = self.interfaces().get(interface) {
            stats.record_rx(bytes);
        }
    }

    pub fn record_tx(&self, interface: &str, bytes: usize) {
        if let Some(stats) = self.interfaces().get(interface) {
            stats.record_tx(bytes);
        }
    }

    pub fn record_rx_drop(&self, interface: &str) {
        if let Some(stats) = self.interfaces().get(interface) {
            stats.rx_drops.inc();
        }
    }

    pub fn record_tx_error(&self, interface: &str) {
        if let Some(stats) = self.interfaces().get(interface) {
            stats.tx_errors.inc();
        }
    }

    /// Updates the table gauges.
    pub fn set_table_sizes(&self, neighbors: usize, contexts: usize) {
        self.neighbor_cache_size
            .store(neighbors as u64, Ordering::Relaxed);
        self.context_table_size
            .store(contexts as u64, Ordering::Relaxed);
    }

    pub fn set_neighbor_evictions(&self, evictions: u64) {
        self.neighbor_evictions.store(evictions, Ordering::Relaxed);
    }

    /// Exports all metrics as key-value pairs.
    pub fn export(&self) -> Vec<(String, u64)> {
        let mut result = vec![
            ("aro_success".into(), self.aro_success.get()),
            ("aro_duplicate".into(), self.aro_duplicate.get()),
            ("aro_nc_full".into(), self.aro_nc_full.get()),
            ("aro_deregistrations".into(), self.aro_deregistrations.get()),
            ("dad_probes_sent".into(), self.dad_probes_sent.get()),
            ("dad_failures".into(), self.dad_failures.get()),
            (
                "router_advertisements_sent".into(),
                self.router_advertisements_sent.get(),
            ),
            (
                "router_solicitations_sent".into(),
                self.router_solicitations_sent.get(),
            ),
            (
                "proxy_advertisements_sent".into(),
                self.proxy_advertisements_sent.get(),
            ),
            ("contexts_learned".into(), self.contexts_learned.get()),
            ("contexts_expired".into(), self.contexts_expired.get()),
            ("contexts_dropped".into(), self.contexts_dropped.get()),
            ("invariant_repairs".into(), self.invariant_repairs.get()),
            ("malformed_options".into(), self.malformed_options.get()),
            (
                "neighbor_evictions".into(),
                self.neighbor_evictions.load(Ordering::Relaxed),
            ),
            (
                "neighbor_cache_size".into(),
                self.neighbor_cache_size.load(Ordering::Relaxed),
            ),
            (
                "context_table_size".into(),
                self.context_table_size.load(Ordering::Relaxed),
            ),
        ];

        let interfaces = self.interfaces();
        let mut names: Vec<&String> = interfaces.keys().collect();
        names.sort();
        for name in names {
            let stats = &interfaces[name];
            result.extend([
                (format!("{}_rx_packets", name), stats.rx_packets.get()),
                (format!("{}_rx_bytes", name), stats.rx_bytes.get()),
                (format!("{}_tx_packets", name), stats.tx_packets.get()),
                (format!("{}_tx_bytes", name), stats.tx_bytes.get()),
                (format!("{}_rx_drops", name), stats.rx_drops.get()),
                (format!("{}_tx_errors", name), stats.tx_errors.get()),
            ]);
        }

        result
    }
}
