//! Periodic maintenance of the neighbor cache and context table
//!
//! One pass per tick: advance every neighbor's registration state, age the
//! contexts, then hand out the ARO answers and RAs that were queued. Each
//! entry is handled on its own; a bad entry is dropped and reported, never
//! allowed to stop the sweep.

use super::context_table::ContextSweep;
use super::nd_proxy::{lifetime_minutes, NdAction, NdProxy};
use super::neighbor_cache::RegistrationState;
use crate::protocol::icmpv6::AroStatus;
use std::time::Instant;
use tracing::{debug, info, warn};

/// What one maintenance pass did
#[derive(Debug, Default)]
pub struct MaintenanceReport {
    pub actions: Vec<NdAction>,
    /// Entries dropped for an impossible state/timer combination
    pub repairs: usize,
    pub dad_failures: usize,
    pub registrations_expired: usize,
    pub neighbors_removed: usize,
    pub contexts: ContextSweep,
    pub router_expired: bool,
}

pub fn run_maintenance(proxy: &mut NdProxy, now: Instant) -> MaintenanceReport {
    let mut report = MaintenanceReport::default();
    let lifetimes = *proxy.cache.lifetimes();
    let max_dad_ns = proxy.settings().max_dad_ns;

    for slot in proxy.cache.slots_mut() {
        let Some(entry) = slot else { continue };

        if !entry.is_consistent() {
            warn!(ip = %entry.ip_address, state = ?entry.state, "inconsistent neighbor entry removed");
            report.repairs += 1;
            *slot = None;
            continue;
        }

        match entry.state {
            RegistrationState::Tentative => {
                if entry.reachable_timer.expired(now) {
                    let lifetime = entry.registration_lifetime;
                    entry.register(now, lifetime);
                    entry.queue_aro_reply(AroStatus::Success);
                    info!(ip = %entry.ip_address, eui64 = %entry.link_layer_address, "address registered after DAD");
                    continue;
                }

                if !entry.dad_timer.is_some_and(|dad| dad.expired(now)) {
                    continue;
                }
                match entry.next_dad_probe(max_dad_ns) {
                    Ok(()) => {
                        debug!(ip = %entry.ip_address, probe = entry.dad_ns_count, "DAD retransmit");
                        report.actions.push(NdAction::SendDadProbe {
                            target: entry.ip_address,
                        });
                    }
                    Err(e) => {
                        info!(ip = %entry.ip_address, probes = entry.dad_ns_count, error = %e, "DAD gave up without resolution");
                        report.dad_failures += 1;
                        *slot = None;
                    }
                }
            }
            RegistrationState::Registered => {
                if entry.reachable_timer.expired(now) {
                    debug!(ip = %entry.ip_address, "registration lapsed");
                    entry.demote(now, lifetimes.garbage_collectible);
                    report.registrations_expired += 1;
                }
            }
            RegistrationState::GarbageCollectible => {
                if entry.reachable_timer.expired(now) {
                    debug!(ip = %entry.ip_address, "neighbor entry collected");
                    report.neighbors_removed += 1;
                    *slot = None;
                }
            }
        }
    }

    report.contexts = proxy.contexts.sweep(now);
    if !report.contexts.is_empty() {
        proxy.context_generation = proxy.context_generation.wrapping_add(1);
    }

    if proxy.router.as_ref().is_some_and(|r| r.expired(now)) {
        if let Some(router) = proxy.router.take() {
            info!(router = %router.address, "upstream router expired");
        }
        report.router_expired = true;
    }

    let router_known = proxy.router(now).is_some();
    for entry in proxy.cache.iter_mut() {
        if entry.aro_pending {
            report.actions.push(NdAction::aro_reply(
                entry.ip_address,
                entry.link_layer_address,
                entry.aro_status,
                lifetime_minutes(entry.registration_lifetime),
            ));
            entry.aro_pending = false;
        }
        if entry.ra_pending && router_known {
            report.actions.push(NdAction::SendRouterAdvertisement {
                destination: entry.ip_address,
                eui64: entry.link_layer_address,
            });
            entry.ra_pending = false;
        }
    }

    let metrics = proxy.metrics();
    metrics.invariant_repairs.add(report.repairs as u64);
    metrics.dad_failures.add(report.dad_failures as u64);
    metrics
        .contexts_expired
        .add(report.contexts.removed.len() as u64);

    report
}
