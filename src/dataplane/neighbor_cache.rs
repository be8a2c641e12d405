//! 6LoWPAN-ND neighbor cache - RFC 6775 §3.5, §6.3
//!
//! Fixed-capacity slot arena. Slots are allocated once in `new` and never
//! grow; a full cache evicts only garbage-collectible entries and otherwise
//! fails with `Error::CacheFull`.

use super::timer::Timer;
use crate::protocol::icmpv6::AroStatus;
use crate::protocol::Eui64;
use crate::{Error, Result};
use std::net::Ipv6Addr;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default neighbor cache capacity
pub const MAX_6LOWPAN_NEIGHBORS: usize = 25;
/// Lifetime of an unregistered (garbage-collectible) entry
pub const GARBAGE_COLLECTIBLE_NCE_LIFETIME: Duration = Duration::from_secs(600);
/// Lifetime of a tentative entry; also the DAD window
pub const TENTATIVE_NCE_LIFETIME: Duration = Duration::from_secs(20);
/// Interval between proxied DAD probes
pub const DAD_RETRANS_INTERVAL: Duration = Duration::from_secs(5);

/// Registration state (RFC 6775 §3.5)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    /// Learned without registration (e.g. from an RS); reclaimable
    GarbageCollectible,
    /// Registration received, DAD in progress on the classic link
    Tentative,
    /// Registration accepted; lifetime negotiated through the ARO
    Registered,
}

/// Lifetimes the cache arms entries with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborLifetimes {
    pub garbage_collectible: Duration,
    pub tentative: Duration,
    pub dad_retrans_interval: Duration,
}

impl Default for NeighborLifetimes {
    fn default() -> Self {
        Self {
            garbage_collectible: GARBAGE_COLLECTIBLE_NCE_LIFETIME,
            tentative: TENTATIVE_NCE_LIFETIME,
            dad_retrans_interval: DAD_RETRANS_INTERVAL,
        }
    }
}

/// Neighbor cache entry
#[derive(Debug, Clone)]
pub struct NeighborEntry {
    pub ip_address: Ipv6Addr,
    pub link_layer_address: Eui64,
    pub reachable_timer: Timer,
    pub last_lookup: Instant,
    pub is_router: bool,
    pub state: RegistrationState,
    /// Owes the node an NA carrying `aro_status`
    pub aro_pending: bool,
    /// Owes the node a Router Advertisement
    pub ra_pending: bool,
    pub dad_timer: Option<Timer>,
    pub dad_ns_count: u8,
    /// Lifetime from the ARO being processed; applied when DAD succeeds
    pub registration_lifetime: Duration,
    pub aro_status: AroStatus,
}

impl NeighborEntry {
    fn new(
        ip_address: Ipv6Addr,
        link_layer_address: Eui64,
        is_router: bool,
        state: RegistrationState,
        now: Instant,
        lifetimes: &NeighborLifetimes,
    ) -> Self {
        let (reachable, dad_timer) = match state {
            RegistrationState::Tentative => (
                lifetimes.tentative,
                Some(Timer::new(now, lifetimes.dad_retrans_interval)),
            ),
            // Registered entries get their negotiated lifetime from `register`
            RegistrationState::GarbageCollectible | RegistrationState::Registered => {
                (lifetimes.garbage_collectible, None)
            }
        };

        Self {
            ip_address,
            link_layer_address,
            reachable_timer: Timer::new(now, reachable),
            last_lookup: now,
            is_router,
            state,
            aro_pending: false,
            ra_pending: false,
            dad_timer,
            dad_ns_count: 0,
            registration_lifetime: reachable,
            aro_status: AroStatus::Success,
        }
    }

    /// Enter `Registered` with the negotiated lifetime
    pub fn register(&mut self, now: Instant, lifetime: Duration) {
        self.state = RegistrationState::Registered;
        self.registration_lifetime = lifetime;
        self.reachable_timer.set(now, lifetime);
        self.dad_timer = None;
        self.dad_ns_count = 0;
    }

    /// Drop back to `GarbageCollectible` for `lifetime`
    pub fn demote(&mut self, now: Instant, lifetime: Duration) {
        self.state = RegistrationState::GarbageCollectible;
        self.reachable_timer.set(now, lifetime);
        self.dad_timer = None;
        self.dad_ns_count = 0;
    }

    /// Mark as used (LRU eviction order)
    pub fn touch(&mut self, now: Instant) {
        self.last_lookup = now;
    }

    /// Queue an NA with the given ARO status for the next maintenance tick
    pub fn queue_aro_reply(&mut self, status: AroStatus) {
        self.aro_pending = true;
        self.aro_status = status;
    }

    /// Count one more DAD probe and rearm the retransmit timer
    ///
    /// Fails with `Error::DadFailed` once `max_dad_ns` probes went unanswered.
    pub fn next_dad_probe(&mut self, max_dad_ns: u8) -> Result<()> {
        if self.dad_ns_count >= max_dad_ns {
            return Err(Error::DadFailed);
        }
        if let Some(dad) = self.dad_timer.as_mut() {
            dad.reset();
        }
        self.dad_ns_count += 1;
        Ok(())
    }

    /// Whether state and DAD timer agree
    pub fn is_consistent(&self) -> bool {
        match self.state {
            RegistrationState::Tentative => self.dad_timer.is_some(),
            RegistrationState::GarbageCollectible | RegistrationState::Registered => {
                self.dad_timer.is_none()
            }
        }
    }
}

/// Fixed-capacity 6LoWPAN neighbor cache
#[derive(Debug)]
pub struct NeighborCache {
    slots: Vec<Option<NeighborEntry>>,
    lifetimes: NeighborLifetimes,
    evictions: u64,
}

impl NeighborCache {
    pub fn new(capacity: usize, lifetimes: NeighborLifetimes) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            lifetimes,
            evictions: 0,
        }
    }

    pub fn lifetimes(&self) -> &NeighborLifetimes {
        &self.lifetimes
    }

    fn position(&self, ip: &Ipv6Addr) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| matches!(slot, Some(e) if e.ip_address == *ip))
    }

    /// Oldest garbage-collectible entry by `last_lookup`
    fn eviction_candidate(&self) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| match slot {
                Some(e) if e.state == RegistrationState::GarbageCollectible => {
                    Some((i, e.last_lookup))
                }
                _ => None,
            })
            .min_by_key(|(_, last_lookup)| *last_lookup)
            .map(|(i, _)| i)
    }

    /// Find the entry for an address (no side effects)
    pub fn lookup(&self, ip: &Ipv6Addr) -> Option<&NeighborEntry> {
        self.slots.iter().flatten().find(|e| e.ip_address == *ip)
    }

    /// Check that `eui64` may register `ip`
    ///
    /// An active entry owned by another EUI-64 makes this fail with
    /// `Error::Duplicate`; garbage-collectible entries can be claimed.
    pub fn check_owner(&self, ip: &Ipv6Addr, eui64: Eui64) -> Result<()> {
        match self.lookup(ip) {
            Some(e)
                if e.link_layer_address != eui64
                    && e.state != RegistrationState::GarbageCollectible =>
            {
                Err(Error::Duplicate)
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn lookup_mut(&mut self, ip: &Ipv6Addr) -> Option<&mut NeighborEntry> {
        self.slots.iter_mut().flatten().find(|e| e.ip_address == *ip)
    }

    /// Claim a slot for `ip`, overwriting an existing entry for the same
    /// address and evicting the least recently used garbage-collectible
    /// entry when the cache is full
    pub fn add(
        &mut self,
        ip: Ipv6Addr,
        lladdr: Eui64,
        is_router: bool,
        state: RegistrationState,
        now: Instant,
    ) -> Result<&mut NeighborEntry> {
        let index = match self
            .position(&ip)
            .or_else(|| self.slots.iter().position(Option::is_none))
        {
            Some(index) => index,
            None => {
                let victim = self.eviction_candidate().ok_or(Error::CacheFull)?;
                if let Some(evicted) = &self.slots[victim] {
                    debug!(ip = %evicted.ip_address, "evicting garbage-collectible neighbor");
                }
                self.evictions += 1;
                victim
            }
        };

        let entry = NeighborEntry::new(ip, lladdr, is_router, state, now, &self.lifetimes);
        Ok(self.slots[index].insert(entry))
    }

    /// Free the slot holding `ip`
    pub fn remove(&mut self, ip: &Ipv6Addr) -> Option<NeighborEntry> {
        let index = self.position(ip)?;
        self.slots[index].take()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NeighborEntry> {
        self.slots.iter().flatten()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut NeighborEntry> {
        self.slots.iter_mut().flatten()
    }

    /// Raw slots for the maintenance sweep, which frees entries in place
    pub(crate) fn slots_mut(&mut self) -> &mut [Option<NeighborEntry>] {
        &mut self.slots
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Entries evicted under capacity pressure since creation
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }
}

impl Default for NeighborCache {
    fn default() -> Self {
        Self::new(MAX_6LOWPAN_NEIGHBORS, NeighborLifetimes::default())
    }
}
