//! 6LoWPAN address context table - RFC 6775 §7.2
//!
//! Contexts map a 4-bit identifier to a prefix used by header compression.
//! A context whose lifetime runs out while usable for compression is never
//! dropped at once: it lingers as decompress-only for twice the default
//! router lifetime so that packets compressed against it still decode.

use super::timer::Timer;
use crate::protocol::icmpv6::SixLowpanContext;
use crate::protocol::ipv6::mask_prefix;
use crate::{Error, Result};
use std::net::Ipv6Addr;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default context table capacity
pub const PGW_CONF_MAX_ADDR_CONTEXTS: usize = 4;
/// Lifetime of contexts created locally
pub const DEFAULT_CONTEXT_LIFETIME: Duration = Duration::from_secs(3600);
/// Context identifiers are 4 bits on the wire
pub const MAX_CONTEXT_ID: u8 = 15;
/// 6CO lifetimes are carried in units of 60 seconds
pub const LIFETIME_UNIT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    NotInUse,
    /// Valid for decompression only (grace period or C flag clear)
    UncompressOnly,
    /// Valid for compression and decompression
    InUseCompress,
    Expired,
}

#[derive(Debug, Clone)]
pub struct AddressContext {
    pub state: ContextState,
    pub length: u8,
    pub context_id: u8,
    pub prefix: Ipv6Addr,
    pub valid_lifetime: Timer,
    /// Decompress-only period after compression use ends
    pub grace_period: Duration,
}

impl AddressContext {
    /// Context as announced in a 6CO
    pub fn to_option(&self, now: Instant) -> SixLowpanContext {
        let remaining = match self.state {
            ContextState::InUseCompress | ContextState::UncompressOnly => {
                self.valid_lifetime.remaining(now)
            }
            ContextState::NotInUse | ContextState::Expired => Duration::ZERO,
        };
        let minutes = remaining.as_secs().div_ceil(60).min(u16::MAX as u64) as u16;

        SixLowpanContext {
            context_len: self.length,
            compression: self.state == ContextState::InUseCompress,
            context_id: self.context_id,
            lifetime: minutes,
            prefix: self.prefix,
        }
    }
}

/// Outcome of one maintenance pass over the table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextSweep {
    /// Moved from InUseCompress to UncompressOnly
    pub demoted: Vec<u8>,
    /// Expired and freed
    pub removed: Vec<u8>,
}

impl ContextSweep {
    pub fn is_empty(&self) -> bool {
        self.demoted.is_empty() && self.removed.is_empty()
    }
}

/// Fixed-capacity address context table
#[derive(Debug)]
pub struct ContextTable {
    slots: Vec<Option<AddressContext>>,
    default_lifetime: Duration,
}

impl ContextTable {
    pub fn new(capacity: usize, default_lifetime: Duration) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            default_lifetime,
        }
    }

    fn in_use(&self) -> impl Iterator<Item = &AddressContext> {
        self.slots
            .iter()
            .flatten()
            .filter(|c| c.state != ContextState::NotInUse)
    }

    pub fn lookup_by_id(&self, context_id: u8) -> Option<&AddressContext> {
        self.in_use().find(|c| c.context_id == context_id)
    }

    /// Exact match on prefix and length
    pub fn lookup_by_prefix(&self, prefix: &Ipv6Addr, length: u8) -> Option<&AddressContext> {
        let prefix = mask_prefix(prefix, length);
        self.in_use()
            .find(|c| c.length == length && c.prefix == prefix)
    }

    fn lookup_by_id_mut(&mut self, context_id: u8) -> Option<&mut AddressContext> {
        self.slots
            .iter_mut()
            .flatten()
            .find(|c| c.state != ContextState::NotInUse && c.context_id == context_id)
    }

    fn free_slot(&self) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| !matches!(slot, Some(c) if c.state != ContextState::NotInUse))
    }

    fn lowest_free_id(&self) -> Option<u8> {
        (0..=MAX_CONTEXT_ID).find(|id| self.lookup_by_id(*id).is_none())
    }

    fn store(&mut self, context: AddressContext) -> Result<&mut AddressContext> {
        let index = self.free_slot().ok_or(Error::TableFull)?;
        Ok(self.slots[index].insert(context))
    }

    /// Create a compression context with the lowest free identifier
    pub fn create(
        &mut self,
        prefix: Ipv6Addr,
        length: u8,
        default_router_lifetime: Duration,
        now: Instant,
    ) -> Result<&mut AddressContext> {
        if length > 128 {
            return Err(Error::Config(format!("context length {} exceeds 128", length)));
        }
        if self.free_slot().is_none() {
            return Err(Error::TableFull);
        }
        let context_id = self.lowest_free_id().ok_or(Error::TableFull)?;

        let context = AddressContext {
            state: ContextState::InUseCompress,
            length,
            context_id,
            prefix: mask_prefix(&prefix, length),
            valid_lifetime: Timer::new(now, self.default_lifetime),
            grace_period: default_router_lifetime * 2,
        };
        debug!(cid = context_id, prefix = %context.prefix, length, "context created");
        self.store(context)
    }

    /// Store or refresh the context carried in a 6CO
    pub fn add_from_option(
        &mut self,
        option: &SixLowpanContext,
        default_router_lifetime: Duration,
        now: Instant,
    ) -> Result<&mut AddressContext> {
        let context_id = option.context_id & MAX_CONTEXT_ID;
        let grace_period = default_router_lifetime * 2;
        let (state, lifetime) = if option.lifetime == 0 {
            (ContextState::UncompressOnly, grace_period)
        } else if option.compression {
            (ContextState::InUseCompress, LIFETIME_UNIT * option.lifetime as u32)
        } else {
            (ContextState::UncompressOnly, LIFETIME_UNIT * option.lifetime as u32)
        };

        let prefix = mask_prefix(&option.prefix, option.context_len);
        let existing = self.slots.iter().position(
            |slot| matches!(slot, Some(c) if c.state != ContextState::NotInUse && c.context_id == context_id),
        );
        if let Some(index) = existing {
            let context = self.slots[index].as_mut().ok_or(Error::TableFull)?;
            context.prefix = prefix;
            context.length = option.context_len;
            context.state = state;
            context.valid_lifetime.set(now, lifetime);
            context.grace_period = grace_period;
            return Ok(context);
        }

        let context = AddressContext {
            state,
            length: option.context_len,
            context_id,
            prefix,
            valid_lifetime: Timer::new(now, lifetime),
            grace_period,
        };
        debug!(cid = context_id, prefix = %prefix, "context learned from 6CO");
        self.store(context)
    }

    /// Restart the lifetime of a context and make it usable for compression
    pub fn refresh(&mut self, context_id: u8, now: Instant) -> bool {
        let default_lifetime = self.default_lifetime;
        match self.lookup_by_id_mut(context_id) {
            Some(context) => {
                context.state = ContextState::InUseCompress;
                context.valid_lifetime.set(now, default_lifetime);
                true
            }
            None => false,
        }
    }

    /// Free the slot holding `context_id`
    pub fn remove(&mut self, context_id: u8) -> Option<AddressContext> {
        let index = self
            .slots
            .iter()
            .position(|slot| matches!(slot, Some(c) if c.context_id == context_id))?;
        self.slots[index].take().map(|mut context| {
            context.state = ContextState::NotInUse;
            context
        })
    }

    /// Advance context lifecycles
    ///
    /// InUseCompress past its lifetime moves to UncompressOnly for the grace
    /// period; UncompressOnly past its lifetime becomes Expired and is freed
    /// in the same pass.
    pub fn sweep(&mut self, now: Instant) -> ContextSweep {
        let mut report = ContextSweep::default();

        for slot in self.slots.iter_mut() {
            let Some(context) = slot else { continue };
            if !context.valid_lifetime.expired(now) && context.state != ContextState::Expired {
                continue;
            }

            match context.state {
                ContextState::InUseCompress => {
                    context.state = ContextState::UncompressOnly;
                    let grace = context.grace_period;
                    context.valid_lifetime.set(now, grace);
                    debug!(cid = context.context_id, "context demoted to decompress-only");
                    report.demoted.push(context.context_id);
                }
                ContextState::UncompressOnly | ContextState::Expired | ContextState::NotInUse => {
                    context.state = ContextState::Expired;
                    debug!(cid = context.context_id, "context expired");
                    report.removed.push(context.context_id);
                    *slot = None;
                }
            }
        }

        report
    }

    pub fn iter(&self) -> impl Iterator<Item = &AddressContext> {
        self.in_use()
    }

    pub fn len(&self) -> usize {
        self.in_use().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn default_lifetime(&self) -> Duration {
        self.default_lifetime
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }
}

impl Default for ContextTable {
    fn default() -> Self {
        Self::new(PGW_CONF_MAX_ADDR_CONTEXTS, DEFAULT_CONTEXT_LIFETIME)
    }
}
