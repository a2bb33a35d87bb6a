//! Temporary address moratorium ("frozen leaver" list)
//!
//! Addresses land here when a participant disconnects while their avatar is
//! frozen. Until the entry expires, connect attempts from the same address are
//! refused before a participant is ever created. Ports are ignored so a fresh
//! client socket does not get around the block.

use log::{debug, warn};
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoratoriumError {
    #[error("frozen leaver list full ({capacity} entries)")]
    ListFull { capacity: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    ip: IpAddr,
    expiry_tick: u64,
}

/// Capacity-bounded list of blocked addresses, expiring lazily
#[derive(Debug)]
pub struct Moratorium {
    entries: Vec<Entry>,
    capacity: usize,
    tick_speed: u64,
}

impl Moratorium {
    pub fn new(capacity: usize, tick_speed: u64) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            tick_speed: tick_speed.max(1),
        }
    }

    /// Blocks `addr` for `seconds` starting at tick `now`
    ///
    /// Refuses instead of evicting when the list is full; entries drain on
    /// their own as they expire.
    pub fn block(&mut self, addr: SocketAddr, seconds: u64, now: u64) -> Result<(), MoratoriumError> {
        self.expire_all(now);

        let ip = addr.ip();
        let expiry_tick = now.saturating_add(seconds.saturating_mul(self.tick_speed));

        if let Some(entry) = self.entries.iter_mut().find(|e| e.ip == ip) {
            entry.expiry_tick = entry.expiry_tick.max(expiry_tick);
            return Ok(());
        }

        if self.entries.len() >= self.capacity {
            warn!("Frozen leaver list full! Not blocking {}", ip);
            return Err(MoratoriumError::ListFull {
                capacity: self.capacity,
            });
        }

        debug!("Blocking {} until tick {}", ip, expiry_tick);
        self.entries.push(Entry { ip, expiry_tick });
        Ok(())
    }

    pub fn is_blocked(&mut self, addr: SocketAddr, now: u64) -> bool {
        self.remaining_seconds(addr, now).is_some()
    }

    /// Whole seconds left on the block for `addr`, rounded up
    pub fn remaining_seconds(&mut self, addr: SocketAddr, now: u64) -> Option<u64> {
        self.expire_all(now);

        let ip = addr.ip();
        self.entries
            .iter()
            .find(|e| e.ip == ip)
            .map(|e| (e.expiry_tick - now).div_ceil(self.tick_speed).max(1))
    }

    /// Drops every entry whose expiry is strictly in the past
    ///
    /// Returns how many entries were removed.
    pub fn expire_all(&mut self, now: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.expiry_tick >= now);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
