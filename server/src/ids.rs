//! Identifier space: real participant ids and viewer-relative visible slots.

use shared::MAX_PARTICIPANTS;
use std::fmt;

/// Server-wide handle for a connected participant, always in `[0, MAX_PARTICIPANTS)`.
///
/// Stable for the lifetime of a connection and reused only after the previous
/// holder has been fully torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RealId(u8);

impl RealId {
    pub fn new(raw: usize) -> Option<Self> {
        if raw < MAX_PARTICIPANTS {
            Some(Self(raw as u8))
        } else {
            None
        }
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn raw(self) -> u8 {
        self.0
    }

    /// Iterates the whole identifier space in ascending order.
    pub fn all() -> impl Iterator<Item = RealId> {
        (0..MAX_PARTICIPANTS).map(|i| RealId(i as u8))
    }
}

impl fmt::Display for RealId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Viewer-relative index standing in for a [`RealId`] on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slot(pub u8);

impl Slot {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
