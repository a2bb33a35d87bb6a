//! Participant visibility virtualization
//!
//! A legacy client can only represent 16 identities at once, an extended one 64.
//! Rather than truncating the roster, every viewer gets its own slot table: a
//! dense list of the participants most relevant to it, where the position in
//! the list is the slot the client sees on the wire.
//!
//! ## Stability
//! Tables are rebuilt once per tick. Participants that are still chosen keep
//! their slot and new entries are held for at least [`MIN_RESIDENCY_ROUNDS`]
//! rounds. A participant that drops out is not replaced straight away: it
//! keeps its slot for one more round as a hidden, still resolvable
//! reservation, and only the round after that can someone else take the
//! slot. A slot shown in one snapshot therefore resolves to the same person
//! for the following round too.
//!
//! ## Sentinel
//! The top slot of each capability is never assigned. Fan-out uses it for
//! identities the viewer cannot see, so tables hold at most `capacity - 1`
//! entries.

use crate::client_manager::ClientManager;
use crate::game::WorldView;
use crate::ids::{RealId, Slot};
use shared::{ProtocolCapability, MAX_PARTICIPANTS};
use thiserror::Error;

/// Rounds a freshly assigned participant is kept before it can be evicted
pub const MIN_RESIDENCY_ROUNDS: u64 = 2;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("slot {slot} was never assigned to viewer {viewer}")]
pub struct UnknownSlot {
    pub viewer: RealId,
    pub slot: Slot,
}

/// Number of identities a client with `capability` can represent
pub fn visible_capacity(capability: ProtocolCapability) -> usize {
    capability.visible_capacity()
}

/// Slot shown for identities outside the viewer's table
pub fn sentinel_slot(capability: ProtocolCapability) -> Slot {
    Slot(capability.sentinel_slot())
}

/// Ranks candidates for a viewer's table; lower values are more relevant
pub trait RelevancePolicy: Send {
    fn priority(&self, view: Option<(f32, f32)>, candidate: Option<(f32, f32)>) -> f32;
}

/// Closest avatars first; anything without a position sorts last
#[derive(Debug, Default, Clone, Copy)]
pub struct NearestFirst;

impl RelevancePolicy for NearestFirst {
    fn priority(&self, view: Option<(f32, f32)>, candidate: Option<(f32, f32)>) -> f32 {
        match (view, candidate) {
            (Some((vx, vy)), Some((cx, cy))) => {
                let dx = cx - vx;
                let dy = cy - vy;
                (dx * dx + dy * dy).sqrt()
            }
            _ => f32::MAX,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Part of the viewer's snapshot
    Shown,
    /// Dropped this round; hidden but still resolves until the next round
    Lapsed,
    /// Participant was torn down; resolves to nothing
    Vacant,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotEntry {
    pub real_id: RealId,
    pub priority: f32,
    /// Round in which this participant entered the table
    pub since_round: u64,
    pub state: SlotState,
}

impl SlotEntry {
    pub fn is_shown(&self) -> bool {
        self.state == SlotState::Shown
    }
}

#[derive(Debug, Default)]
struct ViewerTables {
    current: Vec<SlotEntry>,
    previous: Vec<Option<RealId>>,
    round: u64,
}

/// Slot tables for every viewer
pub struct VisibilityMap {
    viewers: Vec<ViewerTables>,
    policy: Box<dyn RelevancePolicy>,
}

impl Default for VisibilityMap {
    fn default() -> Self {
        Self::new(Box::new(NearestFirst))
    }
}

impl VisibilityMap {
    pub fn new(policy: Box<dyn RelevancePolicy>) -> Self {
        Self {
            viewers: (0..MAX_PARTICIPANTS).map(|_| ViewerTables::default()).collect(),
            policy,
        }
    }

    /// Rebuilds `viewer`'s table and returns it
    ///
    /// The viewer itself and the participant it spectates are wanted every
    /// round; the rest of the room goes to young entries and then to the most
    /// relevant candidates, ties broken by ascending id. Wanted entries keep
    /// their slot. Shown entries that are no longer wanted lapse in place, and
    /// newcomers only take slots that were free or lapsed the round before,
    /// so the viewer's spectated target can wait a round on a full table.
    pub fn assign_slots<W: WorldView>(
        &mut self,
        viewer: RealId,
        roster: &ClientManager,
        world: &W,
    ) -> &[SlotEntry] {
        let Some(participant) = roster.get(viewer) else {
            self.forget_viewer(viewer);
            return &[];
        };

        let room = visible_capacity(participant.capability) - 1;
        let focus = participant.spectating.filter(|id| roster.contains(*id));
        let view_pos = focus
            .and_then(|id| world.position(id))
            .or_else(|| world.position(viewer));

        let mut ranked: Vec<(RealId, f32)> = roster
            .iter()
            .map(|p| (p.id, self.policy.priority(view_pos, world.position(p.id))))
            .collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        let tables = &mut self.viewers[viewer.index()];
        tables.round += 1;
        let round = tables.round;

        let old = std::mem::take(&mut tables.current);
        let priority_of = |id: RealId| {
            ranked
                .iter()
                .find(|(r, _)| *r == id)
                .map(|(_, p)| *p)
                .unwrap_or(f32::MAX)
        };

        // Pick who should be shown this round
        let mut wanted: Vec<RealId> = Vec::with_capacity(room);
        let take = |id: RealId, wanted: &mut Vec<RealId>| {
            if wanted.len() < room && !wanted.contains(&id) {
                wanted.push(id);
            }
        };

        take(viewer, &mut wanted);
        if let Some(target) = focus {
            take(target, &mut wanted);
        }

        let mut young: Vec<&SlotEntry> = old
            .iter()
            .filter(|e| e.is_shown() && roster.contains(e.real_id))
            .filter(|e| round - e.since_round < MIN_RESIDENCY_ROUNDS)
            .collect();
        young.sort_by(|a, b| {
            priority_of(a.real_id)
                .total_cmp(&priority_of(b.real_id))
                .then(a.real_id.cmp(&b.real_id))
        });
        for entry in young {
            take(entry.real_id, &mut wanted);
        }

        for (id, _) in &ranked {
            take(*id, &mut wanted);
        }

        // Wanted entries stay put, dropped ones lapse for a round, lapsed ones free up
        let mut slots: Vec<Option<SlotEntry>> = old
            .iter()
            .map(|entry| {
                if entry.state == SlotState::Vacant || !roster.contains(entry.real_id) {
                    return None;
                }
                let state = if wanted.contains(&entry.real_id) {
                    SlotState::Shown
                } else if entry.is_shown() {
                    SlotState::Lapsed
                } else {
                    return None;
                };
                Some(SlotEntry {
                    priority: priority_of(entry.real_id),
                    state,
                    ..*entry
                })
            })
            .collect();

        let newcomers: Vec<SlotEntry> = wanted
            .iter()
            .filter(|id| !slots.iter().flatten().any(|e| e.real_id == **id))
            .map(|id| SlotEntry {
                real_id: *id,
                priority: priority_of(*id),
                since_round: round,
                state: SlotState::Shown,
            })
            .collect();

        let mut newcomers = newcomers.into_iter();
        for hole in slots.iter_mut().filter(|s| s.is_none()) {
            match newcomers.next() {
                Some(entry) => *hole = Some(entry),
                None => break,
            }
        }
        while slots.len() < room {
            match newcomers.next() {
                Some(entry) => slots.push(Some(entry)),
                None => break,
            }
        }

        // Close remaining gaps from the tail; moved entries resolve through the previous table
        trim_trailing_holes(&mut slots);
        while let Some(hole) = slots.iter().position(Option::is_none) {
            slots.swap_remove(hole);
            trim_trailing_holes(&mut slots);
        }

        tables.previous = old
            .iter()
            .map(|e| (e.state != SlotState::Vacant).then_some(e.real_id))
            .collect();
        tables.current = slots.into_iter().flatten().collect();
        &tables.current
    }

    /// Rebuilds the table of every participant with a live connection
    pub fn refresh<W: WorldView>(&mut self, roster: &ClientManager, world: &W) {
        let viewers: Vec<RealId> = roster.connected().map(|p| p.id).collect();
        for viewer in viewers {
            self.assign_slots(viewer, roster, world);
        }
    }

    /// Maps a slot referenced by `viewer` back to a real id
    ///
    /// Slots inside the current table resolve there, lapsed ones included. A
    /// slot past its end falls back to the previous table, which covers
    /// entries moved down to close a gap.
    pub fn resolve_slot(&self, viewer: RealId, slot: Slot) -> Result<RealId, UnknownSlot> {
        let tables = &self.viewers[viewer.index()];
        let resolved = match tables.current.get(slot.index()) {
            Some(entry) => (entry.state != SlotState::Vacant).then_some(entry.real_id),
            None => tables.previous.get(slot.index()).copied().flatten(),
        };
        resolved.ok_or(UnknownSlot { viewer, slot })
    }

    /// Slot under which `viewer` currently sees `real`, if any
    pub fn visible_slot(&self, viewer: RealId, real: RealId) -> Option<Slot> {
        self.viewers[viewer.index()]
            .current
            .iter()
            .position(|e| e.real_id == real && e.is_shown())
            .map(|i| Slot(i as u8))
    }

    pub fn table(&self, viewer: RealId) -> &[SlotEntry] {
        &self.viewers[viewer.index()].current
    }

    /// Removes every trace of a torn-down participant
    ///
    /// Its slot in other viewers' tables becomes vacant and stops resolving;
    /// the next assignment round reuses or compacts it.
    pub fn forget(&mut self, id: RealId) {
        self.forget_viewer(id);

        for tables in &mut self.viewers {
            for entry in tables.current.iter_mut().filter(|e| e.real_id == id) {
                entry.state = SlotState::Vacant;
            }
            for entry in tables.previous.iter_mut() {
                if *entry == Some(id) {
                    *entry = None;
                }
            }
        }
    }

    fn forget_viewer(&mut self, id: RealId) {
        self.viewers[id.index()] = ViewerTables::default();
    }
}

fn trim_trailing_holes(slots: &mut Vec<Option<SlotEntry>>) {
    while matches!(slots.last(), Some(None)) {
        slots.pop();
    }
}
