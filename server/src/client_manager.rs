//! Participant roster for the session server
//!
//! This module owns every connected participant and the per-connection state the
//! session layer needs:
//! - Real id allocation from a fixed arena (lowest free id first)
//! - Protocol capability, display name and team
//! - Ballots and the rate-limit timestamps consulted by vote and chat handling
//! - Input buffering in sequence order for the world collaborator
//!
//! Ids are only handed out again once the previous holder has been removed,
//! which is what keeps slot tables and vote commands referring to the right
//! person.

use crate::ids::RealId;
use crate::vote::Ballot;
use log::info;
use shared::{truncate_utf8, InputState, ProtocolCapability, Team, MAX_NAME_LENGTH, MAX_PARTICIPANTS};
use std::net::{IpAddr, SocketAddr};

/// One connected session
///
/// Each participant maintains:
/// - Connection metadata (id, address, capability, last activity)
/// - Identity shown to others (name, team)
/// - Vote state (ballot and its submission sequence)
/// - Timestamps used for rate limiting, all in server ticks
/// - Buffered inputs waiting for the next world step
#[derive(Debug)]
pub struct Participant {
    /// Real identifier assigned by the server
    pub id: RealId,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Identity ceiling of the client's wire format
    pub capability: ProtocolCapability,
    /// Name shown to everyone else
    pub name: String,
    /// Name the participant joined with, restored before the leave notice
    pub original_name: String,
    pub team: Team,
    /// Privileged participants cannot be vote-kicked
    pub authed: bool,
    /// Left while frozen; kept until the world resolves the freeze
    pub lingering: bool,
    pub ballot: Ballot,
    pub ballot_seq: u32,
    /// Last tick we received any packet from this participant
    pub last_seen: u64,
    pub last_vote_try: Option<u64>,
    pub last_vote_call: Option<u64>,
    pub last_chat: Option<u64>,
    pub last_set_team: Option<u64>,
    pub last_emote: Option<u64>,
    pub last_set_spectator: Option<u64>,
    /// Team changes are refused before this tick
    pub team_locked_until: u64,
    /// Participant being followed while on the spectator team
    pub spectating: Option<RealId>,
    /// Last whisper target, with the name it had at the time
    pub whisper_partner: Option<(RealId, String)>,
    /// Highest input sequence number we've processed
    pub last_processed_input: u32,
    /// Buffered inputs waiting to be processed
    pub pending_inputs: Vec<InputState>,
}

impl Participant {
    /// Creates a participant that joined at tick `now`
    ///
    /// The name is clamped to what legacy clients can display; an empty name
    /// falls back to a placeholder so chat prefixes never collapse to ": ".
    pub fn new(
        id: RealId,
        addr: SocketAddr,
        capability: ProtocolCapability,
        name: &str,
        team: Team,
        now: u64,
    ) -> Self {
        let name = sanitize_name(name);
        Self {
            id,
            addr,
            capability,
            original_name: name.clone(),
            name,
            team,
            authed: false,
            lingering: false,
            ballot: Ballot::None,
            ballot_seq: 0,
            last_seen: now,
            last_vote_try: None,
            last_vote_call: None,
            last_chat: None,
            last_set_team: None,
            last_emote: None,
            last_set_spectator: None,
            team_locked_until: 0,
            spectating: None,
            whisper_partner: None,
            last_processed_input: 0,
            pending_inputs: Vec::new(),
        }
    }

    /// Address used for per-address bookkeeping (votes, moratorium, mutes)
    pub fn ip(&self) -> IpAddr {
        self.addr.ip()
    }

    /// Adds a new input to the pending queue
    ///
    /// Inputs are kept sorted by sequence so they are applied in order even
    /// if packets arrive out of order.
    pub fn add_input(&mut self, input: InputState, now: u64) {
        self.last_seen = now;
        self.pending_inputs.push(input);
        self.pending_inputs.sort_by_key(|i| i.sequence);
    }

    /// Returns true if nothing was received within `timeout_ticks`
    pub fn is_timed_out(&self, now: u64, timeout_ticks: u64) -> bool {
        now.saturating_sub(self.last_seen) > timeout_ticks
    }
}

/// Clamps a requested display name to the legacy name budget
pub fn sanitize_name(name: &str) -> String {
    let trimmed = truncate_utf8(name.trim(), MAX_NAME_LENGTH - 1);
    if trimmed.is_empty() {
        "nameless tee".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Arena of participants indexed by [`RealId`]
///
/// The ClientManager enforces the server's capacity, hands out the lowest
/// free id to new connections and gives the session layer ordered access to
/// everyone connected. Lingering frozen leavers stay in the arena (their id
/// is still taken) but are excluded from address lookups.
pub struct ClientManager {
    /// Participants indexed by real id
    participants: Vec<Option<Participant>>,
    /// Maximum number of concurrent participants allowed
    max_clients: usize,
}

impl ClientManager {
    /// Creates an empty roster; capacity is clamped to the identifier space
    pub fn new(max_clients: usize) -> Self {
        Self {
            participants: (0..MAX_PARTICIPANTS).map(|_| None).collect(),
            max_clients: max_clients.min(MAX_PARTICIPANTS),
        }
    }

    /// Attempts to add a new participant
    ///
    /// Returns the assigned id, or None if the server is at capacity.
    pub fn add_client(
        &mut self,
        addr: SocketAddr,
        capability: ProtocolCapability,
        name: &str,
        team: Team,
        now: u64,
    ) -> Option<RealId> {
        if self.len() >= self.max_clients {
            return None;
        }

        let id = RealId::all().find(|id| self.participants[id.index()].is_none())?;
        let participant = Participant::new(id, addr, capability, name, team, now);
        info!(
            "Participant {} '{}' connected from {} ({:?})",
            id, participant.name, addr, capability
        );
        self.participants[id.index()] = Some(participant);

        Some(id)
    }

    /// Removes a participant, freeing its id for reuse
    pub fn remove_client(&mut self, id: RealId) -> Option<Participant> {
        let removed = self.participants[id.index()].take();
        if let Some(participant) = &removed {
            info!("Participant {} '{}' removed", id, participant.name);
        }
        removed
    }

    pub fn get(&self, id: RealId) -> Option<&Participant> {
        self.participants[id.index()].as_ref()
    }

    pub fn get_mut(&mut self, id: RealId) -> Option<&mut Participant> {
        self.participants[id.index()].as_mut()
    }

    pub fn contains(&self, id: RealId) -> bool {
        self.participants[id.index()].is_some()
    }

    /// Finds the live participant connected from `addr`
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<RealId> {
        self.connected().find(|p| p.addr == addr).map(|p| p.id)
    }

    /// Finds the best name match, preferring the longest matching name
    ///
    /// A participant matches when their whole name is a prefix of `query`,
    /// which lets "/w name message" work with names that contain spaces.
    pub fn find_by_name_prefix(&self, query: &str) -> Option<RealId> {
        self.connected()
            .filter(|p| query.starts_with(p.name.as_str()))
            .max_by_key(|p| p.name.len())
            .map(|p| p.id)
    }

    /// All participants in ascending id order, lingering ones included
    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Participant> {
        self.participants.iter_mut().flatten()
    }

    /// Participants with a live connection, in ascending id order
    pub fn connected(&self) -> impl Iterator<Item = &Participant> {
        self.iter().filter(|p| !p.lingering)
    }

    /// Number of connected participants not on the spectator team
    pub fn player_count(&self) -> usize {
        self.connected()
            .filter(|p| p.team != Team::Spectators)
            .count()
    }

    /// Adds an input to a participant's pending queue
    ///
    /// Returns false if the id is unknown.
    pub fn add_input(&mut self, id: RealId, input: InputState, now: u64) -> bool {
        if let Some(participant) = self.get_mut(id) {
            participant.add_input(input, now);
            true
        } else {
            false
        }
    }

    /// Gets all unprocessed inputs sorted chronologically
    ///
    /// Inputs from every participant are merged and ordered by client
    /// timestamp so the world applies them deterministically.
    pub fn get_chronological_inputs(&self) -> Vec<(RealId, InputState)> {
        let mut all_inputs: Vec<(RealId, InputState)> = self
            .iter()
            .flat_map(|p| {
                p.pending_inputs
                    .iter()
                    .filter(move |input| input.sequence > p.last_processed_input)
                    .map(move |input| (p.id, input.clone()))
            })
            .collect();

        all_inputs.sort_by_key(|(_, input)| input.timestamp);
        all_inputs
    }

    /// Marks an input sequence as processed for a participant
    pub fn mark_input_processed(&mut self, id: RealId, sequence: u32) {
        if let Some(participant) = self.get_mut(id) {
            participant.last_processed_input = participant.last_processed_input.max(sequence);
        }
    }

    /// Drops inputs that have already been applied to the world
    pub fn cleanup_processed_inputs(&mut self) {
        for participant in self.iter_mut() {
            let last = participant.last_processed_input;
            participant.pending_inputs.retain(|input| input.sequence > last);
        }
    }

    /// Returns live participants that have been silent for too long
    ///
    /// Teardown is left to the caller so it can run the full disconnect path.
    pub fn check_timeouts(&self, now: u64, timeout_ticks: u64) -> Vec<RealId> {
        self.connected()
            .filter(|p| p.is_timed_out(now, timeout_ticks))
            .map(|p| p.id)
            .collect()
    }

    /// Clears every recorded ballot
    pub fn reset_ballots(&mut self) {
        for participant in self.iter_mut() {
            participant.ballot = Ballot::None;
            participant.ballot_seq = 0;
        }
    }

    /// Returns the number of participants occupying an id
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    fn input(sequence: u32, timestamp: u64) -> InputState {
        InputState {
            sequence,
            timestamp,
            left: false,
            right: true,
            jump: false,
        }
    }

    fn add(manager: &mut ClientManager, addr: SocketAddr, name: &str) -> RealId {
        manager
            .add_client(addr, ProtocolCapability::Extended, name, Team::Red, 0)
            .unwrap()
    }

    #[test]
    fn test_participant_creation() {
        let id = RealId::new(3).unwrap();
        let participant = Participant::new(
            id,
            test_addr(),
            ProtocolCapability::Legacy,
            "tee",
            Team::Blue,
            7,
        );

        assert_eq!(participant.id, id);
        assert_eq!(participant.name, "tee");
        assert_eq!(participant.original_name, "tee");
        assert_eq!(participant.ballot, Ballot::None);
        assert_eq!(participant.last_seen, 7);
        assert!(participant.pending_inputs.is_empty());
    }

    #[test]
    fn test_name_is_clamped() {
        assert_eq!(sanitize_name("a_very_long_player_name"), "a_very_long_pla");
        assert_eq!(sanitize_name("   "), "nameless tee");
    }

    #[test]
    fn test_participant_add_input_orders_by_sequence() {
        let mut participant = Participant::new(
            RealId::new(0).unwrap(),
            test_addr(),
            ProtocolCapability::Extended,
            "a",
            Team::Red,
            0,
        );

        participant.add_input(input(2, 100), 5);
        participant.add_input(input(1, 50), 6);

        assert_eq!(participant.pending_inputs[0].sequence, 1);
        assert_eq!(participant.pending_inputs[1].sequence, 2);
        assert_eq!(participant.last_seen, 6);
    }

    #[test]
    fn test_participant_timeout() {
        let participant = Participant::new(
            RealId::new(0).unwrap(),
            test_addr(),
            ProtocolCapability::Extended,
            "a",
            Team::Red,
            10,
        );

        assert!(!participant.is_timed_out(20, 10));
        assert!(participant.is_timed_out(21, 10));
    }

    #[test]
    fn test_lowest_free_id_is_reused_after_removal() {
        let mut manager = ClientManager::new(4);
        let a = add(&mut manager, test_addr(), "a");
        let b = add(&mut manager, test_addr2(), "b");
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);

        assert!(manager.remove_client(a).is_some());
        let c = add(&mut manager, "10.0.0.1:1".parse().unwrap(), "c");
        assert_eq!(c.index(), 0);
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = ClientManager::new(1);
        assert!(manager
            .add_client(test_addr(), ProtocolCapability::Legacy, "a", Team::Red, 0)
            .is_some());
        assert!(manager
            .add_client(test_addr2(), ProtocolCapability::Legacy, "b", Team::Red, 0)
            .is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_capacity_clamped_to_identifier_space() {
        let mut manager = ClientManager::new(1000);
        for port in 0..MAX_PARTICIPANTS as u16 {
            let addr = SocketAddr::from(([10, 0, 0, 1], port + 1));
            assert!(manager
                .add_client(addr, ProtocolCapability::Extended, "x", Team::Red, 0)
                .is_some());
        }
        let addr = SocketAddr::from(([10, 0, 0, 2], 1));
        assert!(manager
            .add_client(addr, ProtocolCapability::Extended, "x", Team::Red, 0)
            .is_none());
    }

    #[test]
    fn test_find_client_by_addr_skips_lingering() {
        let mut manager = ClientManager::new(4);
        let a = add(&mut manager, test_addr(), "a");
        assert_eq!(manager.find_client_by_addr(test_addr()), Some(a));

        manager.get_mut(a).unwrap().lingering = true;
        assert_eq!(manager.find_client_by_addr(test_addr()), None);
        assert_eq!(manager.connected().count(), 0);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_find_by_name_prefix_prefers_longest() {
        let mut manager = ClientManager::new(4);
        let _short = add(&mut manager, test_addr(), "bob");
        let long = add(&mut manager, test_addr2(), "bob the tee");

        assert_eq!(manager.find_by_name_prefix("bob the tee hello"), Some(long));
        assert_eq!(manager.find_by_name_prefix("alice hi"), None);
    }

    #[test]
    fn test_player_count_excludes_spectators() {
        let mut manager = ClientManager::new(4);
        add(&mut manager, test_addr(), "a");
        manager
            .add_client(test_addr2(), ProtocolCapability::Legacy, "b", Team::Spectators, 0)
            .unwrap();
        assert_eq!(manager.player_count(), 1);
    }

    #[test]
    fn test_get_chronological_inputs() {
        let mut manager = ClientManager::new(3);
        let a = add(&mut manager, test_addr(), "a");
        let b = add(&mut manager, test_addr2(), "b");

        manager.add_input(a, input(1, 100), 1);
        manager.add_input(b, input(1, 50), 1);
        manager.add_input(a, input(2, 200), 1);

        let inputs = manager.get_chronological_inputs();
        assert_eq!(inputs.len(), 3);
        assert_eq!(inputs[0].1.timestamp, 50);
        assert_eq!(inputs[1].1.timestamp, 100);
        assert_eq!(inputs[2].1.timestamp, 200);

        manager.mark_input_processed(a, 2);
        manager.mark_input_processed(b, 1);
        manager.cleanup_processed_inputs();
        assert!(manager.get_chronological_inputs().is_empty());
    }

    #[test]
    fn test_check_timeouts_reports_without_removing() {
        let mut manager = ClientManager::new(3);
        let a = add(&mut manager, test_addr(), "a");

        assert!(manager.check_timeouts(5, 10).is_empty());
        assert_eq!(manager.check_timeouts(20, 10), vec![a]);
        assert!(manager.contains(a));
    }

    #[test]
    fn test_reset_ballots() {
        let mut manager = ClientManager::new(3);
        let a = add(&mut manager, test_addr(), "a");
        {
            let p = manager.get_mut(a).unwrap();
            p.ballot = Ballot::Yes;
            p.ballot_seq = 4;
        }
        manager.reset_ballots();
        let p = manager.get(a).unwrap();
        assert_eq!(p.ballot, Ballot::None);
        assert_eq!(p.ballot_seq, 0);
    }
}
