//! Vote consensus engine
//!
//! At most one vote runs at a time. A vote moves through
//! `Idle -> Active -> {Passed, Failed, Aborted} -> Idle`, and every terminal
//! state clears the session again.
//!
//! ## Tally
//! Ballots live on the participants. Each tick the engine counts them with
//! address deduplication: participants sharing an address count once toward
//! the total, and only the earliest ballot cast from that address counts.
//! Spectators never count.
//!
//! ## Majority
//! `yes >= total / 2 + 1` passes the vote and `no >= (total + 1) / 2` fails
//! it. Anything in between stays open until the deadline.
//!
//! The engine never executes anything itself. [`VoteEngine::tick`] reports
//! what happened and the session layer carries out the effects.

use crate::client_manager::ClientManager;
use crate::ids::RealId;
use log::{debug, info, warn};
use shared::{
    truncate_utf8, Packet, Team, MAX_VOTE_OPTIONS, VOTE_CMD_LENGTH, VOTE_DESC_LENGTH,
    VOTE_REASON_LENGTH,
};
use std::collections::HashMap;
use std::net::IpAddr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VoteError {
    #[error("a vote is already running")]
    AlreadyActive,
    #[error("no vote is running")]
    NoActiveVote,
    #[error("vote option table is full ({capacity} entries)")]
    OptionTableFull { capacity: usize },
    #[error("vote option description must be 1 to {max} bytes")]
    InvalidDescription { max: usize },
    #[error("vote option command must be 1 to {max} bytes")]
    InvalidCommand { max: usize },
    #[error("option '{0}' already exists")]
    DuplicateOption(String),
    #[error("option '{0}' does not exist")]
    UnknownOption(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ballot {
    #[default]
    None,
    Yes,
    No,
}

impl Ballot {
    /// Maps a wire choice (`1`, `-1`, `0`) to a ballot
    pub fn from_choice(choice: i8) -> Self {
        match choice.signum() {
            1 => Ballot::Yes,
            -1 => Ballot::No,
            _ => Ballot::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Enforcement {
    #[default]
    Undecided,
    ForceYes,
    ForceNo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VoteTally {
    pub total: u32,
    pub yes: u32,
    pub no: u32,
}

impl VoteTally {
    /// Voters that have not decided yet
    pub fn pass(&self) -> u32 {
        self.total.saturating_sub(self.yes + self.no)
    }

    pub fn decision(&self) -> Enforcement {
        if self.yes >= self.total / 2 + 1 {
            Enforcement::ForceYes
        } else if self.no >= (self.total + 1) / 2 {
            Enforcement::ForceNo
        } else {
            Enforcement::Undecided
        }
    }

    pub fn to_packet(self) -> Packet {
        Packet::VoteStatus {
            total: self.total,
            yes: self.yes,
            no: self.no,
            pass: self.pass(),
        }
    }
}

/// The running vote
#[derive(Debug, Clone)]
pub struct VoteSession {
    pub deadline: u64,
    pub aborted: bool,
    pub description: String,
    pub command: String,
    pub reason: String,
    /// None when started from the console
    pub creator: Option<RealId>,
    pub enforcement: Enforcement,
    pub last_tally: Option<VoteTally>,
}

/// What a call to [`VoteEngine::tick`] observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteTick {
    Idle,
    /// Running, tally unchanged since the last report
    Pending,
    Tally(VoteTally),
    Passed {
        command: String,
        creator: Option<RealId>,
    },
    Failed,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OptionHandle(u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteOption {
    pub handle: OptionHandle,
    pub description: String,
    pub command: String,
}

pub struct VoteEngine {
    session: Option<VoteSession>,
    options: Vec<VoteOption>,
    next_handle: u32,
    next_seq: u32,
    duration_ticks: u64,
    tick_speed: u64,
}

impl VoteEngine {
    pub fn new(duration_seconds: u64, tick_speed: u64) -> Self {
        let tick_speed = tick_speed.max(1);
        Self {
            session: None,
            options: Vec::new(),
            next_handle: 0,
            next_seq: 0,
            duration_ticks: duration_seconds.saturating_mul(tick_speed),
            tick_speed,
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&VoteSession> {
        self.session.as_ref()
    }

    /// Starts a vote
    ///
    /// Fields are clamped to their wire bounds and every ballot is reset.
    /// Nothing changes if a vote is already running.
    pub fn call_vote(
        &mut self,
        roster: &mut ClientManager,
        now: u64,
        creator: Option<RealId>,
        description: &str,
        command: &str,
        reason: &str,
    ) -> Result<(), VoteError> {
        if self.session.is_some() {
            return Err(VoteError::AlreadyActive);
        }

        roster.reset_ballots();
        self.next_seq = 0;
        self.session = Some(VoteSession {
            deadline: now.saturating_add(self.duration_ticks),
            aborted: false,
            description: truncate_utf8(description, VOTE_DESC_LENGTH - 1).to_string(),
            command: truncate_utf8(command, VOTE_CMD_LENGTH - 1).to_string(),
            reason: truncate_utf8(reason, VOTE_REASON_LENGTH - 1).to_string(),
            creator,
            enforcement: Enforcement::Undecided,
            last_tally: None,
        });

        info!("Vote started: '{}' ({})", description, command);
        Ok(())
    }

    /// Records a ballot; the first ballot a participant casts is final
    pub fn cast_vote(
        &mut self,
        roster: &mut ClientManager,
        voter: RealId,
        choice: i8,
    ) -> Result<(), VoteError> {
        if self.session.is_none() {
            return Err(VoteError::NoActiveVote);
        }

        let ballot = Ballot::from_choice(choice);
        if ballot == Ballot::None {
            return Ok(());
        }

        if let Some(participant) = roster.get_mut(voter) {
            if participant.ballot == Ballot::None {
                self.next_seq += 1;
                participant.ballot = ballot;
                participant.ballot_seq = self.next_seq;
                debug!("Participant {} voted {:?}", voter, ballot);
            }
        }
        Ok(())
    }

    /// Counts ballots with one voice per address
    pub fn tally(&self, roster: &ClientManager) -> VoteTally {
        let mut by_address: HashMap<IpAddr, Option<(u32, Ballot)>> = HashMap::new();

        for participant in roster
            .connected()
            .filter(|p| p.team != Team::Spectators)
        {
            let earliest = by_address.entry(participant.ip()).or_insert(None);
            if participant.ballot == Ballot::None {
                continue;
            }
            match earliest {
                Some((seq, _)) if *seq <= participant.ballot_seq => {}
                _ => *earliest = Some((participant.ballot_seq, participant.ballot)),
            }
        }

        let mut tally = VoteTally {
            total: by_address.len() as u32,
            ..VoteTally::default()
        };
        for (_, ballot) in by_address.values().flatten() {
            match ballot {
                Ballot::Yes => tally.yes += 1,
                Ballot::No => tally.no += 1,
                Ballot::None => {}
            }
        }
        tally
    }

    /// Advances the running vote by one tick
    pub fn tick(&mut self, roster: &mut ClientManager, now: u64) -> VoteTick {
        let Some(session) = self.session.as_ref() else {
            return VoteTick::Idle;
        };

        if session.aborted {
            info!("Vote aborted: '{}'", session.description);
            self.close(roster);
            return VoteTick::Aborted;
        }

        let tally = self.tally(roster);
        let mut enforcement = session.enforcement;
        if enforcement == Enforcement::Undecided {
            enforcement = tally.decision();
        }

        let Some(session) = self.session.as_mut() else {
            return VoteTick::Idle;
        };

        match enforcement {
            Enforcement::ForceYes => {
                let command = session.command.clone();
                let creator = session.creator;
                info!("Vote passed: '{}'", session.description);
                self.close(roster);
                VoteTick::Passed { command, creator }
            }
            Enforcement::ForceNo => {
                info!("Vote failed: '{}'", session.description);
                self.close(roster);
                VoteTick::Failed
            }
            Enforcement::Undecided if now > session.deadline => {
                info!("Vote timed out: '{}'", session.description);
                self.close(roster);
                VoteTick::Failed
            }
            Enforcement::Undecided => {
                if session.last_tally == Some(tally) {
                    VoteTick::Pending
                } else {
                    session.last_tally = Some(tally);
                    VoteTick::Tally(tally)
                }
            }
        }
    }

    /// Forces the running vote to close as aborted on the next tick
    pub fn abort(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.aborted = true;
        }
    }

    /// Decides the running vote regardless of ballots
    pub fn force(&mut self, enforcement: Enforcement) -> Result<(), VoteError> {
        let session = self.session.as_mut().ok_or(VoteError::NoActiveVote)?;
        session.enforcement = enforcement;
        Ok(())
    }

    /// Aborts the running vote if its command targets `id`
    ///
    /// Covers `kick <id> ...` and `set_team <id> ...`. Returns true when the
    /// vote was aborted.
    pub fn abort_if_targets(&mut self, id: RealId) -> bool {
        let targets = self.session.as_ref().is_some_and(|session| {
            let mut words = session.command.split_whitespace();
            matches!(words.next(), Some("kick") | Some("set_team"))
                && words.next().and_then(|w| w.parse::<usize>().ok()) == Some(id.index())
        });

        if targets {
            debug!("Aborting vote targeting participant {}", id);
            self.abort();
        }
        targets
    }

    /// Drops the creator of the running vote if it was `id`
    ///
    /// Ids are reused after teardown, so a departed creator must not be
    /// credited once the vote passes.
    pub fn forget_creator(&mut self, id: RealId) {
        if let Some(session) = self.session.as_mut().filter(|s| s.creator == Some(id)) {
            session.creator = None;
        }
    }

    /// Vote state as shown to clients; empty when idle
    pub fn vote_set_packet(&self, now: u64) -> Packet {
        match &self.session {
            Some(session) if !session.aborted => Packet::VoteSet {
                timeout_seconds: session
                    .deadline
                    .saturating_sub(now)
                    .div_ceil(self.tick_speed) as u32,
                description: session.description.clone(),
                reason: session.reason.clone(),
            },
            _ => Packet::VoteSet {
                timeout_seconds: 0,
                description: String::new(),
                reason: String::new(),
            },
        }
    }

    fn close(&mut self, roster: &mut ClientManager) {
        self.session = None;
        roster.reset_ballots();
    }

    pub fn add_option(&mut self, description: &str, command: &str) -> Result<OptionHandle, VoteError> {
        if self.options.len() >= MAX_VOTE_OPTIONS {
            warn!("Vote option table full, '{}' not added", description);
            return Err(VoteError::OptionTableFull {
                capacity: MAX_VOTE_OPTIONS,
            });
        }
        if description.is_empty() || description.len() >= VOTE_DESC_LENGTH {
            return Err(VoteError::InvalidDescription {
                max: VOTE_DESC_LENGTH - 1,
            });
        }
        if command.is_empty() || command.len() >= VOTE_CMD_LENGTH {
            return Err(VoteError::InvalidCommand {
                max: VOTE_CMD_LENGTH - 1,
            });
        }
        if self.find_option(description).is_some() {
            return Err(VoteError::DuplicateOption(description.to_string()));
        }

        let handle = OptionHandle(self.next_handle);
        self.next_handle += 1;
        self.options.push(VoteOption {
            handle,
            description: description.to_string(),
            command: command.to_string(),
        });
        info!("Added vote option '{}' ({})", description, command);
        Ok(handle)
    }

    pub fn remove_option(&mut self, description: &str) -> Result<VoteOption, VoteError> {
        let index = self
            .options
            .iter()
            .position(|o| o.description.eq_ignore_ascii_case(description))
            .ok_or_else(|| VoteError::UnknownOption(description.to_string()))?;

        let removed = self.options.remove(index);
        info!("Removed vote option '{}'", removed.description);
        Ok(removed)
    }

    pub fn clear_options(&mut self) {
        self.options.clear();
    }

    /// Case-insensitive lookup by description
    pub fn find_option(&self, description: &str) -> Option<&VoteOption> {
        self.options
            .iter()
            .find(|o| o.description.eq_ignore_ascii_case(description))
    }

    pub fn option(&self, handle: OptionHandle) -> Option<&VoteOption> {
        self.options.iter().find(|o| o.handle == handle)
    }

    pub fn options(&self) -> &[VoteOption] {
        &self.options
    }

    pub fn option_descriptions(&self) -> Vec<String> {
        self.options.iter().map(|o| o.description.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::ProtocolCapability;
    use std::net::SocketAddr;

    const TICK_SPEED: u64 = 50;

    fn id(n: usize) -> RealId {
        RealId::new(n).unwrap()
    }

    /// Roster where participant `n` connects from address `ips[n]`
    fn roster_from(ips: &[u8]) -> ClientManager {
        let mut roster = ClientManager::new(64);
        for (n, ip) in ips.iter().enumerate() {
            let addr = SocketAddr::from(([10, 0, 0, *ip], 9000 + n as u16));
            roster
                .add_client(addr, ProtocolCapability::Extended, "p", Team::Red, 0)
                .unwrap();
        }
        roster
    }

    fn distinct(count: u8) -> ClientManager {
        roster_from(&(1..=count).collect::<Vec<_>>())
    }

    fn start(engine: &mut VoteEngine, roster: &mut ClientManager) {
        engine
            .call_vote(roster, 0, Some(id(0)), "Kick 'p'", "kick 3 Kicked by vote", "afk")
            .unwrap();
    }

    #[test]
    fn test_single_active_vote() {
        let mut roster = distinct(3);
        let mut engine = VoteEngine::new(25, TICK_SPEED);
        start(&mut engine, &mut roster);
        engine.cast_vote(&mut roster, id(1), 1).unwrap();

        let result = engine.call_vote(&mut roster, 10, Some(id(2)), "other", "say hi", "");
        assert_eq!(result, Err(VoteError::AlreadyActive));

        let session = engine.session().unwrap();
        assert_eq!(session.description, "Kick 'p'");
        assert_eq!(session.creator, Some(id(0)));
        assert_eq!(session.deadline, 25 * TICK_SPEED);
        assert_eq!(roster.get(id(1)).unwrap().ballot, Ballot::Yes);
    }

    #[test]
    fn test_cast_without_vote() {
        let mut roster = distinct(1);
        let mut engine = VoteEngine::new(25, TICK_SPEED);
        assert_eq!(engine.cast_vote(&mut roster, id(0), 1), Err(VoteError::NoActiveVote));
    }

    #[test]
    fn test_first_ballot_wins_and_zero_is_ignored() {
        let mut roster = distinct(2);
        let mut engine = VoteEngine::new(25, TICK_SPEED);
        start(&mut engine, &mut roster);

        engine.cast_vote(&mut roster, id(1), 0).unwrap();
        assert_eq!(roster.get(id(1)).unwrap().ballot, Ballot::None);

        engine.cast_vote(&mut roster, id(1), -1).unwrap();
        engine.cast_vote(&mut roster, id(1), 1).unwrap();
        assert_eq!(roster.get(id(1)).unwrap().ballot, Ballot::No);
        assert_eq!(roster.get(id(1)).unwrap().ballot_seq, 1);
    }

    #[test]
    fn test_dedup_by_address_uses_earliest_ballot() {
        // 0 and 1 share an address, 2 is alone
        let mut roster = roster_from(&[1, 1, 2]);
        let mut engine = VoteEngine::new(25, TICK_SPEED);
        start(&mut engine, &mut roster);

        engine.cast_vote(&mut roster, id(1), 1).unwrap();
        let tally = engine.tally(&roster);
        assert_eq!(tally, VoteTally { total: 2, yes: 1, no: 0 });

        // A later ballot from the shared address does not override
        engine.cast_vote(&mut roster, id(0), -1).unwrap();
        let tally = engine.tally(&roster);
        assert_eq!(tally, VoteTally { total: 2, yes: 1, no: 0 });
        assert_eq!(tally.pass(), 1);
    }

    #[test]
    fn test_spectators_do_not_count() {
        let mut roster = distinct(3);
        roster.get_mut(id(2)).unwrap().team = Team::Spectators;
        let mut engine = VoteEngine::new(25, TICK_SPEED);
        start(&mut engine, &mut roster);
        engine.cast_vote(&mut roster, id(2), 1).unwrap();

        assert_eq!(engine.tally(&roster), VoteTally { total: 2, yes: 0, no: 0 });
    }

    #[test]
    fn test_majority_yes() {
        let mut roster = distinct(7);
        let mut engine = VoteEngine::new(25, TICK_SPEED);
        start(&mut engine, &mut roster);
        for n in 0..4 {
            engine.cast_vote(&mut roster, id(n), 1).unwrap();
        }

        assert_eq!(
            engine.tick(&mut roster, 1),
            VoteTick::Passed {
                command: "kick 3 Kicked by vote".to_string(),
                creator: Some(id(0)),
            }
        );
        assert!(!engine.is_active());
        assert!(roster.iter().all(|p| p.ballot == Ballot::None));
    }

    #[test]
    fn test_majority_no() {
        let mut roster = distinct(7);
        let mut engine = VoteEngine::new(25, TICK_SPEED);
        start(&mut engine, &mut roster);
        for n in 0..4 {
            engine.cast_vote(&mut roster, id(n), -1).unwrap();
        }

        assert_eq!(engine.tick(&mut roster, 1), VoteTick::Failed);
        assert!(!engine.is_active());
    }

    #[test]
    fn test_split_vote_stays_open_until_deadline() {
        let mut roster = distinct(7);
        let mut engine = VoteEngine::new(25, TICK_SPEED);
        start(&mut engine, &mut roster);
        for n in 0..3 {
            engine.cast_vote(&mut roster, id(n), 1).unwrap();
            engine.cast_vote(&mut roster, id(n + 3), -1).unwrap();
        }

        let expected = VoteTally { total: 7, yes: 3, no: 3 };
        assert_eq!(engine.tick(&mut roster, 1), VoteTick::Tally(expected));
        assert_eq!(engine.tick(&mut roster, 2), VoteTick::Pending);
        assert_eq!(engine.tick(&mut roster, 25 * TICK_SPEED), VoteTick::Pending);
        assert_eq!(engine.tick(&mut roster, 25 * TICK_SPEED + 1), VoteTick::Failed);
        assert_eq!(engine.tick(&mut roster, 25 * TICK_SPEED + 2), VoteTick::Idle);
    }

    #[test]
    fn test_threshold_arithmetic() {
        assert_eq!(VoteTally { total: 7, yes: 4, no: 0 }.decision(), Enforcement::ForceYes);
        assert_eq!(VoteTally { total: 7, yes: 0, no: 4 }.decision(), Enforcement::ForceNo);
        assert_eq!(VoteTally { total: 7, yes: 3, no: 3 }.decision(), Enforcement::Undecided);
        assert_eq!(VoteTally { total: 2, yes: 1, no: 0 }.decision(), Enforcement::Undecided);
        assert_eq!(VoteTally { total: 2, yes: 0, no: 1 }.decision(), Enforcement::ForceNo);
        assert_eq!(VoteTally { total: 0, yes: 0, no: 0 }.decision(), Enforcement::ForceNo);
    }

    #[test]
    fn test_idempotent_abort() {
        let mut roster = distinct(3);
        let mut engine = VoteEngine::new(25, TICK_SPEED);
        start(&mut engine, &mut roster);

        engine.abort();
        engine.abort();
        let outcomes = [engine.tick(&mut roster, 1), engine.tick(&mut roster, 2)];
        let aborted = outcomes.iter().filter(|t| **t == VoteTick::Aborted).count();
        assert_eq!(aborted, 1);
        assert_eq!(outcomes[1], VoteTick::Idle);
    }

    #[test]
    fn test_abort_if_targets() {
        let mut roster = distinct(4);
        let mut engine = VoteEngine::new(25, TICK_SPEED);
        start(&mut engine, &mut roster);

        assert!(!engine.abort_if_targets(id(2)));
        assert!(!engine.abort_if_targets(id(31)));
        assert!(engine.abort_if_targets(id(3)));
        assert_eq!(engine.tick(&mut roster, 1), VoteTick::Aborted);

        engine
            .call_vote(&mut roster, 2, None, "move", "set_team 2 -1 0", "")
            .unwrap();
        assert!(engine.abort_if_targets(id(2)));
    }

    #[test]
    fn test_force_overrides_tally() {
        let mut roster = distinct(7);
        let mut engine = VoteEngine::new(25, TICK_SPEED);
        start(&mut engine, &mut roster);
        engine.force(Enforcement::ForceYes).unwrap();
        assert!(matches!(engine.tick(&mut roster, 1), VoteTick::Passed { .. }));

        assert_eq!(engine.force(Enforcement::ForceNo), Err(VoteError::NoActiveVote));
    }

    #[test]
    fn test_departed_creator_is_not_credited() {
        let mut roster = distinct(4);
        let mut engine = VoteEngine::new(25, TICK_SPEED);
        start(&mut engine, &mut roster);

        engine.forget_creator(id(1));
        assert_eq!(engine.session().unwrap().creator, Some(id(0)));

        engine.forget_creator(id(0));
        engine.force(Enforcement::ForceYes).unwrap();
        assert_eq!(
            engine.tick(&mut roster, 1),
            VoteTick::Passed {
                command: "kick 3 Kicked by vote".to_string(),
                creator: None,
            }
        );
    }

    #[test]
    fn test_fields_are_clamped() {
        let mut roster = distinct(1);
        let mut engine = VoteEngine::new(25, TICK_SPEED);
        let long = "r".repeat(100);
        engine
            .call_vote(&mut roster, 0, None, &long, "say hi", &long)
            .unwrap();

        let session = engine.session().unwrap();
        assert_eq!(session.description.len(), VOTE_DESC_LENGTH - 1);
        assert_eq!(session.reason.len(), VOTE_REASON_LENGTH - 1);
    }

    #[test]
    fn test_vote_set_packet() {
        let mut roster = distinct(1);
        let mut engine = VoteEngine::new(25, TICK_SPEED);

        match engine.vote_set_packet(0) {
            Packet::VoteSet {
                timeout_seconds,
                description,
                ..
            } => {
                assert_eq!(timeout_seconds, 0);
                assert!(description.is_empty());
            }
            _ => panic!("Expected vote set"),
        }

        start(&mut engine, &mut roster);
        match engine.vote_set_packet(5 * TICK_SPEED) {
            Packet::VoteSet {
                timeout_seconds,
                reason,
                ..
            } => {
                assert_eq!(timeout_seconds, 20);
                assert_eq!(reason, "afk");
            }
            _ => panic!("Expected vote set"),
        }
    }

    #[test]
    fn test_option_table() {
        let mut engine = VoteEngine::new(25, TICK_SPEED);
        let handle = engine.add_option("Restart", "restart").unwrap();

        assert_eq!(engine.find_option("restart").unwrap().handle, handle);
        assert_eq!(
            engine.add_option("RESTART", "restart"),
            Err(VoteError::DuplicateOption("RESTART".to_string()))
        );
        assert!(matches!(
            engine.add_option("", "x"),
            Err(VoteError::InvalidDescription { .. })
        ));
        assert!(matches!(
            engine.add_option("ok", ""),
            Err(VoteError::InvalidCommand { .. })
        ));

        let second = engine.add_option("Next map", "change_map next").unwrap();
        assert_ne!(handle, second);
        assert_eq!(engine.option_descriptions(), vec!["Restart", "Next map"]);

        engine.remove_option("restart").unwrap();
        assert!(engine.option(handle).is_none());
        assert_eq!(engine.option(second).unwrap().command, "change_map next");
        assert_eq!(
            engine.remove_option("restart"),
            Err(VoteError::UnknownOption("restart".to_string()))
        );

        engine.clear_options();
        assert!(engine.options().is_empty());
    }

    #[test]
    fn test_option_table_full() {
        let mut engine = VoteEngine::new(25, TICK_SPEED);
        for n in 0..MAX_VOTE_OPTIONS {
            engine.add_option(&format!("option {}", n), "say hi").unwrap();
        }
        assert_eq!(
            engine.add_option("one more", "say hi"),
            Err(VoteError::OptionTableFull {
                capacity: MAX_VOTE_OPTIONS
            })
        );
    }
}
