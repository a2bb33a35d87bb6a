//! Session context
//!
//! [`Session`] owns every piece of session state: the roster, slot tables,
//! the vote engine, the frozen leaver list, mutes, bans and the world. It is
//! the only value handlers receive, and it is mutated from a single loop, so
//! nothing here locks or suspends.
//!
//! ## Tick order
//! 1. World step with buffered inputs
//! 2. Teardown of frozen leavers whose freeze resolved
//! 3. Timeout sweep
//! 4. Vote tick, then its side effects
//! 5. Expiry of moratorium, mute and ban entries
//! 6. Slot reassignment
//! 7. Per-viewer snapshots
//!
//! A kick enforced in step 4 is therefore gone from the snapshots of the
//! same tick.

use crate::client_manager::ClientManager;
use crate::commands::Authority;
use crate::config::SessionConfig;
use crate::fanout::{Audience, Delivery, DeliveryFlags, Fanout, Transport};
use crate::game::{GameState, WorldView};
use crate::ids::{RealId, Slot};
use crate::moratorium::Moratorium;
use crate::visibility::{sentinel_slot, RelevancePolicy, VisibilityMap};
use crate::vote::{VoteEngine, VoteTick};
use log::{debug, info, warn};
use shared::{
    truncate_utf8, InputState, Packet, ProtocolCapability, SnapPlayer, Team, MAX_CHAT_LENGTH,
    MAX_NAME_LENGTH,
};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const DEFAULT_VOTE_REASON: &str = "No reason given";

const VOTE_SPAM_SECS: u64 = 3;
const SET_TEAM_SPAM_SECS: u64 = 3;
const SET_SPECTATOR_SPAM_SECS: u64 = 3;
const CHAT_SPAM_SECS: u64 = 1;
const EMOTE_SPAM_SECS: u64 = 1;

/// Chat commands available to participants: (name, arguments, description)
const CHAT_COMMANDS: &[(&str, &str, &str)] = &[
    ("whisper", "<playername> <text>", "Whisper to a player in the server privately"),
    ("w", "<playername> <text>", "Whisper to a player in the server privately"),
    ("conversation", "<text>", "Whisper to the player, you whispered to last"),
    ("c", "<text>", "Whisper to the player, you whispered to last"),
    ("help", "<command>", "Show the description of a command"),
    ("cmdlist", "", "List all chat commands"),
    ("pause", "", "Does nothing, so the pause key gets no error reply"),
    ("spec", "", "Does nothing, so the spectate key gets no error reply"),
];

pub fn team_name(team: Team) -> &'static str {
    match team {
        Team::Red => "red team",
        Team::Blue => "blue team",
        Team::Spectators => "spectators",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanEntry {
    /// None for permanent bans
    pub expiry_tick: Option<u64>,
    pub reason: String,
}

pub struct Session<T: Transport> {
    pub(crate) config: SessionConfig,
    pub(crate) roster: ClientManager,
    pub(crate) visibility: VisibilityMap,
    pub(crate) votes: VoteEngine,
    pub(crate) moratorium: Moratorium,
    pub(crate) world: GameState,
    pub(crate) transport: T,
    pub(crate) mutes: HashMap<IpAddr, u64>,
    pub(crate) bans: HashMap<IpAddr, BanEntry>,
    /// Only moves to the spectators are allowed while set
    pub(crate) teams_locked: bool,
    pub(crate) tick: u64,
}

impl<T: Transport> Session<T> {
    pub fn new(config: SessionConfig, transport: T) -> Self {
        let tick_rate = config.tick_rate.max(1);
        let mut votes = VoteEngine::new(config.vote_duration_secs, tick_rate);
        for (description, command) in &config.vote_options {
            if let Err(e) = votes.add_option(description, command) {
                warn!("Skipping vote option '{}': {}", description, e);
            }
        }

        Self {
            roster: ClientManager::new(config.max_clients),
            visibility: VisibilityMap::default(),
            votes,
            moratorium: Moratorium::new(config.moratorium_capacity, tick_rate),
            world: GameState::new(),
            transport,
            mutes: HashMap::new(),
            bans: HashMap::new(),
            teams_locked: false,
            tick: 0,
            config,
        }
    }

    /// Replaces the relevance policy used for slot assignment
    pub fn with_policy(mut self, policy: Box<dyn RelevancePolicy>) -> Self {
        self.visibility = VisibilityMap::new(policy);
        self
    }

    pub fn now(&self) -> u64 {
        self.tick
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn roster(&self) -> &ClientManager {
        &self.roster
    }

    pub fn visibility(&self) -> &VisibilityMap {
        &self.visibility
    }

    pub fn votes(&self) -> &VoteEngine {
        &self.votes
    }

    pub fn teams_locked(&self) -> bool {
        self.teams_locked
    }

    pub fn world(&self) -> &GameState {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut GameState {
        &mut self.world
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn is_muted(&self, addr: SocketAddr) -> bool {
        self.mutes.get(&addr.ip()).is_some_and(|&expiry| expiry > self.tick)
    }

    pub fn is_banned(&self, addr: SocketAddr) -> bool {
        self.ban_for(addr.ip()).is_some()
    }

    pub(crate) fn fanout(&mut self) -> Fanout<'_, T> {
        Fanout::new(&self.roster, &self.visibility, &mut self.transport)
    }

    pub(crate) fn name_of(&self, id: RealId) -> String {
        self.roster.get(id).map(|p| p.name.clone()).unwrap_or_default()
    }

    fn ban_for(&self, ip: IpAddr) -> Option<&BanEntry> {
        self.bans
            .get(&ip)
            .filter(|ban| ban.expiry_tick.map_or(true, |expiry| expiry > self.tick))
    }

    /// Answers a connection attempt that never becomes a participant
    fn reject(&mut self, addr: SocketAddr, reason: String) {
        self.transport.deliver(Delivery {
            to: Some(addr),
            packet: Packet::Disconnected { reason },
            flags: DeliveryFlags::RELIABLE | DeliveryFlags::FLUSH,
        });
    }

    /// Dispatches one inbound packet
    pub fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        if let Packet::Connect { capability, name } = packet {
            self.handle_connect(addr, capability, &name);
            return;
        }

        let Some(id) = self.roster.find_client_by_addr(addr) else {
            debug!("Packet from unknown address {}", addr);
            return;
        };
        let now = self.tick;
        if let Some(participant) = self.roster.get_mut(id) {
            participant.last_seen = now;
        }

        match packet {
            Packet::Input {
                sequence,
                timestamp,
                left,
                right,
                jump,
            } => {
                let input = InputState {
                    sequence,
                    timestamp,
                    left,
                    right,
                    jump,
                };
                self.roster.add_input(id, input, now);
            }
            Packet::Say { team, message } => self.handle_say(id, team, &message),
            Packet::CallVote {
                kind,
                value,
                reason,
            } => self.handle_call_vote(id, &kind, &value, &reason),
            Packet::Vote { choice } => self.handle_vote(id, choice),
            Packet::SetTeam { team } => self.handle_set_team(id, team),
            Packet::SetSpectator { slot } => self.handle_set_spectator(id, slot),
            Packet::Emote { emoticon } => self.handle_emote(id, emoticon),
            Packet::Disconnect => self.handle_disconnect(id, "", false),
            _ => warn!("Unexpected packet type from participant {} at {}", id, addr),
        }
    }

    /// Admits a new participant unless banned, blocked or full
    pub fn handle_connect(&mut self, addr: SocketAddr, capability: ProtocolCapability, name: &str) {
        info!("Participant connecting from {} ({:?})", addr, capability);
        let now = self.tick;

        if let Some(existing) = self.roster.find_client_by_addr(addr) {
            info!("Replacing existing participant {} from {}", existing, addr);
            self.handle_disconnect(existing, "", false);
        }

        if let Some(ban) = self.ban_for(addr.ip()) {
            let reason = match ban.expiry_tick {
                Some(expiry) => format!(
                    "You have been banned for {} minutes ({})",
                    (expiry - now).div_ceil(self.config.ticks(60)).max(1),
                    ban.reason
                ),
                None => format!("You have been banned ({})", ban.reason),
            };
            info!("Rejected banned address {}", addr.ip());
            self.reject(addr, reason);
            return;
        }

        if let Some(seconds) = self.moratorium.remaining_seconds(addr, now) {
            info!("Rejected frozen leaver {} (still blocked, {}s left)", addr.ip(), seconds);
            self.reject(addr, format!("You left while frozen. Please wait {} seconds.", seconds));
            return;
        }

        let team = self.auto_team();
        let Some(id) = self.roster.add_client(addr, capability, name, team, now) else {
            self.reject(addr, "Server full".to_string());
            return;
        };

        self.world.add_avatar(id);
        self.visibility.assign_slots(id, &self.roster, &self.world);

        let motd = self.config.motd.clone();
        let options = self.votes.option_descriptions();
        let vote_set = self.votes.is_active().then(|| self.votes.vote_set_packet(now));
        let enter = format!("'{}' entered and joined the {}", self.name_of(id), team_name(team));

        let mut fanout = self.fanout();
        fanout.send_packet(
            id,
            Packet::Connected { capability },
            DeliveryFlags::RELIABLE | DeliveryFlags::FLUSH,
        );
        if !motd.is_empty() {
            fanout.send_packet(id, Packet::Motd { message: motd }, DeliveryFlags::RELIABLE);
        }
        fanout.send_vote_options(id, &options);
        if let Some(packet) = vote_set {
            fanout.send_packet(id, packet, DeliveryFlags::RELIABLE);
        }
        fanout.broadcast_text(&enter);
    }

    /// Picks the playing team with fewer members
    fn auto_team(&self) -> Team {
        let count = |team| self.roster.connected().filter(|p| p.team == team).count();
        if count(Team::Blue) < count(Team::Red) {
            Team::Blue
        } else {
            Team::Red
        }
    }

    /// Handles a participant going away
    ///
    /// Unless `force` is set, leaving with a frozen avatar keeps the
    /// participant around as a renamed frozen leaver and blocks its address.
    pub fn handle_disconnect(&mut self, id: RealId, reason: &str, force: bool) {
        let Some(participant) = self.roster.get(id) else {
            return;
        };

        if !force && (participant.lingering || self.world.is_frozen(id)) {
            if !participant.lingering {
                self.linger(id);
            }
            return;
        }

        self.teardown(id, reason);
    }

    fn linger(&mut self, id: RealId) {
        let now = self.tick;
        let Some(participant) = self.roster.get_mut(id) else {
            return;
        };

        let old_name = std::mem::replace(&mut participant.name, "noob".to_string());
        participant.lingering = true;
        let addr = participant.addr;
        info!("Participant {} '{}' left while frozen", id, old_name);

        self.fanout().broadcast_text(&format!("'{}' ragequit", old_name));

        if let Err(e) = self.moratorium.block(addr, self.config.moratorium_secs, now) {
            warn!("Could not block frozen leaver {}: {}", addr.ip(), e);
        }
    }

    /// Sends the participant away and tears it down
    pub fn kick(&mut self, id: RealId, reason: &str) {
        if let Some(participant) = self.roster.get(id).filter(|p| !p.lingering) {
            let addr = participant.addr;
            self.transport.deliver(Delivery {
                to: Some(addr),
                packet: Packet::Disconnected {
                    reason: reason.to_string(),
                },
                flags: DeliveryFlags::RELIABLE | DeliveryFlags::FLUSH,
            });
        }
        self.teardown(id, reason);
    }

    /// Removes every trace of a participant and frees its id
    pub(crate) fn teardown(&mut self, id: RealId, reason: &str) {
        if self.votes.abort_if_targets(id) {
            info!("Vote targeting participant {} aborted on disconnect", id);
        }
        self.votes.forget_creator(id);

        let Some(mut participant) = self.roster.remove_client(id) else {
            return;
        };
        participant.name = participant.original_name.clone();

        self.visibility.forget(id);
        self.world.remove_avatar(id);
        for other in self.roster.iter_mut() {
            if other.spectating == Some(id) {
                other.spectating = None;
            }
        }

        let leave = if reason.is_empty() {
            format!("'{}' has left the game", participant.name)
        } else {
            format!("'{}' has left the game ({})", participant.name, reason)
        };
        self.fanout().broadcast_text(&leave);
    }

    /// Advances the session by one tick
    pub fn tick(&mut self) {
        self.tick += 1;
        let now = self.tick;
        self.world.tick = now;

        self.step_world();
        self.release_frozen_leavers();
        self.check_timeouts(now);
        self.update_vote(now);
        self.expire_entries(now);
        self.visibility.refresh(&self.roster, &self.world);
        self.send_snapshots(now);
    }

    fn step_world(&mut self) {
        let dt = 1.0 / self.config.tick_rate.max(1) as f32;

        for (id, input) in self.roster.get_chronological_inputs() {
            self.world.apply_input(id, &input);
            self.roster.mark_input_processed(id, input.sequence);
        }
        self.roster.cleanup_processed_inputs();
        self.world.update_physics(dt);
    }

    fn release_frozen_leavers(&mut self) {
        let released: Vec<RealId> = self
            .roster
            .iter()
            .filter(|p| p.lingering && !self.world.is_frozen(p.id))
            .map(|p| p.id)
            .collect();

        for id in released {
            debug!("Frozen leaver {} released", id);
            self.teardown(id, "");
        }
    }

    fn check_timeouts(&mut self, now: u64) {
        let timeout = self.config.ticks(self.config.timeout_secs);
        for id in self.roster.check_timeouts(now, timeout) {
            info!("Participant {} timed out", id);
            self.handle_disconnect(id, "Timeout", false);
        }
    }

    fn update_vote(&mut self, now: u64) {
        match self.votes.tick(&mut self.roster, now) {
            VoteTick::Idle | VoteTick::Pending => {}
            VoteTick::Tally(tally) => {
                self.fanout()
                    .broadcast_packet(tally.to_packet(), DeliveryFlags::RELIABLE);
            }
            VoteTick::Passed { command, creator } => {
                if let Err(e) = self.execute_line(&command, Authority::Vote) {
                    warn!("Vote command '{}' failed: {}", command, e);
                }
                if let Some(creator) = creator.and_then(|id| self.roster.get_mut(id)) {
                    creator.last_vote_call = None;
                }
                self.end_vote("Vote passed");
            }
            VoteTick::Failed => self.end_vote("Vote failed"),
            VoteTick::Aborted => self.end_vote("Vote aborted"),
        }
    }

    fn end_vote(&mut self, message: &str) {
        let packet = self.votes.vote_set_packet(self.tick);
        let mut fanout = self.fanout();
        fanout.broadcast_packet(packet, DeliveryFlags::RELIABLE);
        fanout.broadcast_text(message);
    }

    fn expire_entries(&mut self, now: u64) {
        let expired = self.moratorium.expire_all(now);
        if expired > 0 {
            debug!("{} frozen leaver entries expired", expired);
        }
        self.mutes.retain(|_, expiry| *expiry > now);
        self.bans
            .retain(|_, ban| ban.expiry_tick.map_or(true, |expiry| expiry > now));
    }

    fn send_snapshots(&mut self, now: u64) {
        // Take timestamp as close to transmission as possible
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_millis();
        let timestamp = timestamp.min(u64::MAX as u128) as u64;

        let viewers: Vec<RealId> = self.roster.connected().map(|p| p.id).collect();
        for viewer in viewers {
            if let Some(packet) = self.snapshot_for(viewer, now, timestamp) {
                self.fanout().send_packet(viewer, packet, DeliveryFlags::NONE);
            }
        }
    }

    /// Builds `viewer`'s snapshot from its slot table
    ///
    /// The sentinel slot always carries a blank placeholder so clients have a
    /// name to show for out-of-view speakers.
    pub fn snapshot_for(&self, viewer: RealId, now: u64, timestamp: u64) -> Option<Packet> {
        let participant = self.roster.get(viewer)?;

        let mut players: Vec<SnapPlayer> = self
            .visibility
            .table(viewer)
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.is_shown())
            .filter_map(|(slot, entry)| {
                let shown = self.roster.get(entry.real_id)?;
                let (x, y) = self.world.position(entry.real_id).unwrap_or((0.0, 0.0));
                Some(SnapPlayer {
                    slot: slot as u8,
                    name: shown.name.clone(),
                    team: shown.team,
                    x,
                    y,
                    frozen: self.world.is_frozen(entry.real_id),
                })
            })
            .collect();

        players.push(SnapPlayer {
            slot: sentinel_slot(participant.capability).0,
            name: " ".to_string(),
            team: Team::Spectators,
            x: 0.0,
            y: 0.0,
            frozen: false,
        });

        Some(Packet::GameState {
            tick: now,
            timestamp,
            local_slot: self.visibility.visible_slot(viewer, viewer).map(|s| s.0),
            last_processed_input: participant.last_processed_input,
            players,
        })
    }

    /// True when `last` happened less than `seconds` ago and spam protection is on
    fn throttled(&self, last: Option<u64>, seconds: u64) -> bool {
        self.config.spam_protection
            && last.is_some_and(|t| t.saturating_add(self.config.ticks(seconds)) > self.tick)
    }

    fn handle_say(&mut self, id: RealId, team_chat: bool, message: &str) {
        let now = self.tick;
        let Some(participant) = self.roster.get(id) else {
            return;
        };
        if self.throttled(participant.last_chat, CHAT_SPAM_SECS) {
            return;
        }

        if let Some(&expiry) = self.mutes.get(&participant.ip()).filter(|&&e| e > now) {
            let remaining = (expiry - now) / self.config.tick_rate.max(1);
            self.fanout().send_chat_target(
                id,
                &format!("You may not chat now, you are muted for {} more second(s)", remaining),
            );
            return;
        }

        let team = participant.team;
        let text: String = message.chars().take(MAX_CHAT_LENGTH - 1).collect();
        let text = text.trim_end();
        if text.is_empty() {
            return;
        }

        if let Some(participant) = self.roster.get_mut(id) {
            participant.last_chat = Some(now);
        }

        if let Some(command) = text.strip_prefix('/') {
            self.handle_chat_command(id, command);
            return;
        }

        let audience = if team_chat {
            Audience::Team(team)
        } else {
            Audience::All
        };
        self.fanout().send_chat(Some(id), audience, text);
    }

    fn handle_chat_command(&mut self, id: RealId, line: &str) {
        let (command, args) = line.split_once(' ').unwrap_or((line, ""));
        let args = args.trim();

        match command {
            "w" | "whisper" => self.handle_whisper(id, args),
            "c" | "conversation" => self.handle_conversation(id, args),
            "help" => {
                let reply: Vec<String> = if args.is_empty() {
                    vec![
                        "Usage: /help <command>".to_string(),
                        "Use /cmdlist to view all commands".to_string(),
                    ]
                } else {
                    match CHAT_COMMANDS.iter().find(|(name, _, _)| *name == args) {
                        Some((name, _, description)) => vec![format!("[/{}] {}", name, description)],
                        None => vec![format!(
                            "Unknown command: '{}'. Use /cmdlist to view all commands.",
                            args
                        )],
                    }
                };
                let mut fanout = self.fanout();
                for line in reply {
                    fanout.send_chat_target(id, &line);
                }
            }
            "cmdlist" => {
                let list: Vec<String> = CHAT_COMMANDS
                    .iter()
                    .map(|(name, params, _)| format!("/{} {}", name, params).trim_end().to_string())
                    .collect();
                self.fanout()
                    .send_chat_target(id, &format!("Commands: {}", list.join(", ")));
            }
            "pause" | "spec" => {}
            _ => self.fanout().send_chat_target(id, "Server command not found"),
        }
    }

    fn handle_whisper(&mut self, id: RealId, args: &str) {
        if args.is_empty() {
            self.fanout()
                .send_chat_target(id, "[/whisper] usage: /w <playername> <text>");
            return;
        }

        let split = match args.strip_prefix('"') {
            Some(quoted) => quoted.split_once('"').ok_or("*** Missing closing quote."),
            None => args
                .split_once(' ')
                .ok_or("Player not found or message missing."),
        };
        let (name, rest) = match split {
            Ok(pair) => pair,
            Err(message) => {
                self.fanout().send_chat_target(id, message);
                return;
            }
        };

        let text = rest.trim_start();
        if text.is_empty() {
            self.fanout().send_chat_target(id, "No whisper text written.");
            return;
        }

        let name = truncate_utf8(name, MAX_NAME_LENGTH - 1);
        let Some(target) = self.roster.find_by_name_prefix(name) else {
            self.fanout()
                .send_chat_target(id, &format!("Player '{}' not found.", name));
            return;
        };

        self.fanout().send_whisper(id, target, text);
        let target_name = self.name_of(target);
        if let Some(participant) = self.roster.get_mut(id) {
            participant.whisper_partner = Some((target, target_name));
        }
    }

    fn handle_conversation(&mut self, id: RealId, text: &str) {
        if text.is_empty() {
            self.fanout().send_chat_target(
                id,
                "[/conversation] usage: /c <text>, after you already whispered to a player",
            );
            return;
        }

        let partner = self.roster.get(id).and_then(|p| p.whisper_partner.clone());
        match partner {
            None => self.fanout().send_chat_target(id, "No player whispered to yet."),
            Some((target, name)) => {
                let still_there = self
                    .roster
                    .connected()
                    .any(|p| p.id == target && p.name == name);
                if still_there {
                    self.fanout().send_whisper(id, target, text);
                } else {
                    self.fanout()
                        .send_chat_target(id, "Player left the game or renamed.");
                }
            }
        }
    }

    /// Validates and starts a participant's vote request
    ///
    /// Every rejection is a chat line to the requester, except the spam
    /// throttle which stays silent.
    fn handle_call_vote(&mut self, id: RealId, kind: &str, value: &str, reason: &str) {
        let now = self.tick;
        let Some(requester) = self.roster.get(id) else {
            return;
        };
        if self.throttled(requester.last_vote_try, VOTE_SPAM_SECS) {
            return;
        }
        let last_vote_call = requester.last_vote_call;
        let requester_name = requester.name.clone();
        if let Some(participant) = self.roster.get_mut(id) {
            participant.last_vote_try = Some(now);
        }

        if self.votes.is_active() {
            self.fanout()
                .send_chat_target(id, "Wait for current vote to end before calling a new one.");
            return;
        }

        if let Some(last) = last_vote_call {
            let ready_at =
                last.saturating_add(self.config.ticks(self.config.vote_call_cooldown_secs));
            if ready_at > now {
                let seconds = (ready_at - now) / self.config.tick_rate.max(1) + 1;
                self.fanout().send_chat_target(
                    id,
                    &format!("You must wait {} seconds before making another vote", seconds),
                );
                return;
            }
        }

        let reason = if reason.is_empty() {
            DEFAULT_VOTE_REASON
        } else {
            reason
        };

        let request = if kind.eq_ignore_ascii_case("option") {
            self.option_vote(&requester_name, value, reason)
        } else if kind.eq_ignore_ascii_case("kick") {
            self.kick_vote(id, &requester_name, value, reason)
        } else if kind.eq_ignore_ascii_case("spectate") {
            self.spectate_vote(id, &requester_name, value, reason)
        } else {
            debug!("Ignoring vote call of unknown type '{}' from {}", kind, id);
            return;
        };

        let (announcement, description, command) = match request {
            Ok(request) => request,
            Err(rejection) => {
                let mut fanout = self.fanout();
                fanout.send_chat_target(id, &rejection.to_requester);
                if let Some((target, text)) = rejection.to_target {
                    fanout.send_chat_target(target, &text);
                }
                return;
            }
        };

        self.fanout().broadcast_text(&announcement);
        if let Err(e) = self
            .votes
            .call_vote(&mut self.roster, now, Some(id), &description, &command, reason)
        {
            warn!("Could not start vote '{}': {}", description, e);
            return;
        }
        if let Err(e) = self.votes.cast_vote(&mut self.roster, id, 1) {
            debug!("Creator ballot not recorded: {}", e);
        }
        if let Some(participant) = self.roster.get_mut(id) {
            participant.last_vote_call = Some(now);
        }

        let packet = self.votes.vote_set_packet(now);
        self.fanout().broadcast_packet(packet, DeliveryFlags::RELIABLE);
    }

    fn option_vote(&self, requester: &str, value: &str, reason: &str) -> Result<VoteRequest, Rejection> {
        let option = self
            .votes
            .find_option(value)
            .ok_or_else(|| Rejection::new(format!("'{}' isn't an option on this server", value)))?;

        Ok((
            format!(
                "'{}' called vote to change server option '{}' ({})",
                requester, option.description, reason
            ),
            option.description.clone(),
            option.command.clone(),
        ))
    }

    fn kick_vote(&self, id: RealId, requester: &str, value: &str, reason: &str) -> Result<VoteRequest, Rejection> {
        if !self.config.vote_kick {
            return Err(Rejection::new("Server does not allow voting to kick players"));
        }

        let min = self.config.vote_kick_min;
        if min > 0 && self.roster.player_count() < min {
            return Err(Rejection::new(format!(
                "Kick voting requires {} players on the server",
                min
            )));
        }

        let target = self
            .resolve_target(id, value)
            .ok_or_else(|| Rejection::new("Invalid client id to kick"))?;
        if target.id == id {
            return Err(Rejection::new("You can't kick yourself"));
        }
        if target.authed {
            return Err(Rejection {
                to_requester: "You can't kick admins".to_string(),
                to_target: Some((
                    target.id,
                    format!("'{}' called for vote to kick you", requester),
                )),
            });
        }

        let command = if self.config.vote_kick_bantime == 0 {
            format!("kick {} Kicked by vote", target.id)
        } else {
            format!(
                "ban {} {} Banned by vote",
                target.ip(),
                self.config.vote_kick_bantime
            )
        };

        Ok((
            format!(
                "'{}' called for vote to kick '{}' ({})",
                requester, target.name, reason
            ),
            format!("Kick '{}'", target.name),
            command,
        ))
    }

    fn spectate_vote(&self, id: RealId, requester: &str, value: &str, reason: &str) -> Result<VoteRequest, Rejection> {
        if !self.config.vote_spectate {
            return Err(Rejection::new(
                "Server does not allow voting to move players to spectators",
            ));
        }

        let target = self
            .resolve_target(id, value)
            .filter(|p| p.team != Team::Spectators)
            .ok_or_else(|| Rejection::new("Invalid client id to move"))?;
        if target.id == id {
            return Err(Rejection::new("You can't move yourself"));
        }

        Ok((
            format!(
                "'{}' called for vote to move '{}' to spectators ({})",
                requester, target.name, reason
            ),
            format!("move '{}' to spectators", target.name),
            format!(
                "set_team {} -1 {}",
                target.id, self.config.vote_spectate_rejoin_delay
            ),
        ))
    }

    /// Resolves a slot number sent by `viewer` to a live participant
    fn resolve_target(&self, viewer: RealId, value: &str) -> Option<&crate::client_manager::Participant> {
        let slot = value.trim().parse::<u8>().ok()?;
        let real = self.visibility.resolve_slot(viewer, Slot(slot)).ok()?;
        self.roster.get(real).filter(|p| !p.lingering)
    }

    fn handle_vote(&mut self, id: RealId, choice: i8) {
        if let Err(e) = self.votes.cast_vote(&mut self.roster, id, choice) {
            debug!("Ignoring ballot from {}: {}", id, e);
        }
    }

    fn handle_set_team(&mut self, id: RealId, team: Team) {
        let now = self.tick;
        let Some(participant) = self.roster.get(id) else {
            return;
        };
        if self.world.is_frozen(id)
            || participant.team == team
            || self.throttled(participant.last_set_team, SET_TEAM_SPAM_SECS)
        {
            return;
        }
        let locked_until = participant.team_locked_until;

        if team != Team::Spectators && self.teams_locked {
            if let Some(participant) = self.roster.get_mut(id) {
                participant.last_set_team = Some(now);
            }
            self.fanout().send_packet(
                id,
                Packet::Broadcast {
                    message: "Teams are locked".to_string(),
                },
                DeliveryFlags::RELIABLE,
            );
            return;
        }

        if locked_until > now {
            let left = (locked_until - now) / self.config.tick_rate.max(1);
            if let Some(participant) = self.roster.get_mut(id) {
                participant.last_set_team = Some(now);
            }
            let message = format!(
                "Time to wait before changing team: {:02}:{:02}",
                left / 60,
                left % 60
            );
            self.fanout()
                .send_packet(id, Packet::Broadcast { message }, DeliveryFlags::RELIABLE);
            return;
        }

        if let Some(participant) = self.roster.get_mut(id) {
            participant.last_set_team = Some(now);
        }
        self.set_team(id, team);
    }

    /// Moves a participant to `team` and announces it
    pub(crate) fn set_team(&mut self, id: RealId, team: Team) {
        if self.move_to_team(id, team) {
            let name = self.name_of(id);
            self.fanout()
                .broadcast_text(&format!("'{}' joined the {}", name, team_name(team)));
        }
    }

    /// Moves a participant to `team` without a notice; false when nothing changed
    pub(crate) fn move_to_team(&mut self, id: RealId, team: Team) -> bool {
        let Some(participant) = self.roster.get_mut(id) else {
            return false;
        };
        if participant.team == team {
            return false;
        }
        participant.team = team;
        participant.spectating = None;

        if team == Team::Spectators {
            for other in self.roster.iter_mut() {
                if other.spectating == Some(id) {
                    other.spectating = None;
                }
            }
        }

        info!("Participant {} joined the {}", id, team_name(team));
        true
    }

    fn handle_set_spectator(&mut self, id: RealId, slot: Option<u8>) {
        let now = self.tick;
        let Some(participant) = self.roster.get(id) else {
            return;
        };
        if participant.team != Team::Spectators
            || self.throttled(participant.last_set_spectator, SET_SPECTATOR_SPAM_SECS)
        {
            return;
        }

        let target = match slot {
            None => None,
            Some(slot) => match self.visibility.resolve_slot(id, Slot(slot)) {
                Ok(real) if real == id => return,
                Ok(real)
                    if self
                        .roster
                        .get(real)
                        .is_some_and(|p| p.team != Team::Spectators) =>
                {
                    Some(real)
                }
                _ => {
                    if let Some(participant) = self.roster.get_mut(id) {
                        participant.last_set_spectator = Some(now);
                    }
                    self.fanout().send_chat_target(id, "Invalid spectator id used");
                    return;
                }
            },
        };

        if let Some(participant) = self.roster.get_mut(id) {
            participant.last_set_spectator = Some(now);
            participant.spectating = target;
        }
    }

    fn handle_emote(&mut self, id: RealId, emoticon: u8) {
        let now = self.tick;
        let Some(participant) = self.roster.get(id) else {
            return;
        };
        if self.throttled(participant.last_emote, EMOTE_SPAM_SECS) {
            return;
        }
        if let Some(participant) = self.roster.get_mut(id) {
            participant.last_emote = Some(now);
        }
        self.fanout().send_emoticon(id, emoticon);
    }
}

/// (announcement, description, command) of an accepted vote call
type VoteRequest = (String, String, String);

/// A refused vote call
struct Rejection {
    to_requester: String,
    to_target: Option<(RealId, String)>,
}

impl Rejection {
    fn new(message: impl Into<String>) -> Self {
        Self {
            to_requester: message.into(),
            to_target: None,
        }
    }
}
