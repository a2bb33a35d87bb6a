//! Command lines executed by the console and by passed votes
//!
//! Vote options and vote-kick/spectate requests store plain command lines
//! such as `kick 3 Kicked by vote`. They run through the same interpreter
//! as the operator console, tagged with the [`Authority`] that issued them.

use crate::fanout::{DeliveryFlags, Transport};
use crate::game::WorldView;
use crate::ids::RealId;
use crate::session::{team_name, BanEntry, Session, DEFAULT_VOTE_REASON};
use crate::vote::{Enforcement, VoteError};
use log::{debug, info};
use rand::seq::SliceRandom;
use shared::{Packet, Team};
use std::net::IpAddr;
use thiserror::Error;

/// Who issued a command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    Console,
    Vote,
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}'")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("invalid client id '{0}'")]
    InvalidClient(String),
    #[error("invalid address '{0}'")]
    InvalidAddress(String),
    #[error(transparent)]
    Vote(#[from] VoteError),
}

/// Splits a command line into arguments
///
/// Double quotes group words and `\` escapes the next character inside
/// quotes.
pub fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            '\\' if in_quotes => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    tokens.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }

    if has_token {
        tokens.push(current);
    }
    tokens
}

fn team_from_arg(arg: &str) -> Option<Team> {
    match arg.parse::<i32>().ok()? {
        -1 => Some(Team::Spectators),
        0 => Some(Team::Red),
        1 => Some(Team::Blue),
        _ => None,
    }
}

fn rest(args: &[String], from: usize) -> String {
    args.get(from..).map(|words| words.join(" ")).unwrap_or_default()
}

impl<T: Transport> Session<T> {
    /// Runs one command line
    pub fn execute_line(&mut self, line: &str, authority: Authority) -> Result<(), CommandError> {
        let tokens = tokenize(line);
        let Some((command, args)) = tokens.split_first() else {
            return Err(CommandError::Empty);
        };
        debug!("{:?} executing '{}'", authority, line);

        match command.as_str() {
            "kick" => self.con_kick(args, authority),
            "ban" => self.con_ban(args, authority),
            "set_team" => self.con_set_team(args),
            "set_team_all" => {
                let team = args
                    .first()
                    .and_then(|a| team_from_arg(a))
                    .ok_or(CommandError::Usage("set_team_all <-1|0|1>"))?;
                self.fanout().broadcast_text(&format!(
                    "All players were moved to the {}",
                    team_name(team)
                ));
                for id in self.participant_ids() {
                    self.move_to_team(id, team);
                }
                Ok(())
            }
            "swap_teams" => {
                self.fanout().broadcast_text("Teams were swapped");
                for id in self.participant_ids() {
                    let swapped = match self.roster.get(id).map(|p| p.team) {
                        Some(Team::Red) => Team::Blue,
                        Some(Team::Blue) => Team::Red,
                        _ => continue,
                    };
                    self.move_to_team(id, swapped);
                }
                Ok(())
            }
            "shuffle_teams" => {
                self.fanout().broadcast_text("Teams were shuffled");
                self.shuffle_teams();
                Ok(())
            }
            "lock_teams" => {
                self.teams_locked = !self.teams_locked;
                let message = if self.teams_locked {
                    "Teams were locked"
                } else {
                    "Teams were unlocked"
                };
                self.fanout().broadcast_text(message);
                Ok(())
            }
            "say" => {
                let text = rest(args, 0);
                self.fanout().broadcast_text(&text);
                Ok(())
            }
            "broadcast" => {
                let message = rest(args, 0);
                self.fanout()
                    .broadcast_packet(Packet::Broadcast { message }, DeliveryFlags::RELIABLE);
                Ok(())
            }
            "add_vote" => self.con_add_vote(args),
            "remove_vote" => self.con_remove_vote(args),
            "clear_votes" => {
                self.votes.clear_options();
                self.fanout()
                    .broadcast_packet(Packet::VoteClearOptions, DeliveryFlags::RELIABLE);
                Ok(())
            }
            "force_vote" => self.con_force_vote(args),
            "vote" => self.con_vote(args),
            "abort_vote" => {
                if !self.votes.is_active() {
                    return Err(VoteError::NoActiveVote.into());
                }
                self.votes.abort();
                Ok(())
            }
            "mute" => self.con_mute(args),
            "unmute" => self.con_unmute(args),
            "auth" => {
                let id = self.client_arg(args.first())?;
                if let Some(participant) = self.roster.get_mut(id) {
                    participant.authed = true;
                }
                info!("Participant {} authenticated", id);
                Ok(())
            }
            "freeze" => {
                let id = self.client_arg(args.first())?;
                let seconds = args
                    .get(1)
                    .and_then(|a| a.parse::<u64>().ok())
                    .ok_or(CommandError::Usage("freeze <id> <seconds>"))?;
                let ticks = u32::try_from(self.config.ticks(seconds)).unwrap_or(u32::MAX);
                self.world.freeze(id, ticks);
                Ok(())
            }
            "status" => {
                for p in self.roster.iter() {
                    info!(
                        "id={} addr={} name='{}' team={} lingering={} frozen={}",
                        p.id,
                        p.addr,
                        p.name,
                        team_name(p.team),
                        p.lingering,
                        self.world.is_frozen(p.id)
                    );
                }
                Ok(())
            }
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }

    fn participant_ids(&self) -> Vec<RealId> {
        self.roster.iter().map(|p| p.id).collect()
    }

    /// Deals the playing participants into two teams at random
    ///
    /// The red team gets the extra member when the count is odd.
    fn shuffle_teams(&mut self) {
        let mut playing: Vec<RealId> = self
            .roster
            .iter()
            .filter(|p| p.team != Team::Spectators)
            .map(|p| p.id)
            .collect();
        playing.shuffle(&mut rand::thread_rng());

        let red = playing.len().div_ceil(2);
        for (n, id) in playing.into_iter().enumerate() {
            let team = if n < red { Team::Red } else { Team::Blue };
            self.move_to_team(id, team);
        }
    }

    fn client_arg(&self, arg: Option<&String>) -> Result<RealId, CommandError> {
        let arg = arg.ok_or(CommandError::Usage("<id> required"))?;
        arg.parse::<usize>()
            .ok()
            .and_then(RealId::new)
            .filter(|&id| self.roster.contains(id))
            .ok_or_else(|| CommandError::InvalidClient(arg.clone()))
    }

    fn con_kick(&mut self, args: &[String], authority: Authority) -> Result<(), CommandError> {
        let id = self.client_arg(args.first())?;
        let mut reason = rest(args, 1);
        if reason.is_empty() {
            reason = match authority {
                Authority::Console => "Kicked by console".to_string(),
                Authority::Vote => "Kicked by vote".to_string(),
            };
        }

        info!("Kicking participant {} ({})", id, reason);
        self.kick(id, &reason);
        Ok(())
    }

    /// `ban <ip|id> <minutes> [reason]`; 0 minutes bans permanently
    fn con_ban(&mut self, args: &[String], authority: Authority) -> Result<(), CommandError> {
        let target = args.first().ok_or(CommandError::Usage("ban <ip|id> <minutes> [reason]"))?;
        let ip = match target.parse::<IpAddr>() {
            Ok(ip) => ip,
            Err(_) => {
                let id = self
                    .client_arg(Some(target))
                    .map_err(|_| CommandError::InvalidAddress(target.clone()))?;
                self.roster
                    .get(id)
                    .map(|p| p.ip())
                    .ok_or_else(|| CommandError::InvalidAddress(target.clone()))?
            }
        };
        let minutes = args
            .get(1)
            .and_then(|a| a.parse::<u64>().ok())
            .ok_or(CommandError::Usage("ban <ip|id> <minutes> [reason]"))?;
        let mut reason = rest(args, 2);
        if reason.is_empty() {
            reason = match authority {
                Authority::Console => DEFAULT_VOTE_REASON.to_string(),
                Authority::Vote => "Banned by vote".to_string(),
            };
        }

        let expiry_tick = (minutes > 0)
            .then(|| self.tick.saturating_add(self.config.ticks(minutes.saturating_mul(60))));
        self.bans.insert(
            ip,
            BanEntry {
                expiry_tick,
                reason: reason.clone(),
            },
        );
        info!("Banned {} for {} minutes ({})", ip, minutes, reason);

        let kick_reason = if minutes > 0 {
            format!("You have been banned for {} minutes ({})", minutes, reason)
        } else {
            format!("You have been banned ({})", reason)
        };
        let targets: Vec<RealId> = self
            .roster
            .iter()
            .filter(|p| p.ip() == ip)
            .map(|p| p.id)
            .collect();
        for id in targets {
            self.kick(id, &kick_reason);
        }
        Ok(())
    }

    /// `set_team <id> <-1|0|1> [lock minutes]`
    fn con_set_team(&mut self, args: &[String]) -> Result<(), CommandError> {
        let id = self.client_arg(args.first())?;
        let team = args
            .get(1)
            .and_then(|a| team_from_arg(a))
            .ok_or(CommandError::Usage("set_team <id> <-1|0|1> [minutes]"))?;
        let delay = args.get(2).and_then(|a| a.parse::<u64>().ok()).unwrap_or(0);

        let locked_until = self
            .tick
            .saturating_add(self.config.ticks(delay.saturating_mul(60)));
        if let Some(participant) = self.roster.get_mut(id) {
            participant.team_locked_until = locked_until;
        }
        self.set_team(id, team);
        Ok(())
    }

    /// `add_vote <description> <command>`
    fn con_add_vote(&mut self, args: &[String]) -> Result<(), CommandError> {
        let (Some(description), Some(command)) = (args.first(), args.get(1)) else {
            return Err(CommandError::Usage("add_vote <description> <command>"));
        };

        self.votes.add_option(description, command)?;
        self.fanout().broadcast_packet(
            Packet::VoteOptionAdd {
                description: description.clone(),
            },
            DeliveryFlags::RELIABLE,
        );
        Ok(())
    }

    fn con_remove_vote(&mut self, args: &[String]) -> Result<(), CommandError> {
        let description = args
            .first()
            .ok_or(CommandError::Usage("remove_vote <description>"))?;

        let removed = self.votes.remove_option(description)?;
        self.fanout().broadcast_packet(
            Packet::VoteOptionRemove {
                description: removed.description,
            },
            DeliveryFlags::RELIABLE,
        );
        Ok(())
    }

    /// `force_vote <option|kick|spectate> <value> [reason]`
    ///
    /// Carries out what the vote would have done without calling one. Kick
    /// and spectate take a real id.
    fn con_force_vote(&mut self, args: &[String]) -> Result<(), CommandError> {
        const USAGE: &str = "force_vote <option|kick|spectate> <value> [reason]";
        let (Some(kind), Some(value)) = (args.first(), args.get(1)) else {
            return Err(CommandError::Usage(USAGE));
        };
        let mut reason = rest(args, 2);
        if reason.is_empty() {
            reason = DEFAULT_VOTE_REASON.to_string();
        }

        if kind.eq_ignore_ascii_case("option") {
            let option = self
                .votes
                .find_option(value)
                .cloned()
                .ok_or_else(|| VoteError::UnknownOption(value.clone()))?;
            self.fanout().broadcast_text(&format!(
                "admin forced server option '{}' ({})",
                option.description, reason
            ));
            self.execute_line(&option.command, Authority::Console)
        } else if kind.eq_ignore_ascii_case("kick") {
            let id = self.client_arg(Some(value))?;
            let command = if self.config.vote_kick_bantime == 0 {
                format!("kick {} Forced kick", id)
            } else {
                let ip = self.roster.get(id).map(|p| p.ip());
                let ip = ip.ok_or_else(|| CommandError::InvalidClient(value.clone()))?;
                format!("ban {} {} Forced ban", ip, self.config.vote_kick_bantime)
            };
            self.execute_line(&command, Authority::Console)
        } else if kind.eq_ignore_ascii_case("spectate") {
            let id = self.client_arg(Some(value))?;
            let name = self.name_of(id);
            self.fanout()
                .broadcast_text(&format!("admin moved '{}' to spectator ({})", name, reason));
            let command = format!(
                "set_team {} -1 {}",
                id, self.config.vote_spectate_rejoin_delay
            );
            self.execute_line(&command, Authority::Console)
        } else {
            Err(CommandError::Usage(USAGE))
        }
    }

    /// `vote <yes|no>` decides the running vote
    fn con_vote(&mut self, args: &[String]) -> Result<(), CommandError> {
        let (enforcement, word) = match args.first().map(String::as_str) {
            Some(word) if word.eq_ignore_ascii_case("yes") => (Enforcement::ForceYes, "yes"),
            Some(word) if word.eq_ignore_ascii_case("no") => (Enforcement::ForceNo, "no"),
            _ => return Err(CommandError::Usage("vote <yes|no>")),
        };

        self.votes.force(enforcement)?;
        self.fanout()
            .broadcast_text(&format!("admin forced vote {}", word));
        Ok(())
    }

    /// `mute <id> <seconds>`; muting is tracked per address
    fn con_mute(&mut self, args: &[String]) -> Result<(), CommandError> {
        let id = self.client_arg(args.first())?;
        let seconds = args
            .get(1)
            .and_then(|a| a.parse::<u64>().ok())
            .filter(|&s| s > 0)
            .ok_or(CommandError::Usage("mute <id> <seconds>"))?;

        let (ip, name) = match self.roster.get(id) {
            Some(p) => (p.ip(), p.name.clone()),
            None => return Err(CommandError::InvalidClient(id.to_string())),
        };
        let expiry = self.tick.saturating_add(self.config.ticks(seconds));
        self.mutes.insert(ip, expiry);

        self.fanout().broadcast_text(&format!(
            "'{}' has been muted for {} seconds.",
            name, seconds
        ));
        Ok(())
    }

    fn con_unmute(&mut self, args: &[String]) -> Result<(), CommandError> {
        let id = self.client_arg(args.first())?;
        let (ip, name) = match self.roster.get(id) {
            Some(p) => (p.ip(), p.name.clone()),
            None => return Err(CommandError::InvalidClient(id.to_string())),
        };

        if self.mutes.remove(&ip).is_some() {
            self.fanout()
                .broadcast_text(&format!("'{}' has been unmuted", name));
        } else {
            info!("Participant {} is not muted", id);
        }
        Ok(())
    }
}
