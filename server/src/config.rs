//! Session configuration
//!
//! Defines the tunables of the session layer and their defaults. The server
//! binary fills this in from command-line arguments.

use shared::MAX_PARTICIPANTS;

/// Configuration for one session server
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Simulation ticks per second; every timer is converted with this
    pub tick_rate: u64,

    /// Maximum number of concurrent participants
    pub max_clients: usize,

    /// Seconds of silence before a participant is dropped
    pub timeout_secs: u64,

    /// How long a vote stays open
    pub vote_duration_secs: u64,

    /// Allow participants to call kick votes
    pub vote_kick: bool,

    /// Players (non-spectators) required before kick votes are allowed
    pub vote_kick_min: usize,

    /// Minutes a vote-kicked address is banned; 0 kicks without a ban
    pub vote_kick_bantime: u64,

    /// Allow participants to call votes moving someone to the spectators
    pub vote_spectate: bool,

    /// Minutes a vote-moved participant must wait before rejoining a team
    pub vote_spectate_rejoin_delay: u64,

    /// Minimum seconds between a participant's vote calls
    pub vote_call_cooldown_secs: u64,

    /// Rate limits on chat, vote calls, team changes and emoticons
    pub spam_protection: bool,

    /// Seconds a frozen leaver's address stays blocked
    pub moratorium_secs: u64,

    /// Entries the frozen leaver list can hold
    pub moratorium_capacity: usize,

    /// Message of the day sent on connect; empty sends nothing
    pub motd: String,

    /// Vote options available from the start, as (description, command)
    pub vote_options: Vec<(String, String)>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_rate: 50,
            max_clients: MAX_PARTICIPANTS,
            timeout_secs: 5,
            vote_duration_secs: 25,
            vote_kick: true,
            vote_kick_min: 0,
            vote_kick_bantime: 0,
            vote_spectate: true,
            vote_spectate_rejoin_delay: 3,
            vote_call_cooldown_secs: 60,
            spam_protection: true,
            moratorium_secs: 30,
            moratorium_capacity: 16,
            motd: String::new(),
            vote_options: Vec::new(),
        }
    }
}

impl SessionConfig {
    pub fn with_tick_rate(mut self, tick_rate: u64) -> Self {
        self.tick_rate = tick_rate;
        self
    }

    pub fn with_max_clients(mut self, max: usize) -> Self {
        self.max_clients = max;
        self
    }

    /// Adds an initial vote option
    pub fn with_vote_option(mut self, description: impl Into<String>, command: impl Into<String>) -> Self {
        self.vote_options.push((description.into(), command.into()));
        self
    }

    /// Converts seconds into ticks at the configured rate
    pub fn ticks(&self, seconds: u64) -> u64 {
        seconds.saturating_mul(self.tick_rate)
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// Returns a message naming the first invalid value
    pub fn validate(&self) -> Result<(), String> {
        if self.tick_rate == 0 {
            return Err("tick_rate must be greater than 0".to_string());
        }

        if self.max_clients == 0 || self.max_clients > MAX_PARTICIPANTS {
            return Err(format!("max_clients must be between 1 and {}", MAX_PARTICIPANTS));
        }

        if self.timeout_secs == 0 {
            return Err("timeout_secs must be greater than 0".to_string());
        }

        if self.vote_duration_secs == 0 {
            return Err("vote_duration_secs must be greater than 0".to_string());
        }

        if self.moratorium_capacity == 0 {
            return Err("moratorium_capacity must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Parses a `description=command` vote option argument
pub fn parse_vote_option(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((description, command)) if !description.trim().is_empty() && !command.trim().is_empty() => {
            Ok((description.trim().to_string(), command.trim().to_string()))
        }
        _ => Err(format!("expected \"description=command\", got \"{}\"", arg)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.vote_duration_secs, 25);
        assert_eq!(config.moratorium_secs, 30);
        assert_eq!(config.moratorium_capacity, 16);
        assert_eq!(config.ticks(2), 100);
        assert_eq!(config.ticks(u64::MAX), u64::MAX);
    }

    #[test]
    fn test_invalid_values() {
        assert!(SessionConfig::default().with_tick_rate(0).validate().is_err());
        assert!(SessionConfig::default().with_max_clients(0).validate().is_err());
        assert!(SessionConfig::default().with_max_clients(65).validate().is_err());
    }

    #[test]
    fn test_parse_vote_option() {
        assert_eq!(
            parse_vote_option("Restart round = restart").unwrap(),
            ("Restart round".to_string(), "restart".to_string())
        );
        assert_eq!(
            parse_vote_option("say=say a=b").unwrap(),
            ("say".to_string(), "say a=b".to_string())
        );
        assert!(parse_vote_option("no separator").is_err());
        assert!(parse_vote_option("=restart").is_err());
    }

    #[test]
    fn test_with_vote_option() {
        let config = SessionConfig::default().with_vote_option("Restart", "restart");
        assert_eq!(config.vote_options.len(), 1);
    }
}
