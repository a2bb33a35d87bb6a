//! Wire protocol shared between the session server and its clients.
//!
//! Everything that crosses the socket lives here: the [`Packet`] enum (encoded
//! with bincode), the two protocol capabilities and the limits that come with
//! them, and the small records embedded in snapshots.

use serde::{Deserialize, Serialize};

pub const GRAVITY: f32 = 980.0;
pub const PLAYER_SPEED: f32 = 300.0;
pub const JUMP_VELOCITY: f32 = -400.0;
pub const FLOOR_Y: f32 = 550.0;
pub const WORLD_WIDTH: f32 = 800.0;
pub const PLAYER_SIZE: f32 = 32.0;

/// Upper bound on concurrently connected participants, independent of protocol.
pub const MAX_PARTICIPANTS: usize = 64;
/// Identity ceiling of a legacy client.
pub const LEGACY_VISIBLE_SLOTS: usize = 16;
/// Identity ceiling of an extended client.
pub const EXTENDED_VISIBLE_SLOTS: usize = 64;

/// Display names are at most this many bytes including the terminator legacy
/// clients expect, so 15 usable bytes.
pub const MAX_NAME_LENGTH: usize = 16;
/// Largest chat payload a legacy client renders in one line.
pub const LEGACY_MESSAGE_LIMIT: usize = 126;
pub const MAX_CHAT_LENGTH: usize = 256;

pub const VOTE_DESC_LENGTH: usize = 64;
pub const VOTE_CMD_LENGTH: usize = 512;
pub const VOTE_REASON_LENGTH: usize = 16;
pub const MAX_VOTE_OPTIONS: usize = 128;
/// Descriptions carried by a single `VoteOptionListAdd`.
pub const VOTE_OPTIONS_PER_PACKET: usize = 15;

/// How many simultaneous identities a client's wire format can represent.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolCapability {
    Legacy,
    Extended,
}

impl ProtocolCapability {
    /// Number of visible slots the client understands.
    pub fn visible_capacity(self) -> usize {
        match self {
            ProtocolCapability::Legacy => LEGACY_VISIBLE_SLOTS,
            ProtocolCapability::Extended => EXTENDED_VISIBLE_SLOTS,
        }
    }

    /// Highest valid slot, reserved for identities the viewer cannot see.
    pub fn sentinel_slot(self) -> u8 {
        (self.visible_capacity() - 1) as u8
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Team {
    Red,
    Blue,
    Spectators,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ChatChannel {
    All,
    Team,
    WhisperSend,
    WhisperRecv,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SnapPlayer {
    pub slot: u8,
    pub name: String,
    pub team: Team,
    pub x: f32,
    pub y: f32,
    pub frozen: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    // client -> server
    Connect {
        capability: ProtocolCapability,
        name: String,
    },
    Input {
        sequence: u32,
        timestamp: u64,
        left: bool,
        right: bool,
        jump: bool,
    },
    Say {
        team: bool,
        message: String,
    },
    CallVote {
        kind: String,
        value: String,
        reason: String,
    },
    Vote {
        choice: i8,
    },
    SetTeam {
        team: Team,
    },
    SetSpectator {
        slot: Option<u8>,
    },
    Emote {
        emoticon: u8,
    },
    Disconnect,

    // server -> client
    Connected {
        capability: ProtocolCapability,
    },
    Disconnected {
        reason: String,
    },
    GameState {
        tick: u64,
        timestamp: u64,
        local_slot: Option<u8>,
        last_processed_input: u32,
        players: Vec<SnapPlayer>,
    },
    Chat {
        channel: ChatChannel,
        speaker: Option<u8>,
        message: String,
    },
    Broadcast {
        message: String,
    },
    Emoticon {
        speaker: u8,
        emoticon: u8,
    },
    VoteSet {
        timeout_seconds: u32,
        description: String,
        reason: String,
    },
    VoteStatus {
        total: u32,
        yes: u32,
        no: u32,
        pass: u32,
    },
    VoteClearOptions,
    VoteOptionListAdd {
        descriptions: Vec<String>,
    },
    VoteOptionAdd {
        description: String,
    },
    VoteOptionRemove {
        description: String,
    },
    Motd {
        message: String,
    },
}

#[derive(Debug, Clone)]
pub struct InputState {
    pub sequence: u32,
    pub timestamp: u64,
    pub left: bool,
    pub right: bool,
    pub jump: bool,
}

/// Truncates `text` to at most `max_bytes` bytes without splitting a character.
pub fn truncate_utf8(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_limits() {
        assert_eq!(ProtocolCapability::Legacy.visible_capacity(), 16);
        assert_eq!(ProtocolCapability::Extended.visible_capacity(), 64);
        assert_eq!(ProtocolCapability::Legacy.sentinel_slot(), 15);
        assert_eq!(ProtocolCapability::Extended.sentinel_slot(), 63);
    }

    #[test]
    fn test_truncate_utf8_ascii() {
        assert_eq!(truncate_utf8("hello", 10), "hello");
        assert_eq!(truncate_utf8("hello", 3), "hel");
        assert_eq!(truncate_utf8("", 3), "");
    }

    #[test]
    fn test_truncate_utf8_multibyte() {
        // 'é' is two bytes; cutting inside it must back off
        let text = "aé";
        assert_eq!(truncate_utf8(text, 2), "a");
        assert_eq!(truncate_utf8(text, 3), "aé");
    }

    #[test]
    fn test_packet_serialization_connect() {
        let packet = Packet::Connect {
            capability: ProtocolCapability::Legacy,
            name: "tee".to_string(),
        };
        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Connect { capability, name } => {
                assert_eq!(capability, ProtocolCapability::Legacy);
                assert_eq!(name, "tee");
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_chat() {
        let packet = Packet::Chat {
            channel: ChatChannel::Team,
            speaker: Some(15),
            message: "nameless: gg".to_string(),
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Chat {
                channel,
                speaker,
                message,
            } => {
                assert_eq!(channel, ChatChannel::Team);
                assert_eq!(speaker, Some(15));
                assert_eq!(message, "nameless: gg");
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_game_state() {
        let players = vec![
            SnapPlayer {
                slot: 0,
                name: "a".to_string(),
                team: Team::Red,
                x: 100.0,
                y: 200.0,
                frozen: false,
            },
            SnapPlayer {
                slot: 1,
                name: "b".to_string(),
                team: Team::Spectators,
                x: 300.0,
                y: 400.0,
                frozen: true,
            },
        ];

        let packet = Packet::GameState {
            tick: 42,
            timestamp: 123456789,
            local_slot: Some(0),
            last_processed_input: 10,
            players,
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::GameState {
                tick,
                local_slot,
                last_processed_input,
                players,
                ..
            } => {
                assert_eq!(tick, 42);
                assert_eq!(local_slot, Some(0));
                assert_eq!(last_processed_input, 10);
                assert_eq!(players.len(), 2);
                assert_eq!(players[1].slot, 1);
                assert!(players[1].frozen);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }
}
