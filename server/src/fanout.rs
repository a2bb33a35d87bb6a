//! Protocol-compatible message fan-out
//!
//! Every outbound message goes through here so that each recipient gets a
//! version it can represent:
//! - Embedded participant ids are replaced with the recipient's visible slot,
//!   or the sentinel slot when the recipient cannot see that participant
//! - Chat from an out-of-view speaker carries the speaker's name inline
//! - Legacy recipients get long text split into successive deliveries that
//!   each fit the legacy size ceiling
//! - Whispers become plain server text for legacy recipients
//!
//! Chat additionally emits one record-only copy of the unmodified original
//! before any per-recipient delivery.
//!
//! The layer never retries. Whatever the [`Transport`] does with a delivery
//! is its own business.

use crate::client_manager::{ClientManager, Participant};
use crate::ids::RealId;
use crate::visibility::{sentinel_slot, VisibilityMap};
use shared::{
    ChatChannel, Packet, ProtocolCapability, Team, LEGACY_MESSAGE_LIMIT, MAX_NAME_LENGTH,
    VOTE_OPTIONS_PER_PACKET,
};
use std::net::SocketAddr;
use std::ops::BitOr;

/// Room reserved in each legacy chat line for an inlined `"name: "` prefix
pub const LEGACY_PREFIX_BUDGET: usize = MAX_NAME_LENGTH + 1;
/// Body bytes per legacy chat delivery
pub const LEGACY_CHUNK_SIZE: usize = LEGACY_MESSAGE_LIMIT - LEGACY_PREFIX_BUDGET;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeliveryFlags(u8);

impl DeliveryFlags {
    pub const NONE: Self = Self(0);
    /// Must arrive
    pub const RELIABLE: Self = Self(1);
    /// Excluded from session recording
    pub const NO_RECORD: Self = Self(1 << 1);
    /// Recorded but not sent to live participants
    pub const NO_SEND: Self = Self(1 << 2);
    /// Bypasses batching
    pub const FLUSH: Self = Self(1 << 3);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for DeliveryFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// One packet handed to the transport
#[derive(Debug, Clone)]
pub struct Delivery {
    /// None for record-only copies
    pub to: Option<SocketAddr>,
    pub packet: Packet,
    pub flags: DeliveryFlags,
}

pub trait Transport {
    fn deliver(&mut self, delivery: Delivery);
}

/// Transport that keeps every delivery in memory
#[derive(Debug, Default)]
pub struct RecordingTransport {
    pub deliveries: Vec<Delivery>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Packets delivered to `addr`, in order
    pub fn sent_to(&self, addr: SocketAddr) -> Vec<&Packet> {
        self.deliveries
            .iter()
            .filter(|d| d.to == Some(addr))
            .map(|d| &d.packet)
            .collect()
    }

    /// Record-only copies, in order
    pub fn recorded(&self) -> Vec<&Packet> {
        self.deliveries
            .iter()
            .filter(|d| d.to.is_none())
            .map(|d| &d.packet)
            .collect()
    }

    /// Chat text delivered to `addr`, in order
    pub fn chat_lines(&self, addr: SocketAddr) -> Vec<String> {
        self.sent_to(addr)
            .into_iter()
            .filter_map(|p| match p {
                Packet::Chat { message, .. } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.deliveries.clear();
    }
}

impl Transport for RecordingTransport {
    fn deliver(&mut self, delivery: Delivery) {
        self.deliveries.push(delivery);
    }
}

/// Who receives a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    All,
    Team(Team),
    One(RealId),
}

/// A message before per-recipient transformation
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Chat line; `speaker` None is server text
    Chat {
        channel: ChatChannel,
        speaker: Option<RealId>,
        text: String,
    },
    Emoticon {
        speaker: RealId,
        emoticon: u8,
    },
    /// Packet without embedded participant ids
    Plain(Packet),
}

/// Splits `text` into pieces of at most `max_bytes`, never inside a character
pub fn split_utf8(text: &str, max_bytes: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.len() > max_bytes {
        let mut end = max_bytes;
        while end > 0 && !rest.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            // max_bytes smaller than one character
            end = rest.chars().next().map_or(rest.len(), char::len_utf8);
        }
        chunks.push(&rest[..end]);
        rest = &rest[end..];
    }
    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest);
    }
    chunks
}

/// Per-call view over the roster, slot tables and transport
pub struct Fanout<'a, T: Transport> {
    roster: &'a ClientManager,
    visibility: &'a VisibilityMap,
    transport: &'a mut T,
}

impl<'a, T: Transport> Fanout<'a, T> {
    pub fn new(roster: &'a ClientManager, visibility: &'a VisibilityMap, transport: &'a mut T) -> Self {
        Self {
            roster,
            visibility,
            transport,
        }
    }

    /// Delivers `message` to every live participant except `exclude`
    pub fn broadcast(&mut self, message: &Outbound, flags: DeliveryFlags, exclude: Option<RealId>) {
        let recipients: Vec<RealId> = self
            .roster
            .connected()
            .filter(|p| Some(p.id) != exclude)
            .map(|p| p.id)
            .collect();

        for id in recipients {
            self.send_to(id, message, flags);
        }
    }

    /// Delivers `message` to one participant, remapped for its capability
    pub fn send_to(&mut self, to: RealId, message: &Outbound, flags: DeliveryFlags) {
        let Some(recipient) = self.roster.get(to).filter(|p| !p.lingering) else {
            return;
        };

        let packets = self.render(recipient, message);
        let addr = recipient.addr;
        for packet in packets {
            self.transport.deliver(Delivery {
                to: Some(addr),
                packet,
                flags,
            });
        }
    }

    /// Sends a chat line from `speaker` (None for the server)
    ///
    /// The unmodified original goes out first as a record-only copy; every
    /// live delivery is then excluded from recording.
    pub fn send_chat(&mut self, speaker: Option<RealId>, audience: Audience, text: &str) {
        let channel = match audience {
            Audience::Team(_) => ChatChannel::Team,
            _ => ChatChannel::All,
        };

        self.transport.deliver(Delivery {
            to: None,
            packet: Packet::Chat {
                channel,
                speaker: speaker.map(RealId::raw),
                message: text.to_string(),
            },
            flags: DeliveryFlags::NO_SEND,
        });

        let message = Outbound::Chat {
            channel,
            speaker,
            text: text.to_string(),
        };
        let flags = DeliveryFlags::RELIABLE | DeliveryFlags::NO_RECORD;

        match audience {
            Audience::All => self.broadcast(&message, flags, None),
            Audience::One(id) => self.send_to(id, &message, flags),
            Audience::Team(team) => {
                let members: Vec<RealId> = self
                    .roster
                    .connected()
                    .filter(|p| p.team == team)
                    .map(|p| p.id)
                    .collect();
                for id in members {
                    self.send_to(id, &message, flags);
                }
            }
        }
    }

    /// Server text for a single participant
    pub fn send_chat_target(&mut self, to: RealId, text: &str) {
        let message = Outbound::Chat {
            channel: ChatChannel::All,
            speaker: None,
            text: text.to_string(),
        };
        self.send_to(to, &message, DeliveryFlags::RELIABLE);
    }

    /// Server text for everyone
    pub fn broadcast_text(&mut self, text: &str) {
        self.send_chat(None, Audience::All, text);
    }

    /// Delivers a whisper to both parties
    pub fn send_whisper(&mut self, from: RealId, to: RealId, text: &str) {
        let flags = DeliveryFlags::RELIABLE | DeliveryFlags::NO_RECORD;
        let sent = Outbound::Chat {
            channel: ChatChannel::WhisperSend,
            speaker: Some(to),
            text: text.to_string(),
        };
        let received = Outbound::Chat {
            channel: ChatChannel::WhisperRecv,
            speaker: Some(from),
            text: text.to_string(),
        };
        self.send_to(from, &sent, flags);
        self.send_to(to, &received, flags);
    }

    pub fn send_emoticon(&mut self, speaker: RealId, emoticon: u8) {
        let message = Outbound::Emoticon { speaker, emoticon };
        self.broadcast(&message, DeliveryFlags::NONE, None);
    }

    /// Sends a packet that carries no participant ids
    pub fn send_packet(&mut self, to: RealId, packet: Packet, flags: DeliveryFlags) {
        self.send_to(to, &Outbound::Plain(packet), flags);
    }

    pub fn broadcast_packet(&mut self, packet: Packet, flags: DeliveryFlags) {
        self.broadcast(&Outbound::Plain(packet), flags, None);
    }

    /// Replaces the recipient's vote option menu
    pub fn send_vote_options(&mut self, to: RealId, descriptions: &[String]) {
        self.send_packet(to, Packet::VoteClearOptions, DeliveryFlags::RELIABLE);
        for batch in descriptions.chunks(VOTE_OPTIONS_PER_PACKET) {
            let packet = Packet::VoteOptionListAdd {
                descriptions: batch.to_vec(),
            };
            self.send_packet(to, packet, DeliveryFlags::RELIABLE);
        }
    }

    fn render(&self, recipient: &Participant, message: &Outbound) -> Vec<Packet> {
        match message {
            Outbound::Plain(packet) => vec![packet.clone()],
            Outbound::Emoticon { speaker, emoticon } => {
                let (slot, _) = self.speaker_slot(recipient, *speaker);
                vec![Packet::Emoticon {
                    speaker: slot,
                    emoticon: *emoticon,
                }]
            }
            Outbound::Chat {
                channel,
                speaker,
                text,
            } => self.render_chat(recipient, *channel, *speaker, text),
        }
    }

    fn render_chat(
        &self,
        recipient: &Participant,
        channel: ChatChannel,
        speaker: Option<RealId>,
        text: &str,
    ) -> Vec<Packet> {
        let legacy = recipient.capability == ProtocolCapability::Legacy;
        let whisper = matches!(channel, ChatChannel::WhisperSend | ChatChannel::WhisperRecv);

        let Some(speaker) = speaker else {
            return chunked(legacy, text, LEGACY_MESSAGE_LIMIT)
                .into_iter()
                .map(|chunk| Packet::Chat {
                    channel,
                    speaker: None,
                    message: chunk.to_string(),
                })
                .collect();
        };

        if whisper && legacy {
            let arrow = if channel == ChatChannel::WhisperRecv { '←' } else { '→' };
            let prefix = format!("[{} {}] ", arrow, self.name_of(speaker));
            let budget = LEGACY_MESSAGE_LIMIT.saturating_sub(prefix.len()).max(1);
            return split_utf8(text, budget)
                .into_iter()
                .map(|chunk| Packet::Chat {
                    channel: ChatChannel::All,
                    speaker: None,
                    message: format!("{}{}", prefix, chunk),
                })
                .collect();
        }

        let (slot, visible) = self.speaker_slot(recipient, speaker);
        let prefix = if visible {
            String::new()
        } else {
            format!("{}: ", self.name_of(speaker))
        };

        chunked(legacy, text, LEGACY_CHUNK_SIZE)
            .into_iter()
            .map(|chunk| Packet::Chat {
                channel,
                speaker: Some(slot),
                message: format!("{}{}", prefix, chunk),
            })
            .collect()
    }

    /// Slot for `speaker` as seen by `recipient`, and whether it is a real one
    fn speaker_slot(&self, recipient: &Participant, speaker: RealId) -> (u8, bool) {
        match self.visibility.visible_slot(recipient.id, speaker) {
            Some(slot) => (slot.0, true),
            None => (sentinel_slot(recipient.capability).0, false),
        }
    }

    fn name_of(&self, id: RealId) -> &str {
        self.roster.get(id).map_or("", |p| p.name.as_str())
    }
}

fn chunked(legacy: bool, text: &str, max_bytes: usize) -> Vec<&str> {
    if legacy {
        split_utf8(text, max_bytes)
    } else {
        vec![text]
    }
}
