//! # Session Server Library
//!
//! The session layer of a tick-driven multiplayer game server. It sits between
//! the UDP transport and the world simulation and owns everything that is
//! about participants rather than physics: who is connected, what each
//! client is allowed to see, how chat and votes flow, and who is kept out.
//!
//! ## Core Responsibilities
//!
//! ### Identity Virtualization
//! Up to 64 participants share a session, but legacy clients can only tell
//! 16 identities apart. Every viewer gets its own table mapping visible
//! slots to real participant ids; the top slot of every table is a sentinel
//! standing in for anyone the viewer cannot currently see.
//!
//! ### Message Fan-out
//! Chat, emoticons and whispers are rewritten per recipient so every id on
//! the wire is one the recipient understands. Speakers outside a legacy
//! viewer's table are shown through the sentinel with their name folded into
//! the text.
//!
//! ### Votes
//! One vote at a time, tallied every tick with one voice per address, with
//! kick and move-to-spectators requests validated before they start.
//!
//! ### Frozen Leaver Moratorium
//! Leaving while frozen keeps the avatar in the world until the freeze
//! resolves and blocks the address from reconnecting for a while.
//!
//! ## Architecture Design
//!
//! ### Single Owner
//! All session state lives in one [`session::Session`] value owned by the
//! server loop. Packets, console lines and ticks are handled one at a time,
//! so there are no locks and no handler ever suspends mid-update.
//!
//! ### Transport Seam
//! The session never touches sockets. It hands every outgoing packet to a
//! [`fanout::Transport`]; the server plugs in a channel to the UDP sender
//! task and tests plug in [`fanout::RecordingTransport`].
//!
//! ## Module Organization
//!
//! - `ids`: real participant ids and viewer-relative slots
//! - `client_manager`: the roster of participants and their per-connection state
//! - `visibility`: per-viewer slot tables and the relevance policy
//! - `fanout`: per-recipient message rendering and delivery flags
//! - `vote`: the vote engine and vote option table
//! - `moratorium`: the frozen leaver block list
//! - `game`: the minimal world the session reads positions and freeze state from
//! - `session`: packet handlers and the tick
//! - `commands`: console and vote command lines
//! - `config`: tunables
//! - `network`: UDP tasks and the server loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::SessionConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionConfig::default()
//!         .with_tick_rate(50)
//!         .with_vote_option("Restart round", "say restarting");
//!
//!     let mut server = Server::new("127.0.0.1:8303", config).await?;
//!
//!     // Runs until shutdown, reading operator commands from stdin
//!     server.run(true).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod commands;
pub mod config;
pub mod fanout;
pub mod game;
pub mod ids;
pub mod moratorium;
pub mod network;
pub mod session;
pub mod visibility;
pub mod vote;
