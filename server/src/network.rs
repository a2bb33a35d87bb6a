//! Server network layer handling UDP communications and the session tick loop

use crate::commands::Authority;
use crate::config::SessionConfig;
use crate::fanout::{Delivery, DeliveryFlags, Transport};
use crate::ids::RealId;
use crate::session::Session;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::Packet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ConsoleLine(String),
    Shutdown,
}

/// Messages sent from the session to the sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket { packet: Packet, addr: SocketAddr },
}

/// Transport queueing packets for the sender task
///
/// Record-only copies have no destination and are dropped here.
pub struct ChannelTransport {
    game_tx: mpsc::UnboundedSender<GameMessage>,
}

impl ChannelTransport {
    pub fn new(game_tx: mpsc::UnboundedSender<GameMessage>) -> Self {
        Self { game_tx }
    }
}

impl Transport for ChannelTransport {
    fn deliver(&mut self, delivery: Delivery) {
        let Some(addr) = delivery.to else {
            return;
        };
        if delivery.flags.contains(DeliveryFlags::NO_SEND) {
            return;
        }

        if let Err(e) = self.game_tx.send(GameMessage::SendPacket {
            packet: delivery.packet,
            addr,
        }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }
}

/// Main server coordinating networking and the session
pub struct Server {
    socket: Arc<UdpSocket>,
    session: Session<ChannelTransport>,
    tick_duration: Duration,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_rx: Option<mpsc::UnboundedReceiver<GameMessage>>,
}

impl Server {
    pub async fn new(addr: &str, config: SessionConfig) -> Result<Self, Box<dyn std::error::Error>> {
        config.validate()?;

        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();
        let tick_duration = Duration::from_secs_f64(1.0 / config.tick_rate as f64);

        Ok(Server {
            socket,
            session: Session::new(config, ChannelTransport::new(game_tx)),
            tick_duration,
            server_tx,
            server_rx,
            game_rx: Some(game_rx),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn session(&self) -> &Session<ChannelTransport> {
        &self.session
    }

    /// Sender for injecting console lines or a shutdown request
    pub fn control(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let Some(mut game_rx) = self.game_rx.take() else {
            return;
        };

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                }
            }
        });
    }

    /// Spawns task forwarding operator commands from stdin
    fn spawn_console_reader(&self) {
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        if server_tx.send(ServerMessage::ConsoleLine(line)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("Console input closed");
                        break;
                    }
                    Err(e) => {
                        error!("Error reading console: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn handle_message(&mut self, message: ServerMessage) -> bool {
        match message {
            ServerMessage::PacketReceived { packet, addr } => {
                self.session.handle_packet(packet, addr);
            }
            ServerMessage::ConsoleLine(line) => {
                if let Err(e) = self.session.execute_line(&line, Authority::Console) {
                    warn!("Console: {}", e);
                }
            }
            ServerMessage::Shutdown => return false,
        }
        true
    }

    /// Disconnects every participant
    fn shutdown(&mut self) {
        let ids: Vec<RealId> = self.session.roster().iter().map(|p| p.id).collect();
        for id in ids {
            self.session.kick(id, "Server shutdown");
        }
    }

    /// Main server loop; `console` enables reading commands from stdin
    pub async fn run(&mut self, console: bool) -> Result<(), Box<dyn std::error::Error>> {
        // Initialize concurrent tasks
        self.spawn_network_receiver();
        self.spawn_network_sender();
        if console {
            self.spawn_console_reader();
        }

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle network and console events
                message = self.server_rx.recv() => {
                    let keep_running = match message {
                        Some(message) => self.handle_message(message),
                        None => false,
                    };
                    if !keep_running {
                        info!("Server shutting down");
                        break;
                    }
                },

                // Handle server tick events
                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f32();
                    last_tick = now;

                    self.session.tick();

                    // Periodic performance monitoring
                    if self.session.now() % 60 == 0 {
                        let count = self.session.roster().len();
                        if count > 0 {
                            debug!("Tick {}: {} participants, {:.1}Hz, vote active: {}",
                                   self.session.now(), count, 1.0 / dt.max(f32::EPSILON),
                                   self.session.votes().is_active());
                        }
                    }
                },
            }
        }

        self.shutdown();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::ProtocolCapability;
    use std::net::{IpAddr, Ipv4Addr};

    fn test_addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8080)
    }

    #[test]
    fn test_server_message_creation() {
        let msg = ServerMessage::PacketReceived {
            packet: Packet::Connect {
                capability: ProtocolCapability::Legacy,
                name: "tee".to_string(),
            },
            addr: test_addr(),
        };

        match msg {
            ServerMessage::PacketReceived { packet: p, addr: a } => {
                assert_eq!(a, test_addr());
                match p {
                    Packet::Connect { capability, name } => {
                        assert_eq!(capability, ProtocolCapability::Legacy);
                        assert_eq!(name, "tee");
                    }
                    _ => panic!("Unexpected packet type"),
                }
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_channel_transport_forwards_live_deliveries() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut transport = ChannelTransport::new(tx);

        transport.deliver(Delivery {
            to: Some(test_addr()),
            packet: Packet::Motd {
                message: "hello".to_string(),
            },
            flags: DeliveryFlags::RELIABLE,
        });

        match rx.try_recv() {
            Ok(GameMessage::SendPacket { packet, addr }) => {
                assert_eq!(addr, test_addr());
                assert!(matches!(packet, Packet::Motd { .. }));
            }
            _ => panic!("Expected queued packet"),
        }
    }

    #[test]
    fn test_channel_transport_drops_record_only_copies() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut transport = ChannelTransport::new(tx);

        transport.deliver(Delivery {
            to: None,
            packet: Packet::Motd {
                message: "record".to_string(),
            },
            flags: DeliveryFlags::NO_SEND,
        });
        transport.deliver(Delivery {
            to: Some(test_addr()),
            packet: Packet::Disconnect,
            flags: DeliveryFlags::NO_SEND,
        });

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_channel_transport_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut transport = ChannelTransport::new(tx);

        // Logged, never panics
        transport.deliver(Delivery {
            to: Some(test_addr()),
            packet: Packet::Disconnect,
            flags: DeliveryFlags::NONE,
        });
    }

    #[test]
    fn test_buffer_fits_largest_chat() {
        let packet = Packet::Chat {
            channel: shared::ChatChannel::All,
            speaker: Some(63),
            message: "x".repeat(shared::MAX_CHAT_LENGTH),
        };
        let data = serialize(&packet).unwrap();
        assert!(data.len() < 2048);
    }

    #[test]
    fn test_server_rejects_invalid_config() {
        let config = SessionConfig::default().with_tick_rate(0);
        let result = tokio_test::block_on(Server::new("127.0.0.1:0", config));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_console_line_reaches_session() {
        let mut server = Server::new("127.0.0.1:0", SessionConfig::default())
            .await
            .unwrap();

        assert!(server.handle_message(ServerMessage::ConsoleLine(
            "add_vote \"Say hi\" \"say hi\"".to_string()
        )));
        assert!(server.session().votes().find_option("say hi").is_some());
        assert!(!server.handle_message(ServerMessage::Shutdown));
    }
}
