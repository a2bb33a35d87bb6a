use bincode::{deserialize, serialize};
use shared::{Packet, ProtocolCapability};
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

// Get current timestamp in milliseconds
fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

async fn send(socket: &UdpSocket, packet: &Packet, addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let data = serialize(packet)?;
    socket.send_to(&data, addr).await?;
    Ok(())
}

/// Prints everything that is not a snapshot until the socket goes quiet
async fn drain(socket: &UdpSocket, buf: &mut [u8]) {
    while let Ok(Ok((len, _))) = timeout(Duration::from_millis(200), socket.recv_from(buf)).await {
        match deserialize::<Packet>(&buf[0..len]) {
            Ok(Packet::GameState { tick, players, .. }) => {
                if tick % 50 == 0 {
                    println!("Snapshot tick {}: {} visible slots", tick, players.len());
                }
            }
            Ok(Packet::Chat { speaker, message, .. }) => match speaker {
                Some(slot) => println!("[chat] #{}: {}", slot, message),
                None => println!("[server] {}", message),
            },
            Ok(other) => println!("Received packet: {:?}", other),
            Err(e) => println!("Failed to deserialize packet: {}", e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server_addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8303".to_string())
        .parse::<SocketAddr>()?;
    let capability = match std::env::args().nth(2).as_deref() {
        Some("legacy") => ProtocolCapability::Legacy,
        _ => ProtocolCapability::Extended,
    };

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);

    let connect = Packet::Connect {
        capability,
        name: "test client".to_string(),
    };
    println!("Sending connection request to {} ({:?})", server_addr, capability);
    send(&socket, &connect, server_addr).await?;

    let mut buf = [0u8; 2048];
    let (len, _) = socket.recv_from(&mut buf).await?;
    match deserialize::<Packet>(&buf[0..len])? {
        Packet::Connected { capability } => println!("Connected as {:?} client", capability),
        Packet::Disconnected { reason } => {
            println!("Connection rejected: {}", reason);
            return Ok(());
        }
        other => {
            println!("Expected Connected but got: {:?}", other);
            return Ok(());
        }
    }
    drain(&socket, &mut buf).await;

    let say = Packet::Say {
        team: false,
        message: "hello from the test client".to_string(),
    };
    send(&socket, &say, server_addr).await?;
    drain(&socket, &mut buf).await;

    sleep(Duration::from_secs(1)).await;
    send(
        &socket,
        &Packet::Say {
            team: false,
            message: "/cmdlist".to_string(),
        },
        server_addr,
    )
    .await?;
    drain(&socket, &mut buf).await;

    // Walk right for a second
    for sequence in 1..=10 {
        let input = Packet::Input {
            sequence,
            timestamp: get_timestamp(),
            left: false,
            right: true,
            jump: sequence == 5,
        };
        send(&socket, &input, server_addr).await?;
        sleep(Duration::from_millis(100)).await;
    }
    drain(&socket, &mut buf).await;

    println!("Sending disconnect request");
    send(&socket, &Packet::Disconnect, server_addr).await?;

    println!("Test client finished");
    Ok(())
}
