//! Performance benchmarks for the per-tick session work

use server::client_manager::ClientManager;
use server::config::SessionConfig;
use server::fanout::{Audience, Fanout, RecordingTransport};
use server::game::GameState;
use server::ids::RealId;
use server::session::Session;
use server::visibility::VisibilityMap;
use server::vote::VoteEngine;
use shared::{Packet, ProtocolCapability, Team, MAX_PARTICIPANTS};
use std::net::SocketAddr;
use std::time::Instant;

fn full_roster() -> (ClientManager, GameState) {
    let mut roster = ClientManager::new(MAX_PARTICIPANTS);
    let mut world = GameState::new();

    for n in 0..MAX_PARTICIPANTS {
        let addr = SocketAddr::from(([10, 2, (n / 8) as u8, (n % 8) as u8 + 1], 7000));
        let capability = if n % 2 == 0 {
            ProtocolCapability::Legacy
        } else {
            ProtocolCapability::Extended
        };
        let team = if n % 2 == 0 { Team::Red } else { Team::Blue };
        let id = roster
            .add_client(addr, capability, &format!("tee{}", n), team, 0)
            .unwrap();
        world.add_avatar(id);
        if let Some(avatar) = world.avatars.get_mut(&id) {
            avatar.x = (n as f32 * 12.0) % 760.0;
        }
    }
    (roster, world)
}

/// Benchmarks rebuilding every slot table for a full session
#[test]
fn benchmark_slot_assignment() {
    let (roster, world) = full_roster();
    let mut visibility = VisibilityMap::default();

    let iterations = 200;
    let start = Instant::now();

    for _ in 0..iterations {
        visibility.refresh(&roster, &world);
    }

    let duration = start.elapsed();
    println!(
        "Slot assignment: {} rounds of {} viewers in {:?} ({:.2} μs/round)",
        iterations,
        MAX_PARTICIPANTS,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    for id in RealId::all() {
        let participant = roster.get(id).unwrap();
        assert!(visibility.table(id).len() < participant.capability.visible_capacity());
    }

    // Must fit well inside a 20ms tick on average
    assert!(duration.as_millis() < 200 * 20);
}

/// Benchmarks the per-tick vote tally
#[test]
fn benchmark_vote_tally() {
    let (mut roster, _) = full_roster();
    let mut votes = VoteEngine::new(25, 50);
    votes
        .call_vote(&mut roster, 0, None, "Restart", "say restart", "bench")
        .unwrap();
    for (n, id) in RealId::all().enumerate() {
        let choice = if n % 3 == 0 { -1 } else { 1 };
        votes.cast_vote(&mut roster, id, choice).unwrap();
    }

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let tally = votes.tally(&roster);
        assert_eq!(tally.total, MAX_PARTICIPANTS as u32);
    }

    let duration = start.elapsed();
    println!(
        "Vote tally: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks chat fan-out to a full mixed-capability session
#[test]
fn benchmark_chat_fanout() {
    let (roster, world) = full_roster();
    let mut visibility = VisibilityMap::default();
    visibility.refresh(&roster, &world);
    let mut transport = RecordingTransport::new();

    let speaker = RealId::new(MAX_PARTICIPANTS - 1).unwrap();
    let text = "gg ".repeat(60);
    let iterations = 1_000;
    let start = Instant::now();

    for _ in 0..iterations {
        transport.clear();
        Fanout::new(&roster, &visibility, &mut transport).send_chat(
            Some(speaker),
            Audience::All,
            &text,
        );
    }

    let duration = start.elapsed();
    println!(
        "Chat fan-out: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Record copy, one line per extended recipient, two per legacy recipient
    assert_eq!(transport.deliveries.len(), 1 + 32 + 32 * 2);
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks a whole session tick with snapshots for every viewer
#[test]
fn benchmark_session_tick() {
    let mut session = Session::new(SessionConfig::default(), RecordingTransport::new());
    for n in 0..MAX_PARTICIPANTS {
        let addr = SocketAddr::from(([10, 3, 0, n as u8 + 1], 7000));
        let capability = if n % 4 == 0 {
            ProtocolCapability::Legacy
        } else {
            ProtocolCapability::Extended
        };
        session.handle_packet(
            Packet::Connect {
                capability,
                name: format!("tee{}", n),
            },
            addr,
        );
    }
    assert_eq!(session.roster().len(), MAX_PARTICIPANTS);

    let iterations = 100;
    let start = Instant::now();

    for _ in 0..iterations {
        session.transport_mut().clear();
        session.tick();
    }

    let duration = start.elapsed();
    println!(
        "Session tick: {} ticks in {:?} ({:.2} μs/tick)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 5000);
}
