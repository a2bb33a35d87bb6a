use clap::Parser;
use log::info;
use server::config::{parse_vote_option, SessionConfig};
use server::network::{Server, ServerMessage};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8303")]
    port: u16,

    /// Tick rate (updates per second)
    #[arg(short, long, default_value = "50")]
    tick_rate: u64,

    /// Maximum number of participants
    #[arg(short, long, default_value = "64")]
    max_clients: usize,

    /// Seconds a vote stays open
    #[arg(long, default_value = "25")]
    vote_duration: u64,

    /// Players required before kick votes are allowed
    #[arg(long, default_value = "0")]
    vote_kick_min: usize,

    /// Minutes a vote-kicked address is banned (0 = kick only)
    #[arg(long, default_value = "0")]
    vote_kick_bantime: u64,

    /// Disable kick votes
    #[arg(long)]
    no_vote_kick: bool,

    /// Disable move-to-spectators votes
    #[arg(long)]
    no_vote_spectate: bool,

    /// Seconds a frozen leaver is kept out
    #[arg(long, default_value = "30")]
    moratorium: u64,

    /// Message of the day
    #[arg(long, default_value = "")]
    motd: String,

    /// Vote option as "description=command" (repeatable)
    #[arg(long = "vote-option", value_parser = parse_vote_option)]
    vote_options: Vec<(String, String)>,

    /// Do not read operator commands from stdin
    #[arg(long)]
    no_console: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let mut config = SessionConfig::default()
        .with_tick_rate(args.tick_rate)
        .with_max_clients(args.max_clients);
    config.vote_duration_secs = args.vote_duration;
    config.vote_kick = !args.no_vote_kick;
    config.vote_kick_min = args.vote_kick_min;
    config.vote_kick_bantime = args.vote_kick_bantime;
    config.vote_spectate = !args.no_vote_spectate;
    config.moratorium_secs = args.moratorium;
    config.motd = args.motd;
    config.vote_options = args.vote_options;

    let address = format!("{}:{}", args.host, args.port);
    info!("Starting session server on {}", address);
    info!("Tick rate: {}Hz, max participants: {}", config.tick_rate, config.max_clients);

    let mut server = Server::new(&address, config).await?;
    let control = server.control();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down gracefully...");
            let _ = control.send(ServerMessage::Shutdown);
        }
    });

    server.run(!args.no_console).await?;

    Ok(())
}
