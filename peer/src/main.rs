use clap::Parser;
use glam::Vec3;
use log::info;
use peer::network::{NodeOptions, PeerNode};
use peer::physics::BoatTuning;
use peer::scheduler::SyncConfig;
use shared::{NETSYNC_MAX_DISTANCE, NETSYNC_MAX_RATE_MS, NETSYNC_MIN_RATE_MS, NETSYNC_RELAYED_RATE_MS};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Local address to bind the UDP socket to
    #[arg(short = 'b', long, default_value = "0.0.0.0:9000")]
    bind: String,

    /// Peer reachable over a direct path (repeatable)
    #[arg(short = 'p', long = "peer")]
    peers: Vec<SocketAddr>,

    /// Peer reachable only through a relay (repeatable)
    #[arg(short = 'r', long = "relayed-peer")]
    relayed_peers: Vec<SocketAddr>,

    /// Simulation ticks per second
    #[arg(short = 't', long, default_value = "60")]
    tick_rate: u32,

    /// Wind vector X component
    #[arg(long, default_value_t = 0.0)]
    wind_x: f32,

    /// Wind vector Z component
    #[arg(long, default_value_t = 1.0)]
    wind_z: f32,

    /// Send interval for the closest peers, in milliseconds
    #[arg(long, default_value_t = NETSYNC_MAX_RATE_MS)]
    max_rate_ms: f64,

    /// Send interval for the farthest peers, in milliseconds
    #[arg(long, default_value_t = NETSYNC_MIN_RATE_MS)]
    min_rate_ms: f64,

    /// Send interval for relayed peers, in milliseconds
    #[arg(long, default_value_t = NETSYNC_RELAYED_RATE_MS)]
    relayed_rate_ms: f64,

    /// Distance at which peers drop to the slowest rate
    #[arg(long, default_value_t = NETSYNC_MAX_DISTANCE)]
    max_distance: f32,

    /// Leave the controls alone instead of sailing around at random
    #[arg(long)]
    no_autopilot: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let sync = SyncConfig {
        max_rate_ms: args.max_rate_ms,
        min_rate_ms: args.min_rate_ms,
        relayed_rate_ms: args.relayed_rate_ms,
        max_distance: args.max_distance,
        ..SyncConfig::default()
    };
    sync.validate()?;

    info!("Starting peer on {}", args.bind);
    for addr in &args.peers {
        info!("Direct peer: {}", addr);
    }
    for addr in &args.relayed_peers {
        info!("Relayed peer: {}", addr);
    }

    let options = NodeOptions {
        bind: args.bind,
        peers: args.peers,
        relayed_peers: args.relayed_peers,
        tick_duration: Duration::from_secs_f32(1.0 / args.tick_rate.max(1) as f32),
        wind: Vec3::new(args.wind_x, 0.0, args.wind_z),
        sync,
        tuning: BoatTuning::default(),
        autopilot: !args.no_autopilot,
    };

    let mut node = PeerNode::new(options).await?;
    node.run().await?;

    Ok(())
}
