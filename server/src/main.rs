use clap::Parser;
use log::info;
use server::config::WorldConfig;
use server::network::Server;
use server::world::WorldManager;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,

    /// Simulation ticks per second, overrides the config file
    #[arg(short, long)]
    tick_rate: Option<u32>,

    /// Maximum concurrent clients
    #[arg(short, long, default_value = "32")]
    max_clients: usize,

    /// Seed for reproducible floors
    #[arg(long)]
    seed: Option<u64>,

    /// Generate every floor at startup instead of on first visit
    #[arg(long)]
    pregenerate: bool,

    /// JSON world config; missing fields use defaults
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading world config from {}", path.display());
            WorldConfig::from_file(path)?
        }
        None => WorldConfig::default(),
    };
    if let Some(tick_rate) = args.tick_rate {
        config.tick_rate = tick_rate;
    }
    config.validate()?;

    let tick_duration = Duration::from_secs_f64(1.0 / config.tick_rate as f64);
    info!(
        "Starting server: {} floors, {}Hz, max {} clients",
        config.floor_count(),
        config.tick_rate,
        args.max_clients
    );

    let mut world = WorldManager::new(config, args.seed)?;
    if args.pregenerate {
        world.pregenerate_all()?;
        info!("Pregenerated {} floors", world.generated_levels().len());
    }

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, world, tick_duration, args.max_clients).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
