use clap::Parser;
use client::network::{Client, ClientSettings};
use client::overlay::OverlayConfig;
use client::transition::TransitionConfig;
use log::info;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Load this map before connecting
    #[arg(short = 'm', long)]
    map: Option<String>,

    /// Take a portal to this map once the first map is loaded
    #[arg(short = 'p', long)]
    portal: Option<String>,

    /// Loading overlay fade time in seconds
    #[arg(long, default_value = "0.5")]
    fade_time: f32,

    /// Give up on a map change if the server does not release us in time
    #[arg(long, default_value = "10000")]
    disconnect_timeout_ms: u64,

    /// Ticks a simulated map download takes
    #[arg(long, default_value = "30")]
    download_ticks: u32,

    /// Client tick length in milliseconds
    #[arg(long, default_value = "16")]
    tick_ms: u64,

    /// Exit once the last requested map has loaded
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);
    if let Some(portal) = &args.portal {
        info!("Will take the portal to '{}'", portal);
    }

    let settings = ClientSettings {
        transition: TransitionConfig {
            disconnect_timeout: Duration::from_millis(args.disconnect_timeout_ms),
            ..TransitionConfig::default()
        },
        overlay: OverlayConfig {
            fade_time: args.fade_time,
        },
        tick: Duration::from_millis(args.tick_ms.max(1)),
        download_polls: args.download_ticks,
        start_map: args.map,
        portal: args.portal,
        once: args.once,
    };

    let mut client = Client::new(&args.server, settings).await?;
    client.run().await?;

    Ok(())
}
