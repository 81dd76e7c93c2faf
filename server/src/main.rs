use clap::Parser;
use log::info;
use server::network::{Server, ServerConfig};
use shared::{ServerType, STARTING_MAP};
use std::time::Duration;

/// Main-method of the application.
/// Parses command-line arguments, then runs the map server until it stops or
/// Ctrl+C is pressed.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "8080")]
        port: u16,
        /// Hosted maps, comma separated. The first one is the default map
        #[clap(short, long, value_delimiter = ',', default_value = STARTING_MAP)]
        maps: Vec<String>,
        /// Kind of server: town, world, arena or ffa
        #[clap(short = 't', long, default_value = "town")]
        server_type: ServerType,
        /// Maximum number of connected clients
        #[clap(long, default_value = "32")]
        max_clients: usize,
        /// Drop clients that stay silent for this long
        #[clap(long, default_value = "30")]
        client_timeout_secs: u64,
        /// FFA servers stop after being empty for this long
        #[clap(long, default_value = "60")]
        shutdown_grace_secs: u64,
    }

    env_logger::init();

    let args = Args::parse();

    let config = ServerConfig {
        maps: args.maps,
        server_type: args.server_type,
        max_clients: args.max_clients,
        client_timeout: Duration::from_secs(args.client_timeout_secs),
        empty_grace: Duration::from_secs(args.shutdown_grace_secs),
    };

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, config).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
