//! # Map Server Library
//!
//! A small UDP server that hosts one or more maps and tells clients which map
//! to load. It is the counterpart of the client's map transition system: the
//! client only ever changes maps because this server asked it to.
//!
//! ## Core Responsibilities
//!
//! ### Client Management
//! Handles the lifecycle of client connections:
//! - Connection establishment, version check and ID assignment
//! - Capacity limits
//! - Disconnect acknowledgement and timeout cleanup
//!
//! ### Map Routing
//! - A client connecting without one of the hosted maps loaded is sent a
//!   `ChangeMap` to the server's default map
//! - Portal requests to a hosted map are answered with a `ChangeMap`
//! - Portal requests to any other map send the client back to the default map
//!
//! ### Game Modes
//! Once per second the server runs its game mode update. FFA servers use it
//! to shut down after their last player has left.
//!
//! ## Module Organization
//!
//! - `client_manager`: connected clients, timeouts and capacity
//! - `game_mode`: periodic game rules ([`game_mode::FfaGameMode`])
//! - `network`: [`network::ServerState`] routing logic and the UDP
//!   [`network::Server`] loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new("127.0.0.1:8080", ServerConfig::default()).await?;
//!
//!     // Runs until the game mode asks for a shutdown
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod game_mode;
pub mod network;
