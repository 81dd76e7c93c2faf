//! # Map Transition Client Library
//!
//! Client side of the map transition system: the state machine that moves a
//! connected player from one map to another, the loading overlay that hides
//! the switch, and the network plumbing that triggers it.
//!
//! ## Architecture Overview
//!
//! A transition is a run of ordered steps driven by polling. Nothing blocks:
//! every tick the loop calls [`loader::MapLoader::update`], which advances the
//! overlay fade and lets the controller move through as many steps as are
//! ready before returning.
//!
//! ### Transition Steps
//! `Disconnecting -> TearingDownOldMap -> ResolvingAvailability ->
//! Downloading -> LoadingScene -> ResolvingMapRoot -> PostLoadFixup ->
//! Completed`, or `Failed` from any step.
//! Steps never go backwards and a run ends in exactly one terminal step.
//!
//! ### Engine Collaborators
//! The controller never touches the engine directly. Networking, asset
//! streaming, the scene graph, music and party spawns are reached through the
//! traits in [`services`], bundled by [`services::TransitionHost`]. The
//! [`headless`] module provides in-process versions used by the binary and
//! the tests.
//!
//! ### Message Gating
//! While a transition runs, inbound game messages are held back by the
//! [`gate::SessionGate`] so nothing is applied to a half-loaded map.
//!
//! ## Module Organization
//!
//! - `step`: [`step::AsyncStep`], progress handles for long operations
//! - `services`: collaborator traits
//! - `gate`: inbound message suspension
//! - `error`: [`error::TransitionError`]
//! - `transition`: [`transition::MapTransitionController`]
//! - `overlay`: [`overlay::LoadingOverlay`] and [`overlay::GameClock`]
//! - `loader`: secure level loading, overlay first and transition second
//! - `portal`: portal activation requests
//! - `network`: UDP connection and the client loop
//! - `headless`: engine stand-ins
//!
//! ## Usage Example
//!
//! ```rust
//! use client::headless::{HeadlessHost, HeadlessNetwork};
//! use client::loader::{LoaderEvent, MapLoader};
//! use client::overlay::{GameClock, OverlayConfig};
//! use client::transition::TransitionConfig;
//! use std::time::{Duration, Instant};
//!
//! let mut host = HeadlessHost::with_default_catalog(HeadlessNetwork::connected());
//! let mut loader = MapLoader::new(TransitionConfig::default(), OverlayConfig::default());
//! let mut clock = GameClock::new();
//! let mut now = Instant::now();
//!
//! loader
//!     .secure_load_level(&mut host, "Tutorial", None, now)
//!     .expect("loader is idle");
//!
//! let event = loop {
//!     now += Duration::from_millis(16);
//!     if let Some(event) = loader.update(&mut host, &mut clock, 0.016, now) {
//!         break event;
//!     }
//! };
//! assert!(matches!(event, LoaderEvent::MapLoaded { .. }));
//! ```

pub mod error;
pub mod gate;
pub mod headless;
pub mod loader;
pub mod network;
pub mod overlay;
pub mod portal;
pub mod services;
pub mod step;
pub mod transition;
