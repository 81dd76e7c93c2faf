//! Contracts for the engine and middleware collaborators the map transition
//! calls into. None of these are implemented by the core itself; the
//! `headless` module and the UDP `Connection` provide implementations.

use crate::step::AsyncStep;
use shared::{Bounds, Packet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Opaque reference to an object living in the scene graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHandle(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MusicCategory(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapIntro {
    pub title: String,
    pub subtitle: String,
}

/// Components attached to a map root that post-load fixups read
#[derive(Debug, Clone, PartialEq)]
pub struct MapRootComponents {
    pub bounds: Bounds,
    pub has_occlusion_area: bool,
    pub music: Option<MusicCategory>,
    pub intro: Option<MapIntro>,
}

pub trait NetworkLayer {
    fn disconnect(&mut self);
    fn peer_state(&self) -> PeerState;
    fn set_message_queue_running(&mut self, running: bool);
    fn is_message_queue_running(&self) -> bool;
    fn send(&mut self, packet: Packet);
}

pub trait MapProvider {
    /// Whether version information has finished downloading.
    fn is_ready(&self) -> bool;
    fn map_url(&self, map_name: &str) -> String;
    fn map_version(&self, map_name: &str) -> u32;
    fn can_be_loaded_locally(&self, map_name: &str) -> bool;
    fn download_cached_or_fresh(&mut self, url: &str, version: u32) -> AsyncStep;
    fn load_scene_additive_async(&mut self, map_name: &str) -> AsyncStep;
}

pub trait SceneQuery {
    fn find_object_by_tag(&self, tag: &str) -> Option<ObjectHandle>;
    fn find_objects_by_tag(&self, tag: &str) -> Vec<ObjectHandle>;
    fn map_root_components(&self, handle: ObjectHandle) -> Option<MapRootComponents>;
    fn destroy(&mut self, handle: ObjectHandle);
}

pub trait MusicPlayer {
    fn play_category(&mut self, category: &MusicCategory);
}

pub trait PartySpawns {
    fn update_spawn_points(&mut self);
}

/// Bundle of collaborators handed to the controller on every call
pub trait TransitionHost {
    fn network(&mut self) -> &mut dyn NetworkLayer;
    fn maps(&mut self) -> &mut dyn MapProvider;
    fn scene(&mut self) -> &mut dyn SceneQuery;
    fn music(&mut self) -> &mut dyn MusicPlayer;
    fn party(&mut self) -> &mut dyn PartySpawns;
}
