//! Headless stand-ins for the engine collaborators
//!
//! The client binary has no renderer or asset pipeline, so maps, the scene
//! graph, music and party spawns are modelled in memory. Downloads and scene
//! loads take a configurable number of polls to finish, and a freshly loaded
//! map root only becomes visible to tag lookups after a configurable number
//! of lookups, the same way an engine instantiates a scene a few frames after
//! reporting the load as finished.

use crate::services::{
    MapIntro, MapProvider, MapRootComponents, MusicCategory, MusicPlayer, NetworkLayer,
    ObjectHandle, PartySpawns, PeerState, SceneQuery, TransitionHost,
};
use crate::step::{AsyncStep, AsyncStepKind, Operation, OperationStatus};
use log::debug;
use shared::{Bounds, Packet, Vec3, MAP_TAG, NPC_TAG, STARTING_MAP};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

pub const ASSET_BASE_URL: &str = "https://assets.example.net/maps";

#[derive(Debug)]
pub struct HeadlessNetwork {
    peer: Cell<PeerState>,
    /// Peer-state queries that still report `Disconnecting` after a
    /// disconnect request. `None` never finishes.
    disconnect_polls: Option<u32>,
    pending_polls: Cell<u32>,
    queue_running: bool,
    queue_toggles: u32,
    disconnect_requests: u32,
    sent: Vec<Packet>,
}

impl HeadlessNetwork {
    pub fn connected() -> Self {
        Self::with_disconnect_delay(0)
    }

    pub fn with_disconnect_delay(polls: u32) -> Self {
        Self {
            peer: Cell::new(PeerState::Connected),
            disconnect_polls: Some(polls),
            pending_polls: Cell::new(0),
            queue_running: true,
            queue_toggles: 0,
            disconnect_requests: 0,
            sent: Vec::new(),
        }
    }

    pub fn unresponsive() -> Self {
        Self {
            disconnect_polls: None,
            ..Self::connected()
        }
    }

    pub fn queue_toggles(&self) -> u32 {
        self.queue_toggles
    }

    pub fn disconnect_requests(&self) -> u32 {
        self.disconnect_requests
    }

    pub fn sent(&self) -> &[Packet] {
        &self.sent
    }
}

impl NetworkLayer for HeadlessNetwork {
    fn disconnect(&mut self) {
        self.disconnect_requests += 1;
        if self.peer.get() == PeerState::Disconnected {
            return;
        }
        self.peer.set(PeerState::Disconnecting);
        self.pending_polls.set(self.disconnect_polls.unwrap_or(0));
    }

    fn peer_state(&self) -> PeerState {
        if self.peer.get() == PeerState::Disconnecting && self.disconnect_polls.is_some() {
            let remaining = self.pending_polls.get();
            if remaining == 0 {
                self.peer.set(PeerState::Disconnected);
            } else {
                self.pending_polls.set(remaining - 1);
            }
        }
        self.peer.get()
    }

    fn set_message_queue_running(&mut self, running: bool) {
        self.queue_running = running;
        self.queue_toggles += 1;
    }

    fn is_message_queue_running(&self) -> bool {
        self.queue_running
    }

    fn send(&mut self, packet: Packet) {
        self.sent.push(packet);
    }
}

/// Everything needed to stream a map in.
#[derive(Debug, Clone)]
pub struct MapAsset {
    pub name: String,
    pub version: u32,
    /// `None` produces a scene without any object tagged as map root.
    pub root: Option<MapRootComponents>,
    pub root_lookup_delay: u32,
    pub npcs: usize,
}

impl MapAsset {
    pub fn new(name: &str, version: u32, root: Option<MapRootComponents>) -> Self {
        Self {
            name: name.to_string(),
            version,
            root,
            root_lookup_delay: 0,
            npcs: 0,
        }
    }

    pub fn with_root_lookup_delay(mut self, lookups: u32) -> Self {
        self.root_lookup_delay = lookups;
        self
    }

    pub fn with_npcs(mut self, npcs: usize) -> Self {
        self.npcs = npcs;
        self
    }

    pub fn url(&self) -> String {
        format!("{}/{}.unity3d", ASSET_BASE_URL, self.name.replace(' ', "%20"))
    }
}

#[derive(Debug, Clone)]
struct SceneObject {
    tag: String,
    name: String,
    root: Option<MapRootComponents>,
    parent: Option<ObjectHandle>,
    hidden_lookups: Cell<u32>,
}

#[derive(Debug, Default)]
pub struct SceneGraph {
    objects: BTreeMap<ObjectHandle, SceneObject>,
    next_id: u64,
    streamed: HashSet<String>,
}

impl SceneGraph {
    fn spawn(
        &mut self,
        tag: &str,
        name: &str,
        root: Option<MapRootComponents>,
        parent: Option<ObjectHandle>,
        hidden: u32,
    ) -> ObjectHandle {
        self.next_id += 1;
        let handle = ObjectHandle(self.next_id);
        self.objects.insert(
            handle,
            SceneObject {
                tag: tag.to_string(),
                name: name.to_string(),
                root,
                parent,
                hidden_lookups: Cell::new(hidden),
            },
        );
        handle
    }

    /// NPCs hang under the map root when the map has one.
    fn instantiate(&mut self, asset: &MapAsset) {
        let root = asset.root.as_ref().map(|root| {
            self.spawn(MAP_TAG, &asset.name, Some(root.clone()), None, asset.root_lookup_delay)
        });
        for index in 0..asset.npcs {
            let name = format!("{} NPC {}", asset.name, index + 1);
            self.spawn(NPC_TAG, &name, None, root, 0);
        }
    }

    fn remove_with_children(&mut self, handle: ObjectHandle) {
        let children: Vec<ObjectHandle> = self
            .objects
            .iter()
            .filter(|(_, object)| object.parent == Some(handle))
            .map(|(child, _)| *child)
            .collect();
        for child in children {
            self.remove_with_children(child);
        }
        if let Some(object) = self.objects.remove(&handle) {
            debug!("Destroyed {} '{}'", object.tag, object.name);
        }
    }
}

pub type SharedScene = Rc<RefCell<SceneGraph>>;

#[derive(Debug, Clone, Default)]
pub struct HeadlessScene {
    graph: SharedScene,
}

impl HeadlessScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places an already instantiated map into the scene, as if the scene
    /// itself had shipped with it.
    pub fn spawn_map(&mut self, asset: &MapAsset) {
        self.graph.borrow_mut().instantiate(asset);
    }

    pub fn count_tag(&self, tag: &str) -> usize {
        self.graph
            .borrow()
            .objects
            .values()
            .filter(|object| object.tag == tag)
            .count()
    }

    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.graph.borrow().objects.contains_key(&handle)
    }

    pub fn object_name(&self, handle: ObjectHandle) -> Option<String> {
        self.graph
            .borrow()
            .objects
            .get(&handle)
            .map(|object| object.name.clone())
    }
}

impl SceneQuery for HeadlessScene {
    fn find_object_by_tag(&self, tag: &str) -> Option<ObjectHandle> {
        let graph = self.graph.borrow();
        let mut found = None;
        for (handle, object) in graph.objects.iter().filter(|(_, o)| o.tag == tag) {
            let hidden = object.hidden_lookups.get();
            if hidden > 0 {
                object.hidden_lookups.set(hidden - 1);
                continue;
            }
            if found.is_none() {
                found = Some(*handle);
            }
        }
        found
    }

    fn find_objects_by_tag(&self, tag: &str) -> Vec<ObjectHandle> {
        self.graph
            .borrow()
            .objects
            .iter()
            .filter(|(_, object)| object.tag == tag && object.hidden_lookups.get() == 0)
            .map(|(handle, _)| *handle)
            .collect()
    }

    fn map_root_components(&self, handle: ObjectHandle) -> Option<MapRootComponents> {
        self.graph
            .borrow()
            .objects
            .get(&handle)
            .and_then(|object| object.root.clone())
    }

    /// Removes the object together with everything parented to it.
    fn destroy(&mut self, handle: ObjectHandle) {
        self.graph.borrow_mut().remove_with_children(handle);
    }
}

struct DownloadOperation {
    graph: SharedScene,
    map_name: String,
    remaining: u32,
    total: u32,
    error: Option<String>,
}

impl Operation for DownloadOperation {
    fn poll(&mut self) -> OperationStatus {
        if self.remaining > 0 {
            self.remaining -= 1;
            let progress = 1.0 - self.remaining as f32 / self.total.max(1) as f32;
            if self.remaining > 0 {
                return OperationStatus::Pending { progress };
            }
        }

        match self.error.take() {
            Some(error) => OperationStatus::Failed { error },
            None => {
                self.graph.borrow_mut().streamed.insert(self.map_name.clone());
                OperationStatus::Done
            }
        }
    }
}

struct SceneLoadOperation {
    graph: SharedScene,
    asset: Option<MapAsset>,
    map_name: String,
    remaining: u32,
    total: u32,
    fail: bool,
}

impl Operation for SceneLoadOperation {
    fn poll(&mut self) -> OperationStatus {
        if self.remaining > 0 {
            self.remaining -= 1;
            if self.remaining > 0 {
                let progress = 1.0 - self.remaining as f32 / self.total.max(1) as f32;
                return OperationStatus::Pending { progress };
            }
        }

        let loadable = self.graph.borrow().streamed.contains(&self.map_name);
        let asset = match self.asset.take() {
            Some(asset) if loadable && !self.fail => asset,
            _ => {
                return OperationStatus::Failed {
                    error: format!("Map can not be loaded: {}", self.map_name),
                }
            }
        };

        self.graph.borrow_mut().instantiate(&asset);
        OperationStatus::Done
    }
}

/// In-memory asset provider backed by a fixed catalog
pub struct HeadlessMaps {
    graph: SharedScene,
    catalog: HashMap<String, MapAsset>,
    ready_after: u32,
    ready_queries: Cell<u32>,
    download_polls: u32,
    scene_load_polls: u32,
    failing_downloads: HashSet<String>,
    failing_loads: HashSet<String>,
    cached: HashSet<(String, u32)>,
    downloads: Vec<(String, u32)>,
}

impl HeadlessMaps {
    pub fn new(scene: &HeadlessScene) -> Self {
        Self {
            graph: Rc::clone(&scene.graph),
            catalog: HashMap::new(),
            ready_after: 0,
            ready_queries: Cell::new(0),
            download_polls: 1,
            scene_load_polls: 1,
            failing_downloads: HashSet::new(),
            failing_loads: HashSet::new(),
            cached: HashSet::new(),
            downloads: Vec::new(),
        }
    }

    /// Registers a map that ships with the client build.
    pub fn add_local(&mut self, asset: MapAsset) {
        self.graph.borrow_mut().streamed.insert(asset.name.clone());
        self.catalog.insert(asset.name.clone(), asset);
    }

    /// Registers a map that has to be downloaded before it can load.
    pub fn add_remote(&mut self, asset: MapAsset) {
        self.catalog.insert(asset.name.clone(), asset);
    }

    /// `is_ready` answers false this many times before turning true.
    pub fn set_ready_after(&mut self, queries: u32) {
        self.ready_after = queries;
        self.ready_queries.set(0);
    }

    pub fn set_download_polls(&mut self, polls: u32) {
        self.download_polls = polls;
    }

    pub fn set_scene_load_polls(&mut self, polls: u32) {
        self.scene_load_polls = polls;
    }

    pub fn fail_download(&mut self, map_name: &str) {
        self.failing_downloads.insert(map_name.to_string());
    }

    pub fn fail_scene_load(&mut self, map_name: &str) {
        self.failing_loads.insert(map_name.to_string());
    }

    pub fn ready_queries(&self) -> u32 {
        self.ready_queries.get()
    }

    pub fn downloads(&self) -> &[(String, u32)] {
        &self.downloads
    }

    fn asset_by_url(&self, url: &str) -> Option<&MapAsset> {
        self.catalog.values().find(|asset| asset.url() == url)
    }
}

impl MapProvider for HeadlessMaps {
    fn is_ready(&self) -> bool {
        let queries = self.ready_queries.get() + 1;
        self.ready_queries.set(queries);
        queries > self.ready_after
    }

    fn map_url(&self, map_name: &str) -> String {
        self.catalog
            .get(map_name)
            .map(MapAsset::url)
            .unwrap_or_else(|| format!("{}/{}.unity3d", ASSET_BASE_URL, map_name))
    }

    fn map_version(&self, map_name: &str) -> u32 {
        self.catalog.get(map_name).map_or(0, |asset| asset.version)
    }

    fn can_be_loaded_locally(&self, map_name: &str) -> bool {
        self.graph.borrow().streamed.contains(map_name)
    }

    fn download_cached_or_fresh(&mut self, url: &str, version: u32) -> AsyncStep {
        self.downloads.push((url.to_string(), version));

        let (map_name, error) = match self.asset_by_url(url) {
            Some(asset) if self.failing_downloads.contains(&asset.name) => {
                (asset.name.clone(), Some(format!("Couldn't resolve {}", url)))
            }
            Some(asset) => (asset.name.clone(), None),
            None => (String::new(), Some(format!("404 Not Found: {}", url))),
        };

        let cached = error.is_none() && self.cached.contains(&(url.to_string(), version));
        if error.is_none() {
            self.cached.insert((url.to_string(), version));
        }

        let polls = if cached { 0 } else { self.download_polls };
        AsyncStep::from_operation(
            AsyncStepKind::Download,
            Box::new(DownloadOperation {
                graph: Rc::clone(&self.graph),
                map_name,
                remaining: polls,
                total: polls,
                error,
            }),
        )
    }

    fn load_scene_additive_async(&mut self, map_name: &str) -> AsyncStep {
        AsyncStep::from_operation(
            AsyncStepKind::SceneLoad,
            Box::new(SceneLoadOperation {
                graph: Rc::clone(&self.graph),
                asset: self.catalog.get(map_name).cloned(),
                map_name: map_name.to_string(),
                remaining: self.scene_load_polls,
                total: self.scene_load_polls,
                fail: self.failing_loads.contains(map_name),
            }),
        )
    }
}

#[derive(Debug, Default)]
pub struct RecordingMusic {
    pub played: Vec<MusicCategory>,
}

impl MusicPlayer for RecordingMusic {
    fn play_category(&mut self, category: &MusicCategory) {
        debug!("Playing music category '{}'", category.0);
        self.played.push(category.clone());
    }
}

#[derive(Debug, Default)]
pub struct RecordingParty {
    pub spawn_updates: u32,
}

impl PartySpawns for RecordingParty {
    fn update_spawn_points(&mut self) {
        self.spawn_updates += 1;
    }
}

pub struct HeadlessHost<N = HeadlessNetwork> {
    pub network: N,
    pub maps: HeadlessMaps,
    pub scene: HeadlessScene,
    pub music: RecordingMusic,
    pub party: RecordingParty,
}

impl<N: NetworkLayer> HeadlessHost<N> {
    pub fn new(network: N) -> Self {
        let scene = HeadlessScene::new();
        let maps = HeadlessMaps::new(&scene);
        Self {
            network,
            maps,
            scene,
            music: RecordingMusic::default(),
            party: RecordingParty::default(),
        }
    }

    /// Starting town ships with the client, the arena has to be downloaded.
    pub fn with_default_catalog(network: N) -> Self {
        let mut host = Self::new(network);
        host.maps.add_local(town_asset());
        host.maps.add_remote(arena_asset());
        host
    }
}

impl<N: NetworkLayer> TransitionHost for HeadlessHost<N> {
    fn network(&mut self) -> &mut dyn NetworkLayer {
        &mut self.network
    }

    fn maps(&mut self) -> &mut dyn MapProvider {
        &mut self.maps
    }

    fn scene(&mut self) -> &mut dyn SceneQuery {
        &mut self.scene
    }

    fn music(&mut self) -> &mut dyn MusicPlayer {
        &mut self.music
    }

    fn party(&mut self) -> &mut dyn PartySpawns {
        &mut self.party
    }
}

pub fn town_asset() -> MapAsset {
    MapAsset::new(
        STARTING_MAP,
        3,
        Some(MapRootComponents {
            bounds: Bounds::new(Vec3::new(-120.0, 0.0, -120.0), Vec3::new(120.0, 40.0, 120.0)),
            has_occlusion_area: true,
            music: Some(MusicCategory("Town".to_string())),
            intro: Some(MapIntro {
                title: STARTING_MAP.to_string(),
                subtitle: "Where it all begins".to_string(),
            }),
        }),
    )
    .with_npcs(4)
}

pub fn arena_asset() -> MapAsset {
    MapAsset::new(
        "Tournament Field",
        7,
        Some(MapRootComponents {
            bounds: Bounds::new(Vec3::new(-60.0, 0.0, -60.0), Vec3::new(60.0, 25.0, 60.0)),
            has_occlusion_area: false,
            music: Some(MusicCategory("Arena".to_string())),
            intro: None,
        }),
    )
    .with_npcs(2)
}
