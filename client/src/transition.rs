//! Map transition state machine
//!
//! Switching maps is a fixed sequence of steps, some of which wait on
//! collaborators that finish on their own schedule:
//!
//! 1. `Disconnecting`: ask the network layer to disconnect and wait until the
//!    peer reports fully disconnected (bounded by `disconnect_timeout`)
//! 2. `TearingDownOldMap`: destroy the previous map root
//! 3. `ResolvingAvailability`: check whether the map can be loaded locally
//! 4. `Downloading`: wait for the asset provider, then download the map
//! 5. `LoadingScene`: additive asynchronous scene load
//! 6. `ResolvingMapRoot`: look the map root up by tag, retrying a bounded
//!    number of times at a fixed interval
//! 7. `PostLoadFixup`: bounds, occlusion, music, spawn points, NPC cleanup
//! 8. `Completed`: resume inbound messages and fire the completion callback
//!
//! The controller never blocks. `poll` runs every step that can finish
//! immediately and returns as soon as it reaches one that has to wait.

use crate::error::TransitionError;
use crate::gate::{GateState, SessionGate, SessionRole};
use crate::services::{MapIntro, ObjectHandle, PeerState, TransitionHost};
use crate::step::{AsyncStep, AsyncStepKind};
use log::{debug, error, info, warn};
use shared::{Bounds, Vec3, MAP_ROOT_ATTEMPTS, MAP_ROOT_RETRY_INTERVAL_MS, MAP_TAG, NPC_TAG};
use std::fmt;
use std::time::{Duration, Instant};

pub type CompletionCallback = Box<dyn FnOnce()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionStep {
    Disconnecting,
    TearingDownOldMap,
    ResolvingAvailability,
    Downloading,
    LoadingScene,
    ResolvingMapRoot,
    PostLoadFixup,
    Completed,
    Failed,
}

impl TransitionStep {
    fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TransitionStep::Completed | TransitionStep::Failed)
    }

    pub fn label(self) -> &'static str {
        match self {
            TransitionStep::Disconnecting => "Disconnecting from the server",
            TransitionStep::TearingDownOldMap => "Unloading previous map",
            TransitionStep::ResolvingAvailability => "Checking map",
            TransitionStep::Downloading => "Downloading map",
            TransitionStep::LoadingScene => "Loading map",
            TransitionStep::ResolvingMapRoot => "Locating map",
            TransitionStep::PostLoadFixup => "Preparing map",
            TransitionStep::Completed => "Map loaded",
            TransitionStep::Failed => "Map loading failed",
        }
    }
}

impl fmt::Display for TransitionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone)]
pub struct TransitionConfig {
    pub role: SessionRole,
    /// Player-vs-player sessions strip NPCs from freshly loaded maps.
    pub pvp: bool,
    pub disconnect_timeout: Duration,
    pub map_root_attempts: u32,
    pub map_root_retry_interval: Duration,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            role: SessionRole::Client,
            pvp: false,
            disconnect_timeout: Duration::from_secs(10),
            map_root_attempts: MAP_ROOT_ATTEMPTS,
            map_root_retry_interval: Duration::from_millis(MAP_ROOT_RETRY_INTERVAL_MS),
        }
    }
}

/// Resolved state of the currently loaded map
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapRuntimeInfo {
    pub map_name: Option<String>,
    pub map_root: Option<ObjectHandle>,
    /// Only meaningful while `map_root` is set.
    pub bounds: Option<Bounds>,
    pub occlusion_active: bool,
    pub intro: Option<MapIntro>,
}

impl MapRuntimeInfo {
    pub fn is_loaded(&self) -> bool {
        self.map_root.is_some()
    }

    /// Keeps a position inside the map bounds. Positions pass through
    /// unchanged while no bounds are known.
    pub fn stay_in_bounds(&self, position: Vec3) -> Vec3 {
        match &self.bounds {
            Some(bounds) => bounds.clamp_point(position),
            None => position,
        }
    }
}

/// Run record of one transition
pub struct MapTransitionState {
    target_map_name: String,
    current_step: TransitionStep,
    active_step: Option<AsyncStep>,
    retry_count: u32,
    completion: Option<CompletionCallback>,
    step_started_at: Instant,
    next_attempt_at: Option<Instant>,
    /// Set once the provider has been asked for the map archive.
    download_requested: bool,
    warnings: Vec<TransitionError>,
    failure: Option<TransitionError>,
}

impl MapTransitionState {
    fn new(target_map_name: String, completion: Option<CompletionCallback>, now: Instant) -> Self {
        Self {
            target_map_name,
            current_step: TransitionStep::Disconnecting,
            active_step: None,
            retry_count: 0,
            completion,
            step_started_at: now,
            next_attempt_at: None,
            download_requested: false,
            warnings: Vec::new(),
            failure: None,
        }
    }

    pub fn target_map_name(&self) -> &str {
        &self.target_map_name
    }

    pub fn current_step(&self) -> TransitionStep {
        self.current_step
    }

    pub fn active_step(&self) -> Option<&AsyncStep> {
        self.active_step.as_ref()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Soft failures that were logged and skipped over.
    pub fn warnings(&self) -> &[TransitionError] {
        &self.warnings
    }

    pub fn failure(&self) -> Option<&TransitionError> {
        self.failure.as_ref()
    }

    fn advance_to(&mut self, next: TransitionStep, now: Instant) {
        debug_assert!(
            next.ordinal() > self.current_step.ordinal(),
            "transition step regressed from {:?} to {:?}",
            self.current_step,
            next
        );
        debug!(
            "[{}] {:?} -> {:?}",
            self.target_map_name, self.current_step, next
        );
        self.current_step = next;
        self.step_started_at = now;
        self.active_step = None;
    }

    fn fail(&mut self, error: TransitionError) {
        error!("[{}] {}", self.target_map_name, error);
        self.current_step = TransitionStep::Failed;
        self.active_step = None;
        // Never invoked on failure.
        self.completion = None;
        self.failure = Some(error);
    }
}

impl fmt::Debug for MapTransitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapTransitionState")
            .field("target_map_name", &self.target_map_name)
            .field("current_step", &self.current_step)
            .field("active_step", &self.active_step)
            .field("retry_count", &self.retry_count)
            .field("warnings", &self.warnings)
            .field("failure", &self.failure)
            .finish()
    }
}

/// Snapshot of progress for status displays
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionStatus {
    pub map_name: String,
    pub step: TransitionStep,
    pub progress: f32,
    pub download_progress: Option<f32>,
}

enum Flow {
    Continue,
    Wait,
}

pub struct MapTransitionController {
    config: TransitionConfig,
    gate: SessionGate,
    runtime: MapRuntimeInfo,
    state: Option<MapTransitionState>,
}

impl MapTransitionController {
    pub fn new(config: TransitionConfig) -> Self {
        Self {
            gate: SessionGate::new(config.role),
            config,
            runtime: MapRuntimeInfo::default(),
            state: None,
        }
    }

    pub fn config(&self) -> &TransitionConfig {
        &self.config
    }

    pub fn set_pvp(&mut self, pvp: bool) {
        self.config.pvp = pvp;
    }

    pub fn runtime(&self) -> &MapRuntimeInfo {
        &self.runtime
    }

    pub fn gate_state(&self) -> GateState {
        self.gate.state()
    }

    /// Latest run record, including finished ones.
    pub fn state(&self) -> Option<&MapTransitionState> {
        self.state.as_ref()
    }

    pub fn current_step(&self) -> Option<TransitionStep> {
        self.state.as_ref().map(|state| state.current_step)
    }

    pub fn is_active(&self) -> bool {
        self.state
            .as_ref()
            .map_or(false, |state| !state.current_step.is_terminal())
    }

    pub fn status(&self) -> Option<TransitionStatus> {
        let state = self.state.as_ref()?;
        let progress = match state.current_step {
            TransitionStep::Completed => 1.0,
            TransitionStep::ResolvingMapRoot => {
                state.retry_count as f32 / self.config.map_root_attempts.max(1) as f32
            }
            _ => state.active_step.as_ref().map_or(0.0, AsyncStep::progress),
        };
        let download_progress = state
            .active_step
            .as_ref()
            .filter(|step| step.kind() == AsyncStepKind::Download)
            .map(AsyncStep::progress);

        Some(TransitionStatus {
            map_name: state.target_map_name.clone(),
            step: state.current_step,
            progress,
            download_progress,
        })
    }

    /// Starts switching to `target_map_name`.
    ///
    /// Rejected with `AlreadyInProgress` while another transition is still
    /// running; nothing is touched in that case.
    pub fn begin(
        &mut self,
        host: &mut dyn TransitionHost,
        target_map_name: &str,
        completion: Option<CompletionCallback>,
        now: Instant,
    ) -> Result<(), TransitionError> {
        if target_map_name.is_empty() {
            return Err(TransitionError::EmptyMapName);
        }
        if let Some(state) = self.state.as_ref().filter(|s| !s.current_step.is_terminal()) {
            warn!(
                "Refusing to load '{}' while '{}' is loading",
                target_map_name, state.target_map_name
            );
            return Err(TransitionError::AlreadyInProgress(
                state.target_map_name.clone(),
            ));
        }

        info!("Loading {}, starting disconnection", target_map_name);
        let mut state = MapTransitionState::new(target_map_name.to_string(), completion, now);

        let network = host.network();
        self.gate.suspend(network);
        network.disconnect();
        state.active_step = Some(AsyncStep::driven(AsyncStepKind::Disconnect));

        self.state = Some(state);
        Ok(())
    }

    /// Advances the active transition as far as it can go without waiting.
    /// Returns the step it stopped at, or `None` when nothing was started.
    pub fn poll(&mut self, host: &mut dyn TransitionHost, now: Instant) -> Option<TransitionStep> {
        let mut state = self.state.take()?;

        loop {
            let step = state.current_step;
            let flow = match step {
                TransitionStep::Disconnecting => self.wait_for_disconnect(&mut state, host, now),
                TransitionStep::TearingDownOldMap => self.tear_down_old_map(&mut state, host, now),
                TransitionStep::ResolvingAvailability => {
                    self.resolve_availability(&mut state, host, now)
                }
                TransitionStep::Downloading => self.download(&mut state, host, now),
                TransitionStep::LoadingScene => self.load_scene(&mut state, host, now),
                TransitionStep::ResolvingMapRoot => self.resolve_map_root(&mut state, host, now),
                TransitionStep::PostLoadFixup => self.post_load_fixup(&mut state, host, now),
                TransitionStep::Completed | TransitionStep::Failed => Flow::Wait,
            };

            if let Flow::Wait = flow {
                self.state = Some(state);
                return Some(step);
            }
        }
    }

    /// Aborts the active transition. Whatever was already torn down or
    /// loaded stays that way.
    pub fn cancel(&mut self) {
        if let Some(state) = self.state.as_mut() {
            if !state.current_step.is_terminal() {
                let map = state.target_map_name.clone();
                state.fail(TransitionError::Cancelled(map));
            }
        }
    }

    fn wait_for_disconnect(
        &mut self,
        state: &mut MapTransitionState,
        host: &mut dyn TransitionHost,
        now: Instant,
    ) -> Flow {
        if host.network().peer_state() == PeerState::Disconnected {
            info!("Disconnected from the server successfully");
            state.advance_to(TransitionStep::TearingDownOldMap, now);
            return Flow::Continue;
        }

        let timeout = self.config.disconnect_timeout;
        if now.saturating_duration_since(state.step_started_at) >= timeout {
            state.fail(TransitionError::DisconnectTimeout { timeout });
            return Flow::Continue;
        }

        Flow::Wait
    }

    fn tear_down_old_map(
        &mut self,
        state: &mut MapTransitionState,
        host: &mut dyn TransitionHost,
        now: Instant,
    ) -> Flow {
        let scene = host.scene();
        let old_root = self
            .runtime
            .map_root
            .or_else(|| scene.find_object_by_tag(MAP_TAG));

        if let Some(handle) = old_root {
            info!("Deleting old map");
            scene.destroy(handle);
        }
        self.runtime = MapRuntimeInfo::default();

        state.advance_to(TransitionStep::ResolvingAvailability, now);
        Flow::Continue
    }

    fn resolve_availability(
        &mut self,
        state: &mut MapTransitionState,
        host: &mut dyn TransitionHost,
        now: Instant,
    ) -> Flow {
        info!("[{}] Checking scene", state.target_map_name);

        if host.maps().can_be_loaded_locally(&state.target_map_name) {
            info!("[{}] Map can be loaded", state.target_map_name);
            state.advance_to(TransitionStep::LoadingScene, now);
        } else {
            state.advance_to(TransitionStep::Downloading, now);
        }
        Flow::Continue
    }

    fn download(
        &mut self,
        state: &mut MapTransitionState,
        host: &mut dyn TransitionHost,
        now: Instant,
    ) -> Flow {
        let maps = host.maps();

        if !state.download_requested {
            let waiting = state
                .active_step
                .get_or_insert_with(|| AsyncStep::driven(AsyncStepKind::Generic));

            // URL and version are meaningless until version info is in.
            if !maps.is_ready() {
                return Flow::Wait;
            }
            waiting.complete();

            let map = &state.target_map_name;
            let url = maps.map_url(map);
            let version = maps.map_version(map);
            info!("Downloading map '{}' version {} from {}", map, version, url);
            state.active_step = Some(maps.download_cached_or_fresh(&url, version));
            state.download_requested = true;
            return Flow::Continue;
        }

        let finished = state.active_step.as_mut().map_or(true, AsyncStep::poll);
        if !finished {
            return Flow::Wait;
        }
        let error = state
            .active_step
            .as_ref()
            .and_then(AsyncStep::error)
            .map(str::to_string);

        let map = state.target_map_name.clone();
        match error {
            None => info!("Successfully downloaded {}", map),
            Some(details) => {
                let warning = TransitionError::DownloadFailed {
                    map: map.clone(),
                    details,
                };
                error!("{}", warning);
                state.warnings.push(warning);
            }
        }

        if !maps.can_be_loaded_locally(&map) {
            error!("Map can not be loaded: {}", map);
        }

        state.advance_to(TransitionStep::LoadingScene, now);
        Flow::Continue
    }

    fn load_scene(
        &mut self,
        state: &mut MapTransitionState,
        host: &mut dyn TransitionHost,
        now: Instant,
    ) -> Flow {
        let map = state.target_map_name.clone();

        if state.active_step.is_none() {
            info!("Loading map '{}'...", map);
            self.runtime.map_name = Some(map.clone());
            state.active_step = Some(host.maps().load_scene_additive_async(&map));
        }

        let active = match state.active_step.as_mut() {
            Some(active) => active,
            None => return Flow::Wait,
        };

        if !active.poll() {
            return Flow::Wait;
        }

        if let Some(details) = active.error().map(str::to_string) {
            state.fail(TransitionError::SceneLoadFailed { map, details });
            return Flow::Continue;
        }

        info!("Finished loading map: {}", map);
        state.advance_to(TransitionStep::ResolvingMapRoot, now);
        state.retry_count = 0;
        state.next_attempt_at = Some(now);
        state.active_step = Some(AsyncStep::driven(AsyncStepKind::ObjectResolve));
        Flow::Continue
    }

    fn resolve_map_root(
        &mut self,
        state: &mut MapTransitionState,
        host: &mut dyn TransitionHost,
        now: Instant,
    ) -> Flow {
        let attempts = self.config.map_root_attempts.max(1);

        if state.next_attempt_at.map_or(false, |at| now < at) {
            return Flow::Wait;
        }

        state.retry_count += 1;
        let found = host.scene().find_object_by_tag(MAP_TAG);

        if let Some(active) = state.active_step.as_mut() {
            active.report_progress(state.retry_count as f32 / attempts as f32);
        }

        match found {
            Some(root) => {
                debug!("Found map root after {} attempt(s)", state.retry_count);
                self.runtime.map_root = Some(root);
            }
            None if state.retry_count < attempts => {
                warn!("Couldn't find the map, map root is missing: Retrying.");
                // An interval too large to represent retries right away.
                state.next_attempt_at = now.checked_add(self.config.map_root_retry_interval);
                return Flow::Wait;
            }
            None => {
                let warning = TransitionError::MapRootNotFound {
                    map: state.target_map_name.clone(),
                    attempts,
                };
                error!("{}", warning);
                state.warnings.push(warning);
            }
        }

        state.next_attempt_at = None;
        state.advance_to(TransitionStep::PostLoadFixup, now);
        Flow::Continue
    }

    fn post_load_fixup(
        &mut self,
        state: &mut MapTransitionState,
        host: &mut dyn TransitionHost,
        now: Instant,
    ) -> Flow {
        if let Some(root) = self.runtime.map_root {
            match host.scene().map_root_components(root) {
                Some(components) => {
                    info!("Map bounds: {:?}", components.bounds);
                    self.runtime.bounds = Some(components.bounds);
                    self.runtime.intro = components.intro;

                    self.runtime.occlusion_active = components.has_occlusion_area;
                    if components.has_occlusion_area {
                        info!("Occlusion culling information available");
                    } else {
                        info!("Occlusion culling information not available");
                    }

                    if let Some(category) = &components.music {
                        host.music().play_category(category);
                    }
                }
                None => warn!("Map root carries no map components"),
            }

            host.party().update_spawn_points();
        } else {
            warn!("No map root, skipping bounds, music and spawn point updates");
        }

        if self.config.pvp {
            delete_npcs(host);
        }

        self.gate.resume(host.network());
        state.advance_to(TransitionStep::Completed, now);
        info!("Level was loaded: {}", state.target_map_name);

        match state.completion.take() {
            Some(callback) => {
                info!("Calling level load callback");
                callback();
            }
            None => debug!("Level load callback has not been provided"),
        }
        Flow::Continue
    }
}

pub fn delete_npcs(host: &mut dyn TransitionHost) {
    info!("Deleting NPCs...");
    let scene = host.scene();
    for npc in scene.find_objects_by_tag(NPC_TAG) {
        scene.destroy(npc);
    }
    info!("Finished deleting NPCs");
}
