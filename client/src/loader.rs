//! Secure level loading: overlay first, map transition once it covers the
//! screen.

use crate::error::TransitionError;
use crate::overlay::{GameClock, LoadingOverlay, OverlayConfig};
use crate::services::TransitionHost;
use crate::transition::{
    CompletionCallback, MapRuntimeInfo, MapTransitionController, TransitionConfig, TransitionStep,
};
use log::{error, info};
use std::fmt;
use std::time::Instant;

/// Work the overlay runs once it is fully faded in
pub enum LoaderAction {
    BeginTransition {
        map_name: String,
        on_loaded: Option<CompletionCallback>,
    },
    ShowStatus(String),
}

impl fmt::Debug for LoaderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoaderAction::BeginTransition { map_name, .. } => {
                write!(f, "BeginTransition({})", map_name)
            }
            LoaderAction::ShowStatus(message) => write!(f, "ShowStatus({})", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoaderEvent {
    MapLoaded { map_name: String },
    MapLoadFailed { map_name: String, error: TransitionError },
}

pub struct MapLoader {
    overlay: LoadingOverlay<LoaderAction>,
    controller: MapTransitionController,
    /// Requested map waiting for the overlay to finish fading in.
    pending_map: Option<String>,
    reported: bool,
}

impl MapLoader {
    pub fn new(transition: TransitionConfig, overlay: OverlayConfig) -> Self {
        Self {
            overlay: LoadingOverlay::new(overlay),
            controller: MapTransitionController::new(transition),
            pending_map: None,
            reported: true,
        }
    }

    pub fn overlay(&self) -> &LoadingOverlay<LoaderAction> {
        &self.overlay
    }

    pub fn controller(&self) -> &MapTransitionController {
        &self.controller
    }

    pub fn runtime(&self) -> &MapRuntimeInfo {
        self.controller.runtime()
    }

    pub fn set_pvp(&mut self, pvp: bool) {
        self.controller.set_pvp(pvp);
    }

    pub fn is_busy(&self) -> bool {
        self.pending_map.is_some() || self.controller.is_active()
    }

    /// Covers the screen and switches to `map_name` once it is covered.
    pub fn secure_load_level(
        &mut self,
        host: &mut dyn TransitionHost,
        map_name: &str,
        on_loaded: Option<CompletionCallback>,
        now: Instant,
    ) -> Result<(), TransitionError> {
        if map_name.is_empty() {
            return Err(TransitionError::EmptyMapName);
        }
        if let Some(busy_with) = self.busy_with() {
            return Err(TransitionError::AlreadyInProgress(busy_with));
        }

        info!("SecureLoadLevel: {}", map_name);
        self.pending_map = Some(map_name.to_string());

        let action = LoaderAction::BeginTransition {
            map_name: map_name.to_string(),
            on_loaded,
        };
        match self.overlay.activate(action) {
            Some(action) => self.run_action(host, action, now),
            None => Ok(()),
        }
    }

    /// Covers the screen without loading anything, showing `message` once
    /// the overlay is up.
    pub fn show_loading_screen(&mut self, message: impl Into<String>) {
        if let Some(LoaderAction::ShowStatus(message)) =
            self.overlay.activate(LoaderAction::ShowStatus(message.into()))
        {
            self.overlay.set_status_message(message);
        }
    }

    /// Fades the overlay out. Left to the caller so the screen only clears
    /// once the new map is ready to be seen.
    /// Hiding before the overlay is up also drops the queued load.
    pub fn hide(&mut self, clock: &mut GameClock) {
        self.overlay.deactivate(clock);
        self.pending_map = None;
    }

    pub fn cancel(&mut self) {
        if self.pending_map.take().is_some() {
            self.overlay
                .retain_pending(|action| !matches!(action, LoaderAction::BeginTransition { .. }));
        }
        self.controller.cancel();
    }

    /// Advances the fade and the transition by one tick.
    pub fn update(
        &mut self,
        host: &mut dyn TransitionHost,
        clock: &mut GameClock,
        dt: f32,
        now: Instant,
    ) -> Option<LoaderEvent> {
        for action in self.overlay.update(dt, clock) {
            if let Err(e) = self.run_action(host, action, now) {
                error!("Failed to start map transition: {}", e);
            }
        }

        self.controller.poll(host, now);
        self.mirror_status();
        self.take_event()
    }

    fn busy_with(&self) -> Option<String> {
        if let Some(map) = &self.pending_map {
            return Some(map.clone());
        }
        self.controller
            .state()
            .filter(|_| self.controller.is_active())
            .map(|state| state.target_map_name().to_string())
    }

    fn run_action(
        &mut self,
        host: &mut dyn TransitionHost,
        action: LoaderAction,
        now: Instant,
    ) -> Result<(), TransitionError> {
        match action {
            LoaderAction::BeginTransition {
                map_name,
                on_loaded,
            } => {
                info!("Starting loading process for {}", map_name);
                self.pending_map = None;
                self.controller.begin(host, &map_name, on_loaded, now)?;
                self.reported = false;
                Ok(())
            }
            LoaderAction::ShowStatus(message) => {
                self.overlay.set_status_message(message);
                Ok(())
            }
        }
    }

    fn mirror_status(&mut self) {
        let status = match self.controller.status() {
            Some(status) if !self.reported => status,
            _ => return,
        };

        if status.step == TransitionStep::Failed {
            let reason = self
                .controller
                .state()
                .and_then(|state| state.failure())
                .map_or_else(|| status.step.label().to_string(), |e| e.to_string());
            self.overlay.clear_download_status();
            self.overlay.show_failure(reason);
            return;
        }

        match status.download_progress {
            Some(progress) => {
                let text = format!("Downloading map: {}...", status.map_name);
                self.overlay.update_download_status(text, progress);
            }
            None => {
                self.overlay.clear_download_status();
                let text = format!("{}: {}...", status.step.label(), status.map_name);
                self.overlay.update_status(text, status.progress);
            }
        }
    }

    fn take_event(&mut self) -> Option<LoaderEvent> {
        if self.reported {
            return None;
        }

        let state = self.controller.state()?;
        let map_name = state.target_map_name().to_string();
        let event = match state.current_step() {
            TransitionStep::Completed => LoaderEvent::MapLoaded { map_name },
            TransitionStep::Failed => LoaderEvent::MapLoadFailed {
                map_name,
                error: state
                    .failure()
                    .cloned()
                    .unwrap_or_else(|| TransitionError::Cancelled(state.target_map_name().to_string())),
            },
            _ => return None,
        };

        self.reported = true;
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{HeadlessHost, HeadlessNetwork};
    use crate::overlay::OverlayPhase;
    use shared::STARTING_MAP;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;
    use tokio_test::assert_ok;

    const ARENA: &str = "Tournament Field";
    const DT: f32 = 0.1;

    fn loader() -> MapLoader {
        MapLoader::new(TransitionConfig::default(), OverlayConfig { fade_time: 0.3 })
    }

    fn tick_until_event(
        loader: &mut MapLoader,
        host: &mut HeadlessHost,
        clock: &mut GameClock,
        now: &mut Instant,
    ) -> LoaderEvent {
        for _ in 0..500 {
            *now += Duration::from_millis(100);
            if let Some(event) = loader.update(host, clock, DT, *now) {
                return event;
            }
        }
        panic!("loader never reported an outcome");
    }

    #[test]
    fn test_transition_starts_only_after_fade_in() {
        let mut host = HeadlessHost::with_default_catalog(HeadlessNetwork::connected());
        let mut loader = loader();
        let mut clock = GameClock::new();
        let now = Instant::now();

        assert_ok!(loader.secure_load_level(&mut host, STARTING_MAP, None, now));
        assert!(loader.is_busy());
        assert!(loader.controller().state().is_none());
        assert_eq!(host.network.disconnect_requests(), 0);

        loader.update(&mut host, &mut clock, DT, now);
        loader.update(&mut host, &mut clock, DT, now);
        assert_eq!(loader.overlay().phase(), OverlayPhase::FadingIn);
        assert!(loader.controller().state().is_none());

        let event = loader.update(&mut host, &mut clock, DT, now);
        assert_eq!(loader.overlay().phase(), OverlayPhase::Active);
        assert!(clock.is_frozen());
        assert_eq!(
            event,
            Some(LoaderEvent::MapLoaded {
                map_name: STARTING_MAP.to_string()
            })
        );
        assert_eq!(host.network.disconnect_requests(), 1);
    }

    #[test]
    fn test_full_load_then_hide() {
        let mut host = HeadlessHost::with_default_catalog(HeadlessNetwork::with_disconnect_delay(4));
        host.maps.set_download_polls(5);
        let mut loader = loader();
        let mut clock = GameClock::new();
        let mut now = Instant::now();
        let loaded = Rc::new(Cell::new(false));
        let flag = Rc::clone(&loaded);

        assert_ok!(loader.secure_load_level(
            &mut host,
            ARENA,
            Some(Box::new(move || flag.set(true))),
            now
        ));

        let event = tick_until_event(&mut loader, &mut host, &mut clock, &mut now);
        assert_eq!(
            event,
            LoaderEvent::MapLoaded {
                map_name: ARENA.to_string()
            }
        );
        assert!(loaded.get());
        assert!(!loader.is_busy());
        assert_eq!(loader.runtime().map_name.as_deref(), Some(ARENA));
        assert_eq!(
            loader.overlay().status_lines(),
            vec![format!("Map loaded: {}... 100%", ARENA)]
        );

        // Only reported once.
        assert!(loader.update(&mut host, &mut clock, DT, now).is_none());

        loader.hide(&mut clock);
        assert!(!clock.is_frozen());
        for _ in 0..5 {
            loader.update(&mut host, &mut clock, DT, now);
        }
        assert_eq!(loader.overlay().phase(), OverlayPhase::Hidden);
    }

    #[test]
    fn test_download_progress_is_mirrored() {
        let mut host = HeadlessHost::with_default_catalog(HeadlessNetwork::connected());
        host.maps.set_download_polls(4);
        let mut loader = MapLoader::new(TransitionConfig::default(), OverlayConfig { fade_time: 0.0 });
        let mut clock = GameClock::new();
        let now = Instant::now();

        assert_ok!(loader.secure_load_level(&mut host, ARENA, None, now));
        // Fade-in, disconnect, readiness check and the first download poll.
        loader.update(&mut host, &mut clock, DT, now);

        let lines = loader.overlay().status_lines();
        assert!(lines
            .iter()
            .any(|line| line == &format!("Downloading map: {}... 25%", ARENA)));
    }

    #[test]
    fn test_second_request_while_busy_is_rejected() {
        let mut host = HeadlessHost::with_default_catalog(HeadlessNetwork::connected());
        let mut loader = loader();
        let now = Instant::now();

        assert_ok!(loader.secure_load_level(&mut host, STARTING_MAP, None, now));
        let result = loader.secure_load_level(&mut host, ARENA, None, now);
        assert_eq!(
            result,
            Err(TransitionError::AlreadyInProgress(STARTING_MAP.to_string()))
        );
    }

    #[test]
    fn test_failure_is_reported_and_shown() {
        let mut host = HeadlessHost::with_default_catalog(HeadlessNetwork::connected());
        host.maps.fail_download(ARENA);
        let mut loader = loader();
        let mut clock = GameClock::new();
        let mut now = Instant::now();

        assert_ok!(loader.secure_load_level(&mut host, ARENA, None, now));
        let event = tick_until_event(&mut loader, &mut host, &mut clock, &mut now);

        match event {
            LoaderEvent::MapLoadFailed { map_name, error } => {
                assert_eq!(map_name, ARENA);
                assert!(matches!(error, TransitionError::SceneLoadFailed { .. }));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(loader.overlay().failure().is_some());
        assert!(!loader.is_busy());
    }

    #[test]
    fn test_loading_screen_message_then_load() {
        let mut host = HeadlessHost::with_default_catalog(HeadlessNetwork::connected());
        let mut loader = loader();
        let mut clock = GameClock::new();
        let mut now = Instant::now();

        loader.show_loading_screen("Teleporting to: Tutorial");
        for _ in 0..3 {
            loader.update(&mut host, &mut clock, DT, now);
        }
        assert_eq!(loader.overlay().phase(), OverlayPhase::Active);
        assert_eq!(
            loader.overlay().status_lines(),
            vec!["Teleporting to: Tutorial".to_string()]
        );

        // Already active: the transition begins without another fade.
        assert_ok!(loader.secure_load_level(&mut host, STARTING_MAP, None, now));
        assert!(loader.controller().is_active());

        let event = tick_until_event(&mut loader, &mut host, &mut clock, &mut now);
        assert!(matches!(event, LoaderEvent::MapLoaded { .. }));
    }

    #[test]
    fn test_cancel_reports_failure() {
        let mut host = HeadlessHost::with_default_catalog(HeadlessNetwork::unresponsive());
        let mut loader = loader();
        let mut clock = GameClock::new();
        let mut now = Instant::now();

        assert_ok!(loader.secure_load_level(&mut host, STARTING_MAP, None, now));
        for _ in 0..3 {
            loader.update(&mut host, &mut clock, DT, now);
        }
        assert!(loader.controller().is_active());

        loader.cancel();
        let event = tick_until_event(&mut loader, &mut host, &mut clock, &mut now);
        assert!(matches!(
            event,
            LoaderEvent::MapLoadFailed {
                error: TransitionError::Cancelled(_),
                ..
            }
        ));
    }

    #[test]
    fn test_cancel_during_fade_in_drops_queued_load() {
        let mut host = HeadlessHost::with_default_catalog(HeadlessNetwork::connected());
        host.maps.add_local(crate::headless::arena_asset());
        let mut loader = loader();
        let mut clock = GameClock::new();
        let mut now = Instant::now();

        assert_ok!(loader.secure_load_level(&mut host, STARTING_MAP, None, now));
        loader.update(&mut host, &mut clock, DT, now);
        assert_eq!(loader.overlay().phase(), OverlayPhase::FadingIn);

        loader.cancel();
        assert!(!loader.is_busy());
        for _ in 0..5 {
            now += Duration::from_millis(100);
            assert_eq!(loader.update(&mut host, &mut clock, DT, now), None);
        }
        assert_eq!(loader.overlay().phase(), OverlayPhase::Active);
        assert!(loader.controller().state().is_none());
        assert_eq!(host.network.disconnect_requests(), 0);

        assert_ok!(loader.secure_load_level(&mut host, ARENA, None, now));
        let event = tick_until_event(&mut loader, &mut host, &mut clock, &mut now);
        assert_eq!(
            event,
            LoaderEvent::MapLoaded {
                map_name: ARENA.to_string()
            }
        );
        assert_eq!(host.network.disconnect_requests(), 1);
    }

    #[test]
    fn test_hide_during_fade_in_releases_loader() {
        let mut host = HeadlessHost::with_default_catalog(HeadlessNetwork::connected());
        let mut loader = loader();
        let mut clock = GameClock::new();
        let mut now = Instant::now();

        assert_ok!(loader.secure_load_level(&mut host, STARTING_MAP, None, now));
        loader.update(&mut host, &mut clock, DT, now);
        loader.hide(&mut clock);
        assert!(!loader.is_busy());

        for _ in 0..10 {
            now += Duration::from_millis(100);
            assert_eq!(loader.update(&mut host, &mut clock, DT, now), None);
        }
        assert_eq!(loader.overlay().phase(), OverlayPhase::Hidden);
        assert!(!clock.is_frozen());
        assert!(loader.controller().state().is_none());

        assert_ok!(loader.secure_load_level(&mut host, STARTING_MAP, None, now));
        let event = tick_until_event(&mut loader, &mut host, &mut clock, &mut now);
        assert!(matches!(event, LoaderEvent::MapLoaded { .. }));
    }
}
