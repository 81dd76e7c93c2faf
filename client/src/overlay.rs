//! Loading overlay fade state machine
//!
//! The overlay covers the screen while a map is swapped. It fades in, runs
//! whatever actions were queued for the moment it becomes fully opaque,
//! freezes the game clock, and fades out again on request. Drawing is left to
//! the renderer, which reads `alpha` and `status_lines` once per frame.

use log::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayPhase {
    Hidden,
    FadingIn,
    Active,
    FadingOut,
}

#[derive(Debug, Clone)]
pub struct OverlayConfig {
    /// Seconds for a full fade in either direction.
    pub fade_time: f32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self { fade_time: 0.5 }
    }
}

/// Global time scale applied to gameplay
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameClock {
    time_scale: f32,
}

impl GameClock {
    pub fn new() -> Self {
        Self { time_scale: 1.0 }
    }

    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    pub fn set_time_scale(&mut self, time_scale: f32) {
        self.time_scale = time_scale.max(0.0);
    }

    pub fn is_frozen(&self) -> bool {
        self.time_scale == 0.0
    }

    /// Gameplay delta for a frame of `dt` real seconds.
    pub fn scaled(&self, dt: f32) -> f32 {
        dt * self.time_scale
    }
}

impl Default for GameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ProgressLine {
    text: String,
    progress: f32,
}

impl ProgressLine {
    fn render(&self) -> String {
        format!("{} {}%", self.text, (self.progress * 100.0) as i32)
    }
}

pub struct LoadingOverlay<A> {
    config: OverlayConfig,
    phase: OverlayPhase,
    alpha: f32,
    status_message: Option<String>,
    status: Option<ProgressLine>,
    download_status: Option<ProgressLine>,
    failure: Option<String>,
    pending: Vec<A>,
    saved_time_scale: Option<f32>,
}

impl<A> LoadingOverlay<A> {
    pub fn new(config: OverlayConfig) -> Self {
        Self {
            config,
            phase: OverlayPhase::Hidden,
            alpha: 0.0,
            status_message: None,
            status: None,
            download_status: None,
            failure: None,
            pending: Vec::new(),
            saved_time_scale: None,
        }
    }

    pub fn phase(&self) -> OverlayPhase {
        self.phase
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn is_active(&self) -> bool {
        self.phase == OverlayPhase::Active
    }

    pub fn is_visible(&self) -> bool {
        self.phase != OverlayPhase::Hidden
    }

    /// Shows the overlay and schedules `on_active` for when it is fully
    /// faded in.
    ///
    /// When the overlay is already active there is nothing to animate and
    /// the action is handed straight back for the caller to run now. While
    /// a fade-in is under way the action joins the queue; a fade-out is
    /// reversed from its current opacity.
    pub fn activate(&mut self, on_active: A) -> Option<A> {
        self.clear_status();

        match self.phase {
            OverlayPhase::Active => return Some(on_active),
            OverlayPhase::FadingIn => {}
            OverlayPhase::Hidden | OverlayPhase::FadingOut => {
                info!("Loading screen enabled");
                self.phase = OverlayPhase::FadingIn;
            }
        }

        self.pending.push(on_active);
        None
    }

    /// Drops queued actions for which `keep` returns false.
    pub fn retain_pending(&mut self, keep: impl FnMut(&A) -> bool) {
        self.pending.retain(keep);
    }

    /// Starts fading out. Normal time flow is restored right away, not once
    /// the fade finishes.
    pub fn deactivate(&mut self, clock: &mut GameClock) {
        if self.phase == OverlayPhase::Hidden {
            return;
        }

        if let Some(time_scale) = self.saved_time_scale.take() {
            info!(
                "Loading screen fading out, setting time scale from {} to {}",
                clock.time_scale(),
                time_scale
            );
            clock.set_time_scale(time_scale);
        }

        if !self.pending.is_empty() {
            warn!(
                "Loading screen hidden before becoming active, dropping {} action(s)",
                self.pending.len()
            );
            self.pending.clear();
        }

        self.phase = OverlayPhase::FadingOut;
    }

    /// Advances the fade by `dt` real seconds. Returns the queued actions
    /// once the overlay turns active.
    pub fn update(&mut self, dt: f32, clock: &mut GameClock) -> Vec<A> {
        let step = if self.config.fade_time > 0.0 {
            dt.max(0.0) / self.config.fade_time
        } else {
            1.0
        };

        match self.phase {
            OverlayPhase::FadingIn => {
                self.alpha = (self.alpha + step).min(1.0);
                if self.alpha >= 1.0 {
                    self.phase = OverlayPhase::Active;
                    self.saved_time_scale = Some(clock.time_scale());
                    clock.set_time_scale(0.0);
                    debug!("Loading screen active, {} action(s) queued", self.pending.len());
                    return std::mem::take(&mut self.pending);
                }
            }
            OverlayPhase::FadingOut => {
                self.alpha = (self.alpha - step).max(0.0);
                if self.alpha <= 0.0 {
                    self.phase = OverlayPhase::Hidden;
                    self.clear_status();
                    info!("Loading screen disabled");
                }
            }
            OverlayPhase::Hidden | OverlayPhase::Active => {}
        }

        Vec::new()
    }

    pub fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
    }

    pub fn update_status(&mut self, text: impl Into<String>, progress: f32) {
        self.status = Some(ProgressLine {
            text: text.into(),
            progress: progress.max(0.0),
        });
    }

    pub fn update_download_status(&mut self, text: impl Into<String>, progress: f32) {
        self.download_status = Some(ProgressLine {
            text: text.into(),
            progress: progress.max(0.0),
        });
    }

    pub fn clear_download_status(&mut self) {
        self.download_status = None;
    }

    pub fn show_failure(&mut self, reason: impl Into<String>) {
        self.failure = Some(reason.into());
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn clear_status(&mut self) {
        self.status_message = None;
        self.status = None;
        self.download_status = None;
        self.failure = None;
    }

    /// Text lines for the renderer, top to bottom.
    pub fn status_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(message) = &self.status_message {
            lines.push(message.clone());
        }
        if let Some(failure) = &self.failure {
            lines.push(format!("Error: {}", failure));
        }
        if let Some(status) = &self.status {
            lines.push(status.render());
        }
        if let Some(download) = &self.download_status {
            lines.push(download.render());
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn overlay() -> LoadingOverlay<&'static str> {
        LoadingOverlay::new(OverlayConfig { fade_time: 0.5 })
    }

    fn fade_in(overlay: &mut LoadingOverlay<&'static str>, clock: &mut GameClock) -> Vec<&'static str> {
        for _ in 0..100 {
            let fired = overlay.update(0.1, clock);
            if overlay.is_active() {
                return fired;
            }
        }
        panic!("overlay never became active");
    }

    #[test]
    fn test_fade_in_runs_action_and_freezes_time() {
        let mut overlay = overlay();
        let mut clock = GameClock::new();

        assert!(overlay.activate("begin").is_none());
        assert_eq!(overlay.phase(), OverlayPhase::FadingIn);

        assert!(overlay.update(0.2, &mut clock).is_empty());
        assert_approx_eq!(overlay.alpha(), 0.4);
        assert!(!clock.is_frozen());

        let fired = fade_in(&mut overlay, &mut clock);
        assert_eq!(fired, vec!["begin"]);
        assert_approx_eq!(overlay.alpha(), 1.0);
        assert!(clock.is_frozen());
    }

    #[test]
    fn test_activate_while_active_returns_action_immediately() {
        let mut overlay = overlay();
        let mut clock = GameClock::new();
        overlay.activate("first");
        fade_in(&mut overlay, &mut clock);

        assert_eq!(overlay.activate("again"), Some("again"));
        assert_eq!(overlay.phase(), OverlayPhase::Active);
        assert!(overlay.update(0.1, &mut clock).is_empty());
    }

    #[test]
    fn test_activate_during_fade_in_queues() {
        let mut overlay = overlay();
        let mut clock = GameClock::new();

        overlay.activate("first");
        overlay.update(0.1, &mut clock);
        assert!(overlay.activate("second").is_none());

        assert_eq!(fade_in(&mut overlay, &mut clock), vec!["first", "second"]);
    }

    #[test]
    fn test_round_trip_restores_previous_time_scale() {
        let mut overlay = overlay();
        let mut clock = GameClock::new();
        clock.set_time_scale(0.75);

        overlay.activate("begin");
        fade_in(&mut overlay, &mut clock);
        assert!(clock.is_frozen());

        overlay.deactivate(&mut clock);
        assert_eq!(overlay.phase(), OverlayPhase::FadingOut);
        // Restored as soon as the fade-out starts.
        assert_approx_eq!(clock.time_scale(), 0.75);

        overlay.update(0.2, &mut clock);
        assert_approx_eq!(overlay.alpha(), 0.6);
        for _ in 0..10 {
            overlay.update(0.1, &mut clock);
        }
        assert_eq!(overlay.phase(), OverlayPhase::Hidden);
        assert_approx_eq!(overlay.alpha(), 0.0);
        assert_approx_eq!(clock.time_scale(), 0.75);
    }

    #[test]
    fn test_deactivate_during_fade_in_drops_actions() {
        let mut overlay = overlay();
        let mut clock = GameClock::new();

        overlay.activate("begin");
        overlay.update(0.1, &mut clock);
        overlay.deactivate(&mut clock);
        assert!(!clock.is_frozen());

        for _ in 0..10 {
            assert!(overlay.update(0.1, &mut clock).is_empty());
        }
        assert_eq!(overlay.phase(), OverlayPhase::Hidden);
    }

    #[test]
    fn test_activate_during_fade_out_reverses() {
        let mut overlay = overlay();
        let mut clock = GameClock::new();
        overlay.activate("first");
        fade_in(&mut overlay, &mut clock);
        overlay.deactivate(&mut clock);
        overlay.update(0.1, &mut clock);
        assert_approx_eq!(overlay.alpha(), 0.8);

        assert!(overlay.activate("second").is_none());
        assert_eq!(overlay.phase(), OverlayPhase::FadingIn);
        assert_eq!(overlay.update(0.1, &mut clock), vec!["second"]);
    }

    #[test]
    fn test_deactivate_when_hidden_is_noop() {
        let mut overlay = overlay();
        let mut clock = GameClock::new();
        overlay.deactivate(&mut clock);
        assert_eq!(overlay.phase(), OverlayPhase::Hidden);
        assert_approx_eq!(clock.time_scale(), 1.0);
    }

    #[test]
    fn test_zero_fade_time_completes_in_one_update() {
        let mut overlay = LoadingOverlay::new(OverlayConfig { fade_time: 0.0 });
        let mut clock = GameClock::new();
        overlay.activate(1u8);
        assert_eq!(overlay.update(0.0, &mut clock), vec![1]);
    }

    #[test]
    fn test_status_lines() {
        let mut overlay = overlay();
        overlay.set_status_message("Teleporting to: Tournament Field");
        overlay.update_status("Loading map: Tournament Field...", 0.456);
        overlay.update_download_status("Downloading map: Tournament Field...", -1.0);

        assert_eq!(
            overlay.status_lines(),
            vec![
                "Teleporting to: Tournament Field".to_string(),
                "Loading map: Tournament Field... 45%".to_string(),
                "Downloading map: Tournament Field... 0%".to_string(),
            ]
        );

        overlay.clear_download_status();
        overlay.show_failure("Map can not be loaded");
        let lines = overlay.status_lines();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "Error: Map can not be loaded");
        assert_eq!(overlay.failure(), Some("Map can not be loaded"));
    }

    #[test]
    fn test_activate_clears_status() {
        let mut overlay = overlay();
        overlay.set_status_message("old");
        overlay.show_failure("old failure");
        overlay.activate("begin");
        assert!(overlay.status_lines().is_empty());
    }

    #[test]
    fn test_clock_scaling() {
        let mut clock = GameClock::new();
        assert_approx_eq!(clock.scaled(0.016), 0.016);
        clock.set_time_scale(-2.0);
        assert!(clock.is_frozen());
        assert_approx_eq!(clock.scaled(0.016), 0.0);
    }
}
