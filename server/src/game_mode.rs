//! Server-side game modes

use log::info;
use shared::ServerType;
use std::time::{Duration, Instant};

/// How often the server runs the game mode update.
pub const GAME_MODE_UPDATE_INTERVAL: Duration = Duration::from_secs(1);

/// Periodic game rules of a server instance.
pub trait GameMode: Send + Sync {
    fn name(&self) -> &'static str;

    /// Called once per [`GAME_MODE_UPDATE_INTERVAL`]. Returns true when the
    /// server should shut down.
    fn update(&mut self, player_count: usize, now: Instant) -> bool;
}

/// Free-for-all servers are spun up on demand and stop once everybody has
/// left.
#[derive(Debug)]
pub struct FfaGameMode {
    empty_grace: Duration,
    had_players: bool,
    empty_since: Option<Instant>,
}

impl FfaGameMode {
    pub fn new(empty_grace: Duration) -> Self {
        Self {
            empty_grace,
            had_players: false,
            empty_since: None,
        }
    }

    fn check_shutdown(&mut self, player_count: usize, now: Instant) -> bool {
        if player_count > 0 {
            self.had_players = true;
            self.empty_since = None;
            return false;
        }

        // A fresh server waits for its first player indefinitely.
        if !self.had_players {
            return false;
        }

        let since = *self.empty_since.get_or_insert(now);
        if now.saturating_duration_since(since) >= self.empty_grace {
            info!(
                "Server empty for {:?}, shutting down",
                now.saturating_duration_since(since)
            );
            return true;
        }
        false
    }
}

impl GameMode for FfaGameMode {
    fn name(&self) -> &'static str {
        "FFA"
    }

    fn update(&mut self, player_count: usize, now: Instant) -> bool {
        self.check_shutdown(player_count, now)
    }
}

/// Picks the game mode for a server type. Towns, worlds and arenas run
/// without one.
pub fn game_mode_for(server_type: ServerType, empty_grace: Duration) -> Option<Box<dyn GameMode>> {
    match server_type {
        ServerType::Ffa => Some(Box::new(FfaGameMode::new(empty_grace))),
        ServerType::Town | ServerType::World | ServerType::Arena => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRACE: Duration = Duration::from_secs(5);

    #[test]
    fn test_empty_server_waits_for_first_player() {
        let mut mode = FfaGameMode::new(GRACE);
        let start = Instant::now();

        for secs in 0..60 {
            assert!(!mode.update(0, start + Duration::from_secs(secs)));
        }
    }

    #[test]
    fn test_shuts_down_after_grace() {
        let mut mode = FfaGameMode::new(GRACE);
        let start = Instant::now();

        assert!(!mode.update(2, start));
        assert!(!mode.update(0, start + Duration::from_secs(1)));
        assert!(!mode.update(0, start + Duration::from_secs(5)));
        assert!(mode.update(0, start + Duration::from_secs(6)));
    }

    #[test]
    fn test_rejoining_player_resets_grace() {
        let mut mode = FfaGameMode::new(GRACE);
        let start = Instant::now();

        mode.update(1, start);
        mode.update(0, start + Duration::from_secs(1));
        assert!(!mode.update(1, start + Duration::from_secs(4)));
        assert!(!mode.update(0, start + Duration::from_secs(7)));
        assert!(!mode.update(0, start + Duration::from_secs(11)));
        assert!(mode.update(0, start + Duration::from_secs(12)));
    }

    #[test]
    fn test_game_mode_selection() {
        assert_eq!(
            game_mode_for(ServerType::Ffa, GRACE).map(|mode| mode.name()),
            Some("FFA")
        );
        assert!(game_mode_for(ServerType::Town, GRACE).is_none());
        assert!(game_mode_for(ServerType::Arena, GRACE).is_none());
    }
}
