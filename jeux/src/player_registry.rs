//! Interns [`Player`]s by username. Single process-wide instance,
//! initialized at startup and outliving every client.
//!
//! Grounded on the teacher's `AppState.configs: RwLock<HashMap<...>>`
//! (`lobby.rs`) for the "single mutex-guarded map, process-wide" shape;
//! unlike that config table this one grows over the server's lifetime
//! and never shrinks, matching spec.md's "never destroyed while the
//! registry holds it" lifecycle.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::player::Player;

/// Shared, lockable handle to one player's mutable rating.
pub type PlayerHandle = Arc<Mutex<Player>>;

/// Process-wide table of known players, keyed by username.
#[derive(Default)]
pub struct PlayerRegistry {
    players: Mutex<HashMap<String, PlayerHandle>>,
}

impl PlayerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        PlayerRegistry::default()
    }

    /// Returns the existing player for `name`, or interns a fresh one at
    /// the initial rating. Byte-exact, case-sensitive match on username.
    pub async fn register(&self, name: &str) -> PlayerHandle {
        let mut players = self.players.lock().await;
        if let Some(existing) = players.get(name) {
            return existing.clone();
        }
        let handle = Arc::new(Mutex::new(Player::new(name.to_string())));
        players.insert(name.to_string(), handle.clone());
        handle
    }

    /// Looks up a player without creating one.
    pub async fn find(&self, name: &str) -> Option<PlayerHandle> {
        self.players.lock().await.get(name).cloned()
    }

    /// Orders two player handles by username (the stable substitute for
    /// "lower address first") and runs `f` with both locked in that
    /// order, avoiding AB/BA deadlock when two clients touch the same
    /// pair of players concurrently. The two handles must be distinct
    /// players (guaranteed by invitations requiring distinct endpoint
    /// clients, each holding at most one logged-in player).
    pub async fn with_both_locked<F, R>(a: &PlayerHandle, b: &PlayerHandle, f: F) -> R
    where
        F: FnOnce(&mut Player, &mut Player) -> R,
    {
        debug_assert!(!Arc::ptr_eq(a, b), "post_result between a player and itself");

        // Snapshot names one lock at a time to decide order without ever
        // holding both locks simultaneously during the comparison.
        let a_name = a.lock().await.username().to_string();
        let b_name = b.lock().await.username().to_string();

        if a_name <= b_name {
            let mut a_guard = a.lock().await;
            let mut b_guard = b.lock().await;
            f(&mut a_guard, &mut b_guard)
        } else {
            let mut b_guard = b.lock().await;
            let mut a_guard = a.lock().await;
            f(&mut a_guard, &mut b_guard)
        }
    }
}
