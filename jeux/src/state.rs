//! Process-wide server state shared by every connection task.
//!
//! Grounded on the teacher's `Arc<AppState>` (`lobby.rs`, threaded through
//! `main.rs` via axum's `State` extractor): one handle, built once at
//! startup, cloned into every task that needs it.

use crate::client_registry::ClientRegistry;
use crate::player_registry::PlayerRegistry;

/// Everything a connection's service loop needs beyond its own `Client`.
pub struct ServerState {
    /// Currently-connected clients.
    pub clients: ClientRegistry,
    /// Every player ever seen, with its Elo rating.
    pub players: PlayerRegistry,
}

impl ServerState {
    /// Builds a fresh, empty server state accepting up to
    /// `max_connections` simultaneous clients.
    pub fn new(max_connections: usize) -> Self {
        ServerState {
            clients: ClientRegistry::new(max_connections),
            players: PlayerRegistry::new(),
        }
    }
}
