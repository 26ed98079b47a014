//! The set of currently-connected clients, keyed by [`ClientId`].
//!
//! Grounded on the teacher's `AppState` (`lobby.rs`): a single
//! `Mutex`-guarded map as the one source of truth for "who is connected
//! right now", built fresh at startup and handed around as an `Arc`. The
//! `wait_for_empty` barrier has no teacher analogue — it is the async
//! substitute for a pthread condition variable a synchronous server would
//! use to let its main thread block until every connection has drained
//! before exiting. `shutdown_all` is the other half of graceful shutdown:
//! it kicks every service loop's blocked read so it can notice the
//! process is exiting and unwind on its own.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

use crate::client::{Client, ClientId};
use crate::error::JeuxError;
use crate::player_registry::PlayerHandle;

/// Registry of connected clients, process-wide and long-lived.
pub struct ClientRegistry {
    clients: Mutex<HashMap<ClientId, Arc<Client>>>,
    capacity: usize,
    empty: Notify,
}

impl ClientRegistry {
    /// Creates an empty registry accepting up to `capacity` simultaneous
    /// connections.
    pub fn new(capacity: usize) -> Self {
        ClientRegistry {
            clients: Mutex::new(HashMap::new()),
            capacity,
            empty: Notify::new(),
        }
    }

    /// Admits `client`. Fails with [`JeuxError::Full`] if the registry is
    /// already at capacity.
    pub async fn register(&self, client: Arc<Client>) -> Result<(), JeuxError> {
        let mut clients = self.clients.lock().await;
        if clients.len() >= self.capacity {
            return Err(JeuxError::Full);
        }
        clients.insert(client.id(), client);
        Ok(())
    }

    /// Removes a client. Wakes any task blocked in [`Self::wait_for_empty`]
    /// once the registry has drained.
    pub async fn unregister(&self, id: ClientId) {
        let mut clients = self.clients.lock().await;
        clients.remove(&id);
        if clients.is_empty() {
            self.empty.notify_waiters();
        }
    }

    /// Looks up a connected client by id.
    pub async fn lookup(&self, id: ClientId) -> Option<Arc<Client>> {
        self.clients.lock().await.get(&id).cloned()
    }

    /// Finds the connected client currently logged in as `username`, if
    /// any. Used to reject a second simultaneous login under the same
    /// name and to resolve `INVITE` targets by username.
    pub async fn find_by_username(&self, username: &str) -> Option<Arc<Client>> {
        let clients = self.clients.lock().await;
        for client in clients.values() {
            if let Some(player) = client.get_player().await {
                if player.lock().await.username() == username {
                    return Some(client.clone());
                }
            }
        }
        None
    }

    /// Every logged-in player currently connected, for the `USERS` reply.
    pub async fn logged_in_players(&self) -> Vec<PlayerHandle> {
        let clients = self.clients.lock().await;
        let mut players = Vec::with_capacity(clients.len());
        for client in clients.values() {
            if let Some(player) = client.get_player().await {
                players.push(player);
            }
        }
        players
    }

    /// Half-closes the read side of every connected client's socket so
    /// each one's service loop observes EOF on its next read and exits on
    /// its own. Does not remove anything from the table itself — each
    /// service loop unregisters its own client as part of normal
    /// connection teardown. Holding the registry lock for the duration is
    /// fine: each shutdown is a single non-blocking syscall.
    pub async fn shutdown_all(&self) {
        let clients = self.clients.lock().await;
        for client in clients.values() {
            client.shutdown_read().await;
        }
    }

    /// Blocks until the registry has no connected clients. If it is
    /// already empty, returns immediately. Used during shutdown to let
    /// every in-flight connection finish before the process exits.
    pub async fn wait_for_empty(&self) {
        loop {
            let notified = self.empty.notified();
            if self.clients.lock().await.is_empty() {
                return;
            }
            notified.await;
        }
    }
}
