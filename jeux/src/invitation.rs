//! A directed, two-party invitation handshake, optionally carrying a
//! live [`Game`].
//!
//! The same invitation is referenced by both endpoint clients, each under
//! its own locally-assigned id — the cycle `client -> invitation ->
//! client` is broken explicitly by [`close`](Invitation::close) plus the
//! client's `remove_invitation`, never by relying on any form of garbage
//! collection (spec.md §9's "cyclic references" design note).

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::client::{Client, ClientId};
use crate::error::JeuxError;
use crate::game::{Game, Role};

/// Where an invitation sits in its handshake lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvitationState {
    /// Created, awaiting the target's accept/decline, or the source's revoke.
    Open,
    /// Accepted; a game is live.
    Accepted,
    /// Terminal: revoked, declined, resigned, or the game ended normally.
    Closed,
}

/// A pending or active handshake between a `source` and a `target` client.
pub struct Invitation {
    source: Arc<Client>,
    target: Arc<Client>,
    source_role: Role,
    target_role: Role,
    state: InvitationState,
    game: Option<Arc<Mutex<Game>>>,
}

impl Invitation {
    /// Creates a fresh `Open` invitation. Fails if `source` and `target`
    /// are the same client, or if the two roles are not distinct and
    /// non-null.
    pub fn new(
        source: Arc<Client>,
        target: Arc<Client>,
        source_role: Role,
        target_role: Role,
    ) -> Result<Self, JeuxError> {
        if source.id() == target.id() {
            return Err(JeuxError::Protocol("invitation source and target must differ"));
        }
        if source_role == Role::Null || target_role == Role::Null || source_role == target_role {
            return Err(JeuxError::Protocol("invitation roles must be distinct and non-null"));
        }
        Ok(Invitation {
            source,
            target,
            source_role,
            target_role,
            state: InvitationState::Open,
            game: None,
        })
    }

    /// The source endpoint's id.
    pub fn source_id(&self) -> ClientId {
        self.source.id()
    }

    /// The target endpoint's id.
    pub fn target_id(&self) -> ClientId {
        self.target.id()
    }

    /// A counted reference to the source client.
    pub fn source(&self) -> Arc<Client> {
        self.source.clone()
    }

    /// A counted reference to the target client.
    pub fn target(&self) -> Arc<Client> {
        self.target.clone()
    }

    /// The role offered to the source.
    pub fn source_role(&self) -> Role {
        self.source_role
    }

    /// The role offered to the target.
    pub fn target_role(&self) -> Role {
        self.target_role
    }

    /// Current lifecycle state.
    pub fn state(&self) -> InvitationState {
        self.state
    }

    /// A counted reference to the live game, if the invitation has been
    /// accepted.
    pub fn game(&self) -> Option<Arc<Mutex<Game>>> {
        self.game.clone()
    }

    /// `OPEN -> ACCEPTED`, creating a fresh game. Fails unless the
    /// invitation is currently `OPEN`.
    pub fn accept(&mut self) -> Result<Arc<Mutex<Game>>, JeuxError> {
        if self.state != InvitationState::Open {
            return Err(JeuxError::IllegalState("invitation is not open"));
        }
        let game = Arc::new(Mutex::new(Game::new()));
        self.game = Some(game.clone());
        self.state = InvitationState::Accepted;
        Ok(game)
    }

    /// Transitions to `CLOSED` from `OPEN` or `ACCEPTED`. If a game is
    /// live (accepted, not yet terminated) and `resigning_role` is not
    /// `Role::Null`, the game is resigned on behalf of that role first.
    /// Closing with `Role::Null` while a game is live and still in
    /// progress fails — the caller must resign or let the game finish
    /// before closing.
    pub async fn close(&mut self, resigning_role: Role) -> Result<(), JeuxError> {
        if self.state == InvitationState::Closed {
            return Err(JeuxError::IllegalState("invitation already closed"));
        }
        if let Some(game) = &self.game {
            let mut game = game.lock().await;
            if !game.is_terminated() {
                if resigning_role == Role::Null {
                    return Err(JeuxError::IllegalState("game still in progress"));
                }
                game.resign(resigning_role)
                    .expect("checked not terminated immediately above");
            }
        }
        self.state = InvitationState::Closed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_support::new_test_client_pair;

    #[tokio::test]
    async fn create_rejects_self_invitation() {
        let (a, _b) = new_test_client_pair().await;
        let err = Invitation::new(a.clone(), a.clone(), Role::First, Role::Second).unwrap_err();
        assert!(matches!(err, JeuxError::Protocol(_)));
    }

    #[tokio::test]
    async fn create_rejects_non_distinct_roles() {
        let (a, b) = new_test_client_pair().await;
        let err = Invitation::new(a, b, Role::First, Role::First).unwrap_err();
        assert!(matches!(err, JeuxError::Protocol(_)));
    }

    #[tokio::test]
    async fn accept_requires_open_state() {
        let (a, b) = new_test_client_pair().await;
        let mut inv = Invitation::new(a, b, Role::First, Role::Second).unwrap();
        inv.accept().unwrap();
        let err = inv.accept().unwrap_err();
        assert!(matches!(err, JeuxError::IllegalState(_)));
    }

    #[tokio::test]
    async fn close_with_null_role_fails_while_game_in_progress() {
        let (a, b) = new_test_client_pair().await;
        let mut inv = Invitation::new(a, b, Role::First, Role::Second).unwrap();
        inv.accept().unwrap();
        let err = inv.close(Role::Null).await.unwrap_err();
        assert!(matches!(err, JeuxError::IllegalState(_)));
        assert_eq!(inv.state(), InvitationState::Accepted);
    }

    #[tokio::test]
    async fn close_resigns_a_live_game() {
        let (a, b) = new_test_client_pair().await;
        let mut inv = Invitation::new(a, b, Role::First, Role::Second).unwrap();
        let game = inv.accept().unwrap();
        inv.close(Role::First).await.unwrap();
        assert_eq!(inv.state(), InvitationState::Closed);
        assert!(game.lock().await.is_terminated());
        assert_eq!(game.lock().await.winner(), Role::Second);
    }

    #[tokio::test]
    async fn close_from_closed_fails() {
        let (a, b) = new_test_client_pair().await;
        let mut inv = Invitation::new(a, b, Role::First, Role::Second).unwrap();
        inv.close(Role::Null).await.unwrap();
        let err = inv.close(Role::Null).await.unwrap_err();
        assert!(matches!(err, JeuxError::IllegalState(_)));
    }
}
