//! A single connected client: its send lock, its logged-in player (if
//! any), and the invitations it currently holds.
//!
//! The send lock is grounded on the teacher's
//! `Arc<Mutex<SplitSink<WebSocket, Message>>>` (`processing_module.rs`,
//! `message_relay.rs`): one lock around the write half, shared by every
//! task that might need to push an unsolicited packet to this client.
//! Unlike the teacher's websocket transport, Jeux speaks its own framing
//! directly over a raw `TcpStream`, so the guarded type is
//! `OwnedWriteHalf` rather than a `SplitSink`.

use std::collections::HashMap;
use std::net::Shutdown;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use socket2::SockRef;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;

use protocol::{ACCEPTED, DECLINED, ENDED, INVITED, MOVED, NULL_ROLE, RESIGNED};

use crate::error::JeuxError;
use crate::game::Role;
use crate::invitation::{Invitation, InvitationState};
use crate::player::GameResult;
use crate::player_registry::{PlayerHandle, PlayerRegistry};

/// Identifies one connected client for the lifetime of its connection.
///
/// Stands in for "peer address" in the lock-ordering discipline: ids are
/// allocated from a monotonic counter, so any two are comparable without
/// reaching into the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(u64);

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

impl ClientId {
    /// Allocates the next unused id. Unique for the life of the process.
    pub fn next() -> ClientId {
        ClientId(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// What happened to a game as a result of a single move.
#[derive(Debug)]
pub enum MoveOutcome {
    /// The game continues; `board` is the post-move serialized state.
    Ongoing {
        /// Fixed 30-byte serialized board, as produced by
        /// [`Game::unparse_state`](crate::game::Game::unparse_state).
        board: [u8; 30],
    },
    /// The move ended the game (a line, or a full board).
    Ended {
        /// The winning role, or `Role::Null` for a draw.
        winner: Role,
    },
}

#[derive(Default)]
struct ClientState {
    player: Option<PlayerHandle>,
    invitations: HashMap<u8, Arc<Mutex<Invitation>>>,
}

/// One connection's worth of server-side state.
pub struct Client {
    id: ClientId,
    write_half: Mutex<OwnedWriteHalf>,
    state: Mutex<ClientState>,
}

impl Client {
    /// Wraps a freshly-accepted connection's write half.
    pub fn new(id: ClientId, write_half: OwnedWriteHalf) -> Self {
        Client {
            id,
            write_half: Mutex::new(write_half),
            state: Mutex::new(ClientState::default()),
        }
    }

    /// This client's id.
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Writes one packet under the send lock. Safe to call concurrently
    /// with other operations on this client: the send lock is
    /// independent of the state lock guarding players and invitations.
    pub async fn send_packet(&self, packet_type: u8, id: u8, role: u8, payload: &[u8]) -> Result<(), JeuxError> {
        let header = protocol::Header::new(packet_type, id, role, payload.len())?;
        let mut write_half = self.write_half.lock().await;
        protocol::send(&mut *write_half, &header, payload).await?;
        Ok(())
    }

    /// Sends a generic positive reply.
    pub async fn send_ack(&self, id: u8, payload: &[u8]) -> Result<(), JeuxError> {
        self.send_packet(protocol::ACK, id, NULL_ROLE, payload).await
    }

    /// Sends a generic negative reply.
    pub async fn send_nack(&self, id: u8) -> Result<(), JeuxError> {
        self.send_packet(protocol::NACK, id, NULL_ROLE, &[]).await
    }

    /// Half-closes the read side of this connection's socket so a read
    /// blocked on the other half (owned by this connection's receive loop)
    /// observes EOF and returns. Shutting down a direction applies to the
    /// underlying socket shared by both split halves, not just the handle
    /// it is called through, so this works even though `Client` never
    /// holds the read half itself. Best-effort: a connection that is
    /// already gone has nothing left to shut down.
    pub async fn shutdown_read(&self) {
        let write_half = self.write_half.lock().await;
        let _ = SockRef::from(&*write_half).shutdown(Shutdown::Read);
    }

    /// Assigns this connection its player identity. Fails if the
    /// connection is already logged in.
    pub async fn login(&self, player: PlayerHandle) -> Result<(), JeuxError> {
        let mut state = self.state.lock().await;
        if state.player.is_some() {
            return Err(JeuxError::Protocol("already logged in"));
        }
        state.player = Some(player);
        Ok(())
    }

    /// The logged-in player, if any.
    pub async fn get_player(&self) -> Option<PlayerHandle> {
        self.state.lock().await.player.clone()
    }

    /// Inserts `invitation` under the smallest id this client is not
    /// currently using.
    async fn add_invitation(&self, invitation: Arc<Mutex<Invitation>>) -> u8 {
        let mut state = self.state.lock().await;
        let mut local_id = 0u8;
        while state.invitations.contains_key(&local_id) {
            local_id += 1;
        }
        state.invitations.insert(local_id, invitation);
        local_id
    }

    /// Looks up an invitation by this client's local id for it.
    pub async fn get_invitation(&self, local_id: u8) -> Option<Arc<Mutex<Invitation>>> {
        self.state.lock().await.invitations.get(&local_id).cloned()
    }

    /// Removes an invitation from this client's table, if present.
    pub async fn remove_invitation(&self, local_id: u8) -> Option<Arc<Mutex<Invitation>>> {
        self.state.lock().await.invitations.remove(&local_id)
    }

    /// Finds this client's own local id for `invitation`, if it holds one.
    pub async fn local_id_for(&self, invitation: &Arc<Mutex<Invitation>>) -> Option<u8> {
        let state = self.state.lock().await;
        state
            .invitations
            .iter()
            .find(|(_, handle)| Arc::ptr_eq(handle, invitation))
            .map(|(local_id, _)| *local_id)
    }

    async fn invitation_snapshot(&self) -> Vec<(u8, Arc<Mutex<Invitation>>)> {
        self.state
            .lock()
            .await
            .invitations
            .iter()
            .map(|(local_id, handle)| (*local_id, handle.clone()))
            .collect()
    }

    /// Creates an invitation from `self` to `target`, offering the two
    /// roles. `target` must already be logged in. Returns the source's
    /// own local id for the new invitation.
    pub async fn make_invitation(
        self: &Arc<Self>,
        target: &Arc<Client>,
        source_role: Role,
        target_role: Role,
    ) -> Result<u8, JeuxError> {
        if target.get_player().await.is_none() {
            return Err(JeuxError::NotFound("target is not logged in"));
        }

        let invitation = Arc::new(Mutex::new(Invitation::new(
            self.clone(),
            target.clone(),
            source_role,
            target_role,
        )?));

        let source_local_id = self.add_invitation(invitation.clone()).await;
        let target_local_id = target.add_invitation(invitation.clone()).await;

        target
            .send_packet(INVITED, target_local_id, target_role.to_wire(), &[])
            .await?;

        Ok(source_local_id)
    }

    /// Revokes an `Open` invitation this client is the source of.
    pub async fn revoke_invitation(&self, local_id: u8) -> Result<(), JeuxError> {
        let invitation = self
            .get_invitation(local_id)
            .await
            .ok_or(JeuxError::NotFound("unknown invitation id"))?;

        let target = {
            let mut inv = invitation.lock().await;
            if inv.source_id() != self.id {
                return Err(JeuxError::Protocol("only the source may revoke an invitation"));
            }
            inv.close(Role::Null).await?;
            inv.target()
        };

        if let Some(target_local_id) = target.local_id_for(&invitation).await {
            target
                .send_packet(protocol::REVOKED, target_local_id, NULL_ROLE, &[])
                .await?;
            target.remove_invitation(target_local_id).await;
        }
        self.remove_invitation(local_id).await;
        Ok(())
    }

    /// Declines an `Open` invitation this client is the target of.
    pub async fn decline_invitation(&self, local_id: u8) -> Result<(), JeuxError> {
        let invitation = self
            .get_invitation(local_id)
            .await
            .ok_or(JeuxError::NotFound("unknown invitation id"))?;

        let source = {
            let mut inv = invitation.lock().await;
            if inv.target_id() != self.id {
                return Err(JeuxError::Protocol("only the target may decline an invitation"));
            }
            inv.close(Role::Null).await?;
            inv.source()
        };

        if let Some(source_local_id) = source.local_id_for(&invitation).await {
            source.send_packet(DECLINED, source_local_id, NULL_ROLE, &[]).await?;
            source.remove_invitation(source_local_id).await;
        }
        self.remove_invitation(local_id).await;
        Ok(())
    }

    /// Accepts an `Open` invitation this client is the target of, starting
    /// a game. Returns the initial board if `self` (the target) holds
    /// `FIRST_PLAYER_ROLE` and so must move first; the source is notified
    /// with `ACCEPTED` directly by this call, carrying the board itself
    /// when the source moves first.
    pub async fn accept_invitation(&self, local_id: u8) -> Result<Option<[u8; 30]>, JeuxError> {
        let invitation = self
            .get_invitation(local_id)
            .await
            .ok_or(JeuxError::NotFound("unknown invitation id"))?;

        let (source, source_role, target_role, game) = {
            let mut inv = invitation.lock().await;
            if inv.target_id() != self.id {
                return Err(JeuxError::Protocol("only the target may accept an invitation"));
            }
            let game = inv.accept()?;
            (inv.source(), inv.source_role(), inv.target_role(), game)
        };

        let board = game.lock().await.unparse_state();

        let source_local_id = source.local_id_for(&invitation).await.expect("source always holds this invitation");
        let source_payload: &[u8] = if source_role == Role::First { &board } else { &[] };
        source
            .send_packet(ACCEPTED, source_local_id, source_role.to_wire(), source_payload)
            .await?;

        Ok(if target_role == Role::First { Some(board) } else { None })
    }

    /// Plays a move on the live game behind `local_id`, as the role this
    /// client was assigned when the invitation was accepted. `role` is
    /// the caller's claim about which role it is moving as, straight off
    /// the wire: it must be `Role::Null` (meaning "my assigned role,
    /// whichever that is") or equal to this client's actual assigned
    /// role, never the other endpoint's — a client can only ever move on
    /// its own behalf, regardless of whose turn the game thinks it is.
    ///
    /// Notifies the opponent with `MOVED`; if the move ends the game,
    /// settles ratings, closes the invitation, and also notifies the
    /// opponent with `ENDED` (the caller's own reply, built by the
    /// dispatcher from the returned [`MoveOutcome`], is its `ENDED` in
    /// that case rather than a plain `ACK`).
    pub async fn make_move(
        &self,
        local_id: u8,
        role: Role,
        text: &[u8],
    ) -> Result<MoveOutcome, JeuxError> {
        let invitation = self
            .get_invitation(local_id)
            .await
            .ok_or(JeuxError::NotFound("unknown invitation id"))?;

        let (game, peer, my_role) = {
            let inv = invitation.lock().await;
            if inv.state() != InvitationState::Accepted {
                return Err(JeuxError::IllegalState("invitation has no live game"));
            }
            let is_source = inv.source_id() == self.id;
            let my_role = if is_source { inv.source_role() } else { inv.target_role() };
            if role != Role::Null && role != my_role {
                return Err(JeuxError::Protocol("a client may only move as its own assigned role"));
            }
            let game = inv.game().expect("an accepted invitation always carries a game");
            let peer = if is_source { inv.target() } else { inv.source() };
            (game, peer, my_role)
        };
        let peer_local_id = peer
            .local_id_for(&invitation)
            .await
            .expect("the opponent always holds a matching invitation entry");

        let (board, ended_winner) = {
            let mut game = game.lock().await;
            let mv = game.parse_move(my_role, text)?;
            game.apply_move(mv)?;
            let board = game.unparse_state();
            let ended = game.is_terminated().then(|| game.winner());
            (board, ended)
        };

        peer.send_packet(MOVED, peer_local_id, my_role.to_wire(), &board).await?;

        match ended_winner {
            None => Ok(MoveOutcome::Ongoing { board }),
            Some(winner) => {
                {
                    let mut inv = invitation.lock().await;
                    inv.close(Role::Null).await.ok();
                }
                settle_rating(&invitation, winner).await;
                peer.send_packet(ENDED, peer_local_id, winner.to_wire(), &[]).await?;
                self.remove_invitation(local_id).await;
                peer.remove_invitation(peer_local_id).await;
                Ok(MoveOutcome::Ended { winner })
            }
        }
    }

    /// Resigns the live game behind `local_id` on this client's behalf.
    /// The opponent wins, gets `RESIGNED` then `ENDED`; ratings are
    /// settled and the invitation closes. Returns the winning role, which
    /// the dispatcher sends back to the caller as its own `ENDED` reply.
    pub async fn resign_game(&self, local_id: u8) -> Result<Role, JeuxError> {
        let invitation = self
            .get_invitation(local_id)
            .await
            .ok_or(JeuxError::NotFound("unknown invitation id"))?;

        let (my_role, peer) = {
            let inv = invitation.lock().await;
            if inv.state() != InvitationState::Accepted {
                return Err(JeuxError::IllegalState("invitation has no live game"));
            }
            let my_role = if inv.source_id() == self.id { inv.source_role() } else { inv.target_role() };
            let peer = if inv.source_id() == self.id { inv.target() } else { inv.source() };
            (my_role, peer)
        };
        let peer_local_id = peer
            .local_id_for(&invitation)
            .await
            .expect("the opponent always holds a matching invitation entry");

        {
            let mut inv = invitation.lock().await;
            inv.close(my_role).await?;
        }
        let winner = my_role.other();
        settle_rating(&invitation, winner).await;

        peer.send_packet(RESIGNED, peer_local_id, my_role.to_wire(), &[]).await?;
        peer.send_packet(ENDED, peer_local_id, winner.to_wire(), &[]).await?;

        self.remove_invitation(local_id).await;
        peer.remove_invitation(peer_local_id).await;

        Ok(winner)
    }

    /// Tears down every invitation this client still holds, treating any
    /// live game as a resignation by `self`, then drops the logged-in
    /// player reference. Best-effort: failures notifying the opponent are
    /// swallowed since the opponent's own connection may be going away at
    /// the same time.
    pub async fn logout(&self) {
        for (local_id, invitation) in self.invitation_snapshot().await {
            let (is_source, state) = {
                let inv = invitation.lock().await;
                (inv.source_id() == self.id, inv.state())
            };

            match state {
                InvitationState::Closed => {}
                InvitationState::Open => {
                    let peer = {
                        let inv = invitation.lock().await;
                        if is_source { inv.target() } else { inv.source() }
                    };
                    if invitation.lock().await.close(Role::Null).await.is_ok() {
                        if let Some(peer_local_id) = peer.local_id_for(&invitation).await {
                            let packet_type = if is_source { protocol::REVOKED } else { DECLINED };
                            let _ = peer.send_packet(packet_type, peer_local_id, NULL_ROLE, &[]).await;
                            peer.remove_invitation(peer_local_id).await;
                        }
                    }
                }
                InvitationState::Accepted => {
                    let (my_role, peer) = {
                        let inv = invitation.lock().await;
                        let role = if is_source { inv.source_role() } else { inv.target_role() };
                        let peer = if is_source { inv.target() } else { inv.source() };
                        (role, peer)
                    };
                    if invitation.lock().await.close(my_role).await.is_ok() {
                        let winner = my_role.other();
                        settle_rating(&invitation, winner).await;
                        if let Some(peer_local_id) = peer.local_id_for(&invitation).await {
                            let _ = peer.send_packet(RESIGNED, peer_local_id, my_role.to_wire(), &[]).await;
                            let _ = peer.send_packet(ENDED, peer_local_id, winner.to_wire(), &[]).await;
                            peer.remove_invitation(peer_local_id).await;
                        }
                    }
                }
            }
            self.remove_invitation(local_id).await;
        }
        self.state.lock().await.player = None;
    }
}

/// Applies the Elo update for a finished game to both endpoints of
/// `invitation`, locking the two players in the fixed order
/// [`PlayerRegistry::with_both_locked`] establishes.
async fn settle_rating(invitation: &Arc<Mutex<Invitation>>, winner: Role) {
    let (first, second) = {
        let inv = invitation.lock().await;
        if inv.source_role() == Role::First {
            (inv.source(), inv.target())
        } else {
            (inv.target(), inv.source())
        }
    };
    let (first_player, second_player) = match (first.get_player().await, second.get_player().await) {
        (Some(a), Some(b)) => (a, b),
        _ => return,
    };
    let result = match winner {
        Role::Null => GameResult::Draw,
        Role::First => GameResult::FirstWon,
        Role::Second => GameResult::SecondWon,
    };
    PlayerRegistry::with_both_locked(&first_player, &second_player, |a, b| {
        crate::player::Player::post_result(a, b, result)
    })
    .await;
}

#[cfg(test)]
pub mod test_support {
    use std::sync::Arc;

    use tokio::net::{TcpListener, TcpStream};

    use super::{Client, ClientId};

    /// Spins up a loopback TCP pair and wraps each half as a [`Client`].
    /// For tests that need two distinct, addressable clients but do not
    /// exercise the wire protocol itself.
    pub async fn new_test_client_pair() -> (Arc<Client>, Arc<Client>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback listener");
        let addr = listener.local_addr().expect("local addr");
        let (connect_result, accept_result) =
            tokio::join!(TcpStream::connect(addr), listener.accept());
        let (_, write_a) = connect_result.expect("connect").into_split();
        let (accepted, _) = accept_result.expect("accept");
        let (_, write_b) = accepted.into_split();

        (
            Arc::new(Client::new(ClientId::next(), write_a)),
            Arc::new(Client::new(ClientId::next(), write_b)),
        )
    }
}
