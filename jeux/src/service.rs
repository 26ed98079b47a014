//! The per-connection receive/dispatch/reply loop.
//!
//! Grounded on the teacher's `receive_logic_server`/`receive_logic_client`
//! (`processing_module.rs`): read one frame, match its type byte against
//! a fixed set of legal values, log and bail on anything else. Jeux
//! differs in that a single task owns both halves of the connection in
//! sequence (there is no separate send task — the send lock on `Client`
//! plays that role instead), and a non-fatal failure produces a `NACK`
//! reply rather than tearing the connection down.

use std::sync::Arc;

use tokio::net::TcpStream;

use protocol::{ACCEPT, DECLINE, ENDED, INVITE, LOGIN, MOVE, RESIGN, REVOKE, USERS};

use crate::client::{Client, ClientId, MoveOutcome};
use crate::error::JeuxError;
use crate::game::Role;
use crate::state::ServerState;

/// Accepts and fully services one connection: registers a [`Client`],
/// runs the receive loop until the stream closes or a fatal error
/// occurs, then tears the client down.
pub async fn run_connection(stream: TcpStream, state: Arc<ServerState>) {
    if let Err(err) = stream.set_nodelay(true) {
        tracing::warn!(?err, "failed to set TCP_NODELAY");
    }
    let peer_addr = stream.peer_addr().ok();
    let (read_half, write_half) = stream.into_split();
    let client = Arc::new(Client::new(ClientId::next(), write_half));

    if let Err(err) = state.clients.register(client.clone()).await {
        tracing::warn!(?peer_addr, ?err, "rejecting connection: registry is full");
        return;
    }

    tracing::info!(?peer_addr, client_id = ?client.id(), "client connected");
    let outcome = receive_loop(&client, &state, read_half).await;
    tracing::info!(?peer_addr, client_id = ?client.id(), ?outcome, "client disconnected");

    client.logout().await;
    state.clients.unregister(client.id()).await;
}

async fn receive_loop(
    client: &Arc<Client>,
    state: &Arc<ServerState>,
    mut read_half: tokio::net::tcp::OwnedReadHalf,
) -> &'static str {
    loop {
        let (header, payload) = match protocol::recv(&mut read_half).await {
            Ok(pair) => pair,
            Err(protocol::ProtocolError::Eof) => return "connection closed cleanly",
            Err(err) => {
                tracing::warn!(client_id = ?client.id(), ?err, "read error");
                return "read error";
            }
        };

        match dispatch(client, state, header.packet_type, header.id, header.role, &payload).await {
            Ok(Reply::Ack(ack_payload)) => {
                if let Err(err) = client.send_ack(header.id, &ack_payload).await {
                    tracing::warn!(client_id = ?client.id(), ?err, "failed to send ACK");
                    return "write error";
                }
            }
            Ok(Reply::Ended(winner)) => {
                if let Err(err) = client
                    .send_packet(ENDED, header.id, winner.to_wire(), &[])
                    .await
                {
                    tracing::warn!(client_id = ?client.id(), ?err, "failed to send ENDED");
                    return "write error";
                }
            }
            Err(err) => {
                if err.is_fatal() {
                    tracing::warn!(client_id = ?client.id(), ?err, "fatal error, closing connection");
                    return "fatal dispatch error";
                }
                tracing::debug!(client_id = ?client.id(), ?err, "rejecting request");
                if let Err(err) = client.send_nack(header.id).await {
                    tracing::warn!(client_id = ?client.id(), ?err, "failed to send NACK");
                    return "write error";
                }
            }
        }
    }
}

/// The synchronous reply owed to the client that sent the dispatched
/// packet, as opposed to any asynchronous notification already sent to a
/// peer inside the dispatched operation itself.
enum Reply {
    Ack(Vec<u8>),
    Ended(Role),
}

/// Dispatches one received packet to the operation it names. Every packet
/// type besides `LOGIN` requires the connection to already be logged in;
/// an unauthenticated client gets a `NACK` for anything else, the same way
/// the reference server honors only `LOGIN` packets until one succeeds.
async fn dispatch(
    client: &Arc<Client>,
    state: &Arc<ServerState>,
    packet_type: u8,
    id: u8,
    role: u8,
    payload: &[u8],
) -> Result<Reply, JeuxError> {
    if packet_type != LOGIN && client.get_player().await.is_none() {
        return Err(JeuxError::Protocol("not logged in"));
    }

    match packet_type {
        LOGIN => {
            let username =
                std::str::from_utf8(payload).map_err(|_| JeuxError::Protocol("username is not valid UTF-8"))?;
            if username.is_empty() {
                return Err(JeuxError::Protocol("username must not be empty"));
            }
            if state.clients.find_by_username(username).await.is_some() {
                return Err(JeuxError::Protocol("username already connected"));
            }
            let player = state.players.register(username).await;
            client.login(player).await?;
            Ok(Reply::Ack(Vec::new()))
        }

        USERS => {
            let mut body = Vec::new();
            for player in state.clients.logged_in_players().await {
                body.extend_from_slice(player.lock().await.to_string().as_bytes());
            }
            Ok(Reply::Ack(body))
        }

        INVITE => {
            let target_name =
                std::str::from_utf8(payload).map_err(|_| JeuxError::Protocol("target username is not valid UTF-8"))?;
            let source_role = Role::from_wire(role).ok_or(JeuxError::Protocol("invalid role"))?;
            if source_role == Role::Null {
                return Err(JeuxError::Protocol("invite role must be FIRST or SECOND"));
            }
            let target = state
                .clients
                .find_by_username(target_name)
                .await
                .ok_or(JeuxError::NotFound("target is not connected"))?;
            let source_local_id = client.make_invitation(&target, source_role, source_role.other()).await?;
            Ok(Reply::Ack(vec![source_local_id]))
        }

        REVOKE => {
            client.revoke_invitation(id).await?;
            Ok(Reply::Ack(Vec::new()))
        }

        ACCEPT => {
            let board = client.accept_invitation(id).await?;
            Ok(Reply::Ack(board.map(|b| b.to_vec()).unwrap_or_default()))
        }

        DECLINE => {
            client.decline_invitation(id).await?;
            Ok(Reply::Ack(Vec::new()))
        }

        MOVE => {
            let requested_role = Role::from_wire(role).ok_or(JeuxError::Protocol("invalid role"))?;
            match client.make_move(id, requested_role, payload).await? {
                MoveOutcome::Ongoing { board } => Ok(Reply::Ack(board.to_vec())),
                MoveOutcome::Ended { winner } => Ok(Reply::Ended(winner)),
            }
        }

        RESIGN => {
            let winner = client.resign_game(id).await?;
            Ok(Reply::Ended(winner))
        }

        _ => Err(JeuxError::Protocol("unknown or server-only packet type")),
    }
}
