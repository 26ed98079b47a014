//! Structured error kinds shared across dispatch.
//!
//! Mirrors the teacher's habit of logging at the error site
//! (`tracing::error!`/`tracing::warn!` calls scattered through
//! `hand_shake.rs` and `message_relay.rs`) and then translating the
//! failure into a protocol-level outcome one layer up. Here that
//! translation is `JeuxError::is_fatal()` plus the dispatch table in
//! `service.rs`, which NACKs on everything non-fatal and tears the
//! connection down otherwise.

use thiserror::Error;

/// Every way a client-facing operation can fail.
#[derive(Debug, Error)]
pub enum JeuxError {
    /// The underlying stream failed or the registry ran out of slots;
    /// terminal for the connection.
    #[error("I/O error: {0}")]
    Io(#[from] protocol::ProtocolError),
    /// A well-formed packet is forbidden in the client's current state
    /// (e.g. `LOGIN` sent twice, an action attempted before login).
    #[error("protocol violation: {0}")]
    Protocol(&'static str),
    /// An invitation or game operation was attempted in the wrong state.
    #[error("illegal state: {0}")]
    IllegalState(&'static str),
    /// A move was rejected by the game.
    #[error("illegal move")]
    IllegalMove,
    /// An unknown user or invitation id was referenced.
    #[error("not found: {0}")]
    NotFound(&'static str),
    /// The client registry is at capacity.
    #[error("server full")]
    Full,
}

impl JeuxError {
    /// `true` if this error should terminate the connection (vs. simply
    /// being reported back as a `NACK`).
    pub fn is_fatal(&self) -> bool {
        matches!(self, JeuxError::Io(_) | JeuxError::Full)
    }
}

impl From<crate::game::GameError> for JeuxError {
    fn from(err: crate::game::GameError) -> Self {
        match err {
            crate::game::GameError::IllegalMove => JeuxError::IllegalMove,
            crate::game::GameError::IllegalState => JeuxError::IllegalState("game already terminated"),
            crate::game::GameError::MalformedMove => JeuxError::IllegalMove,
        }
    }
}
