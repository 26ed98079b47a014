//! The wire protocol for the Jeux game server.
//!
//! A packet is a fixed-size header followed by an optional payload of raw
//! bytes. All multi-byte header fields are big-endian. This crate only
//! knows how to move bytes across the wire; it has no opinion on what a
//! given packet type means to the game logic above it.
//!
//! ```text
//! +--------+----+------+------+----------------+-----------------+---------+
//! |  type  | id | role | size | timestamp_sec  | timestamp_nsec  | payload |
//! |   u8   | u8 |  u8  | u16  |      u32        |      u32        |  size   |
//! +--------+----+------+------+----------------+-----------------+---------+
//! ```

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the fixed header in bytes: 1 + 1 + 1 + 2 + 4 + 4.
pub const HEADER_SIZE: usize = 13;

/// Reserved; invalid on the wire.
pub const NONE: u8 = 0;
/// C->S. Payload = username bytes; no NUL required.
pub const LOGIN: u8 = 1;
/// C->S. Empty payload.
pub const USERS: u8 = 2;
/// C->S. Payload = target username; `role` = requested source role.
pub const INVITE: u8 = 3;
/// C->S. `id` identifies an OPEN invitation where self is source.
pub const REVOKE: u8 = 4;
/// C->S. `id` identifies an OPEN invitation where self is target.
pub const ACCEPT: u8 = 5;
/// C->S. `id` identifies an OPEN invitation where self is target.
pub const DECLINE: u8 = 6;
/// C->S. `id` identifies a live game on this client; payload = digit '1'..'9'.
pub const MOVE: u8 = 7;
/// C->S. `id` identifies a live game on this client.
pub const RESIGN: u8 = 8;
/// S->C. Positive reply; payload optional.
pub const ACK: u8 = 9;
/// S->C. Negative reply.
pub const NACK: u8 = 10;
/// S->C (async). New invitation arrived.
pub const INVITED: u8 = 11;
/// S->C (async). Source revoked an invitation.
pub const REVOKED: u8 = 12;
/// S->C (async). Target accepted.
pub const ACCEPTED: u8 = 13;
/// S->C (async). Target declined.
pub const DECLINED: u8 = 14;
/// S->C (async). Opponent moved.
pub const MOVED: u8 = 15;
/// S->C (async). Opponent resigned.
pub const RESIGNED: u8 = 16;
/// S->C (both sides). Game terminated; `role` = winning role (0 = draw).
pub const ENDED: u8 = 17;

/// No role / not applicable.
pub const NULL_ROLE: u8 = 0;
/// The first player to move.
pub const FIRST_PLAYER_ROLE: u8 = 1;
/// The second player to move.
pub const SECOND_PLAYER_ROLE: u8 = 2;

/// Maximum payload size representable in the 16-bit `size` field.
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

/// Errors that can occur while moving packets across the wire.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The underlying stream reported an I/O error, or a read/write was short.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The stream reached a clean end-of-file before a full packet was read.
    #[error("end of stream")]
    Eof,
    /// A declared payload size exceeds what the header's `size` field can hold.
    #[error("payload of {0} bytes exceeds the maximum of {MAX_PAYLOAD_SIZE}")]
    PayloadTooLarge(usize),
}

/// The fixed-size packet header, network byte order on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Packet type, one of the constants at the top of this module.
    pub packet_type: u8,
    /// Invitation id within the receiving client's namespace (0 if n/a).
    pub id: u8,
    /// Game role (0 = none, 1 = first, 2 = second).
    pub role: u8,
    /// Payload length in bytes.
    pub size: u16,
    /// Wall clock seconds.
    pub timestamp_sec: u32,
    /// Wall clock nanoseconds.
    pub timestamp_nsec: u32,
}

impl Header {
    /// Builds a header for a packet carrying `payload_len` bytes, stamping
    /// the current wall-clock time.
    pub fn new(packet_type: u8, id: u8, role: u8, payload_len: usize) -> Result<Self, ProtocolError> {
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge(payload_len));
        }
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Ok(Header {
            packet_type,
            id,
            role,
            size: payload_len as u16,
            timestamp_sec: now.as_secs() as u32,
            timestamp_nsec: now.subsec_nanos(),
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.packet_type);
        buf.put_u8(self.id);
        buf.put_u8(self.role);
        buf.put_u16(self.size);
        buf.put_u32(self.timestamp_sec);
        buf.put_u32(self.timestamp_nsec);
    }

    fn decode(mut raw: &[u8]) -> Self {
        Header {
            packet_type: raw.get_u8(),
            id: raw.get_u8(),
            role: raw.get_u8(),
            size: raw.get_u16(),
            timestamp_sec: raw.get_u32(),
            timestamp_nsec: raw.get_u32(),
        }
    }
}

/// Writes a header followed by its payload as a single write.
///
/// Callers that must keep packets atomic on a shared stream (the Jeux
/// server's per-client send lock) should hold their own serialization lock
/// across this call; the codec itself does not lock anything.
pub async fn send<W: AsyncWrite + Unpin>(
    stream: &mut W,
    header: &Header,
    payload: &[u8],
) -> Result<(), ProtocolError> {
    debug_assert_eq!(payload.len(), header.size as usize, "header.size must match payload.len()");
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    header.encode(&mut buf);
    buf.put_slice(payload);
    stream.write_all(&buf).await?;
    Ok(())
}

/// Reads exactly one header, then exactly `size` bytes of payload if
/// `size > 0`. A clean EOF before any header bytes arrive is reported as
/// [`ProtocolError::Eof`]; a short read anywhere else (mid-header or
/// mid-payload) is an [`ProtocolError::Io`].
pub async fn recv<R: AsyncRead + Unpin>(
    stream: &mut R,
) -> Result<(Header, Vec<u8>), ProtocolError> {
    let mut header_buf = [0u8; HEADER_SIZE];
    let mut total_read = 0;
    while total_read < HEADER_SIZE {
        let n = stream.read(&mut header_buf[total_read..]).await?;
        if n == 0 {
            if total_read == 0 {
                return Err(ProtocolError::Eof);
            }
            return Err(ProtocolError::Io(std::io::Error::from(
                std::io::ErrorKind::UnexpectedEof,
            )));
        }
        total_read += n;
    }
    let header = Header::decode(&header_buf);

    let mut payload = vec![0u8; header.size as usize];
    if !payload.is_empty() {
        stream.read_exact(&mut payload).await?;
    }
    Ok((header, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn round_trip_with_payload() {
        let (mut client, mut server) = duplex(4096);
        let header = Header::new(LOGIN, 0, NULL_ROLE, 5).unwrap();
        let payload = b"alice".to_vec();

        send(&mut client, &header, &payload).await.unwrap();
        let (got_header, got_payload) = recv(&mut server).await.unwrap();

        assert_eq!(got_header.packet_type, LOGIN);
        assert_eq!(got_header.size, 5);
        assert_eq!(got_payload, payload);
    }

    #[tokio::test]
    async fn round_trip_empty_payload() {
        let (mut client, mut server) = duplex(4096);
        let header = Header::new(USERS, 0, NULL_ROLE, 0).unwrap();

        send(&mut client, &header, &[]).await.unwrap();
        let (got_header, got_payload) = recv(&mut server).await.unwrap();

        assert_eq!(got_header.packet_type, USERS);
        assert!(got_payload.is_empty());
    }

    #[tokio::test]
    async fn clean_eof_before_any_bytes() {
        let (client, mut server) = duplex(4096);
        drop(client);
        let err = recv(&mut server).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Eof));
    }

    #[tokio::test]
    async fn short_read_mid_header_is_io_error() {
        let (mut client, mut server) = duplex(4096);
        client.write_all(&[LOGIN, 0, 0]).await.unwrap();
        drop(client);
        let err = recv(&mut server).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Io(_)));
    }

    #[tokio::test]
    async fn payload_too_large_is_rejected() {
        let err = Header::new(LOGIN, 0, NULL_ROLE, MAX_PAYLOAD_SIZE + 1).unwrap_err();
        assert!(matches!(err, ProtocolError::PayloadTooLarge(_)));
    }
}
