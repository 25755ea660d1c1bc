//! Hybrid handshake primitives
//!
//! ```text
//! host                              client
//!  │  accept TCP                       │
//!  │──── token (4 bytes, u32 LE) ────▶│  over TCP
//!  │◀─── token (4 bytes, u32 LE) ─────│  over UDP, resent until acked
//!  │──── ack (1 byte, 0x01) ─────────▶│  over UDP
//! ```

use std::time::Duration;

use rand::RngCore;

use crate::timer::TimeoutTimer;

use super::TcpConnection;

/// Size of a token datagram
pub const TOKEN_SIZE: usize = 4;

/// Single-byte datagram acknowledging a token
pub const HANDSHAKE_ACK: u8 = 1;

/// Draw tokens from `rng` until one is not taken
pub fn next_token<R, F>(rng: &mut R, is_taken: F) -> u32
where
    R: RngCore + ?Sized,
    F: Fn(u32) -> bool,
{
    loop {
        let token = rng.next_u32();
        if !is_taken(token) {
            return token;
        }
    }
}

pub fn encode_token(token: u32) -> [u8; TOKEN_SIZE] {
    token.to_le_bytes()
}

/// Token carried by a datagram, if it is exactly token-sized
pub fn decode_token(datagram: &[u8]) -> Option<u32> {
    let bytes: [u8; TOKEN_SIZE] = datagram.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

/// An accepted TCP connection waiting for its UDP token
pub(crate) struct PendingHandshake {
    pub(crate) tcp: TcpConnection,
    pub(crate) token: u32,
    timeout: TimeoutTimer,
}

impl PendingHandshake {
    pub(crate) fn new(tcp: TcpConnection, token: u32, timeout: Duration) -> Self {
        Self {
            tcp,
            token,
            timeout: TimeoutTimer::start_new(timeout),
        }
    }

    pub(crate) fn is_timed_out(&self) -> bool {
        self.timeout.is_timed_out()
    }
}
