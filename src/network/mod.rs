//! Network Module
//!
//! Connections, hosts and client connect helpers.
//!
//! ## Architecture
//! - Each connection owns its socket, an inbound and an outbound
//!   `PacketQueue`, and its own receive (and for TCP, send) thread
//! - Hosts run on a `ThreadRun` worker: every tick accepts pending sockets,
//!   publishes them through a poll queue, and prunes dead connections
//! - A hybrid connection pairs a TCP connection with a UDP endpoint; the
//!   pairing is established by echoing a random token over UDP

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::TandemError;
use crate::protocol::{NetContract, Packet};

mod queue;
mod record;
mod tcp;
mod udp;
mod hybrid;
mod host;
mod connect;
pub mod handshake;

pub use queue::PacketQueue;
pub use record::{ByteCounts, ByteRecord};
pub use tcp::TcpConnection;
pub use udp::UdpConnection;
pub use hybrid::HybridConnection;
pub use host::{Host, HostState, HybridHost, TcpHost};
pub use connect::{ConnectProcess, ConnectStep, HybridConnecting, TcpConnecting};

/// Why a connection was closed; the first reason recorded wins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClosingReason {
    #[default]
    None,
    ClosedSelf,
    LostConnection,
    PacketSerializeError,
    HandshakeTimeout,
    UnknownException,
}

impl fmt::Display for ClosingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ClosingReason::None => "none",
            ClosingReason::ClosedSelf => "closed self",
            ClosingReason::LostConnection => "lost connection",
            ClosingReason::PacketSerializeError => "packet serialize error",
            ClosingReason::HandshakeTimeout => "handshake timeout",
            ClosingReason::UnknownException => "unknown exception",
        };
        f.write_str(text)
    }
}

/// Transport a hybrid connection sends a packet over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

/// Where a connection is in its life
///
/// Connections only exist once their transports are paired, so the
/// handshake phase is reported by `ConnectStep` on the client and by
/// `HybridHost::pending_handshake_count` on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Open for sending and receiving
    Active,
    /// Closed, with received packets still waiting to be polled
    Draining,
    /// Closed and drained
    Closed,
}

/// A connection exchanging packets with one peer
///
/// Once closed, sends are dropped but packets already received stay
/// retrievable; a connection is active while it is open or still has
/// inbound packets.
pub trait NetConnection: Send + Sync {
    /// Queue `packet` for transmission; no-op once closed
    fn send(&self, packet: Packet);

    /// Take the oldest received packet
    fn poll_receive_packet(&self) -> Option<Packet>;

    /// Close the connection; later calls keep the first reason and error
    fn close(&self, reason: ClosingReason, error: Option<TandemError>);

    fn packet_available(&self) -> bool;

    fn time_since_last_packet_received(&self) -> Duration;

    fn time_since_last_packet_sent(&self) -> Duration;

    /// Time since creation, frozen at close
    fn time_alive(&self) -> Duration;

    fn local_addr(&self) -> SocketAddr;

    fn remote_addr(&self) -> SocketAddr;

    fn is_active(&self) -> bool {
        !self.is_closed() || self.packet_available()
    }

    fn is_closed(&self) -> bool;

    fn state(&self) -> ConnectionState {
        if !self.is_closed() {
            ConnectionState::Active
        } else if self.packet_available() {
            ConnectionState::Draining
        } else {
            ConnectionState::Closed
        }
    }

    fn closing_reason(&self) -> ClosingReason;

    /// Error that caused the close, if any
    fn unhandled_error(&self) -> Option<Arc<TandemError>>;

    fn byte_record(&self) -> ByteCounts;

    /// Send a typed contract value
    fn send_contract<C: NetContract>(&self, contract: &C)
    where
        Self: Sized,
    {
        self.send(Packet::from_contract(contract));
    }
}

/// Pick the closing reason for an IO failure on a live socket
pub(crate) fn reason_for(error: &TandemError) -> ClosingReason {
    match error {
        TandemError::Io(_) => ClosingReason::LostConnection,
        TandemError::Format(_) | TandemError::Serialization(_) => {
            ClosingReason::PacketSerializeError
        }
        _ => ClosingReason::UnknownException,
    }
}
