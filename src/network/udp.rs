//! UDP connection
//!
//! One frame per datagram. A client connection owns a connected socket and
//! a receive thread; a hosted connection shares the host's socket and is
//! fed datagrams by the host.

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::Span;

use crate::config::NetConfig;
use crate::error::{Result, TandemError};
use crate::protocol::{FrameCodec, GroupTable, Packet};
use crate::timer::SimpleTimer;

use super::handshake::HANDSHAKE_ACK;
use super::record::Lifecycle;
use super::{ByteCounts, ByteRecord, ClosingReason, NetConnection, PacketQueue};

/// Read timeout of the client receive thread, bounding how long it takes to
/// notice a close
const RECEIVE_POLL: Duration = Duration::from_millis(100);

/// Largest datagram the receive thread reads
pub(crate) const MAX_DATAGRAM: usize = 64 * 1024;

/// A packet endpoint bound to one remote UDP address
///
/// Delivery is unreliable and unordered. Malformed datagrams are logged and
/// discarded without closing the connection.
pub struct UdpConnection {
    inner: Arc<UdpInner>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Owns a connected socket
    Client,

    /// Shares the host's listening socket
    Hosted,
}

struct UdpInner {
    socket: Arc<UdpSocket>,
    mode: Mode,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    inbound: PacketQueue,
    outbound: Arc<GroupTable>,
    last_sent: Mutex<SimpleTimer>,
    codec: FrameCodec,
    record: ByteRecord,
    lifecycle: Lifecycle,
    span: Span,
}

impl UdpConnection {
    /// Wrap a socket already connected to its peer and start receiving
    pub fn new(
        socket: UdpSocket,
        inbound: Arc<GroupTable>,
        outbound: Arc<GroupTable>,
        config: &NetConfig,
        parent: &Span,
    ) -> Result<Self> {
        let remote_addr = socket.peer_addr()?;
        socket.set_nonblocking(false)?;
        socket.set_read_timeout(Some(RECEIVE_POLL))?;

        let inner = UdpInner::new(Arc::new(socket), Mode::Client, remote_addr, inbound, outbound, config, parent)?;

        let receiver = Arc::clone(&inner);
        thread::Builder::new()
            .name(format!("udp-recv {}", remote_addr))
            .spawn(move || receiver.receive_loop())?;

        tracing::debug!(parent: &inner.span, "opened");
        Ok(Self { inner })
    }

    /// Endpoint on the host's shared socket
    pub(crate) fn hosted(
        socket: Arc<UdpSocket>,
        remote_addr: SocketAddr,
        inbound: Arc<GroupTable>,
        outbound: Arc<GroupTable>,
        config: &NetConfig,
        parent: &Span,
    ) -> Result<Self> {
        let inner = UdpInner::new(socket, Mode::Hosted, remote_addr, inbound, outbound, config, parent)?;
        tracing::debug!(parent: &inner.span, "opened on host socket");
        Ok(Self { inner })
    }

    /// Decode a datagram the host received from this peer
    pub(crate) fn deliver(&self, datagram: &[u8]) {
        self.inner.accept_datagram(datagram);
    }

    /// Send a raw datagram outside the packet framing
    pub(crate) fn send_raw(&self, datagram: &[u8]) -> Result<()> {
        self.inner.send_datagram(datagram)
    }

    /// Closure that closes this endpoint with a given reason
    ///
    /// Holds the endpoint weakly, so it does nothing once the connection is gone.
    pub(crate) fn closer(&self) -> impl FnOnce(ClosingReason) + Send + 'static {
        let inner: Weak<UdpInner> = Arc::downgrade(&self.inner);
        move |reason| {
            if let Some(inner) = inner.upgrade() {
                inner.close(reason, None);
            }
        }
    }
}

impl NetConnection for UdpConnection {
    fn send(&self, packet: Packet) {
        let inner = &self.inner;
        if inner.lifecycle.is_closed() {
            return;
        }

        let frame = match inner.codec.serialize(&packet, &inner.outbound) {
            Ok(frame) => frame,
            Err(e) => {
                inner.close(ClosingReason::PacketSerializeError, Some(e));
                return;
            }
        };

        match inner.send_datagram(&frame) {
            Ok(()) => {}
            Err(TandemError::Io(ref e)) if e.kind() == ErrorKind::WouldBlock => {
                tracing::warn!(parent: &inner.span, "socket busy, dropping datagram id {}", packet.contract_id());
                return;
            }
            Err(e) => {
                inner.close(ClosingReason::LostConnection, Some(e));
                return;
            }
        }

        inner.last_sent.lock().restart();
        tracing::trace!(parent: &inner.span, "out: [{}] id {}", frame.len(), packet.contract_id());
    }

    fn poll_receive_packet(&self) -> Option<Packet> {
        self.inner.inbound.poll_dequeue()
    }

    fn close(&self, reason: ClosingReason, error: Option<TandemError>) {
        self.inner.close(reason, error);
    }

    fn packet_available(&self) -> bool {
        self.inner.inbound.has_next()
    }

    fn time_since_last_packet_received(&self) -> Duration {
        self.inner.inbound.time_since_last_enqueue()
    }

    fn time_since_last_packet_sent(&self) -> Duration {
        self.inner.last_sent.lock().elapsed()
    }

    fn time_alive(&self) -> Duration {
        self.inner.lifecycle.time_alive()
    }

    fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    fn remote_addr(&self) -> SocketAddr {
        self.inner.remote_addr
    }

    fn is_closed(&self) -> bool {
        self.inner.lifecycle.is_closed()
    }

    fn closing_reason(&self) -> ClosingReason {
        self.inner.lifecycle.reason()
    }

    fn unhandled_error(&self) -> Option<Arc<TandemError>> {
        self.inner.lifecycle.error()
    }

    fn byte_record(&self) -> ByteCounts {
        self.inner.record.snapshot()
    }
}

impl Drop for UdpConnection {
    fn drop(&mut self) {
        self.inner.close(ClosingReason::ClosedSelf, None);
    }
}

impl UdpInner {
    fn new(
        socket: Arc<UdpSocket>,
        mode: Mode,
        remote_addr: SocketAddr,
        inbound: Arc<GroupTable>,
        outbound: Arc<GroupTable>,
        config: &NetConfig,
        parent: &Span,
    ) -> Result<Arc<Self>> {
        let local_addr = socket.local_addr()?;
        let span = tracing::debug_span!(
            parent: parent,
            "udp_connection",
            local = %local_addr,
            remote = %remote_addr
        );

        Ok(Arc::new(Self {
            socket,
            mode,
            local_addr,
            remote_addr,
            inbound: PacketQueue::new(inbound),
            outbound,
            last_sent: Mutex::new(SimpleTimer::start_new()),
            codec: FrameCodec::new(config.max_payload_size),
            record: ByteRecord::new(),
            lifecycle: Lifecycle::new(),
            span,
        }))
    }

    fn close(&self, reason: ClosingReason, error: Option<TandemError>) {
        let message = error.as_ref().map(|e| e.to_string());
        if !self.lifecycle.close(reason, error) {
            return;
        }

        match message {
            Some(message) => tracing::debug!(parent: &self.span, "closed [{}] {}", reason, message),
            None => tracing::debug!(parent: &self.span, "closed [{}]", reason),
        }
    }

    fn send_datagram(&self, datagram: &[u8]) -> Result<()> {
        let sent = match self.mode {
            Mode::Client => self.socket.send(datagram)?,
            Mode::Hosted => self.socket.send_to(datagram, self.remote_addr)?,
        };
        if sent != datagram.len() {
            return Err(TandemError::Transport(format!(
                "datagram truncated: sent {} of {} bytes",
                sent,
                datagram.len()
            )));
        }

        self.record.add_outbound(sent);
        Ok(())
    }

    /// Decode one datagram as exactly one frame
    fn accept_datagram(&self, datagram: &[u8]) {
        if self.lifecycle.is_closed() {
            return;
        }
        self.record.add_inbound(datagram.len());

        // A late duplicate of the handshake acknowledgment
        if self.mode == Mode::Client && datagram.len() == 1 && datagram[0] == HANDSHAKE_ACK {
            tracing::trace!(parent: &self.span, "ignoring repeated handshake ack");
            return;
        }

        match self.codec.try_deserialize(datagram, self.inbound.group()) {
            Ok(Some((packet, consumed))) if consumed == datagram.len() => {
                tracing::trace!(parent: &self.span, "in: [{}] id {}", consumed, packet.contract_id());
                self.inbound.enqueue(packet);
            }
            Ok(Some((_, consumed))) => {
                tracing::warn!(
                    parent: &self.span,
                    "discarding datagram with {} bytes after its frame",
                    datagram.len() - consumed
                );
            }
            Ok(None) => {
                tracing::warn!(
                    parent: &self.span,
                    "discarding truncated datagram of {} bytes",
                    datagram.len()
                );
            }
            Err(e) => {
                tracing::warn!(parent: &self.span, "discarding invalid datagram: {}", e);
            }
        }
    }

    /// Client receive thread body
    fn receive_loop(&self) {
        let _enter = self.span.enter();
        let mut buffer = vec![0u8; MAX_DATAGRAM];

        while !self.lifecycle.is_closed() {
            match self.socket.recv(&mut buffer) {
                Ok(count) => self.accept_datagram(&buffer[..count]),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted) => {}
                Err(e) => {
                    self.close(ClosingReason::LostConnection, Some(e.into()));
                    return;
                }
            }
        }
    }
}
