//! TCP connection
//!
//! Receives on one thread, reassembling frames from the byte stream, and
//! sends on another, draining the outbound queue one frame at a time.

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use parking_lot::Mutex;
use tracing::Span;

use crate::config::NetConfig;
use crate::error::{Result, TandemError};
use crate::protocol::{FrameCodec, GroupTable, Packet};

use super::record::Lifecycle;
use super::{reason_for, ByteCounts, ByteRecord, ClosingReason, NetConnection, PacketQueue};

/// Longest time the send thread sleeps before rechecking the closed flag
const SEND_IDLE_WAIT: Duration = Duration::from_millis(100);

/// Callback run once with the reason when the connection closes
type CloseHook = Box<dyn FnOnce(ClosingReason) + Send>;

/// A framed packet connection over one TCP stream
///
/// Dropping the connection closes it with `ClosingReason::ClosedSelf`.
pub struct TcpConnection {
    inner: Arc<TcpInner>,
}

struct TcpInner {
    /// Handle kept for shutdown; the worker threads own clones
    stream: TcpStream,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    inbound: PacketQueue,
    outbound: PacketQueue,
    codec: FrameCodec,
    record: ByteRecord,
    lifecycle: Lifecycle,
    close_hooks: Mutex<Vec<CloseHook>>,
    span: Span,
}

impl TcpConnection {
    /// Wrap a connected stream and start its receive and send threads
    ///
    /// `inbound` decodes what the peer sends, `outbound` encodes what this
    /// side sends.
    pub fn new(
        stream: TcpStream,
        inbound: Arc<GroupTable>,
        outbound: Arc<GroupTable>,
        config: &NetConfig,
        parent: &Span,
    ) -> Result<Self> {
        stream.set_nodelay(config.nodelay)?;
        let local_addr = stream.local_addr()?;
        let remote_addr = stream.peer_addr()?;

        let reader = stream.try_clone()?;
        let writer = stream.try_clone()?;

        let span = tracing::debug_span!(
            parent: parent,
            "tcp_connection",
            local = %local_addr,
            remote = %remote_addr
        );

        let inner = Arc::new(TcpInner {
            stream,
            local_addr,
            remote_addr,
            inbound: PacketQueue::new(inbound),
            outbound: PacketQueue::new(outbound),
            codec: FrameCodec::new(config.max_payload_size),
            record: ByteRecord::new(),
            lifecycle: Lifecycle::new(),
            close_hooks: Mutex::new(Vec::new()),
            span,
        });

        let chunk_size = config.receive_chunk_size;
        let receiver = Arc::clone(&inner);
        thread::Builder::new()
            .name(format!("tcp-recv {}", remote_addr))
            .spawn(move || receiver.receive_loop(reader, chunk_size))?;

        let sender = Arc::clone(&inner);
        if let Err(e) = thread::Builder::new()
            .name(format!("tcp-send {}", remote_addr))
            .spawn(move || sender.send_loop(writer))
        {
            inner.close(ClosingReason::UnknownException, None);
            return Err(e.into());
        }

        tracing::debug!(parent: &inner.span, "opened");
        Ok(Self { inner })
    }

    /// Number of packets waiting to be written
    pub fn pending_outbound(&self) -> usize {
        self.inner.outbound.len()
    }

    pub fn span(&self) -> &Span {
        &self.inner.span
    }

    /// Run `hook` with the closing reason once this connection closes
    ///
    /// Runs immediately if the connection is already closed.
    pub(crate) fn on_close(&self, hook: impl FnOnce(ClosingReason) + Send + 'static) {
        let mut hooks = self.inner.close_hooks.lock();
        if self.inner.lifecycle.is_closed() {
            drop(hooks);
            hook(self.inner.lifecycle.reason());
            return;
        }
        hooks.push(Box::new(hook));
    }
}

impl NetConnection for TcpConnection {
    fn send(&self, packet: Packet) {
        if self.inner.lifecycle.is_closed() {
            return;
        }
        self.inner.outbound.enqueue(packet);
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
        self.inner.outbound.time_since_last_enqueue()
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

impl Drop for TcpConnection {
    fn drop(&mut self) {
        self.inner.close(ClosingReason::ClosedSelf, None);
    }
}

impl TcpInner {
    fn close(&self, reason: ClosingReason, error: Option<TandemError>) {
        let message = error.as_ref().map(|e| e.to_string());
        if !self.lifecycle.close(reason, error) {
            return;
        }

        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            if e.kind() != ErrorKind::NotConnected {
                tracing::warn!(parent: &self.span, "error while shutting down: {}", e);
            }
        }
        self.outbound.interrupt();

        // Hooks registered after the flag flipped run at registration instead
        let hooks = std::mem::take(&mut *self.close_hooks.lock());
        for hook in hooks {
            hook(reason);
        }

        match message {
            Some(message) => tracing::debug!(parent: &self.span, "closed [{}] {}", reason, message),
            None => tracing::debug!(parent: &self.span, "closed [{}]", reason),
        }
    }

    /// Receive thread body
    fn receive_loop(&self, mut reader: TcpStream, chunk_size: usize) {
        let _enter = self.span.enter();
        let mut chunk = vec![0u8; chunk_size];
        let mut received = BytesMut::with_capacity(chunk_size);

        while !self.lifecycle.is_closed() {
            let count = match reader.read(&mut chunk) {
                Ok(0) => {
                    self.close(ClosingReason::LostConnection, None);
                    return;
                }
                Ok(count) => count,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.close(ClosingReason::LostConnection, Some(e.into()));
                    return;
                }
            };

            self.record.add_inbound(count);
            received.extend_from_slice(&chunk[..count]);

            // Drain every frame that is now complete
            loop {
                match self.codec.try_deserialize(&received, self.inbound.group()) {
                    Ok(Some((packet, consumed))) => {
                        received.advance(consumed);
                        tracing::trace!("in: [{}] id {}", consumed, packet.contract_id());
                        self.inbound.enqueue(packet);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        self.close(ClosingReason::PacketSerializeError, Some(e));
                        return;
                    }
                }
            }
        }
    }

    /// Send thread body
    fn send_loop(&self, mut writer: TcpStream) {
        let _enter = self.span.enter();

        while !self.lifecycle.is_closed() {
            let Some(packet) = self.outbound.dequeue_timeout(SEND_IDLE_WAIT) else {
                continue;
            };

            let frame = match self.codec.serialize(&packet, self.outbound.group()) {
                Ok(frame) => frame,
                Err(e) => {
                    self.close(ClosingReason::PacketSerializeError, Some(e));
                    return;
                }
            };

            if let Err(e) = writer.write_all(&frame).and_then(|_| writer.flush()) {
                let error = TandemError::from(e);
                self.close(reason_for(&error), Some(error));
                return;
            }

            self.record.add_outbound(frame.len());
            tracing::trace!("out: [{}] id {}", frame.len(), packet.contract_id());
        }
    }
}
