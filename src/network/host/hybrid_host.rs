//! Hybrid TCP + UDP host
//!
//! Accepted TCP sockets are sent a random token and parked as pending
//! handshakes. A UDP datagram echoing that token promotes the pair into a
//! `HybridConnection`.

use std::io::{ErrorKind, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs, UdpSocket};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::Span;

use crate::config::NetConfig;
use crate::error::{Result, TandemError};
use crate::protocol::GroupTable;
use crate::threading::{RunState, ThreadRun, ThreadRunner};

use super::{Host, HostShared, HostState};
use crate::network::handshake::{self, PendingHandshake, HANDSHAKE_ACK};
use crate::network::udp::MAX_DATAGRAM;
use crate::network::{ClosingReason, HybridConnection, NetConnection, TcpConnection, UdpConnection};

/// Host pairing each TCP connection with a UDP endpoint
pub struct HybridHost {
    run: ThreadRun<HybridHostRunner>,
    shared: Arc<HostShared<HybridConnection>>,
    local_addr: SocketAddr,
    udp_local_addr: SocketAddr,
}

struct HybridHostRunner {
    listener: Option<TcpListener>,
    udp: Option<Arc<UdpSocket>>,
    pending: Vec<PendingHandshake>,
    rng: StdRng,
    receive_buffer: Vec<u8>,
    shared: Arc<HostShared<HybridConnection>>,
    inbound: Arc<GroupTable>,
    outbound: Arc<GroupTable>,
    config: NetConfig,
    span: Span,
}

impl HybridHost {
    /// Bind the TCP listener and the UDP socket; accepting begins at `start`
    pub fn bind(
        tcp_addr: impl ToSocketAddrs,
        udp_addr: impl ToSocketAddrs,
        inbound: Arc<GroupTable>,
        outbound: Arc<GroupTable>,
        config: NetConfig,
        parent: &Span,
    ) -> Result<Self> {
        config.validate()?;

        let listener = TcpListener::bind(tcp_addr)?;
        let udp = UdpSocket::bind(udp_addr)?;
        let local_addr = listener.local_addr()?;
        let udp_local_addr = udp.local_addr()?;

        let span = tracing::info_span!(
            parent: parent,
            "hybrid_host",
            tcp = %local_addr,
            udp = %udp_local_addr
        );
        let shared = HostShared::new();
        let tick_interval = config.host_tick_interval;
        let udp_interval = config.udp_poll_interval;

        let runner = HybridHostRunner {
            listener: Some(listener),
            udp: Some(Arc::new(udp)),
            pending: Vec::new(),
            rng: StdRng::from_entropy(),
            receive_buffer: vec![0u8; MAX_DATAGRAM],
            shared: Arc::clone(&shared),
            inbound,
            outbound,
            config,
            span: span.clone(),
        };

        let run = ThreadRun::with_parent("HybridHost", runner, &span)?;
        run.register_tick_call(tick_interval, HybridHostRunner::tick)?;
        run.register_tick_call(udp_interval, HybridHostRunner::receive_udp)?;

        Ok(Self {
            run,
            shared,
            local_addr,
            udp_local_addr,
        })
    }

    pub fn udp_local_addr(&self) -> SocketAddr {
        self.udp_local_addr
    }

    /// Number of accepted sockets still waiting for their UDP token
    ///
    /// Answered by the worker; fails if the host is not running.
    pub fn pending_handshake_count(&self) -> Result<usize> {
        if self.run.state() != RunState::Running {
            return Err(TandemError::Scheduler("HybridHost is not running".to_string()));
        }
        self.run
            .invoke_func(|runner| Ok(runner.pending.len()))
            .wait()
    }

    pub fn span(&self) -> &Span {
        self.run.span()
    }
}

impl Host for HybridHost {
    type Connection = HybridConnection;

    fn start(&self) -> Result<()> {
        if self.run.has_started() {
            return Err(TandemError::Scheduler(
                "HybridHost can only be started once".to_string(),
            ));
        }
        self.shared.set_state(HostState::Starting);
        if let Err(e) = self.run.start() {
            self.shared.set_state(HostState::Stopped);
            return Err(e);
        }
        Ok(())
    }

    fn close(&self) {
        if self.shared.state() != HostState::Stopped {
            self.shared.set_state(HostState::Stopping);
        }
        self.run.stop(true);
        self.shared.set_state(HostState::Stopped);
    }

    fn poll_new_connection(&self) -> Option<Arc<HybridConnection>> {
        self.shared.poll_new()
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn state(&self) -> HostState {
        self.shared.state()
    }

    fn active_connection_count(&self) -> usize {
        self.shared.active_count()
    }
}

impl Drop for HybridHost {
    fn drop(&mut self) {
        self.close();
    }
}

impl HybridHostRunner {
    // =========================================================================
    // TCP Tick
    // =========================================================================

    fn tick(&mut self) -> Result<()> {
        self.accept_pending();
        self.prune_pending();
        let removed = self.shared.prune();
        if removed > 0 {
            tracing::debug!("pruned {} connections", removed);
        }
        Ok(())
    }

    fn accept_pending(&mut self) {
        loop {
            let Some(listener) = self.listener.as_ref() else {
                return;
            };

            match listener.accept() {
                Ok((stream, addr)) => match self.begin_handshake(stream) {
                    Ok(()) => tracing::debug!("sent token to {}, awaiting udp", addr),
                    Err(e) => tracing::warn!("failed to admit {}: {}", addr, e),
                },
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!("accept failed: {}", e);
                    break;
                }
            }
        }
    }

    /// Send a fresh token over the socket and park it
    fn begin_handshake(&mut self, mut stream: TcpStream) -> Result<()> {
        stream.set_nonblocking(false)?;

        let pending = &self.pending;
        let token = handshake::next_token(&mut self.rng, |token| {
            pending.iter().any(|p| p.token == token)
        });
        stream.write_all(&handshake::encode_token(token))?;

        let tcp = TcpConnection::new(
            stream,
            Arc::clone(&self.inbound),
            Arc::clone(&self.outbound),
            &self.config,
            &self.span,
        )?;
        self.pending
            .push(PendingHandshake::new(tcp, token, self.config.handshake_timeout));
        Ok(())
    }

    /// Drop handshakes that timed out or whose TCP side went away
    fn prune_pending(&mut self) {
        self.pending.retain(|pending| {
            if pending.is_timed_out() {
                pending.tcp.close(ClosingReason::HandshakeTimeout, None);
                tracing::info!(
                    "handshake with {} timed out",
                    pending.tcp.remote_addr()
                );
                return false;
            }
            if !pending.tcp.is_active() {
                pending.tcp.close(ClosingReason::LostConnection, None);
                tracing::info!(
                    "{} disconnected while handshaking",
                    pending.tcp.remote_addr()
                );
                return false;
            }
            true
        });
    }

    // =========================================================================
    // UDP Tick
    // =========================================================================

    /// Classify every waiting datagram
    fn receive_udp(&mut self) -> Result<()> {
        let Some(socket) = self.udp.clone() else {
            return Ok(());
        };

        loop {
            let (count, source) = match socket.recv_from(&mut self.receive_buffer) {
                Ok(received) => received,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                // ICMP errors from earlier sends surface here on some platforms
                Err(e) if e.kind() == ErrorKind::ConnectionReset => continue,
                Err(e) => {
                    tracing::warn!("udp receive failed: {}", e);
                    return Ok(());
                }
            };

            let datagram = self.receive_buffer[..count].to_vec();
            self.classify(&socket, &datagram, source);
        }
    }

    fn classify(&mut self, socket: &Arc<UdpSocket>, datagram: &[u8], source: SocketAddr) {
        let token = handshake::decode_token(datagram);

        if let Some(connection) = self.shared.find(|c| c.udp_remote_addr() == source) {
            if token == Some(connection.token()) {
                // The client missed our ack and resent its token
                acknowledge(socket, source);
            } else {
                connection.udp().deliver(datagram);
            }
            return;
        }

        let Some(token) = token else {
            tracing::warn!(
                "ignoring {} byte datagram from unknown source {}",
                datagram.len(),
                source
            );
            return;
        };

        let Some(index) = self.pending.iter().position(|p| p.token == token) else {
            tracing::warn!("received invalid token from {}", source);
            return;
        };

        let pending = self.pending.swap_remove(index);
        if !pending.tcp.is_active() {
            tracing::info!("{} disconnected while handshaking", source);
            return;
        }

        acknowledge(socket, source);

        match UdpConnection::hosted(
            Arc::clone(socket),
            source,
            Arc::clone(&self.inbound),
            Arc::clone(&self.outbound),
            &self.config,
            &self.span,
        ) {
            Ok(udp) => {
                tracing::info!(
                    "new connection: tcp {} / udp {}",
                    pending.tcp.remote_addr(),
                    source
                );
                let connection = HybridConnection::new(pending.tcp, udp, pending.token);
                self.shared.publish(Arc::new(connection));
            }
            Err(e) => {
                tracing::warn!("failed to open udp endpoint for {}: {}", source, e);
                pending.tcp.close(ClosingReason::UnknownException, Some(e));
            }
        }
    }
}

fn acknowledge(socket: &UdpSocket, target: SocketAddr) {
    if let Err(e) = socket.send_to(&[HANDSHAKE_ACK], target) {
        tracing::warn!("failed to acknowledge {}: {}", target, e);
    }
}

impl ThreadRunner for HybridHostRunner {
    fn on_begin(&mut self) -> Result<()> {
        if let Some(listener) = self.listener.as_ref() {
            listener.set_nonblocking(true)?;
        }
        if let Some(udp) = self.udp.as_ref() {
            udp.set_nonblocking(true)?;
        }
        self.shared.set_state(HostState::Listening);
        tracing::info!("listening");
        Ok(())
    }

    fn on_finish(&mut self, unhandled: Option<&TandemError>) {
        self.listener = None;
        self.udp = None;
        for pending in self.pending.drain(..) {
            pending.tcp.close(ClosingReason::ClosedSelf, None);
        }
        self.shared.close_all();
        self.shared.set_state(HostState::Stopped);

        match unhandled {
            Some(e) => tracing::error!("stopped: {}", e),
            None => tracing::info!("stopped"),
        }
    }
}
