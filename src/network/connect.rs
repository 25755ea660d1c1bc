//! Client connect helpers
//!
//! Dial a host, run the handshake, and hand back a ready connection. Each
//! helper has a blocking form and an `_async` form that runs on a
//! `ThreadJob`.

use std::io::{ErrorKind, Read};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream, UdpSocket};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tracing::Span;

use crate::config::NetConfig;
use crate::error::{Result, TandemError};
use crate::protocol::GroupTable;
use crate::threading::ThreadJob;
use crate::timer::TimeoutTimer;

use super::handshake::{self, HANDSHAKE_ACK, TOKEN_SIZE};
use super::{HybridConnection, TcpConnection, UdpConnection};

// =============================================================================
// TCP
// =============================================================================

/// Connects a plain `TcpConnection`
pub struct TcpConnecting;

impl TcpConnecting {
    /// Dial `addr` and wrap the stream
    pub fn connect(
        addr: SocketAddr,
        inbound: Arc<GroupTable>,
        outbound: Arc<GroupTable>,
        config: &NetConfig,
        parent: &Span,
    ) -> Result<TcpConnection> {
        config.validate()?;
        let span = tracing::debug_span!(parent: parent, "connect", addr = %addr);
        let _enter = span.enter();

        tracing::debug!("connecting");
        let stream = TcpStream::connect_timeout(&addr, config.connect_timeout)?;
        let connection = TcpConnection::new(stream, inbound, outbound, config, parent)?;
        tracing::debug!("connected");
        Ok(connection)
    }

    /// `connect` on a background job
    pub fn connect_async(
        addr: SocketAddr,
        inbound: Arc<GroupTable>,
        outbound: Arc<GroupTable>,
        config: NetConfig,
        parent: &Span,
    ) -> Result<ThreadJob<Result<TcpConnection>>> {
        let parent = parent.clone();
        ThreadJob::start_new(format!("TcpConnecting {}", addr), move || {
            Self::connect(addr, inbound, outbound, &config, &parent)
        })
    }
}

// =============================================================================
// Hybrid
// =============================================================================

/// Progress of a hybrid connect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectStep {
    Waiting = 0,
    Connecting = 1,
    HandshakingTcp = 2,
    HandshakingUdp = 3,
    Connected = 4,
    Failed = 5,
}

impl ConnectStep {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectStep::Waiting,
            1 => ConnectStep::Connecting,
            2 => ConnectStep::HandshakingTcp,
            3 => ConnectStep::HandshakingUdp,
            4 => ConnectStep::Connected,
            _ => ConnectStep::Failed,
        }
    }
}

/// A hybrid connect running in the background
pub struct ConnectProcess {
    step: Arc<AtomicU8>,
    job: ThreadJob<Result<HybridConnection>>,
}

impl ConnectProcess {
    pub fn step(&self) -> ConnectStep {
        ConnectStep::from_u8(self.step.load(Ordering::Acquire))
    }

    /// True once the connect has succeeded or failed
    pub fn is_finished(&self) -> bool {
        !self.job.is_running()
    }

    /// Wait for the outcome
    pub fn join(self) -> Result<HybridConnection> {
        self.job.join()?
    }
}

/// Connects a `HybridConnection` through the token handshake
pub struct HybridConnecting;

impl HybridConnecting {
    /// Dial the host's TCP listener, then pair a UDP socket with it
    pub fn connect(
        tcp_addr: SocketAddr,
        udp_addr: SocketAddr,
        inbound: Arc<GroupTable>,
        outbound: Arc<GroupTable>,
        config: &NetConfig,
        parent: &Span,
    ) -> Result<HybridConnection> {
        let step = AtomicU8::new(ConnectStep::Waiting as u8);
        run_hybrid(tcp_addr, udp_addr, inbound, outbound, config, parent, &step)
    }

    /// `connect` on a background job whose progress can be observed
    pub fn connect_async(
        tcp_addr: SocketAddr,
        udp_addr: SocketAddr,
        inbound: Arc<GroupTable>,
        outbound: Arc<GroupTable>,
        config: NetConfig,
        parent: &Span,
    ) -> Result<ConnectProcess> {
        let step = Arc::new(AtomicU8::new(ConnectStep::Waiting as u8));
        let job_step = Arc::clone(&step);
        let parent = parent.clone();

        let job = ThreadJob::start_new(format!("HybridConnecting {}", tcp_addr), move || {
            run_hybrid(tcp_addr, udp_addr, inbound, outbound, &config, &parent, &job_step)
        })?;

        Ok(ConnectProcess { step, job })
    }
}

fn run_hybrid(
    tcp_addr: SocketAddr,
    udp_addr: SocketAddr,
    inbound: Arc<GroupTable>,
    outbound: Arc<GroupTable>,
    config: &NetConfig,
    parent: &Span,
    step: &AtomicU8,
) -> Result<HybridConnection> {
    let span = tracing::debug_span!(parent: parent, "connect", tcp = %tcp_addr, udp = %udp_addr);
    let _enter = span.enter();

    let outcome = hybrid_steps(tcp_addr, udp_addr, inbound, outbound, config, parent, step);
    match &outcome {
        Ok(_) => {
            step.store(ConnectStep::Connected as u8, Ordering::Release);
            tracing::debug!("connected");
        }
        Err(e) => {
            step.store(ConnectStep::Failed as u8, Ordering::Release);
            tracing::warn!("connect failed: {}", e);
        }
    }
    outcome
}

fn hybrid_steps(
    tcp_addr: SocketAddr,
    udp_addr: SocketAddr,
    inbound: Arc<GroupTable>,
    outbound: Arc<GroupTable>,
    config: &NetConfig,
    parent: &Span,
    step: &AtomicU8,
) -> Result<HybridConnection> {
    config.validate()?;

    step.store(ConnectStep::Connecting as u8, Ordering::Release);
    let mut stream = TcpStream::connect_timeout(&tcp_addr, config.connect_timeout)?;

    step.store(ConnectStep::HandshakingTcp as u8, Ordering::Release);
    let token = read_token(&mut stream, config)?;
    tracing::debug!("received token");

    step.store(ConnectStep::HandshakingUdp as u8, Ordering::Release);
    let socket = UdpSocket::bind(unspecified_for(&udp_addr))?;
    socket.connect(udp_addr)?;
    await_ack(&socket, token, config)?;
    tracing::debug!("udp acknowledged");

    let tcp = TcpConnection::new(
        stream,
        Arc::clone(&inbound),
        Arc::clone(&outbound),
        config,
        parent,
    )?;
    let udp = UdpConnection::new(socket, inbound, outbound, config, parent)?;
    Ok(HybridConnection::new(tcp, udp, token))
}

/// Read the 4 token bytes, and nothing more, within the handshake window
fn read_token(stream: &mut TcpStream, config: &NetConfig) -> Result<u32> {
    stream.set_read_timeout(Some(config.handshake_window))?;

    let mut bytes = [0u8; TOKEN_SIZE];
    match stream.read_exact(&mut bytes) {
        Ok(()) => {}
        Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
            return Err(TandemError::HandshakeTimeout(config.handshake_window));
        }
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
            return Err(TandemError::Handshake(
                "host closed the connection before sending a token".to_string(),
            ));
        }
        Err(e) => return Err(e.into()),
    }

    stream.set_read_timeout(None)?;
    Ok(u32::from_le_bytes(bytes))
}

/// Send the token over UDP until the host acknowledges it
fn await_ack(socket: &UdpSocket, token: u32, config: &NetConfig) -> Result<()> {
    socket.set_read_timeout(Some(config.token_resend_interval))?;
    let window = TimeoutTimer::start_new(config.handshake_window);
    let datagram = handshake::encode_token(token);
    let mut reply = [0u8; 16];

    while !window.is_timed_out() {
        socket.send(&datagram)?;

        match socket.recv(&mut reply) {
            Ok(1) if reply[0] == HANDSHAKE_ACK => return Ok(()),
            Ok(count) => tracing::debug!("ignoring {} byte datagram while handshaking", count),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                tracing::trace!("no ack yet, resending token");
            }
            // The host's UDP port is not open (yet)
            Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
                tracing::trace!("udp refused, resending token");
                std::thread::sleep(config.token_resend_interval);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(TandemError::HandshakeTimeout(config.handshake_window))
}

/// Wildcard local address of the same family as `remote`
fn unspecified_for(remote: &SocketAddr) -> SocketAddr {
    let ip = match remote.ip() {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    };
    SocketAddr::new(ip, 0)
}
