//! Hybrid connection
//!
//! A TCP connection paired with a UDP endpoint to the same peer.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::TandemError;
use crate::protocol::Packet;

use super::{ByteCounts, ClosingReason, NetConnection, Protocol, TcpConnection, UdpConnection};

/// Reliable and unreliable paths to one peer
///
/// `send` uses TCP; `send_via(packet, Protocol::Udp)` uses UDP. Received
/// packets are polled from TCP first, then UDP. The connection stays active
/// while TCP is active or a UDP packet is still queued. When TCP closes, for
/// any reason, the UDP path closes with the same reason. Dropping it closes
/// both transports.
pub struct HybridConnection {
    tcp: TcpConnection,
    udp: UdpConnection,
    token: u32,
}

impl HybridConnection {
    pub fn new(tcp: TcpConnection, udp: UdpConnection, token: u32) -> Self {
        tcp.on_close(udp.closer());
        Self { tcp, udp, token }
    }

    /// Send over the chosen transport; ignored once TCP has closed
    pub fn send_via(&self, packet: Packet, protocol: Protocol) {
        if self.tcp.is_closed() {
            return;
        }
        match protocol {
            Protocol::Tcp => self.tcp.send(packet),
            Protocol::Udp => self.udp.send(packet),
        }
    }

    /// Token that paired the two transports
    pub fn token(&self) -> u32 {
        self.token
    }

    pub fn tcp(&self) -> &TcpConnection {
        &self.tcp
    }

    pub fn udp(&self) -> &UdpConnection {
        &self.udp
    }

    pub fn udp_local_addr(&self) -> SocketAddr {
        self.udp.local_addr()
    }

    pub fn udp_remote_addr(&self) -> SocketAddr {
        self.udp.remote_addr()
    }
}

impl NetConnection for HybridConnection {
    fn send(&self, packet: Packet) {
        self.tcp.send(packet);
    }

    fn poll_receive_packet(&self) -> Option<Packet> {
        self.tcp
            .poll_receive_packet()
            .or_else(|| self.udp.poll_receive_packet())
    }

    fn close(&self, reason: ClosingReason, error: Option<TandemError>) {
        // The UDP side gets the reason only; the error belongs to TCP.
        self.udp.close(reason, None);
        self.tcp.close(reason, error);
    }

    fn packet_available(&self) -> bool {
        self.tcp.packet_available() || self.udp.packet_available()
    }

    fn time_since_last_packet_received(&self) -> Duration {
        self.tcp
            .time_since_last_packet_received()
            .min(self.udp.time_since_last_packet_received())
    }

    fn time_since_last_packet_sent(&self) -> Duration {
        self.tcp
            .time_since_last_packet_sent()
            .min(self.udp.time_since_last_packet_sent())
    }

    fn time_alive(&self) -> Duration {
        self.tcp.time_alive()
    }

    fn local_addr(&self) -> SocketAddr {
        self.tcp.local_addr()
    }

    fn remote_addr(&self) -> SocketAddr {
        self.tcp.remote_addr()
    }

    fn is_active(&self) -> bool {
        self.tcp.is_active() || self.udp.packet_available()
    }

    fn is_closed(&self) -> bool {
        self.tcp.is_closed()
    }

    fn closing_reason(&self) -> ClosingReason {
        self.tcp.closing_reason()
    }

    fn unhandled_error(&self) -> Option<Arc<TandemError>> {
        self.tcp.unhandled_error().or_else(|| self.udp.unhandled_error())
    }

    fn byte_record(&self) -> ByteCounts {
        self.tcp.byte_record() + self.udp.byte_record()
    }
}
