//! TCP Transport Tests
//!
//! Tests verify:
//! - Host lifecycle states and single start
//! - Packets travel both ways and decode into contracts
//! - Close bookkeeping (first reason wins, drain before inactive, state)
//! - Activity clocks reset on traffic and the alive clock stops at close
//! - Byte records count whole frames
//! - Malformed frames close the connection with a serialize error
//! - Hosts skip connections that died before being polled

mod common;

use std::io::Write;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use tandem::demo::{Chat, Number};
use tandem::network::{
    ClosingReason, ConnectionState, Host, HostState, NetConnection, TcpConnecting, TcpConnection, TcpHost,
};
use tandem::TandemError;
use tracing::Span;

use common::{demo_group, fast_config, init_tracing, poll_for, wait_until};

const WAIT: Duration = Duration::from_secs(3);

// =============================================================================
// Helper Functions
// =============================================================================

fn start_host() -> TcpHost {
    init_tracing();
    let host = TcpHost::bind("127.0.0.1:0", demo_group(), demo_group(), fast_config(), &Span::none()).unwrap();
    host.start().unwrap();
    assert!(wait_until(WAIT, || host.state() == HostState::Listening));
    host
}

fn connect(host: &TcpHost) -> TcpConnection {
    TcpConnecting::connect(host.local_addr(), demo_group(), demo_group(), &fast_config(), &Span::none()).unwrap()
}

/// Connect a client and claim the host side of it
fn connected_pair(host: &TcpHost) -> (TcpConnection, Arc<TcpConnection>) {
    let client = connect(host);
    let server = poll_for(WAIT, || host.poll_new_connection()).expect("host never published the connection");
    (client, server)
}

fn receive<C: NetConnection>(connection: &C) -> tandem::protocol::Packet {
    poll_for(WAIT, || connection.poll_receive_packet()).expect("no packet arrived")
}

// =============================================================================
// Host Lifecycle Tests
// =============================================================================

#[test]
fn test_host_states() {
    init_tracing();
    let host = TcpHost::bind("127.0.0.1:0", demo_group(), demo_group(), fast_config(), &Span::none()).unwrap();
    assert_eq!(host.state(), HostState::Stopped);
    assert_ne!(host.local_addr().port(), 0);

    host.start().unwrap();
    assert!(wait_until(WAIT, || host.state() == HostState::Listening));

    host.close();
    assert_eq!(host.state(), HostState::Stopped);
}

#[test]
fn test_host_starts_once() {
    let host = start_host();
    assert!(matches!(host.start(), Err(TandemError::Scheduler(_))));
}

#[test]
fn test_bind_rejects_invalid_config() {
    let config = tandem::NetConfig::builder().host_tick_interval(Duration::ZERO).build();
    let result = TcpHost::bind("127.0.0.1:0", demo_group(), demo_group(), config, &Span::none());
    assert!(matches!(result, Err(TandemError::Config(_))));
}

#[test]
fn test_host_close_closes_connections() {
    let host = start_host();
    let (client, server) = connected_pair(&host);
    assert_eq!(host.active_connection_count(), 1);

    host.close();

    assert!(server.is_closed());
    assert_eq!(host.active_connection_count(), 0);
    assert!(wait_until(WAIT, || !client.is_active()));
    assert_eq!(client.closing_reason(), ClosingReason::LostConnection);
}

// =============================================================================
// Exchange Tests
// =============================================================================

#[test]
fn test_number_exchange() {
    let host = start_host();
    let (client, server) = connected_pair(&host);

    client.send_contract(&Number { number: 222 });
    let packet = receive(&*server);
    assert_eq!(packet.to_contract::<Number>().unwrap().number, 222);

    server.send_contract(&Number { number: 111 });
    let packet = receive(&client);
    assert_eq!(packet.to_contract::<Number>().unwrap().number, 111);

    assert!(client.byte_record().outbound_total >= 9);
    assert!(wait_until(WAIT, || server.byte_record().outbound_total >= 9));
}

#[test]
fn test_packets_arrive_in_send_order() {
    let host = start_host();
    let (client, server) = connected_pair(&host);

    for sequence in 0..50u64 {
        client.send_contract(&Chat {
            sender: "ordered".to_string(),
            text: "x".repeat(sequence as usize * 40),
            sequence,
        });
    }

    for expected in 0..50u64 {
        let chat = receive(&*server).to_contract::<Chat>().unwrap();
        assert_eq!(chat.sequence, expected);
        assert_eq!(chat.text.len(), expected as usize * 40);
    }
}

#[test]
fn test_connect_async() {
    let host = start_host();
    let job = TcpConnecting::connect_async(host.local_addr(), demo_group(), demo_group(), fast_config(), &Span::none()).unwrap();

    let client = job.join().unwrap().unwrap();
    assert!(client.is_active());
    assert_eq!(client.remote_addr(), host.local_addr());
}

#[test]
fn test_connect_refused() {
    // Grab a free port, then release it
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let result = TcpConnecting::connect(addr, demo_group(), demo_group(), &fast_config(), &Span::none());
    assert!(matches!(result, Err(TandemError::Io(_))));
}

// =============================================================================
// Close Tests
// =============================================================================

#[test]
fn test_close_marks_inactive() {
    let host = start_host();
    let (client, server) = connected_pair(&host);

    client.close(ClosingReason::ClosedSelf, None);
    assert!(client.is_closed());
    assert!(!client.is_active());
    assert_eq!(client.closing_reason(), ClosingReason::ClosedSelf);

    assert!(wait_until(WAIT, || !server.is_active()));
    assert_eq!(server.closing_reason(), ClosingReason::LostConnection);
}

#[test]
fn test_first_reason_wins() {
    let host = start_host();
    let (client, _server) = connected_pair(&host);

    client.close(ClosingReason::ClosedSelf, None);
    client.close(ClosingReason::LostConnection, None);
    assert_eq!(client.closing_reason(), ClosingReason::ClosedSelf);
    assert!(client.unhandled_error().is_none());
}

#[test]
fn test_send_after_close_is_ignored() {
    let host = start_host();
    let (client, server) = connected_pair(&host);

    client.close(ClosingReason::ClosedSelf, None);
    client.send_contract(&Number { number: 5 });
    assert_eq!(client.pending_outbound(), 0);

    assert!(wait_until(WAIT, || server.is_closed()));
    assert!(server.poll_receive_packet().is_none());
}

#[test]
fn test_buffered_packets_keep_connection_active() {
    let host = start_host();
    let (client, server) = connected_pair(&host);

    server.send_contract(&Number { number: 1 });
    assert!(wait_until(WAIT, || client.packet_available()));
    server.close(ClosingReason::ClosedSelf, None);

    assert!(wait_until(WAIT, || client.is_closed()));
    assert!(client.is_active());

    let packet = client.poll_receive_packet().unwrap();
    assert_eq!(packet.to_contract::<Number>().unwrap().number, 1);
    assert!(!client.is_active());
}

#[test]
fn test_state_moves_through_draining_to_closed() {
    let host = start_host();
    let (client, server) = connected_pair(&host);
    assert_eq!(client.state(), ConnectionState::Active);

    server.send_contract(&Number { number: 2 });
    assert!(wait_until(WAIT, || client.packet_available()));
    client.close(ClosingReason::ClosedSelf, None);
    assert_eq!(client.state(), ConnectionState::Draining);

    client.poll_receive_packet().unwrap();
    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(wait_until(WAIT, || server.state() == ConnectionState::Closed));
}

#[test]
fn test_drop_closes_peer() {
    let host = start_host();
    let (client, server) = connected_pair(&host);

    drop(client);
    assert!(wait_until(WAIT, || server.is_closed()));
    assert_eq!(server.closing_reason(), ClosingReason::LostConnection);
}

#[test]
fn test_poll_skips_dead_connections() {
    let host = start_host();

    let stream = TcpStream::connect(host.local_addr()).unwrap();
    drop(stream);

    std::thread::sleep(Duration::from_millis(300));
    assert!(host.poll_new_connection().is_none());
}

#[test]
fn test_host_prunes_closed_connections() {
    let host = start_host();
    let (client, _server) = connected_pair(&host);
    assert_eq!(host.active_connection_count(), 1);

    client.close(ClosingReason::ClosedSelf, None);
    assert!(wait_until(WAIT, || host.active_connection_count() == 0));
}

// =============================================================================
// Liveness Tests
// =============================================================================

#[test]
fn test_activity_clocks_reset_on_traffic() {
    let host = start_host();
    let (client, server) = connected_pair(&host);

    std::thread::sleep(Duration::from_millis(200));
    assert!(client.time_since_last_packet_sent() >= Duration::from_millis(200));
    assert!(server.time_since_last_packet_received() >= Duration::from_millis(200));

    client.send_contract(&Number { number: 4 });
    assert!(client.time_since_last_packet_sent() < Duration::from_millis(150));

    receive(&*server);
    assert!(server.time_since_last_packet_received() < Duration::from_millis(150));
    assert!(client.time_since_last_packet_received() >= Duration::from_millis(200));
}

#[test]
fn test_time_alive_stops_at_close() {
    let host = start_host();
    let (client, _server) = connected_pair(&host);

    std::thread::sleep(Duration::from_millis(50));
    assert!(client.time_alive() >= Duration::from_millis(50));

    client.close(ClosingReason::ClosedSelf, None);
    let at_close = client.time_alive();
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(client.time_alive(), at_close);
}

#[test]
fn test_byte_record_counts_frames() {
    let host = start_host();
    let (client, server) = connected_pair(&host);

    // 1 byte id, 4 byte length, 4 byte payload
    client.send_contract(&Number { number: 17 });
    assert!(wait_until(WAIT, || client.byte_record().outbound_total == 9));
    assert!(wait_until(WAIT, || server.byte_record().inbound_total == 9));
    receive(&*server);

    assert_eq!(client.byte_record().inbound_total, 0);
    assert_eq!(server.byte_record().outbound_total, 0);
}

// =============================================================================
// Malformed Stream Tests
// =============================================================================

#[test]
fn test_unknown_contract_closes_connection() {
    let host = start_host();
    let mut raw = TcpStream::connect(host.local_addr()).unwrap();
    let server = poll_for(WAIT, || host.poll_new_connection()).unwrap();

    // Complete frame for an id the group does not know
    raw.write_all(&[99, 1, 0, 0, 0, 7]).unwrap();

    assert!(wait_until(WAIT, || server.is_closed()));
    assert_eq!(server.closing_reason(), ClosingReason::PacketSerializeError);
    assert!(matches!(server.unhandled_error().as_deref(), Some(TandemError::Format(_))));
}

#[test]
fn test_negative_length_closes_connection() {
    let host = start_host();
    let mut raw = TcpStream::connect(host.local_addr()).unwrap();
    let server = poll_for(WAIT, || host.poll_new_connection()).unwrap();

    raw.write_all(&[1, 0xff, 0xff, 0xff, 0xff]).unwrap();

    assert!(wait_until(WAIT, || server.is_closed()));
    assert_eq!(server.closing_reason(), ClosingReason::PacketSerializeError);
}

#[test]
fn test_split_frame_is_reassembled() {
    let host = start_host();
    let mut raw = TcpStream::connect(host.local_addr()).unwrap();
    raw.set_nodelay(true).unwrap();
    let server = poll_for(WAIT, || host.poll_new_connection()).unwrap();

    let mut frame = vec![1u8];
    frame.extend_from_slice(&4i32.to_le_bytes());
    frame.extend_from_slice(&(-42i32).to_le_bytes());

    for byte in frame {
        raw.write_all(&[byte]).unwrap();
        std::thread::sleep(Duration::from_millis(5));
    }

    let packet = receive(&*server);
    assert_eq!(packet.to_contract::<Number>().unwrap().number, -42);
    assert!(server.is_active());
}
