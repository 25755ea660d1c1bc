//! Tandem Host Binary
//!
//! Runs a TCP or hybrid host speaking the demo contracts and echoes every
//! packet back to its sender.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use tandem::demo::{self, Chat, Number};
use tandem::network::{HybridHost, Protocol, TcpHost};
use tandem::timer::SimpleTimer;
use tandem::{Host, NetConfig, NetConnection, Packet};
use tracing_subscriber::{fmt, EnvFilter};

/// Tandem demo host
#[derive(Parser, Debug)]
#[command(name = "tandem-host")]
#[command(about = "Echo host for the tandem demo contracts")]
#[command(version)]
struct Args {
    /// TCP listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:7777")]
    listen: String,

    /// UDP listen address; enables the hybrid host
    #[arg(short, long)]
    udp: Option<String>,

    /// Host tick interval in milliseconds
    #[arg(short, long, default_value = "250")]
    tick_ms: u64,

    /// Stop after this many seconds (0 runs until killed)
    #[arg(short, long, default_value = "0")]
    run_for: u64,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tandem=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("Tandem Host v{}", tandem::VERSION);
    tracing::info!("TCP address: {}", args.listen);
    if let Some(udp) = &args.udp {
        tracing::info!("UDP address: {}", udp);
    }

    let config = NetConfig::builder()
        .host_tick_interval(Duration::from_millis(args.tick_ms))
        .build();

    let result = match &args.udp {
        Some(udp) => HybridHost::bind(
            args.listen.as_str(),
            udp.as_str(),
            group(),
            group(),
            config,
            &tracing::Span::current(),
        )
        .and_then(|host| serve(&host, args.run_for, true)),
        None => TcpHost::bind(
            args.listen.as_str(),
            group(),
            group(),
            config,
            &tracing::Span::current(),
        )
        .and_then(|host| serve(&host, args.run_for, false)),
    };

    if let Err(e) = result {
        tracing::error!("Host error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Host stopped");
}

fn group() -> Arc<tandem::protocol::GroupTable> {
    match demo::registry().and_then(|registry| registry.group(demo::GROUP)) {
        Ok(group) => group,
        Err(e) => {
            tracing::error!("Failed to register demo contracts: {}", e);
            std::process::exit(1);
        }
    }
}

/// Poll for connections and echo their packets until `run_for` elapses
fn serve<H>(host: &H, run_for: u64, hybrid: bool) -> tandem::Result<()>
where
    H: Host,
    H::Connection: EchoTarget + 'static,
{
    host.start()?;
    tracing::info!("Listening on {}", host.local_addr());

    let uptime = SimpleTimer::start_new();
    let mut connections: Vec<Arc<H::Connection>> = Vec::new();

    while run_for == 0 || uptime.elapsed() < Duration::from_secs(run_for) {
        while let Some(connection) = host.poll_new_connection() {
            tracing::info!("Client connected: {}", connection.remote_addr());
            connections.push(connection);
        }

        connections.retain(|connection| {
            while let Some(packet) = connection.poll_receive_packet() {
                echo(connection.as_ref(), packet, hybrid);
            }
            if connection.is_active() {
                return true;
            }
            tracing::info!(
                "Client disconnected: {} [{}] {:?}",
                connection.remote_addr(),
                connection.closing_reason(),
                connection.byte_record()
            );
            false
        });

        thread::sleep(Duration::from_millis(5));
    }

    host.close();
    Ok(())
}

fn echo<C: EchoTarget>(connection: &C, packet: Packet, hybrid: bool) {
    if let Ok(number) = packet.to_contract::<Number>() {
        tracing::info!("{} sent number {}", connection.remote_addr(), number.number);
    } else if let Ok(chat) = packet.to_contract::<Chat>() {
        tracing::info!("{} <{}> {}", connection.remote_addr(), chat.sender, chat.text);
    }

    // Hybrid clients get their echo over UDP
    if hybrid {
        connection.reply(packet, Protocol::Udp);
    } else {
        connection.reply(packet, Protocol::Tcp);
    }
}

/// Connections the demo host can answer
trait EchoTarget: NetConnection {
    fn reply(&self, packet: Packet, protocol: Protocol);
}

impl EchoTarget for tandem::network::TcpConnection {
    fn reply(&self, packet: Packet, _protocol: Protocol) {
        self.send(packet);
    }
}

impl EchoTarget for tandem::network::HybridConnection {
    fn reply(&self, packet: Packet, protocol: Protocol) {
        self.send_via(packet, protocol);
    }
}
