//! Tandem Client Binary
//!
//! Connects to a demo host, sends numbered packets and prints the echoes.

use std::net::SocketAddr;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tandem::demo::{self, Chat, Number};
use tandem::network::{ConnectStep, HybridConnecting, Protocol, TcpConnecting};
use tandem::timer::TimeoutTimer;
use tandem::{ClosingReason, NetConfig, NetConnection, Packet};
use tracing_subscriber::{fmt, EnvFilter};

/// Tandem demo client
#[derive(Parser, Debug)]
#[command(name = "tandem-client")]
#[command(about = "Client for the tandem demo host")]
#[command(version)]
struct Args {
    /// Host TCP address
    #[arg(short, long, default_value = "127.0.0.1:7777")]
    server: SocketAddr,

    /// Number of packets to send
    #[arg(short, long, default_value = "5")]
    count: u32,

    /// Seconds to wait for all echoes
    #[arg(short, long, default_value = "5")]
    wait: u64,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Plain TCP connection
    Tcp,

    /// TCP paired with UDP through the token handshake
    Hybrid {
        /// Host UDP address
        #[arg(short, long, default_value = "127.0.0.1:7778")]
        udp: SocketAddr,
    },

    /// Send chat lines instead of numbers
    Chat {
        /// Sender name
        #[arg(short, long, default_value = "client")]
        name: String,

        /// Text to send
        text: String,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tandem=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    if let Err(e) = run(&args) {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> tandem::Result<()> {
    let registry = demo::registry()?;
    let group = registry.group(demo::GROUP)?;
    let config = NetConfig::default();
    let span = tracing::Span::current();

    match &args.mode {
        Mode::Tcp => {
            let connection = TcpConnecting::connect(args.server, group.clone(), group, &config, &span)?;
            exchange(&connection, args, |number| Packet::from_contract(&Number { number }))
        }
        Mode::Hybrid { udp } => {
            let process = HybridConnecting::connect_async(args.server, *udp, group.clone(), group, config, &span)?;

            let mut last = ConnectStep::Waiting;
            while !process.is_finished() {
                let step = process.step();
                if step != last {
                    tracing::info!("Connect step: {:?}", step);
                    last = step;
                }
                thread::sleep(Duration::from_millis(10));
            }

            let connection = process.join()?;
            tracing::info!("Paired with token {:#010x}, udp {}", connection.token(), connection.udp_remote_addr());

            // Alternate transports to show both paths
            for i in 0..args.count {
                let packet = Packet::from_contract(&Number { number: i as i32 });
                let protocol = if i % 2 == 0 { Protocol::Tcp } else { Protocol::Udp };
                connection.send_via(packet, protocol);
            }
            collect(&connection, args)
        }
        Mode::Chat { name, text } => {
            let connection = TcpConnecting::connect(args.server, group.clone(), group, &config, &span)?;
            for sequence in 0..args.count {
                connection.send_contract(&Chat {
                    sender: name.clone(),
                    text: text.clone(),
                    sequence: sequence as u64,
                });
            }
            collect(&connection, args)
        }
    }
}

fn exchange<C, F>(connection: &C, args: &Args, make: F) -> tandem::Result<()>
where
    C: NetConnection,
    F: Fn(i32) -> Packet,
{
    for i in 0..args.count {
        connection.send(make(i as i32));
    }
    collect(connection, args)
}

/// Print echoes until `count` arrive or the wait runs out
fn collect<C: NetConnection>(connection: &C, args: &Args) -> tandem::Result<()> {
    let deadline = TimeoutTimer::start_new(Duration::from_secs(args.wait));
    let mut received = 0;

    while received < args.count && !deadline.is_timed_out() && connection.is_active() {
        match connection.poll_receive_packet() {
            Some(packet) => {
                received += 1;
                if let Ok(number) = packet.to_contract::<Number>() {
                    println!("echo: {}", number.number);
                } else if let Ok(chat) = packet.to_contract::<Chat>() {
                    println!("echo #{} <{}> {}", chat.sequence, chat.sender, chat.text);
                }
            }
            None => thread::sleep(Duration::from_millis(5)),
        }
    }

    println!(
        "received {}/{} echoes in {:?}",
        received,
        args.count,
        connection.time_alive()
    );
    tracing::info!("Traffic: {:?}", connection.byte_record());

    connection.close(ClosingReason::ClosedSelf, None);
    Ok(())
}
