//! # Tandem
//!
//! A small bidirectional packet transport with:
//! - A tick-scheduled worker primitive (`ThreadRun`) every host runs on
//! - Length-prefixed, contract-tagged packet framing
//! - TCP connections with per-connection receive and send threads
//! - Hybrid connections pairing TCP with UDP through a token handshake
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Application (poll / send)                    │
//! └──────────────┬──────────────────────────────┬───────────────┘
//!                │                              │
//! ┌──────────────▼──────────────┐  ┌────────────▼───────────────┐
//! │     Host (TCP / Hybrid)      │  │  Connect (TCP / Hybrid)     │
//! │  ThreadRun: accept, prune,   │  │  dial, token handshake      │
//! │  udp demux, poll queue       │  │                             │
//! └──────────────┬──────────────┘  └────────────┬───────────────┘
//!                │                              │
//!                └──────────────┬───────────────┘
//!                               ▼
//!                 ┌───────────────────────────┐
//!                 │  Connection (TCP/UDP/Hyb)  │
//!                 │  PacketQueue in / out      │
//!                 └─────────────┬─────────────┘
//!                               ▼
//!                 ┌───────────────────────────┐
//!                 │   Protocol (contracts,     │
//!                 │   frame codec)             │
//!                 └───────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod timer;
pub mod threading;
pub mod protocol;
pub mod network;

pub mod demo;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, TandemError};
pub use config::{NetConfig, NetConfigBuilder};
pub use network::{ClosingReason, ConnectionState, Host, NetConnection, Protocol};
pub use protocol::{ContractGroup, ContractRegistry, NetContract, Packet};
pub use threading::{ThreadRun, ThreadRunner};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of Tandem
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
