//! Protocol Module
//!
//! Contract-based packet framing shared by every transport.
//!
//! ## Frame Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │  Id (1)  │ Len (4)  │      Field-ordered payload  │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//! - Id: contract id, unique within the contract group
//! - Len: payload length, `i32` little endian
//! - Payload: the contract's members in ascending `order`, each encoded
//!   with bincode fixed-int little-endian encoding (strings and byte arrays
//!   carry a `u64` length)
//!
//! ## Contracts
//! Every message shape is declared up front, either as a `NetContract`
//! implementation or as a hand-built `ContractSchema`, collected into a
//! `ContractGroup`, and registered into an immutable `ContractRegistry`
//! before any socket traffic.

mod field;
mod packet;
mod contract;
mod registry;
mod codec;

pub use field::{FieldKind, FieldValue};
pub use packet::Packet;
pub use contract::{ContractGroup, ContractMember, ContractSchema, NetContract, PacketConstructor};
pub use registry::{ContractRegistry, GroupTable, RegistryBuilder};
pub use codec::{
    serialize, try_deserialize, FrameCodec, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
