//! Demo contracts
//!
//! The contract group spoken by the `tandem-host` and `tandem-client`
//! binaries.

use std::sync::Arc;

use crate::error::Result;
use crate::protocol::{ContractGroup, ContractMember, ContractRegistry, FieldKind, FieldValue, NetContract, Packet};

/// Name the demo group is registered under
pub const GROUP: &str = "demo";

/// A single number
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Number {
    pub number: i32,
}

impl NetContract for Number {
    const ID: u8 = 1;
    const NAME: &'static str = "Number";

    fn members() -> Vec<ContractMember> {
        vec![ContractMember::new(1, "number", FieldKind::I32)]
    }

    fn to_fields(&self) -> Vec<(u32, FieldValue)> {
        vec![(1, self.number.into())]
    }

    fn from_packet(packet: &Packet) -> Result<Self> {
        Ok(Self {
            number: packet.value(1)?,
        })
    }
}

/// A line of text from a named sender
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chat {
    pub sender: String,
    pub text: String,
    pub sequence: u64,
}

impl NetContract for Chat {
    const ID: u8 = 2;
    const NAME: &'static str = "Chat";

    fn members() -> Vec<ContractMember> {
        vec![
            ContractMember::new(1, "sender", FieldKind::Str),
            ContractMember::new(2, "text", FieldKind::Str),
            ContractMember::new(3, "sequence", FieldKind::U64),
        ]
    }

    fn to_fields(&self) -> Vec<(u32, FieldValue)> {
        vec![
            (1, self.sender.as_str().into()),
            (2, self.text.as_str().into()),
            (3, self.sequence.into()),
        ]
    }

    fn from_packet(packet: &Packet) -> Result<Self> {
        Ok(Self {
            sender: packet.value(1)?,
            text: packet.value(2)?,
            sequence: packet.value(3)?,
        })
    }
}

pub fn contract_group() -> ContractGroup {
    ContractGroup::new(GROUP).contract::<Number>().contract::<Chat>()
}

/// Registry holding only the demo group
pub fn registry() -> Result<Arc<ContractRegistry>> {
    let mut builder = ContractRegistry::builder();
    builder.register_group(contract_group())?;
    Ok(builder.build())
}
