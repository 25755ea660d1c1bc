//! Packet values
//!
//! A packet is the decoded form of one frame: a contract id plus member
//! values keyed by their `order`.

use std::collections::BTreeMap;

use crate::error::{Result, TandemError};

use super::{FieldValue, NetContract};

/// One message instance
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// Contract id within the packet's group
    contract_id: u8,

    /// Member values keyed by member order
    fields: BTreeMap<u32, FieldValue>,
}

impl Packet {
    /// Create an empty packet for `contract_id`
    pub fn new(contract_id: u8) -> Self {
        Self {
            contract_id,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style `set`
    pub fn with(mut self, order: u32, value: impl Into<FieldValue>) -> Self {
        self.set(order, value);
        self
    }

    /// Set the value of the member at `order`
    pub fn set(&mut self, order: u32, value: impl Into<FieldValue>) {
        self.fields.insert(order, value.into());
    }

    /// Build the packet for a typed contract value
    pub fn from_contract<C: NetContract>(contract: &C) -> Self {
        let mut packet = Self::new(C::ID);
        for (order, value) in contract.to_fields() {
            packet.fields.insert(order, value);
        }
        packet
    }

    /// Convert back into a typed contract value
    ///
    /// Fails if the packet carries a different contract id.
    pub fn to_contract<C: NetContract>(&self) -> Result<C> {
        if !self.is::<C>() {
            return Err(TandemError::Format(format!(
                "packet id {} is not contract {}[{}]",
                self.contract_id,
                C::NAME,
                C::ID
            )));
        }
        C::from_packet(self)
    }

    /// True if this packet carries contract `C`
    pub fn is<C: NetContract>(&self) -> bool {
        self.contract_id == C::ID
    }

    pub fn contract_id(&self) -> u8 {
        self.contract_id
    }

    pub fn get(&self, order: u32) -> Option<&FieldValue> {
        self.fields.get(&order)
    }

    /// Typed read of the member at `order`
    ///
    /// ```
    /// use tandem::protocol::Packet;
    ///
    /// let packet = Packet::new(1).with(1, 222i32);
    /// assert_eq!(packet.value::<i32>(1).unwrap(), 222);
    /// ```
    pub fn value<T>(&self, order: u32) -> Result<T>
    where
        T: for<'a> TryFrom<&'a FieldValue, Error = TandemError>,
    {
        let value = self.get(order).ok_or_else(|| {
            TandemError::Format(format!(
                "packet id {} has no member at order {}",
                self.contract_id, order
            ))
        })?;
        T::try_from(value)
    }

    /// Members in ascending order
    pub fn fields(&self) -> impl Iterator<Item = (u32, &FieldValue)> {
        self.fields.iter().map(|(order, value)| (*order, value))
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}
