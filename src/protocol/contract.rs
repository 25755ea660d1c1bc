//! Contract declarations
//!
//! A contract describes one message shape: its id, its members in wire
//! order, and how to construct an empty instance. Contracts are grouped into
//! named `ContractGroup`s that share one id namespace.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, TandemError};

use super::{FieldKind, FieldValue, Packet};

/// Zero-argument construction path for a contract's packets
pub type PacketConstructor = Arc<dyn Fn() -> Packet + Send + Sync>;

/// One declared member of a contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractMember {
    /// Position in the wire payload; unique within the contract
    pub order: u32,

    /// Member name (diagnostics only, never sent)
    pub name: String,

    pub kind: FieldKind,
}

impl ContractMember {
    pub fn new(order: u32, name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            order,
            name: name.into(),
            kind,
        }
    }
}

/// A statically declared message type
///
/// ```
/// use tandem::protocol::{ContractMember, FieldKind, FieldValue, NetContract, Packet};
///
/// #[derive(Default)]
/// struct Ping {
///     number: i32,
/// }
///
/// impl NetContract for Ping {
///     const ID: u8 = 1;
///     const NAME: &'static str = "Ping";
///
///     fn members() -> Vec<ContractMember> {
///         vec![ContractMember::new(1, "number", FieldKind::I32)]
///     }
///
///     fn to_fields(&self) -> Vec<(u32, FieldValue)> {
///         vec![(1, self.number.into())]
///     }
///
///     fn from_packet(packet: &Packet) -> tandem::Result<Self> {
///         Ok(Self { number: packet.value(1)? })
///     }
/// }
/// ```
pub trait NetContract: Default + 'static {
    /// Contract id, unique within its group
    const ID: u8;

    /// Human-readable name for logs and errors
    const NAME: &'static str;

    /// Members in any order; the schema sorts them by `order`
    fn members() -> Vec<ContractMember>;

    /// Current member values keyed by order
    fn to_fields(&self) -> Vec<(u32, FieldValue)>;

    /// Rebuild from a decoded packet of this contract
    fn from_packet(packet: &Packet) -> Result<Self>;
}

/// Runtime description of one contract
#[derive(Clone)]
pub struct ContractSchema {
    id: u8,
    name: String,
    members: Vec<ContractMember>,
    constructor: Option<PacketConstructor>,
}

impl ContractSchema {
    /// Start a schema with no members and no constructor
    pub fn new(id: u8, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            members: Vec::new(),
            constructor: None,
        }
    }

    /// Schema of a typed contract, constructed through `Default`
    pub fn of<C: NetContract>() -> Self {
        let mut schema = Self::new(C::ID, C::NAME);
        for member in C::members() {
            schema = schema.with_member(member);
        }
        schema.constructor = Some(Arc::new(|| Packet::from_contract(&C::default())));
        schema
    }

    /// Add a member
    pub fn member(self, order: u32, name: impl Into<String>, kind: FieldKind) -> Self {
        self.with_member(ContractMember::new(order, name, kind))
    }

    fn with_member(mut self, member: ContractMember) -> Self {
        let index = self
            .members
            .partition_point(|existing| existing.order <= member.order);
        self.members.insert(index, member);
        self
    }

    /// Use a custom constructor
    pub fn constructor(mut self, constructor: impl Fn() -> Packet + Send + Sync + 'static) -> Self {
        self.constructor = Some(Arc::new(constructor));
        self
    }

    /// Construct packets with every member at its kind's default value
    pub fn default_constructor(mut self) -> Self {
        let id = self.id;
        let defaults: Vec<(u32, FieldKind)> =
            self.members.iter().map(|m| (m.order, m.kind)).collect();
        self.constructor = Some(Arc::new(move || {
            defaults
                .iter()
                .fold(Packet::new(id), |packet, (order, kind)| {
                    packet.with(*order, kind.default_value())
                })
        }));
        self
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Members sorted by ascending order
    pub fn members(&self) -> &[ContractMember] {
        &self.members
    }

    pub fn member_at(&self, order: u32) -> Option<&ContractMember> {
        self.members
            .binary_search_by_key(&order, |m| m.order)
            .ok()
            .map(|index| &self.members[index])
    }

    pub fn has_constructor(&self) -> bool {
        self.constructor.is_some()
    }

    /// Run the zero-argument construction path
    pub fn construct(&self) -> Option<Packet> {
        self.constructor.as_ref().map(|construct| construct())
    }

    /// Check the schema is usable for wire encoding
    pub(crate) fn validate(&self) -> Result<()> {
        if self.members.is_empty() {
            return Err(TandemError::Contract(format!(
                "failed to find any members in contract {}[{}]",
                self.name, self.id
            )));
        }

        let mut seen = HashSet::new();
        for member in &self.members {
            if !seen.insert(member.order) {
                return Err(TandemError::Contract(format!(
                    "contract {}[{}] declares order {} more than once",
                    self.name, self.id, member.order
                )));
            }
        }

        let sample = self.construct().ok_or_else(|| {
            TandemError::Contract(format!(
                "contract {}[{}] has no zero-argument constructor",
                self.name, self.id
            ))
        })?;
        if sample.contract_id() != self.id {
            return Err(TandemError::Contract(format!(
                "constructor of {}[{}] builds packets with id {}",
                self.name,
                self.id,
                sample.contract_id()
            )));
        }
        if let Some((order, _)) = sample.fields().find(|(order, _)| self.member_at(*order).is_none()) {
            return Err(TandemError::Contract(format!(
                "constructor of {}[{}] sets undeclared order {}",
                self.name, self.id, order
            )));
        }

        Ok(())
    }
}

impl fmt::Debug for ContractSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractSchema")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("members", &self.members)
            .field("has_constructor", &self.constructor.is_some())
            .finish()
    }
}

/// A named collection of contracts sharing one id namespace
#[derive(Debug, Clone)]
pub struct ContractGroup {
    name: String,
    schemas: Vec<ContractSchema>,
}

impl ContractGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schemas: Vec::new(),
        }
    }

    /// Add a typed contract
    pub fn contract<C: NetContract>(self) -> Self {
        self.schema(ContractSchema::of::<C>())
    }

    /// Add a hand-built schema
    pub fn schema(mut self, schema: ContractSchema) -> Self {
        self.schemas.push(schema);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schemas(&self) -> &[ContractSchema] {
        &self.schemas
    }
}
