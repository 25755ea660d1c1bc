//! Protocol codec
//!
//! Encoding and decoding of contract frames.
//!
//! ## Wire Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │  Id (1)  │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Payload
//! Members of the contract in ascending order, no tags:
//! - bool / u8:        1 byte
//! - i32 / u32 / f32:  4 bytes LE
//! - i64 / u64 / f64:  8 bytes LE
//! - string / bytes:   len (8 bytes LE) + data

use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, TandemError};

use super::{ContractSchema, FieldKind, FieldValue, GroupTable, Packet};

/// Header size: 1 byte contract id + 4 bytes length
pub const HEADER_SIZE: usize = 5;

/// Maximum payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Serialize with the default payload limit
pub fn serialize(packet: &Packet, group: &GroupTable) -> Result<Vec<u8>> {
    FrameCodec::default().serialize(packet, group)
}

/// Deserialize with the default payload limit
pub fn try_deserialize(buffer: &[u8], group: &GroupTable) -> Result<Option<(Packet, usize)>> {
    FrameCodec::default().try_deserialize(buffer, group)
}

/// Frame encoder/decoder with a payload size limit
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_payload_size: u32,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_PAYLOAD_SIZE)
    }
}

impl FrameCodec {
    pub fn new(max_payload_size: u32) -> Self {
        Self {
            max_payload_size: max_payload_size.min(i32::MAX as u32),
        }
    }

    pub fn max_payload_size(&self) -> u32 {
        self.max_payload_size
    }

    // =========================================================================
    // Encoding
    // =========================================================================

    /// Encode `packet` as one frame
    ///
    /// Format: id (1) + payload_len (4) + payload. Fails rather than
    /// truncating when the packet does not match its schema or is too large.
    pub fn serialize(&self, packet: &Packet, group: &GroupTable) -> Result<Vec<u8>> {
        let schema = group.resolve(packet.contract_id()).map_err(|e| {
            TandemError::Serialization(format!("cannot serialize packet: {}", e))
        })?;

        let payload = encode_payload(packet, schema)?;
        if payload.len() > self.max_payload_size as usize {
            return Err(TandemError::Serialization(format!(
                "{} payload too large: {} bytes (max {})",
                schema.name(),
                payload.len(),
                self.max_payload_size
            )));
        }

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
        frame.push(packet.contract_id());
        frame.extend_from_slice(&(payload.len() as i32).to_le_bytes());
        frame.extend_from_slice(&payload);

        Ok(frame)
    }

    // =========================================================================
    // Decoding
    // =========================================================================

    /// Decode the first frame in `buffer`
    ///
    /// Returns `Ok(None)` while the frame is incomplete, otherwise the packet
    /// and the number of bytes it occupied. A negative or oversized length,
    /// an unknown id, or a payload that does not match its schema is a
    /// `Format` error.
    pub fn try_deserialize(
        &self,
        buffer: &[u8],
        group: &GroupTable,
    ) -> Result<Option<(Packet, usize)>> {
        if buffer.len() < HEADER_SIZE {
            return Ok(None);
        }

        // Parse header
        let contract_id = buffer[0];
        let declared = i32::from_le_bytes([buffer[1], buffer[2], buffer[3], buffer[4]]);

        // Validate payload length
        if declared < 0 {
            return Err(TandemError::Format(format!(
                "negative payload length {} for id {}",
                declared, contract_id
            )));
        }
        if declared as u32 > self.max_payload_size {
            return Err(TandemError::Format(format!(
                "payload too large: {} bytes (max {})",
                declared, self.max_payload_size
            )));
        }

        let total_len = HEADER_SIZE + declared as usize;
        if buffer.len() < total_len {
            return Ok(None);
        }

        let schema = group.resolve(contract_id).map_err(|_| {
            TandemError::Format(format!(
                "unknown contract id {} in group \"{}\"",
                contract_id,
                group.name()
            ))
        })?;

        let packet = decode_payload(&buffer[HEADER_SIZE..total_len], schema)?;
        Ok(Some((packet, total_len)))
    }
}

// =============================================================================
// Payload Encoding/Decoding
// =============================================================================

/// Encode the members of `packet` in schema order
fn encode_payload(packet: &Packet, schema: &ContractSchema) -> Result<Vec<u8>> {
    if let Some((order, _)) = packet.fields().find(|(order, _)| schema.member_at(*order).is_none()) {
        return Err(TandemError::Serialization(format!(
            "{} has no member at order {}",
            schema.name(),
            order
        )));
    }

    let mut payload = Vec::new();
    for member in schema.members() {
        let value = packet.get(member.order).ok_or_else(|| {
            TandemError::Serialization(format!(
                "{} is missing member [{}] {}",
                schema.name(),
                member.order,
                member.name
            ))
        })?;

        if value.kind() != member.kind {
            return Err(TandemError::Serialization(format!(
                "{} member [{}] {} expects {}, found {}",
                schema.name(),
                member.order,
                member.name,
                member.kind,
                value.kind()
            )));
        }

        encode_field(&mut payload, value)?;
    }

    Ok(payload)
}

/// Decode a complete payload into a packet built by the schema's constructor
fn decode_payload(payload: &[u8], schema: &ContractSchema) -> Result<Packet> {
    let mut packet = schema.construct().ok_or_else(|| {
        TandemError::Format(format!("{} cannot be constructed", schema.name()))
    })?;

    let mut cursor = payload;
    for member in schema.members() {
        let value = decode_field(&mut cursor, member.kind).map_err(|e| {
            TandemError::Format(format!(
                "{} member [{}] {}: {}",
                schema.name(),
                member.order,
                member.name,
                e
            ))
        })?;
        packet.set(member.order, value);
    }

    if !cursor.is_empty() {
        return Err(TandemError::Format(format!(
            "{} payload has {} trailing bytes",
            schema.name(),
            cursor.len()
        )));
    }

    Ok(packet)
}

fn encode_field(out: &mut Vec<u8>, value: &FieldValue) -> Result<()> {
    match value {
        FieldValue::Bool(v) => put(out, v),
        FieldValue::U8(v) => put(out, v),
        FieldValue::I32(v) => put(out, v),
        FieldValue::U32(v) => put(out, v),
        FieldValue::I64(v) => put(out, v),
        FieldValue::U64(v) => put(out, v),
        FieldValue::F32(v) => put(out, v),
        FieldValue::F64(v) => put(out, v),
        FieldValue::Str(v) => put(out, v),
        FieldValue::Bytes(v) => put(out, v),
    }
}

fn decode_field(cursor: &mut &[u8], kind: FieldKind) -> Result<FieldValue> {
    Ok(match kind {
        FieldKind::Bool => FieldValue::Bool(take(cursor)?),
        FieldKind::U8 => FieldValue::U8(take(cursor)?),
        FieldKind::I32 => FieldValue::I32(take(cursor)?),
        FieldKind::U32 => FieldValue::U32(take(cursor)?),
        FieldKind::I64 => FieldValue::I64(take(cursor)?),
        FieldKind::U64 => FieldValue::U64(take(cursor)?),
        FieldKind::F32 => FieldValue::F32(take(cursor)?),
        FieldKind::F64 => FieldValue::F64(take(cursor)?),
        FieldKind::Str => FieldValue::Str(take(cursor)?),
        FieldKind::Bytes => FieldValue::Bytes(take(cursor)?),
    })
}

fn put<T: Serialize + ?Sized>(out: &mut Vec<u8>, value: &T) -> Result<()> {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .serialize_into(out, value)
        .map_err(|e| TandemError::Serialization(e.to_string()))
}

/// Read one value, never past the end of the payload
fn take<T: DeserializeOwned>(cursor: &mut &[u8]) -> Result<T> {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(cursor.len() as u64)
        .deserialize_from(cursor)
        .map_err(|e| TandemError::Format(e.to_string()))
}
