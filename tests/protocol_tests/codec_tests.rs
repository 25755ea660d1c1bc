//! Codec Tests
//!
//! Tests for frame encoding/decoding against a registered group.

use std::sync::Arc;

use tandem::protocol::{
    serialize, try_deserialize, ContractGroup, ContractRegistry, ContractSchema, FieldKind,
    FrameCodec, GroupTable, Packet, HEADER_SIZE,
};
use tandem::TandemError;

// =============================================================================
// Helper Functions
// =============================================================================

const NUMBER: u8 = 1;
const EVERYTHING: u8 = 2;
const NOTE: u8 = 3;

fn group() -> Arc<GroupTable> {
    let contracts = ContractGroup::new("codec")
        .schema(
            ContractSchema::new(NUMBER, "Number")
                .member(1, "number", FieldKind::I32)
                .default_constructor(),
        )
        .schema(
            ContractSchema::new(EVERYTHING, "Everything")
                .member(1, "flag", FieldKind::Bool)
                .member(2, "byte", FieldKind::U8)
                .member(3, "int", FieldKind::I32)
                .member(4, "uint", FieldKind::U32)
                .member(5, "long", FieldKind::I64)
                .member(6, "ulong", FieldKind::U64)
                .member(7, "float", FieldKind::F32)
                .member(8, "double", FieldKind::F64)
                .member(9, "text", FieldKind::Str)
                .member(10, "blob", FieldKind::Bytes)
                .default_constructor(),
        )
        .schema(
            ContractSchema::new(NOTE, "Note")
                .member(1, "text", FieldKind::Str)
                .default_constructor(),
        );

    let mut builder = ContractRegistry::builder();
    builder.register_group(contracts).unwrap();
    builder.build().group("codec").unwrap()
}

fn number(value: i32) -> Packet {
    Packet::new(NUMBER).with(1, value)
}

fn everything_max() -> Packet {
    Packet::new(EVERYTHING)
        .with(1, true)
        .with(2, u8::MAX)
        .with(3, i32::MIN)
        .with(4, u32::MAX)
        .with(5, i64::MIN)
        .with(6, u64::MAX)
        .with(7, f32::MAX)
        .with(8, f64::MIN_POSITIVE)
        .with(9, "héllo wörld")
        .with(10, vec![0u8, 255, 1, 254])
}

fn assert_format_error<T: std::fmt::Debug>(result: tandem::Result<T>) {
    match result {
        Err(TandemError::Format(_)) => {}
        other => panic!("expected Format error, got {:?}", other),
    }
}

fn assert_serialization_error<T: std::fmt::Debug>(result: tandem::Result<T>) {
    match result {
        Err(TandemError::Serialization(_)) => {}
        other => panic!("expected Serialization error, got {:?}", other),
    }
}

// =============================================================================
// Frame Layout Tests
// =============================================================================

#[test]
fn test_number_frame_layout() {
    let frame = serialize(&number(222), &group()).unwrap();

    assert_eq!(frame.len(), HEADER_SIZE + 4);
    assert_eq!(frame[0], NUMBER);
    assert_eq!(&frame[1..5], &4i32.to_le_bytes());
    assert_eq!(&frame[5..], &222i32.to_le_bytes());
}

#[test]
fn test_string_carries_u64_length() {
    let frame = serialize(&Packet::new(NOTE).with(1, "abc"), &group()).unwrap();

    assert_eq!(&frame[1..5], &11i32.to_le_bytes());
    assert_eq!(&frame[5..13], &3u64.to_le_bytes());
    assert_eq!(&frame[13..], b"abc");
}

// =============================================================================
// Round Trip Tests
// =============================================================================

#[test]
fn test_round_trip_number() {
    let group = group();
    let packet = number(-7);
    let frame = serialize(&packet, &group).unwrap();

    let (decoded, consumed) = try_deserialize(&frame, &group).unwrap().unwrap();
    assert_eq!(decoded, packet);
    assert_eq!(consumed, frame.len());
}

#[test]
fn test_round_trip_extreme_values() {
    let group = group();
    let packet = everything_max();
    let frame = serialize(&packet, &group).unwrap();

    let (decoded, consumed) = try_deserialize(&frame, &group).unwrap().unwrap();
    assert_eq!(decoded, packet);
    assert_eq!(consumed, frame.len());
}

#[test]
fn test_round_trip_empty_string() {
    let group = group();
    let packet = Packet::new(NOTE).with(1, "");
    let frame = serialize(&packet, &group).unwrap();

    let (decoded, _) = try_deserialize(&frame, &group).unwrap().unwrap();
    assert_eq!(decoded.value::<String>(1).unwrap(), "");
}

#[test]
fn test_consecutive_frames_decode_in_order() {
    let group = group();
    let mut stream = serialize(&number(1), &group).unwrap();
    stream.extend(serialize(&Packet::new(NOTE).with(1, "middle"), &group).unwrap());
    stream.extend(serialize(&number(3), &group).unwrap());

    let mut offset = 0;
    let mut decoded = Vec::new();
    while let Some((packet, consumed)) = try_deserialize(&stream[offset..], &group).unwrap() {
        decoded.push(packet);
        offset += consumed;
    }

    assert_eq!(offset, stream.len());
    assert_eq!(decoded.len(), 3);
    assert_eq!(decoded[0].value::<i32>(1).unwrap(), 1);
    assert_eq!(decoded[1].value::<String>(1).unwrap(), "middle");
    assert_eq!(decoded[2].value::<i32>(1).unwrap(), 3);
}

// =============================================================================
// Partial Frame Tests
// =============================================================================

#[test]
fn test_every_strict_prefix_is_incomplete() {
    let group = group();
    let frame = serialize(&everything_max(), &group).unwrap();

    for len in 0..frame.len() {
        let result = try_deserialize(&frame[..len], &group).unwrap();
        assert!(result.is_none(), "prefix of {} bytes decoded", len);
    }
}

#[test]
fn test_unknown_id_waits_for_full_frame() {
    let group = group();
    let mut frame = vec![99u8];
    frame.extend_from_slice(&4i32.to_le_bytes());
    frame.extend_from_slice(&[1, 2]);

    assert!(try_deserialize(&frame, &group).unwrap().is_none());

    frame.extend_from_slice(&[3, 4]);
    assert_format_error(try_deserialize(&frame, &group));
}

// =============================================================================
// Malformed Frame Tests
// =============================================================================

#[test]
fn test_negative_length_is_rejected() {
    let mut frame = vec![NUMBER];
    frame.extend_from_slice(&(-1i32).to_le_bytes());
    assert_format_error(try_deserialize(&frame, &group()));
}

#[test]
fn test_oversized_length_is_rejected_from_header() {
    let codec = FrameCodec::new(64);
    let mut frame = vec![NOTE];
    frame.extend_from_slice(&65i32.to_le_bytes());

    // Rejected before any payload arrives
    assert_format_error(codec.try_deserialize(&frame, &group()));
}

#[test]
fn test_short_payload_is_rejected() {
    // Declares 2 bytes but the i32 member needs 4
    let mut frame = vec![NUMBER];
    frame.extend_from_slice(&2i32.to_le_bytes());
    frame.extend_from_slice(&[1, 2]);
    assert_format_error(try_deserialize(&frame, &group()));
}

#[test]
fn test_trailing_payload_bytes_are_rejected() {
    let mut frame = vec![NUMBER];
    frame.extend_from_slice(&6i32.to_le_bytes());
    frame.extend_from_slice(&[1, 0, 0, 0, 9, 9]);
    assert_format_error(try_deserialize(&frame, &group()));
}

#[test]
fn test_string_length_past_payload_is_rejected() {
    let mut frame = vec![NOTE];
    frame.extend_from_slice(&9i32.to_le_bytes());
    frame.extend_from_slice(&100u64.to_le_bytes());
    frame.push(b'x');
    assert_format_error(try_deserialize(&frame, &group()));
}

// =============================================================================
// Serialize Error Tests
// =============================================================================

#[test]
fn test_serialize_unknown_id_fails() {
    assert_serialization_error(serialize(&Packet::new(42).with(1, 0i32), &group()));
}

#[test]
fn test_serialize_missing_member_fails() {
    assert_serialization_error(serialize(&Packet::new(NUMBER), &group()));
}

#[test]
fn test_serialize_wrong_kind_fails() {
    assert_serialization_error(serialize(&Packet::new(NUMBER).with(1, 5u32), &group()));
}

#[test]
fn test_serialize_undeclared_member_fails() {
    let packet = number(1).with(2, true);
    assert_serialization_error(serialize(&packet, &group()));
}

#[test]
fn test_serialize_oversized_payload_fails() {
    let codec = FrameCodec::new(16);
    let packet = Packet::new(NOTE).with(1, "this text is longer than the limit");
    assert_serialization_error(codec.serialize(&packet, &group()));
}
