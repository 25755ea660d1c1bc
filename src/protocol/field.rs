//! Field kinds and values
//!
//! The closed set of types a contract member can carry on the wire.

use std::fmt;

use crate::error::TandemError;

/// Wire type of a contract member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Bool,
    U8,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Str,
    Bytes,
}

impl FieldKind {
    /// Value a freshly constructed packet holds for this kind
    pub fn default_value(self) -> FieldValue {
        match self {
            FieldKind::Bool => FieldValue::Bool(false),
            FieldKind::U8 => FieldValue::U8(0),
            FieldKind::I32 => FieldValue::I32(0),
            FieldKind::U32 => FieldValue::U32(0),
            FieldKind::I64 => FieldValue::I64(0),
            FieldKind::U64 => FieldValue::U64(0),
            FieldKind::F32 => FieldValue::F32(0.0),
            FieldKind::F64 => FieldValue::F64(0.0),
            FieldKind::Str => FieldValue::Str(String::new()),
            FieldKind::Bytes => FieldValue::Bytes(Vec::new()),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Bool => "bool",
            FieldKind::U8 => "u8",
            FieldKind::I32 => "i32",
            FieldKind::U32 => "u32",
            FieldKind::I64 => "i64",
            FieldKind::U64 => "u64",
            FieldKind::F32 => "f32",
            FieldKind::F64 => "f64",
            FieldKind::Str => "string",
            FieldKind::Bytes => "bytes",
        };
        f.write_str(name)
    }
}

/// A single typed member value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    U8(u8),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(String),
    Bytes(Vec<u8>),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Bool(_) => FieldKind::Bool,
            FieldValue::U8(_) => FieldKind::U8,
            FieldValue::I32(_) => FieldKind::I32,
            FieldValue::U32(_) => FieldKind::U32,
            FieldValue::I64(_) => FieldKind::I64,
            FieldValue::U64(_) => FieldKind::U64,
            FieldValue::F32(_) => FieldKind::F32,
            FieldValue::F64(_) => FieldKind::F64,
            FieldValue::Str(_) => FieldKind::Str,
            FieldValue::Bytes(_) => FieldKind::Bytes,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            FieldValue::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

/// `From<T>` and `TryFrom<&FieldValue>` for the plain-copy kinds
macro_rules! field_conversions {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    FieldValue::$variant(value)
                }
            }

            impl TryFrom<&FieldValue> for $ty {
                type Error = TandemError;

                fn try_from(value: &FieldValue) -> Result<Self, Self::Error> {
                    match value {
                        FieldValue::$variant(v) => Ok(*v),
                        other => Err(TandemError::Format(format!(
                            "expected {}, found {}",
                            FieldKind::$variant,
                            other.kind()
                        ))),
                    }
                }
            }
        )*
    };
}

field_conversions! {
    bool => Bool,
    u8 => U8,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Str(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_string())
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        FieldValue::Bytes(value)
    }
}

impl TryFrom<&FieldValue> for String {
    type Error = TandemError;

    fn try_from(value: &FieldValue) -> Result<Self, Self::Error> {
        value.as_str().map(str::to_string).ok_or_else(|| {
            TandemError::Format(format!("expected string, found {}", value.kind()))
        })
    }
}

impl TryFrom<&FieldValue> for Vec<u8> {
    type Error = TandemError;

    fn try_from(value: &FieldValue) -> Result<Self, Self::Error> {
        value.as_bytes().map(<[u8]>::to_vec).ok_or_else(|| {
            TandemError::Format(format!("expected bytes, found {}", value.kind()))
        })
    }
}
