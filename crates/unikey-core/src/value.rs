//! Property values and their canonical byte form.
//!
//! The canonical form is what fingerprints are computed over, so it must never
//! change for an existing tag. New variants get new tags.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A typed property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 32-bit floating point.
    Float32(f32),
    /// 64-bit floating point.
    Float64(f64),
    /// UTF-8 string.
    String(String),
    /// Binary data.
    Bytes(Vec<u8>),
    /// Timestamp as microseconds since Unix epoch.
    Timestamp(i64),
    /// UUID as 16 bytes.
    Uuid([u8; 16]),
}

/// Type tag in the canonical encoding.
///
/// Integer widths share a tag, as do float widths: `Int32(7)` and `Int64(7)`
/// are the same logical value.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CanonicalTag {
    Null = 0,
    Bool = 1,
    Integer = 2,
    Float = 3,
    String = 4,
    Bytes = 5,
    Uuid = 6,
    Timestamp = 7,
}

/// Bit pattern every NaN is folded to.
const CANONICAL_NAN: u64 = 0x7ff8_0000_0000_0000;

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as i64, widening 32-bit integers.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(i) => Some(*i),
            Value::Int32(i) => Some(*i as i64),
            _ => None,
        }
    }

    /// Try to get as f64, widening 32-bit floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(f) => Some(*f),
            Value::Float32(f) => Some(*f as f64),
            _ => None,
        }
    }

    /// Try to get as string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as bytes reference.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Name of the variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Float32(_) => "float32",
            Value::Float64(_) => "float64",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Timestamp(_) => "timestamp",
            Value::Uuid(_) => "uuid",
        }
    }

    /// Append the canonical encoding of this value to `buf`.
    ///
    /// Format: tag (1 byte) followed by
    /// - nothing for null
    /// - 1 byte for bool
    /// - `i64` little-endian for integers and timestamps
    /// - `f64` bits little-endian for floats, with `-0.0` as `0.0` and one NaN
    /// - `u32` little-endian length then bytes for strings and binary data
    /// - 16 raw bytes for UUIDs
    pub fn encode_canonical(&self, buf: &mut Vec<u8>) {
        match self {
            Value::Null => buf.push(CanonicalTag::Null as u8),
            Value::Bool(b) => {
                buf.push(CanonicalTag::Bool as u8);
                buf.push(u8::from(*b));
            }
            Value::Int32(_) | Value::Int64(_) => {
                buf.push(CanonicalTag::Integer as u8);
                let i = self.as_i64().unwrap_or_default();
                buf.extend_from_slice(&i.to_le_bytes());
            }
            Value::Float32(_) | Value::Float64(_) => {
                buf.push(CanonicalTag::Float as u8);
                let f = self.as_f64().unwrap_or_default();
                buf.extend_from_slice(&canonical_float_bits(f).to_le_bytes());
            }
            Value::String(s) => {
                buf.push(CanonicalTag::String as u8);
                put_len_prefixed(buf, s.as_bytes());
            }
            Value::Bytes(b) => {
                buf.push(CanonicalTag::Bytes as u8);
                put_len_prefixed(buf, b);
            }
            Value::Uuid(u) => {
                buf.push(CanonicalTag::Uuid as u8);
                buf.extend_from_slice(u);
            }
            Value::Timestamp(ts) => {
                buf.push(CanonicalTag::Timestamp as u8);
                buf.extend_from_slice(&ts.to_le_bytes());
            }
        }
    }
}

fn canonical_float_bits(f: f64) -> u64 {
    if f.is_nan() {
        CANONICAL_NAN
    } else if f == 0.0 {
        0
    } else {
        f.to_bits()
    }
}

/// Write a `u32` little-endian length followed by the bytes.
pub(crate) fn put_len_prefixed(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int32(i) => write!(f, "{}", i),
            Value::Int64(i) => write!(f, "{}", i),
            Value::Float32(x) => write!(f, "{}", x),
            Value::Float64(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
            Value::Timestamp(ts) => write!(f, "@{}", ts),
            Value::Uuid(u) => write!(f, "{}", hex::encode(u)),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int32(i)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int64(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float64(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical(value: &Value) -> Vec<u8> {
        let mut buf = Vec::new();
        value.encode_canonical(&mut buf);
        buf
    }

    #[test]
    fn test_integer_widths_share_encoding() {
        assert_eq!(canonical(&Value::Int32(42)), canonical(&Value::Int64(42)));
        assert_ne!(canonical(&Value::Int64(42)), canonical(&Value::Timestamp(42)));
    }

    #[test]
    fn test_float_normalization() {
        assert_eq!(canonical(&Value::Float64(0.0)), canonical(&Value::Float64(-0.0)));
        assert_eq!(
            canonical(&Value::Float64(f64::NAN)),
            canonical(&Value::Float64(-f64::NAN))
        );
        assert_eq!(canonical(&Value::Float32(1.5)), canonical(&Value::Float64(1.5)));
    }

    #[test]
    fn test_string_and_bytes_differ() {
        assert_ne!(
            canonical(&Value::from("abc")),
            canonical(&Value::Bytes(b"abc".to_vec()))
        );
    }

    #[test]
    fn test_string_layout() {
        assert_eq!(
            canonical(&Value::from("hi")),
            vec![4, 2, 0, 0, 0, b'h', b'i']
        );
    }

    #[test]
    fn test_option_into_value() {
        assert_eq!(Value::from(None::<String>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::String("x".to_string()));
    }
}
