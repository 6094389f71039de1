//! Typed scalar values exchanged through the stream interfaces.

use crate::schema::FieldType;
use crate::wire::{decode_zigzag32, decode_zigzag64};

/// A decoded scalar value.
///
/// The variant is determined by the field's declared type: the signed
/// integer declarations (`int32`, `sint32`, `sfixed32` and the 64-bit
/// equivalents) surface as `Int32`/`Int64`, the unsigned and fixed unsigned
/// declarations as `UInt32`/`UInt64`, and enum numbers keep their own
/// variant so consumers can resolve them against an enum descriptor.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Value {
    Double(f64),
    Float(f32),
    Int32(i32),
    Int64(i64),
    UInt32(u32),
    UInt64(u64),
    Bool(bool),
    Enum(i32),
}

impl Value {
    pub fn as_double(&self) -> Option<f64> {
        match *self {
            Value::Double(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match *self {
            Value::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_int32(&self) -> Option<i32> {
        match *self {
            Value::Int32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_int64(&self) -> Option<i64> {
        match *self {
            Value::Int64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_uint32(&self) -> Option<u32> {
        match *self {
            Value::UInt32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_uint64(&self) -> Option<u64> {
        match *self {
            Value::UInt64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<i32> {
        match *self {
            Value::Enum(v) => Some(v),
            _ => None,
        }
    }

    /// Interpret a decoded varint according to `field_type`.
    ///
    /// Returns `None` if the declared type is not varint-encoded.
    pub(crate) fn from_varint(field_type: FieldType, raw: u64) -> Option<Value> {
        let value = match field_type {
            FieldType::Int32 => Value::Int32(raw as i32),
            FieldType::Int64 => Value::Int64(raw as i64),
            FieldType::UInt32 => Value::UInt32(raw as u32),
            FieldType::UInt64 => Value::UInt64(raw),
            FieldType::SInt32 => Value::Int32(decode_zigzag32(raw as u32)),
            FieldType::SInt64 => Value::Int64(decode_zigzag64(raw)),
            FieldType::Bool => Value::Bool(raw != 0),
            FieldType::Enum => Value::Enum(raw as i32),
            _ => return None,
        };
        Some(value)
    }

    /// Interpret 4 fixed little-endian bytes according to `field_type`.
    pub(crate) fn from_fixed32(field_type: FieldType, raw: u32) -> Option<Value> {
        let value = match field_type {
            FieldType::Fixed32 => Value::UInt32(raw),
            FieldType::SFixed32 => Value::Int32(raw as i32),
            FieldType::Float => Value::Float(f32::from_bits(raw)),
            _ => return None,
        };
        Some(value)
    }

    /// Interpret 8 fixed little-endian bytes according to `field_type`.
    pub(crate) fn from_fixed64(field_type: FieldType, raw: u64) -> Option<Value> {
        let value = match field_type {
            FieldType::Fixed64 => Value::UInt64(raw),
            FieldType::SFixed64 => Value::Int64(raw as i64),
            FieldType::Double => Value::Double(f64::from_bits(raw)),
            _ => return None,
        };
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::Value;
    use crate::schema::FieldType;

    #[test]
    fn test_varint_interpretation() {
        #[derive(Debug)]
        struct Case {
            field_type: FieldType,
            raw: u64,
            expected: Value,
        }

        let cases = [
            Case {
                field_type: FieldType::Int32,
                raw: 150,
                expected: Value::Int32(150),
            },
            Case {
                // -1 as int32 occupies the full 10-byte varint range.
                field_type: FieldType::Int32,
                raw: u64::MAX,
                expected: Value::Int32(-1),
            },
            Case {
                field_type: FieldType::SInt32,
                raw: 1,
                expected: Value::Int32(-1),
            },
            Case {
                field_type: FieldType::SInt64,
                raw: 3,
                expected: Value::Int64(-2),
            },
            Case {
                field_type: FieldType::Bool,
                raw: 1,
                expected: Value::Bool(true),
            },
            Case {
                field_type: FieldType::UInt64,
                raw: u64::MAX,
                expected: Value::UInt64(u64::MAX),
            },
            Case {
                field_type: FieldType::Enum,
                raw: 3,
                expected: Value::Enum(3),
            },
        ];

        for case in cases {
            let value = Value::from_varint(case.field_type, case.raw).unwrap();
            assert_eq!(value, case.expected, "case {:?}", case);
        }

        assert_eq!(Value::from_varint(FieldType::Float, 1), None);
        assert_eq!(Value::from_varint(FieldType::Message, 1), None);
    }

    #[test]
    fn test_fixed_interpretation() {
        assert_eq!(
            Value::from_fixed32(FieldType::Float, 1.5f32.to_bits()),
            Some(Value::Float(1.5))
        );
        assert_eq!(
            Value::from_fixed32(FieldType::SFixed32, -7i32 as u32),
            Some(Value::Int32(-7))
        );
        assert_eq!(
            Value::from_fixed64(FieldType::Double, 2.5f64.to_bits()),
            Some(Value::Double(2.5))
        );
        assert_eq!(
            Value::from_fixed64(FieldType::Fixed64, 42),
            Some(Value::UInt64(42))
        );
        assert_eq!(Value::from_fixed32(FieldType::Int32, 1), None);
        assert_eq!(Value::from_fixed64(FieldType::Int64, 1), None);
    }
}
