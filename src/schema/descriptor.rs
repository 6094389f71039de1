//! Immutable descriptions of schema entities.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::value::Value;
use crate::wire::WireType;

/// The declared type of a message field.
///
/// Discriminants match the `Type` enum of `FieldDescriptorProto`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FieldType {
    Double = 1,
    Float = 2,
    Int64 = 3,
    UInt64 = 4,
    Int32 = 5,
    Fixed64 = 6,
    Fixed32 = 7,
    Bool = 8,
    String = 9,
    Group = 10,
    Message = 11,
    Bytes = 12,
    UInt32 = 13,
    Enum = 14,
    SFixed32 = 15,
    SFixed64 = 16,
    SInt32 = 17,
    SInt64 = 18,
}

impl FieldType {
    /// Map a `FieldDescriptorProto.type` value to a `FieldType`.
    pub fn from_proto(raw: i32) -> Option<FieldType> {
        let field_type = match raw {
            1 => FieldType::Double,
            2 => FieldType::Float,
            3 => FieldType::Int64,
            4 => FieldType::UInt64,
            5 => FieldType::Int32,
            6 => FieldType::Fixed64,
            7 => FieldType::Fixed32,
            8 => FieldType::Bool,
            9 => FieldType::String,
            10 => FieldType::Group,
            11 => FieldType::Message,
            12 => FieldType::Bytes,
            13 => FieldType::UInt32,
            14 => FieldType::Enum,
            15 => FieldType::SFixed32,
            16 => FieldType::SFixed64,
            17 => FieldType::SInt32,
            18 => FieldType::SInt64,
            _ => return None,
        };
        Some(field_type)
    }

    /// The wire type a field of this declared type is encoded with.
    pub fn wire_type(self) -> WireType {
        match self {
            FieldType::Int64
            | FieldType::UInt64
            | FieldType::Int32
            | FieldType::UInt32
            | FieldType::Bool
            | FieldType::Enum
            | FieldType::SInt32
            | FieldType::SInt64 => WireType::Varint,
            FieldType::Double | FieldType::Fixed64 | FieldType::SFixed64 => WireType::Fixed64,
            FieldType::Float | FieldType::Fixed32 | FieldType::SFixed32 => WireType::Fixed32,
            FieldType::String | FieldType::Bytes | FieldType::Message => WireType::Delimited,
            FieldType::Group => WireType::StartGroup,
        }
    }

    /// True for the numeric types a repeated field may pack into one
    /// length-delimited run.
    pub fn is_packable(self) -> bool {
        !matches!(
            self,
            FieldType::String | FieldType::Bytes | FieldType::Message | FieldType::Group
        )
    }

    /// True if values of this type carry a length prefix on the wire.
    pub fn is_length_delimited(self) -> bool {
        matches!(
            self,
            FieldType::String | FieldType::Bytes | FieldType::Message
        )
    }

    /// True for submessage types, whether length-prefixed or group-framed.
    pub fn is_submessage(self) -> bool {
        matches!(self, FieldType::Message | FieldType::Group)
    }

    /// Size and alignment of this type's slot in a reflected message layout.
    ///
    /// Strings, bytes and submessages occupy a pointer-sized handle.
    pub(crate) fn layout(self) -> (u32, u32) {
        match self {
            FieldType::Bool => (1, 1),
            FieldType::Float
            | FieldType::Fixed32
            | FieldType::SFixed32
            | FieldType::Int32
            | FieldType::UInt32
            | FieldType::SInt32
            | FieldType::Enum => (4, 4),
            _ => (8, 8),
        }
    }
}

/// Presence and cardinality of a field.
///
/// Discriminants match the `Label` enum of `FieldDescriptorProto`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Label {
    Optional = 1,
    Required = 2,
    Repeated = 3,
}

impl Label {
    pub fn from_proto(raw: i32) -> Option<Label> {
        match raw {
            1 => Some(Label::Optional),
            2 => Some(Label::Required),
            3 => Some(Label::Repeated),
            _ => None,
        }
    }
}

/// Resolved reference from a field to the pool entry of its message or enum
/// type.
///
/// Fields hold pool indices rather than owning handles so that cyclic
/// message graphs (a message containing a field of its own type) need no
/// special treatment.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum TypeRef {
    Message(usize),
    Enum(usize),
}

/// Description of one field of a message. Immutable once the pool is sealed.
#[derive(Debug)]
pub struct FieldDescriptor {
    pub(crate) number: u32,
    pub(crate) name: String,
    pub(crate) label: Label,
    pub(crate) field_type: FieldType,
    pub(crate) type_ref: Option<TypeRef>,
    pub(crate) offset: u32,
    pub(crate) set_bit: Option<u32>,
    pub(crate) default: Option<Value>,
}

impl FieldDescriptor {
    /// The field number, positive and unique within the parent message.
    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> Label {
        self.label
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn is_repeated(&self) -> bool {
        self.label == Label::Repeated
    }

    /// True if this field holds a submessage, length-prefixed or group.
    pub fn is_submessage(&self) -> bool {
        self.field_type.is_submessage()
    }

    /// The wire type values of this field are expected to use.
    ///
    /// A packable repeated field additionally accepts `Delimited` for packed
    /// runs; the decoder handles that case.
    pub fn wire_type(&self) -> WireType {
        self.field_type.wire_type()
    }

    /// Pool index of the message type of this field, for message and group
    /// fields. Resolve with [`SchemaPool::message_at`](super::SchemaPool).
    pub fn message_index(&self) -> Option<usize> {
        match self.type_ref {
            Some(TypeRef::Message(index)) => Some(index),
            _ => None,
        }
    }

    /// Pool index of the enum type of this field, for enum fields.
    pub fn enum_index(&self) -> Option<usize> {
        match self.type_ref {
            Some(TypeRef::Enum(index)) => Some(index),
            _ => None,
        }
    }

    /// Byte offset of this field's slot in the reflected message layout.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Index of this field's presence bit, for non-repeated fields.
    pub fn set_bit(&self) -> Option<u32> {
        self.set_bit
    }

    /// The declared default for primitive fields, when one was given.
    pub fn default_value(&self) -> Option<Value> {
        self.default
    }
}

/// Description of a message type. Immutable once the pool is sealed.
#[derive(Debug)]
pub struct MessageDescriptor {
    pub(crate) full_name: String,
    pub(crate) fields: Vec<Arc<FieldDescriptor>>,
    pub(crate) by_number: FxHashMap<u32, usize>,
    pub(crate) instance_size: u32,
    pub(crate) presence_bits: u32,
}

impl MessageDescriptor {
    /// Fully-qualified dotted name, e.g. `pkg.Outer.Inner`.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[Arc<FieldDescriptor>] {
        &self.fields
    }

    /// Look up a field by number.
    pub fn field(&self, number: u32) -> Option<&Arc<FieldDescriptor>> {
        self.by_number.get(&number).map(|&index| &self.fields[index])
    }

    /// Look up a field by declared name.
    pub fn field_by_name(&self, name: &str) -> Option<&Arc<FieldDescriptor>> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Byte size of one reflected instance of this message, including its
    /// presence bitmap, rounded to pointer alignment.
    pub fn instance_size(&self) -> u32 {
        self.instance_size
    }

    /// Number of presence bits in the instance bitmap.
    pub fn presence_bits(&self) -> u32 {
        self.presence_bits
    }
}

/// Description of an enum type: a two-way mapping between symbolic names and
/// numbers.
#[derive(Debug)]
pub struct EnumDescriptor {
    pub(crate) full_name: String,
    pub(crate) by_name: FxHashMap<String, i32>,
    pub(crate) by_number: FxHashMap<i32, String>,
    pub(crate) default: i32,
}

impl EnumDescriptor {
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// The number of the named value.
    pub fn number(&self, name: &str) -> Option<i32> {
        self.by_name.get(name).copied()
    }

    /// The name of the numbered value.
    ///
    /// When several names share a number, the first declared one wins.
    pub fn name(&self, number: i32) -> Option<&str> {
        self.by_number.get(&number).map(|s| s.as_str())
    }

    /// The default value: the first value declared for the enum.
    pub fn default_value(&self) -> i32 {
        self.default
    }
}
