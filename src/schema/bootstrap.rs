//! Built-in decoders for the `google.protobuf.descriptor` subset.
//!
//! A schema pool is loaded from a serialized `FileDescriptorSet`, which is
//! itself a Protocol Buffers message. The decoders here read that format
//! directly on top of [`RawFields`], so the engine can parse its own schema
//! input with nothing but the field numbers below compiled in.
//!
//! The types are not complete: only the messages and fields the loader needs
//! are represented, and unknown fields are skipped, per the usual wire
//! compatibility rules.

use crate::error::{Error, ErrorKind};
use crate::wire::{RawFields, RawValue};

fn malformed() -> Error {
    Error::new(ErrorKind::MalformedDescriptor)
}

fn bytes_value(value: RawValue) -> Result<&[u8], Error> {
    match value {
        RawValue::Bytes(bytes) => Ok(bytes),
        _ => Err(malformed()),
    }
}

fn string_value(value: RawValue) -> Result<String, Error> {
    let bytes = bytes_value(value)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| malformed())
}

fn int32_value(value: RawValue) -> Result<i32, Error> {
    match value {
        RawValue::Varint(raw) => Ok(raw as i32),
        _ => Err(malformed()),
    }
}

#[derive(Debug, Default)]
pub(crate) struct FileDescriptorSet {
    pub files: Vec<FileDescriptorProto>,
}

impl FileDescriptorSet {
    const FILE: u32 = 1;

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        let mut msg = Self::default();
        let mut fields = RawFields::new(buf);
        while let Some(field) = fields.next()? {
            match field.number {
                Self::FILE => {
                    msg.files
                        .push(FileDescriptorProto::decode(bytes_value(field.value)?)?);
                }
                _ => {}
            }
        }
        Ok(msg)
    }
}

#[derive(Debug, Default)]
pub(crate) struct FileDescriptorProto {
    pub name: Option<String>,
    pub package: Option<String>,
    pub messages: Vec<DescriptorProto>,
    pub enums: Vec<EnumDescriptorProto>,
}

impl FileDescriptorProto {
    const NAME: u32 = 1;
    const PACKAGE: u32 = 2;
    const MESSAGE_TYPE: u32 = 4;
    const ENUM_TYPE: u32 = 5;

    fn decode(buf: &[u8]) -> Result<Self, Error> {
        let mut msg = Self::default();
        let mut fields = RawFields::new(buf);
        while let Some(field) = fields.next()? {
            match field.number {
                Self::NAME => {
                    msg.name = Some(string_value(field.value)?);
                }
                Self::PACKAGE => {
                    msg.package = Some(string_value(field.value)?);
                }
                Self::MESSAGE_TYPE => {
                    msg.messages
                        .push(DescriptorProto::decode(bytes_value(field.value)?)?);
                }
                Self::ENUM_TYPE => {
                    msg.enums
                        .push(EnumDescriptorProto::decode(bytes_value(field.value)?)?);
                }
                _ => {}
            }
        }
        Ok(msg)
    }
}

#[derive(Debug, Default)]
pub(crate) struct DescriptorProto {
    pub name: Option<String>,
    pub fields: Vec<FieldDescriptorProto>,
    pub nested: Vec<DescriptorProto>,
    pub enums: Vec<EnumDescriptorProto>,
}

impl DescriptorProto {
    const NAME: u32 = 1;
    const FIELD: u32 = 2;
    const NESTED_TYPE: u32 = 3;
    const ENUM_TYPE: u32 = 4;

    fn decode(buf: &[u8]) -> Result<Self, Error> {
        let mut msg = Self::default();
        let mut fields = RawFields::new(buf);
        while let Some(field) = fields.next()? {
            match field.number {
                Self::NAME => {
                    msg.name = Some(string_value(field.value)?);
                }
                Self::FIELD => {
                    msg.fields
                        .push(FieldDescriptorProto::decode(bytes_value(field.value)?)?);
                }
                Self::NESTED_TYPE => {
                    msg.nested
                        .push(DescriptorProto::decode(bytes_value(field.value)?)?);
                }
                Self::ENUM_TYPE => {
                    msg.enums
                        .push(EnumDescriptorProto::decode(bytes_value(field.value)?)?);
                }
                _ => {}
            }
        }
        Ok(msg)
    }
}

#[derive(Debug, Default)]
pub(crate) struct FieldDescriptorProto {
    pub name: Option<String>,
    pub number: Option<i32>,
    pub label: Option<i32>,
    pub field_type: Option<i32>,
    pub type_name: Option<String>,
    pub default_value: Option<String>,
}

impl FieldDescriptorProto {
    const NAME: u32 = 1;
    const NUMBER: u32 = 3;
    const LABEL: u32 = 4;
    const TYPE: u32 = 5;
    const TYPE_NAME: u32 = 6;
    const DEFAULT_VALUE: u32 = 7;

    fn decode(buf: &[u8]) -> Result<Self, Error> {
        let mut msg = Self::default();
        let mut fields = RawFields::new(buf);
        while let Some(field) = fields.next()? {
            match field.number {
                Self::NAME => {
                    msg.name = Some(string_value(field.value)?);
                }
                Self::NUMBER => {
                    msg.number = Some(int32_value(field.value)?);
                }
                Self::LABEL => {
                    msg.label = Some(int32_value(field.value)?);
                }
                Self::TYPE => {
                    msg.field_type = Some(int32_value(field.value)?);
                }
                Self::TYPE_NAME => {
                    msg.type_name = Some(string_value(field.value)?);
                }
                Self::DEFAULT_VALUE => {
                    msg.default_value = Some(string_value(field.value)?);
                }
                _ => {}
            }
        }
        Ok(msg)
    }
}

#[derive(Debug, Default)]
pub(crate) struct EnumDescriptorProto {
    pub name: Option<String>,
    pub values: Vec<EnumValueDescriptorProto>,
}

impl EnumDescriptorProto {
    const NAME: u32 = 1;
    const VALUE: u32 = 2;

    fn decode(buf: &[u8]) -> Result<Self, Error> {
        let mut msg = Self::default();
        let mut fields = RawFields::new(buf);
        while let Some(field) = fields.next()? {
            match field.number {
                Self::NAME => {
                    msg.name = Some(string_value(field.value)?);
                }
                Self::VALUE => {
                    msg.values
                        .push(EnumValueDescriptorProto::decode(bytes_value(field.value)?)?);
                }
                _ => {}
            }
        }
        Ok(msg)
    }
}

#[derive(Debug, Default)]
pub(crate) struct EnumValueDescriptorProto {
    pub name: Option<String>,
    pub number: Option<i32>,
}

impl EnumValueDescriptorProto {
    const NAME: u32 = 1;
    const NUMBER: u32 = 2;

    fn decode(buf: &[u8]) -> Result<Self, Error> {
        let mut msg = Self::default();
        let mut fields = RawFields::new(buf);
        while let Some(field) = fields.next()? {
            match field.number {
                Self::NAME => {
                    msg.name = Some(string_value(field.value)?);
                }
                Self::NUMBER => {
                    msg.number = Some(int32_value(field.value)?);
                }
                _ => {}
            }
        }
        Ok(msg)
    }
}


#[cfg(test)]
mod tests {
    use super::{
        DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
        FileDescriptorProto, FileDescriptorSet,
    };
    use crate::error::ErrorKind;

    fn int32_field(name: &str, number: i32) -> FieldDescriptorProto {
        FieldDescriptorProto {
            name: Some(name.to_string()),
            number: Some(number),
            label: Some(1),
            field_type: Some(5),
            ..Default::default()
        }
    }

    #[test]
    fn test_descriptor_set_round_trip() {
        let set = FileDescriptorSet {
            files: vec![FileDescriptorProto {
                name: Some("test.proto".to_string()),
                package: Some("test".to_string()),
                messages: vec![DescriptorProto {
                    name: Some("Msg".to_string()),
                    fields: vec![
                        int32_field("a", 1),
                        FieldDescriptorProto {
                            name: Some("color".to_string()),
                            number: Some(2),
                            label: Some(1),
                            field_type: Some(14),
                            type_name: Some(".test.Color".to_string()),
                            default_value: Some("RED".to_string()),
                            ..Default::default()
                        },
                    ],
                    nested: vec![DescriptorProto {
                        name: Some("Nested".to_string()),
                        fields: vec![int32_field("x", 1)],
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
                enums: vec![EnumDescriptorProto {
                    name: Some("Color".to_string()),
                    values: vec![EnumValueDescriptorProto {
                        name: Some("RED".to_string()),
                        number: Some(0),
                    }],
                }],
            }],
        };

        let decoded = FileDescriptorSet::decode(&set.encode()).unwrap();
        assert_eq!(decoded.files.len(), 1);

        let file = &decoded.files[0];
        assert_eq!(file.package.as_deref(), Some("test"));
        assert_eq!(file.messages.len(), 1);

        let msg = &file.messages[0];
        assert_eq!(msg.name.as_deref(), Some("Msg"));
        assert_eq!(msg.fields.len(), 2);
        assert_eq!(msg.nested.len(), 1);
        assert_eq!(msg.fields[0].number, Some(1));
        assert_eq!(msg.fields[1].type_name.as_deref(), Some(".test.Color"));
        assert_eq!(msg.fields[1].default_value.as_deref(), Some("RED"));

        assert_eq!(file.enums[0].values[0].name.as_deref(), Some("RED"));
    }

    #[test]
    fn test_decode_truncated() {
        let set = FileDescriptorSet {
            files: vec![FileDescriptorProto {
                name: Some("test.proto".to_string()),
                ..Default::default()
            }],
        };
        let bytes = set.encode();
        let err = FileDescriptorSet::decode(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::PrematureEof));
    }
}
