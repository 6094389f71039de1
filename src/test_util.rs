//! Shared schema fixtures for tests.
//!
//! The fixture pool is loaded through the regular descriptor-set path, so
//! every test using it also exercises the bootstrap decoders and the seal
//! pass. It corresponds to this schema:
//!
//! ```proto
//! package test;
//!
//! enum Color { RED = 0; GREEN = 1; BLUE = 2; }
//!
//! message Inner { optional int32 value = 1; }
//! message Str { optional string s = 1; }
//! message Gr { optional int32 value = 1; }
//!
//! message Outer {
//!   optional int32 id = 1;
//!   optional group Gr gr = 2;
//!   optional Inner inner = 3;
//!   repeated int32 nums = 4;
//!   repeated Inner items = 5;
//!   optional string note = 6;
//!   optional Outer next = 7;
//! }
//!
//! message Scalars { /* one field per scalar type, numbers 1-16 */ }
//! ```

use std::sync::Arc;

use crate::schema::bootstrap::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto, FileDescriptorSet,
};
use crate::schema::SchemaPool;

fn field(name: &str, number: i32, label: i32, field_type: i32) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(label),
        field_type: Some(field_type),
        ..Default::default()
    }
}

fn typed_field(
    name: &str,
    number: i32,
    label: i32,
    field_type: i32,
    type_name: &str,
) -> FieldDescriptorProto {
    FieldDescriptorProto {
        type_name: Some(type_name.to_string()),
        ..field(name, number, label, field_type)
    }
}

fn message(name: &str, fields: Vec<FieldDescriptorProto>) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_string()),
        fields,
        ..Default::default()
    }
}

pub(crate) fn test_pool() -> Arc<SchemaPool> {
    let set = FileDescriptorSet {
        files: vec![FileDescriptorProto {
            name: Some("test.proto".to_string()),
            package: Some("test".to_string()),
            messages: vec![
                message("Inner", vec![field("value", 1, 1, 5)]),
                message("Str", vec![field("s", 1, 1, 9)]),
                message("Gr", vec![field("value", 1, 1, 5)]),
                message(
                    "Outer",
                    vec![
                        field("id", 1, 1, 5),
                        typed_field("gr", 2, 1, 10, ".test.Gr"),
                        typed_field("inner", 3, 1, 11, ".test.Inner"),
                        field("nums", 4, 3, 5),
                        typed_field("items", 5, 3, 11, ".test.Inner"),
                        field("note", 6, 1, 9),
                        typed_field("next", 7, 1, 11, ".test.Outer"),
                    ],
                ),
                message(
                    "Scalars",
                    vec![
                        field("v_int32", 1, 1, 5),
                        field("v_int64", 2, 1, 3),
                        field("v_uint32", 3, 1, 13),
                        field("v_uint64", 4, 1, 4),
                        field("v_sint32", 5, 1, 17),
                        field("v_sint64", 6, 1, 18),
                        field("v_fixed32", 7, 1, 7),
                        field("v_fixed64", 8, 1, 6),
                        field("v_sfixed32", 9, 1, 15),
                        field("v_sfixed64", 10, 1, 16),
                        field("v_float", 11, 1, 2),
                        field("v_double", 12, 1, 1),
                        field("v_bool", 13, 1, 8),
                        field("v_string", 14, 1, 9),
                        field("v_bytes", 15, 1, 12),
                        typed_field("v_color", 16, 1, 14, ".test.Color"),
                    ],
                ),
            ],
            enums: vec![EnumDescriptorProto {
                name: Some("Color".to_string()),
                values: vec![
                    EnumValueDescriptorProto {
                        name: Some("RED".to_string()),
                        number: Some(0),
                    },
                    EnumValueDescriptorProto {
                        name: Some("GREEN".to_string()),
                        number: Some(1),
                    },
                    EnumValueDescriptorProto {
                        name: Some("BLUE".to_string()),
                        number: Some(2),
                    },
                ],
            }],
        }],
    };

    let mut pool = SchemaPool::new();
    pool.add_descriptor_set(&set.encode()).unwrap();
    Arc::new(pool)
}
