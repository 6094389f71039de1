//! Schema model: message, field and enum descriptors and the pool that owns
//! them.
//!
//! Descriptors are loaded from a serialized `FileDescriptorSet` (the output
//! of `protoc --descriptor_set_out`) and sealed into an immutable
//! [`SchemaPool`]. Loading is self-hosting: the subset of
//! `google.protobuf.descriptor` needed to read descriptor files is decoded by
//! built-in bootstrap decoders, so no external schema input is ever required.

pub(crate) mod bootstrap;
mod descriptor;
mod pool;

pub use descriptor::{EnumDescriptor, FieldDescriptor, FieldType, Label, MessageDescriptor};
pub use pool::SchemaPool;
