//! Schema-driven streaming codec for the Protocol Buffers wire format.
//!
//! This crate converts between [protobuf][protobuf] byte streams and typed
//! values using descriptors loaded at runtime, with no code generation per
//! message type. A compiled schema (a serialized `FileDescriptorSet`, as
//! produced by `protoc --descriptor_set_out`) is loaded into a
//! [`SchemaPool`]; the pool then drives either of two streaming front ends:
//!
//! - [`Decoder`], a pull parser implementing the [`Source`] interface:
//!   callers iterate fields, descending into submessages and reading values
//!   as typed [`Value`]s or [`ByteString`]s.
//! - [`EventParser`], a push parser in the SAX mould: callers implement
//!   [`Events`] and feed input chunks; the parser fires one callback per
//!   wire element and is resumable at element boundaries, so input may
//!   arrive in arbitrary pieces.
//!
//! The mirror-image push interface, [`Sink`], is implemented by [`Encoder`]
//! for serialization, and [`stream_data`] pumps any `Source` into any
//! `Sink`. Underneath both sit the byte-stream contracts [`ByteSource`] and
//! [`ByteSink`] with in-memory and reader/writer implementations.
//!
//! # Design
//!
//! Messages are often dominated by strings and submessage payloads. To
//! avoid copying them, values of string and bytes fields are handed out as
//! [`ByteString`]s which alias the input buffer whenever the byte source is
//! an in-memory slice, falling back to owned storage for reader-backed
//! sources. Schema loading is self-hosting: the descriptor format is itself
//! protobuf, decoded by built-in bootstrap decoders, so no generated code or
//! external schema is involved anywhere.
//!
//! Unknown fields are skipped, honoring their wire type (including
//! descending through unknown groups); preserving them is left to callers
//! that want pass-through behavior. End-of-stream reporting follows C
//! `feof` semantics: eof flags report a read that already failed, never
//! predict one.
//!
//! [protobuf]: https://protobuf.dev/

#![forbid(unsafe_code)]

mod buffer;
mod decoder;
mod encoder;
mod error;
mod event;
mod schema;
mod stream;
mod value;
pub mod wire;

#[cfg(test)]
mod test_util;

pub use buffer::ByteString;
pub use decoder::Decoder;
pub use encoder::Encoder;
pub use error::{Error, ErrorKind};
pub use event::{EventParser, Events, TagAction};
pub use schema::{
    EnumDescriptor, FieldDescriptor, FieldType, Label, MessageDescriptor, SchemaPool,
};
pub use stream::{
    stream_data, ByteSink, ByteSource, ReaderSource, SliceSource, Sink, Source, WriteSink,
};
pub use value::Value;
pub use wire::{Tag, WireType};

/// Default limit on submessage and group nesting depth.
pub const DEFAULT_MAX_DEPTH: usize = 64;
