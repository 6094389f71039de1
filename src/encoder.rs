//! The wire encoder: a [`Sink`] over any [`ByteSink`]; the push counterpart
//! of the decoder.
//!
//! Scalars are encoded per the announced field's declared type. Submessages
//! are buffered until [`end_message`](Encoder::end_message) so their length
//! prefix can be written; group fields are framed by start/end tags and need
//! no buffering. A caller holding an already serialized submessage can skip
//! the framing calls and pass the blob to [`put_bytes`](Encoder::put_bytes).
//!
//! Repeated primitive values are written one tag per value. Packed runs are
//! an accepted input encoding on the decode side regardless.

use std::io;

use crate::error::{Error, ErrorKind};
use crate::schema::{FieldDescriptor, FieldType};
use crate::stream::{ByteSink, Sink};
use crate::value::Value;
use crate::wire::{encode_varint, encode_zigzag32, encode_zigzag64, Tag, WireType};

/// An open submessage or group.
enum Level {
    /// Length-prefixed: body accumulates here until the closing tag+length
    /// can be emitted.
    Message { number: u32, buf: Vec<u8> },
    /// Group: content went out inline, only the end tag is owed.
    Group { number: u32 },
}

/// The field announced by `put_field`, awaiting its value.
#[derive(Copy, Clone)]
struct PendingField {
    number: u32,
    field_type: FieldType,
}

/// Schema-driven push encoder for the protobuf wire format.
///
/// ```
/// use dynpb::{Encoder, Sink, Value};
/// # fn demo(msg: &dynpb::MessageDescriptor) -> Result<(), dynpb::Error> {
/// let mut enc = Encoder::new(Vec::new());
/// enc.put_field(msg.field(1).unwrap())?;
/// enc.put_value(Value::Int32(150))?;
/// let bytes = enc.into_sink();
/// assert_eq!(bytes, [0x08, 0x96, 0x01]);
/// # Ok(()) }
/// ```
pub struct Encoder<S: ByteSink> {
    sink: S,
    levels: Vec<Level>,
    pending: Option<PendingField>,
    /// Completed top-level elements awaiting delivery to the sink.
    staged: Vec<u8>,
}

impl<S: ByteSink> Encoder<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            levels: Vec::new(),
            pending: None,
            staged: Vec::new(),
        }
    }

    /// Recover the byte sink. Any unterminated submessage is discarded.
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// The buffer new output is written to.
    fn out(&mut self) -> &mut Vec<u8> {
        for level in self.levels.iter_mut().rev() {
            if let Level::Message { buf, .. } = level {
                return buf;
            }
        }
        &mut self.staged
    }

    fn put_tag(&mut self, number: u32, wire_type: WireType) {
        let raw = Tag::new(number, wire_type).to_raw();
        encode_varint(raw, self.out());
    }

    fn take_pending(&mut self) -> Result<PendingField, Error> {
        self.pending
            .take()
            .ok_or_else(|| Error::new(ErrorKind::BadSequence))
    }

    /// Hand completed top-level output to the sink, honoring short writes.
    fn flush(&mut self) -> Result<(), Error> {
        if !self.levels.is_empty() {
            return Ok(());
        }
        let mut written = 0;
        while written < self.staged.len() {
            let n = self.sink.put(&self.staged[written..])?;
            if n == 0 {
                return Err(Error::from(io::Error::from(io::ErrorKind::WriteZero)));
            }
            written += n;
        }
        self.staged.clear();
        Ok(())
    }
}

impl<S: ByteSink> Sink for Encoder<S> {
    fn put_field(&mut self, field: &FieldDescriptor) -> Result<(), Error> {
        if self.pending.is_some() {
            // The previous field never received a value.
            return Err(Error::new(ErrorKind::BadSequence));
        }
        self.pending = Some(PendingField {
            number: field.number(),
            field_type: field.field_type(),
        });
        Ok(())
    }

    fn put_value(&mut self, value: Value) -> Result<(), Error> {
        let PendingField { number, field_type } = self.take_pending()?;
        let mismatch = || {
            Error::new(ErrorKind::BadWireType).with_context(None, Some(number))
        };
        match field_type.wire_type() {
            WireType::Varint => {
                let raw = match (field_type, value) {
                    (FieldType::Int32, Value::Int32(v)) => v as i64 as u64,
                    (FieldType::Int64, Value::Int64(v)) => v as u64,
                    (FieldType::UInt32, Value::UInt32(v)) => v as u64,
                    (FieldType::UInt64, Value::UInt64(v)) => v,
                    (FieldType::SInt32, Value::Int32(v)) => encode_zigzag32(v) as u64,
                    (FieldType::SInt64, Value::Int64(v)) => encode_zigzag64(v),
                    (FieldType::Bool, Value::Bool(v)) => v as u64,
                    (FieldType::Enum, Value::Enum(v)) => v as i64 as u64,
                    _ => return Err(mismatch()),
                };
                self.put_tag(number, WireType::Varint);
                encode_varint(raw, self.out());
            }
            WireType::Fixed32 => {
                let raw = match (field_type, value) {
                    (FieldType::Fixed32, Value::UInt32(v)) => v,
                    (FieldType::SFixed32, Value::Int32(v)) => v as u32,
                    (FieldType::Float, Value::Float(v)) => v.to_bits(),
                    _ => return Err(mismatch()),
                };
                self.put_tag(number, WireType::Fixed32);
                self.out().extend_from_slice(&raw.to_le_bytes());
            }
            WireType::Fixed64 => {
                let raw = match (field_type, value) {
                    (FieldType::Fixed64, Value::UInt64(v)) => v,
                    (FieldType::SFixed64, Value::Int64(v)) => v as u64,
                    (FieldType::Double, Value::Double(v)) => v.to_bits(),
                    _ => return Err(mismatch()),
                };
                self.put_tag(number, WireType::Fixed64);
                self.out().extend_from_slice(&raw.to_le_bytes());
            }
            // Strings and submessages go through put_bytes or the framing
            // calls.
            _ => return Err(Error::new(ErrorKind::BadSequence)),
        }
        self.flush()
    }

    fn put_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let PendingField { number, field_type } = self.take_pending()?;
        if !field_type.is_length_delimited() {
            return Err(Error::new(ErrorKind::BadSequence));
        }
        self.put_tag(number, WireType::Delimited);
        encode_varint(bytes.len() as u64, self.out());
        self.out().extend_from_slice(bytes);
        self.flush()
    }

    fn start_message(&mut self) -> Result<(), Error> {
        let PendingField { number, field_type } = self.take_pending()?;
        match field_type {
            FieldType::Message => {
                self.levels.push(Level::Message {
                    number,
                    buf: Vec::new(),
                });
                Ok(())
            }
            FieldType::Group => {
                self.put_tag(number, WireType::StartGroup);
                self.levels.push(Level::Group { number });
                Ok(())
            }
            _ => Err(Error::new(ErrorKind::BadSequence)),
        }
    }

    fn end_message(&mut self) -> Result<(), Error> {
        if self.pending.is_some() {
            return Err(Error::new(ErrorKind::BadSequence));
        }
        match self.levels.pop() {
            Some(Level::Message { number, buf }) => {
                self.put_tag(number, WireType::Delimited);
                encode_varint(buf.len() as u64, self.out());
                self.out().extend_from_slice(&buf);
            }
            Some(Level::Group { number }) => {
                self.put_tag(number, WireType::EndGroup);
            }
            None => return Err(Error::new(ErrorKind::BadSequence)),
        }
        self.flush()
    }
}
