//! The wire decoder: a schema-driven [`Source`] over any [`ByteSource`].
//!
//! The decoder reads tags, resolves field numbers against the current
//! message descriptor, checks wire-type compatibility and hands values out
//! through the pull interface. Unknown fields are skipped per their wire
//! type, including descending through unknown groups. Submessage framing is
//! tracked on a bounded frame stack; group frames record the field number
//! that their end-group tag must match.
//!
//! Input arrives in whatever chunks the byte source produces. The decoder
//! pulls a fresh window whenever the current one is exhausted and grows the
//! window in place when a single value straddles a chunk edge, so strings
//! decoded from an in-memory slice stay zero-copy.

use std::sync::Arc;

use smallvec::{smallvec, SmallVec};

use crate::buffer::ByteString;
use crate::error::{Error, ErrorKind};
use crate::schema::{FieldDescriptor, FieldType, MessageDescriptor, SchemaPool};
use crate::stream::{ByteSource, Source};
use crate::value::Value;
use crate::wire::{self, Tag, WireType};
use crate::DEFAULT_MAX_DEPTH;

/// How a submessage frame ends.
enum FrameEnd {
    /// Length-prefixed: ends when the cursor reaches this stream offset.
    Bounded(u64),
    /// Group: ends at the end-group tag carrying this field number.
    Group(u32),
}

struct Frame {
    msg: Arc<MessageDescriptor>,
    end: FrameEnd,
}

/// The value announced by the last `next_field`, not yet consumed.
enum Pending {
    Scalar {
        field: Arc<FieldDescriptor>,
    },
    Bytes {
        field: Arc<FieldDescriptor>,
        len: usize,
    },
    Submsg {
        field: Arc<FieldDescriptor>,
        len: u64,
    },
    Group {
        field: Arc<FieldDescriptor>,
    },
    /// A packed run; `ready` is true while the caller owes a read for the
    /// element at the cursor.
    Packed {
        field: Arc<FieldDescriptor>,
        end: u64,
        ready: bool,
    },
}

#[derive(Copy, Clone, PartialEq)]
enum AtEnd {
    No,
    /// The cursor reached the end offset of a length-prefixed submessage.
    Submsg,
    /// The matching end-group tag was consumed.
    Group,
}

enum VarintRead {
    Value(u64),
    Eof,
}

/// Schema-driven pull decoder for the protobuf wire format.
///
/// ```
/// use dynpb::{Decoder, SliceSource, Source};
/// # use std::sync::Arc;
/// # fn demo(pool: Arc<dynpb::SchemaPool>) -> Result<(), dynpb::Error> {
/// let msg = pool.message("pkg.Msg").unwrap().clone();
/// let input: &[u8] = &[0x08, 0x96, 0x01];
/// let mut dec = Decoder::new(SliceSource::new(input), pool.clone(), msg);
/// while let Some(field) = dec.next_field()? {
///     if field.is_submessage() {
///         dec.start_message()?;
///     } else if field.field_type().is_length_delimited() {
///         println!("{} = {:?}", field.name(), dec.read_bytes()?);
///     } else {
///         println!("{} = {:?}", field.name(), dec.read_value()?);
///     }
/// }
/// # Ok(()) }
/// ```
pub struct Decoder<'buf, S: ByteSource<'buf>> {
    src: S,
    pool: Arc<SchemaPool>,
    buf: ByteString<'buf>,
    /// Read position within `buf`.
    cursor: usize,
    /// Stream offset of `buf[0]`.
    base: u64,
    frames: SmallVec<[Frame; 8]>,
    max_depth: usize,
    pending: Option<Pending>,
    at_end: AtEnd,
    stream_eof: bool,
}

impl<'buf, S: ByteSource<'buf>> Decoder<'buf, S> {
    /// Create a decoder reading instances of `message` from `src`.
    pub fn new(src: S, pool: Arc<SchemaPool>, message: Arc<MessageDescriptor>) -> Self {
        Self {
            src,
            pool,
            buf: ByteString::new(),
            cursor: 0,
            base: 0,
            frames: smallvec![Frame {
                msg: message,
                end: FrameEnd::Bounded(u64::MAX),
            }],
            max_depth: DEFAULT_MAX_DEPTH,
            pending: None,
            at_end: AtEnd::No,
            stream_eof: false,
        }
    }

    /// Override the maximum submessage nesting depth.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Stream offset of the next unread byte.
    pub fn offset(&self) -> u64 {
        self.base + self.cursor as u64
    }

    /// Current submessage nesting depth.
    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    fn top(&self) -> &Frame {
        self.frames.last().unwrap()
    }

    fn err(&self, kind: ErrorKind, field: Option<u32>) -> Error {
        Error::new(kind).with_context(Some(self.top().msg.full_name()), field)
    }

    fn avail(&self) -> usize {
        self.buf.len() - self.cursor
    }

    /// Replace the exhausted window with the next chunk from the source.
    fn refill(&mut self, min_len: usize) -> Result<usize, Error> {
        debug_assert_eq!(self.cursor, self.buf.len());
        self.base += self.buf.len() as u64;
        self.cursor = 0;
        self.src.pull(&mut self.buf, min_len)
    }

    /// Make at least `n` contiguous bytes available at the cursor.
    ///
    /// Returns false if the stream ends first.
    fn ensure(&mut self, n: usize) -> Result<bool, Error> {
        while self.avail() < n {
            let got = if self.avail() == 0 {
                self.refill(n)?
            } else {
                let need = n - self.avail();
                self.src.append(&mut self.buf, need)?
            };
            if got == 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Read a varint, reporting a clean end-of-stream at a value boundary.
    fn read_varint_raw(&mut self) -> Result<VarintRead, Error> {
        loop {
            match wire::decode_varint(&self.buf.as_bytes()[self.cursor..])? {
                Some((value, len)) => {
                    self.cursor += len;
                    return Ok(VarintRead::Value(value));
                }
                None => {
                    let need = self.avail() + 1;
                    if !self.ensure(need)? {
                        return if self.avail() == 0 {
                            Ok(VarintRead::Eof)
                        } else {
                            Err(self.err(ErrorKind::UnterminatedVarint, None))
                        };
                    }
                }
            }
        }
    }

    /// Read a varint in a position where end-of-stream is an error.
    fn read_varint(&mut self) -> Result<u64, Error> {
        match self.read_varint_raw()? {
            VarintRead::Value(value) => Ok(value),
            VarintRead::Eof => Err(self.err(ErrorKind::PrematureEof, None)),
        }
    }

    fn read_fixed32(&mut self) -> Result<u32, Error> {
        if !self.ensure(4)? {
            return Err(self.err(ErrorKind::PrematureEof, None));
        }
        let bytes: [u8; 4] = self.buf.as_bytes()[self.cursor..self.cursor + 4]
            .try_into()
            .unwrap();
        self.cursor += 4;
        Ok(u32::from_le_bytes(bytes))
    }

    fn read_fixed64(&mut self) -> Result<u64, Error> {
        if !self.ensure(8)? {
            return Err(self.err(ErrorKind::PrematureEof, None));
        }
        let bytes: [u8; 8] = self.buf.as_bytes()[self.cursor..self.cursor + 8]
            .try_into()
            .unwrap();
        self.cursor += 8;
        Ok(u64::from_le_bytes(bytes))
    }

    /// Discard `n` bytes, refilling as needed.
    fn skip_bytes(&mut self, mut n: u64) -> Result<(), Error> {
        loop {
            let avail = self.avail() as u64;
            if avail >= n {
                self.cursor += n as usize;
                return Ok(());
            }
            n -= avail;
            self.cursor = self.buf.len();
            if self.refill(1)? == 0 {
                return Err(self.err(ErrorKind::PrematureEof, None));
            }
        }
    }

    /// End offset of a delimited payload of `len` bytes starting at the
    /// cursor, checked against the enclosing submessage.
    fn delimited_end(&mut self, len: u64, number: u32) -> Result<u64, Error> {
        let end = self
            .offset()
            .checked_add(len)
            .ok_or_else(|| self.err(ErrorKind::SubmsgExceedsParent, Some(number)))?;
        if let FrameEnd::Bounded(parent_end) = self.top().end {
            if end > parent_end {
                return Err(self.err(ErrorKind::SubmsgExceedsParent, Some(number)));
            }
        }
        Ok(end)
    }

    /// Skip one wire element of an unknown field.
    fn skip_unknown(&mut self, tag: Tag) -> Result<(), Error> {
        match tag.wire_type {
            WireType::Varint => {
                self.read_varint()?;
            }
            WireType::Fixed32 => {
                self.read_fixed32()?;
            }
            WireType::Fixed64 => {
                self.read_fixed64()?;
            }
            WireType::Delimited => {
                let len = self.read_varint()?;
                self.delimited_end(len, tag.number)?;
                self.skip_bytes(len)?;
            }
            WireType::StartGroup => self.skip_group(tag.number)?,
            // End-group tags are matched against the frame stack before
            // unknown-field handling, so one arriving here is spurious.
            WireType::EndGroup => {
                return Err(self.err(ErrorKind::GroupMismatch, Some(tag.number)));
            }
        }
        Ok(())
    }

    /// Consume a group body, including nested groups, up to and including
    /// the end tag matching `number`.
    fn skip_group(&mut self, number: u32) -> Result<(), Error> {
        let mut open: SmallVec<[u32; 8]> = smallvec![number];
        while let Some(&current) = open.last() {
            let tag = Tag::from_raw(self.read_varint()?)
                .map_err(|err| err.with_context(Some(self.top().msg.full_name()), None))?;
            match tag.wire_type {
                WireType::Varint => {
                    self.read_varint()?;
                }
                WireType::Fixed32 => {
                    self.read_fixed32()?;
                }
                WireType::Fixed64 => {
                    self.read_fixed64()?;
                }
                WireType::Delimited => {
                    let len = self.read_varint()?;
                    self.skip_bytes(len)?;
                }
                WireType::StartGroup => {
                    if open.len() >= self.max_depth {
                        return Err(self.err(ErrorKind::NestingOverflow, Some(tag.number)));
                    }
                    open.push(tag.number);
                }
                WireType::EndGroup => {
                    if tag.number != current {
                        return Err(self.err(ErrorKind::GroupMismatch, Some(tag.number)));
                    }
                    open.pop();
                }
            }
        }
        Ok(())
    }

    /// Skip a value announced by `next_field` but never read.
    fn skip_pending(&mut self, pending: Pending) -> Result<(), Error> {
        match pending {
            Pending::Scalar { field } => {
                match field.wire_type() {
                    WireType::Varint => {
                        self.read_varint()?;
                    }
                    WireType::Fixed32 => {
                        self.read_fixed32()?;
                    }
                    _ => {
                        self.read_fixed64()?;
                    }
                }
                Ok(())
            }
            Pending::Bytes { len, .. } => self.skip_bytes(len as u64),
            Pending::Submsg { len, .. } => self.skip_bytes(len),
            Pending::Group { field } => self.skip_group(field.number()),
            Pending::Packed { end, .. } => {
                let n = end - self.offset();
                self.skip_bytes(n)
            }
        }
    }

    /// Decode one scalar element of `field` at the cursor.
    fn decode_scalar(&mut self, field: &FieldDescriptor) -> Result<Value, Error> {
        let field_type = field.field_type();
        let value = match field_type.wire_type() {
            WireType::Varint => {
                let raw = self.read_varint()?;
                Value::from_varint(field_type, raw)
            }
            WireType::Fixed32 => {
                let raw = self.read_fixed32()?;
                Value::from_fixed32(field_type, raw)
            }
            WireType::Fixed64 => {
                let raw = self.read_fixed64()?;
                Value::from_fixed64(field_type, raw)
            }
            _ => None,
        };
        value.ok_or_else(|| self.err(ErrorKind::BadSequence, Some(field.number())))
    }

    /// Continue an in-progress packed run.
    ///
    /// Returns the field again while elements remain, and `None` once the
    /// run's sub-range is exhausted.
    fn next_packed(&mut self) -> Result<Option<Arc<FieldDescriptor>>, Error> {
        let Some(Pending::Packed { field, end, ready }) = &self.pending else {
            return Ok(None);
        };
        let (field, end, ready) = (field.clone(), *end, *ready);
        if ready {
            // The caller moved on without reading this element.
            self.decode_scalar(&field)?;
        }
        if self.offset() < end {
            self.pending = Some(Pending::Packed {
                field: field.clone(),
                end,
                ready: true,
            });
            Ok(Some(field))
        } else if self.offset() == end {
            self.pending = None;
            Ok(None)
        } else {
            Err(self.err(ErrorKind::PrematureEof, Some(field.number())))
        }
    }
}

impl<'buf, S: ByteSource<'buf>> Source<'buf> for Decoder<'buf, S> {
    fn next_field(&mut self) -> Result<Option<Arc<FieldDescriptor>>, Error> {
        if self.at_end != AtEnd::No || self.stream_eof {
            return Ok(None);
        }

        // Resolve whatever the previous `next_field` left behind.
        if matches!(self.pending, Some(Pending::Packed { .. })) {
            if let Some(field) = self.next_packed()? {
                return Ok(Some(field));
            }
        } else if let Some(pending) = self.pending.take() {
            self.skip_pending(pending)?;
        }

        loop {
            if let FrameEnd::Bounded(end) = self.top().end {
                if self.offset() >= end {
                    if self.offset() > end {
                        // An element inside the submessage ran past its end.
                        return Err(self.err(ErrorKind::SubmsgExceedsParent, None));
                    }
                    self.at_end = AtEnd::Submsg;
                    return Ok(None);
                }
            }

            let raw = match self.read_varint_raw()? {
                VarintRead::Value(raw) => raw,
                VarintRead::Eof => {
                    if self.frames.len() == 1 {
                        self.stream_eof = true;
                        return Ok(None);
                    }
                    // Inside a submessage the input may not just stop.
                    return Err(self.err(ErrorKind::PrematureEof, None));
                }
            };
            let tag = Tag::from_raw(raw)
                .map_err(|err| err.with_context(Some(self.top().msg.full_name()), None))?;

            if tag.wire_type == WireType::EndGroup {
                match self.top().end {
                    FrameEnd::Group(number) if number == tag.number => {
                        self.at_end = AtEnd::Group;
                        return Ok(None);
                    }
                    _ => {
                        return Err(self.err(ErrorKind::GroupMismatch, Some(tag.number)));
                    }
                }
            }

            let Some(field) = self.top().msg.field(tag.number).cloned() else {
                self.skip_unknown(tag)?;
                continue;
            };

            let expected = field.wire_type();
            if tag.wire_type == expected {
                match expected {
                    WireType::Delimited => {
                        let len = self.read_varint()?;
                        self.delimited_end(len, tag.number)?;
                        self.pending = Some(if field.field_type() == FieldType::Message {
                            Pending::Submsg {
                                field: field.clone(),
                                len,
                            }
                        } else {
                            Pending::Bytes {
                                field: field.clone(),
                                len: len as usize,
                            }
                        });
                    }
                    WireType::StartGroup => {
                        self.pending = Some(Pending::Group {
                            field: field.clone(),
                        });
                    }
                    _ => {
                        self.pending = Some(Pending::Scalar {
                            field: field.clone(),
                        });
                    }
                }
                return Ok(Some(field));
            }

            // The one permitted mismatch: a packed run for a packable
            // repeated field.
            if tag.wire_type == WireType::Delimited
                && field.is_repeated()
                && field.field_type().is_packable()
            {
                let len = self.read_varint()?;
                let end = self.delimited_end(len, tag.number)?;
                self.pending = Some(Pending::Packed {
                    field,
                    end,
                    ready: false,
                });
                // An empty run yields no fields; resume scanning.
                match self.next_packed()? {
                    Some(field) => return Ok(Some(field)),
                    None => continue,
                }
            }

            return Err(self.err(ErrorKind::BadWireType, Some(tag.number)));
        }
    }

    fn read_value(&mut self) -> Result<Value, Error> {
        match self.pending.take() {
            Some(Pending::Scalar { field }) => self.decode_scalar(&field),
            Some(Pending::Packed {
                field,
                end,
                ready: true,
            }) => {
                let value = self.decode_scalar(&field)?;
                if self.offset() > end {
                    return Err(self.err(ErrorKind::PrematureEof, Some(field.number())));
                }
                self.pending = Some(Pending::Packed {
                    field,
                    end,
                    ready: false,
                });
                Ok(value)
            }
            other => {
                self.pending = other;
                Err(self.err(ErrorKind::BadSequence, None))
            }
        }
    }

    fn read_bytes(&mut self) -> Result<ByteString<'buf>, Error> {
        match self.pending.take() {
            Some(Pending::Bytes { field, len }) => {
                if !self.ensure(len)? {
                    return Err(self.err(ErrorKind::PrematureEof, Some(field.number())));
                }
                let bytes = self.buf.slice(self.cursor, self.cursor + len);
                self.cursor += len;
                Ok(bytes)
            }
            other => {
                self.pending = other;
                Err(self.err(ErrorKind::BadSequence, None))
            }
        }
    }

    fn skip_value(&mut self) -> Result<(), Error> {
        match self.pending.take() {
            Some(pending) => self.skip_pending(pending),
            None => Err(self.err(ErrorKind::BadSequence, None)),
        }
    }

    fn start_message(&mut self) -> Result<(), Error> {
        let resolve = |decoder: &Self, field: &FieldDescriptor| {
            let index = field
                .message_index()
                .ok_or_else(|| decoder.err(ErrorKind::BadRef, Some(field.number())))?;
            Ok::<_, Error>(decoder.pool.message_at(index).clone())
        };
        match self.pending.take() {
            Some(Pending::Submsg { field, len }) => {
                if self.frames.len() > self.max_depth {
                    return Err(self.err(ErrorKind::NestingOverflow, Some(field.number())));
                }
                let msg = resolve(self, &field)?;
                let end = self.offset() + len;
                self.frames.push(Frame {
                    msg,
                    end: FrameEnd::Bounded(end),
                });
                Ok(())
            }
            Some(Pending::Group { field }) => {
                if self.frames.len() > self.max_depth {
                    return Err(self.err(ErrorKind::NestingOverflow, Some(field.number())));
                }
                let msg = resolve(self, &field)?;
                self.frames.push(Frame {
                    msg,
                    end: FrameEnd::Group(field.number()),
                });
                Ok(())
            }
            other => {
                self.pending = other;
                Err(self.err(ErrorKind::BadSequence, None))
            }
        }
    }

    fn end_message(&mut self) -> Result<(), Error> {
        if self.frames.len() <= 1 {
            return Err(self.err(ErrorKind::BadSequence, None));
        }
        if let Some(pending) = self.pending.take() {
            self.skip_pending(pending)?;
        }
        match self.top().end {
            FrameEnd::Bounded(end) => {
                let n = end
                    .checked_sub(self.offset())
                    .ok_or_else(|| self.err(ErrorKind::SubmsgExceedsParent, None))?;
                self.skip_bytes(n)?;
            }
            FrameEnd::Group(number) => {
                if self.at_end != AtEnd::Group {
                    // Leaving early: consume up to the matching end tag.
                    self.skip_group(number)?;
                }
            }
        }
        self.frames.pop();
        self.at_end = AtEnd::No;
        Ok(())
    }

    fn eof(&self) -> bool {
        self.stream_eof || self.at_end != AtEnd::No
    }
}
