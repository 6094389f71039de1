//! The event parser: a one-shot, resumable push front end for the wire
//! format.
//!
//! Instead of pulling values through a [`Source`](crate::Source), a consumer
//! implements [`Events`] and feeds input chunks to [`EventParser::parse`].
//! The parser fires exactly one callback per wire element, in strict wire
//! order, with [`Events::message_start`] preceding everything nested inside
//! a submessage or group and [`Events::message_end`] following it.
//!
//! The client rules on each field: [`Events::tag`] returns either the
//! declared type to parse the value as, or [`TagAction::Skip`]. No schema is
//! consulted, so the client is responsible for returning a declared type
//! whose encoding matches the wire type.
//!
//! `parse` is fully resumable. It consumes up to the last complete element
//! and reports the number of bytes taken; a partial tail (half a varint, an
//! incomplete string payload) is left unconsumed for the caller to resubmit
//! with more data appended, and a suspended element re-delivers its tag
//! callback when parsing resumes. Skipped delimited fields are the
//! exception: they are discarded incrementally, so an arbitrarily large
//! unknown field never needs to fit in one chunk.

use smallvec::{smallvec, SmallVec};

use crate::buffer::ByteString;
use crate::error::{Error, ErrorKind};
use crate::schema::FieldType;
use crate::value::Value;
use crate::wire::{self, Tag, WireType};
use crate::DEFAULT_MAX_DEPTH;

/// The client's ruling on a field, returned from [`Events::tag`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum TagAction {
    /// Discard the value, descending through groups as needed.
    Skip,
    /// Decode the value as this declared type and deliver it.
    Parse(FieldType),
}

/// Callbacks driven by [`EventParser`].
///
/// `U` is the per-frame user data type; every callback receives the data
/// slot of the current frame (for `message_start`, the frame just entered;
/// for `message_end`, the frame being left).
pub trait Events<U = ()> {
    /// A tag was read. Decide whether to parse or skip the value.
    fn tag(&mut self, frame: &mut U, tag: Tag) -> Result<TagAction, Error>;

    /// A scalar value was decoded. Fires once per value and once per element
    /// of a packed run.
    fn value(&mut self, frame: &mut U, number: u32, value: Value) -> Result<(), Error> {
        let _ = (frame, number, value);
        Ok(())
    }

    /// A length-delimited string was read. The payload aliases the input
    /// chunk and is only valid for the duration of the call.
    fn bytes(&mut self, frame: &mut U, number: u32, data: ByteString<'_>) -> Result<(), Error> {
        let _ = (frame, number, data);
        Ok(())
    }

    /// A submessage or group was entered.
    fn message_start(&mut self, frame: &mut U, number: u32) -> Result<(), Error> {
        let _ = (frame, number);
        Ok(())
    }

    /// The submessage or group entered by the matching `message_start` was
    /// left.
    fn message_end(&mut self, frame: &mut U, number: u32) -> Result<(), Error> {
        let _ = (frame, number);
        Ok(())
    }
}

enum FrameEnd {
    /// Length-prefixed submessage ending at this stream offset.
    Bounded(u64),
    /// Group ending at the end-group tag with this field number.
    Group(u32),
}

struct Frame {
    end: FrameEnd,
    /// Field number the frame was entered through, reported to
    /// `message_end`.
    number: u32,
}

/// What kind of partial element the last `parse` call stopped in front of.
#[derive(Copy, Clone, PartialEq)]
enum Partial {
    None,
    Varint,
    Element,
}

enum Outcome {
    Advance(usize),
    Suspend(Partial),
}

/// Resumable streaming parser that drives an [`Events`] implementation.
///
/// `U` is the per-frame user data: one slot per nesting level, allocated
/// once and reused as submessages are entered and left within the same
/// message, like the rest of the frame stack.
///
/// ```
/// use dynpb::{Error, EventParser, Events, FieldType, Tag, TagAction, Value};
///
/// struct Sum(i64);
///
/// impl Events for Sum {
///     fn tag(&mut self, _: &mut (), tag: Tag) -> Result<TagAction, Error> {
///         Ok(if tag.number == 1 {
///             TagAction::Parse(FieldType::Int32)
///         } else {
///             TagAction::Skip
///         })
///     }
///
///     fn value(&mut self, _: &mut (), _number: u32, value: Value) -> Result<(), Error> {
///         self.0 += value.as_int32().unwrap() as i64;
///         Ok(())
///     }
/// }
///
/// # fn main() -> Result<(), Error> {
/// let mut parser = EventParser::new();
/// let mut sum = Sum(0);
/// let consumed = parser.parse(&mut sum, &[0x08, 0x96, 0x01, 0x08, 0x2a])?;
/// parser.finish()?;
/// assert_eq!(consumed, 5);
/// assert_eq!(sum.0, 192);
/// # Ok(()) }
/// ```
pub struct EventParser<U = ()> {
    /// Stream offset of the next unparsed byte.
    offset: u64,
    frames: SmallVec<[Frame; 8]>,
    udata: Vec<U>,
    max_depth: usize,
    /// Frame index at which callback suppression began, while discarding an
    /// unknown group.
    skip_from: Option<usize>,
    /// Remainder of a skipped delimited payload spanning chunks.
    pending_skip: u64,
    partial: Partial,
}

impl<U: Default> EventParser<U> {
    pub fn new() -> Self {
        Self::with_max_depth(DEFAULT_MAX_DEPTH)
    }

    /// Create a parser allowing at most `max_depth` nested submessages.
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            offset: 0,
            frames: smallvec![Frame {
                end: FrameEnd::Bounded(u64::MAX),
                number: 0,
            }],
            udata: std::iter::repeat_with(U::default)
                .take(max_depth + 1)
                .collect(),
            max_depth,
            skip_from: None,
            pending_skip: 0,
            partial: Partial::None,
        }
    }

    /// Prepare the state for an unrelated message.
    pub fn reset(&mut self) {
        self.offset = 0;
        self.frames.truncate(1);
        for slot in &mut self.udata {
            *slot = U::default();
        }
        self.skip_from = None;
        self.pending_skip = 0;
        self.partial = Partial::None;
    }

    /// Stream offset of the next unparsed byte.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Current submessage nesting depth.
    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    /// User data of the current frame.
    pub fn frame_data(&self) -> &U {
        &self.udata[self.frames.len() - 1]
    }

    pub fn frame_data_mut(&mut self) -> &mut U {
        &mut self.udata[self.frames.len() - 1]
    }

    /// Consume as much of `chunk` as possible, firing callbacks.
    ///
    /// Returns the number of bytes consumed, which is less than
    /// `chunk.len()` when the chunk ends inside an element; resubmit the
    /// unconsumed tail with more data appended. An error from a callback or
    /// from the wire aborts the call; the state may then be [`reset`] or
    /// dropped.
    ///
    /// [`reset`]: EventParser::reset
    pub fn parse<E: Events<U>>(&mut self, events: &mut E, chunk: &[u8]) -> Result<usize, Error> {
        let base = self.offset;
        let mut pos = 0usize;
        self.partial = Partial::None;

        // Finish a skip that ran off the end of the previous chunk.
        if self.pending_skip > 0 {
            let n = self.pending_skip.min(chunk.len() as u64) as usize;
            pos += n;
            self.pending_skip -= n as u64;
        }

        loop {
            // Close every bounded frame ending at the cursor. An element
            // that ran past its frame's end is a framing error.
            loop {
                let offset = base + pos as u64;
                let (end, number) = match self.frames.last().unwrap() {
                    Frame {
                        end: FrameEnd::Bounded(end),
                        number,
                    } => (*end, *number),
                    _ => break,
                };
                if offset < end {
                    break;
                }
                if offset > end {
                    return Err(Error::new(ErrorKind::SubmsgExceedsParent));
                }
                self.pop_frame(events, number)?;
            }

            if self.pending_skip > 0 || pos == chunk.len() {
                break;
            }
            match self.parse_element(events, chunk, pos, base)? {
                Outcome::Advance(next) => pos = next,
                Outcome::Suspend(partial) => {
                    self.partial = partial;
                    break;
                }
            }
        }

        self.offset = base + pos as u64;
        Ok(pos)
    }

    /// Declare the input complete.
    ///
    /// Fails if the last chunk ended inside an element or inside an
    /// unterminated submessage.
    pub fn finish(&self) -> Result<(), Error> {
        match self.partial {
            Partial::Varint => Err(Error::new(ErrorKind::UnterminatedVarint)),
            Partial::Element => Err(Error::new(ErrorKind::PrematureEof)),
            Partial::None => {
                if self.pending_skip > 0 || self.frames.len() > 1 {
                    Err(Error::new(ErrorKind::PrematureEof))
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Parse one wire element starting at `chunk[start]`.
    fn parse_element<E: Events<U>>(
        &mut self,
        events: &mut E,
        chunk: &[u8],
        start: usize,
        base: u64,
    ) -> Result<Outcome, Error> {
        let mut pos = start;
        let Some((raw, n)) = wire::decode_varint(&chunk[pos..])? else {
            return Ok(Outcome::Suspend(Partial::Varint));
        };
        pos += n;
        let tag = Tag::from_raw(raw)?;

        if tag.wire_type == WireType::EndGroup {
            return match self.frames.last().unwrap().end {
                FrameEnd::Group(number) if number == tag.number => {
                    let frame_number = self.frames.last().unwrap().number;
                    self.pop_frame(events, frame_number)?;
                    Ok(Outcome::Advance(pos))
                }
                _ => Err(Error::new(ErrorKind::GroupMismatch)),
            };
        }

        let depth = self.frames.len() - 1;
        let action = if self.skip_from.is_some() {
            TagAction::Skip
        } else {
            events.tag(&mut self.udata[depth], tag)?
        };

        match tag.wire_type {
            WireType::Varint => {
                let Some((raw, n)) = wire::decode_varint(&chunk[pos..])? else {
                    return Ok(Outcome::Suspend(Partial::Varint));
                };
                pos += n;
                if let TagAction::Parse(field_type) = action {
                    let value = Value::from_varint(field_type, raw)
                        .ok_or_else(|| Error::new(ErrorKind::BadWireType))?;
                    events.value(&mut self.udata[depth], tag.number, value)?;
                }
                Ok(Outcome::Advance(pos))
            }
            WireType::Fixed32 => {
                if chunk.len() - pos < 4 {
                    return Ok(Outcome::Suspend(Partial::Element));
                }
                let raw = u32::from_le_bytes(chunk[pos..pos + 4].try_into().unwrap());
                pos += 4;
                if let TagAction::Parse(field_type) = action {
                    let value = Value::from_fixed32(field_type, raw)
                        .ok_or_else(|| Error::new(ErrorKind::BadWireType))?;
                    events.value(&mut self.udata[depth], tag.number, value)?;
                }
                Ok(Outcome::Advance(pos))
            }
            WireType::Fixed64 => {
                if chunk.len() - pos < 8 {
                    return Ok(Outcome::Suspend(Partial::Element));
                }
                let raw = u64::from_le_bytes(chunk[pos..pos + 8].try_into().unwrap());
                pos += 8;
                if let TagAction::Parse(field_type) = action {
                    let value = Value::from_fixed64(field_type, raw)
                        .ok_or_else(|| Error::new(ErrorKind::BadWireType))?;
                    events.value(&mut self.udata[depth], tag.number, value)?;
                }
                Ok(Outcome::Advance(pos))
            }
            WireType::Delimited => {
                let Some((len, n)) = wire::decode_varint(&chunk[pos..])? else {
                    return Ok(Outcome::Suspend(Partial::Varint));
                };
                pos += n;
                let payload_end = (base + pos as u64)
                    .checked_add(len)
                    .ok_or_else(|| Error::new(ErrorKind::SubmsgExceedsParent))?;
                self.delimited_element(events, chunk, pos, tag, action, len, payload_end)
            }
            WireType::StartGroup => match action {
                TagAction::Parse(FieldType::Group) => {
                    self.push_frame(FrameEnd::Group(tag.number), tag.number)?;
                    events.message_start(&mut self.udata[self.frames.len() - 1], tag.number)?;
                    Ok(Outcome::Advance(pos))
                }
                TagAction::Skip => {
                    // Suppress callbacks until this group's end tag.
                    if self.skip_from.is_none() {
                        self.skip_from = Some(self.frames.len());
                    }
                    self.push_frame(FrameEnd::Group(tag.number), tag.number)?;
                    Ok(Outcome::Advance(pos))
                }
                TagAction::Parse(_) => Err(Error::new(ErrorKind::BadWireType)),
            },
            WireType::EndGroup => unreachable!("handled above"),
        }
    }

    /// Handle a delimited element whose length prefix has been read.
    /// `pos` is the chunk position of the payload.
    #[allow(clippy::too_many_arguments)]
    fn delimited_element<E: Events<U>>(
        &mut self,
        events: &mut E,
        chunk: &[u8],
        pos: usize,
        tag: Tag,
        action: TagAction,
        len: u64,
        payload_end: u64,
    ) -> Result<Outcome, Error> {
        let depth = self.frames.len() - 1;
        let available = (chunk.len() - pos) as u64;
        match action {
            TagAction::Skip => {
                // Discard incrementally; the remainder carries into the next
                // chunk.
                let taken = len.min(available);
                self.pending_skip = len - taken;
                Ok(Outcome::Advance(pos + taken as usize))
            }
            TagAction::Parse(FieldType::Message) => {
                if let FrameEnd::Bounded(end) = self.frames.last().unwrap().end {
                    if payload_end > end {
                        return Err(Error::new(ErrorKind::SubmsgExceedsParent));
                    }
                }
                self.push_frame(FrameEnd::Bounded(payload_end), tag.number)?;
                events.message_start(&mut self.udata[self.frames.len() - 1], tag.number)?;
                Ok(Outcome::Advance(pos))
            }
            TagAction::Parse(FieldType::String) | TagAction::Parse(FieldType::Bytes) => {
                if available < len {
                    return Ok(Outcome::Suspend(Partial::Element));
                }
                let len = len as usize;
                let data = ByteString::from_alias(&chunk[pos..pos + len]);
                events.bytes(&mut self.udata[depth], tag.number, data)?;
                Ok(Outcome::Advance(pos + len))
            }
            TagAction::Parse(FieldType::Group) => Err(Error::new(ErrorKind::BadWireType)),
            TagAction::Parse(field_type) => {
                // Packed run: every remaining declared type is a packable
                // scalar. The whole run must be available at once.
                if available < len {
                    return Ok(Outcome::Suspend(Partial::Element));
                }
                let len = len as usize;
                let run = &chunk[pos..pos + len];
                let mut at = 0usize;
                while at < len {
                    let value = match field_type.wire_type() {
                        WireType::Varint => {
                            let Some((raw, n)) = wire::decode_varint(&run[at..])? else {
                                return Err(Error::new(ErrorKind::PrematureEof));
                            };
                            at += n;
                            Value::from_varint(field_type, raw)
                        }
                        WireType::Fixed32 => {
                            if len - at < 4 {
                                return Err(Error::new(ErrorKind::PrematureEof));
                            }
                            let raw = u32::from_le_bytes(run[at..at + 4].try_into().unwrap());
                            at += 4;
                            Value::from_fixed32(field_type, raw)
                        }
                        _ => {
                            if len - at < 8 {
                                return Err(Error::new(ErrorKind::PrematureEof));
                            }
                            let raw = u64::from_le_bytes(run[at..at + 8].try_into().unwrap());
                            at += 8;
                            Value::from_fixed64(field_type, raw)
                        }
                    };
                    let value = value.ok_or_else(|| Error::new(ErrorKind::BadWireType))?;
                    events.value(&mut self.udata[depth], tag.number, value)?;
                }
                Ok(Outcome::Advance(pos + len))
            }
        }
    }

    fn push_frame(&mut self, end: FrameEnd, number: u32) -> Result<(), Error> {
        if self.frames.len() > self.max_depth {
            return Err(Error::new(ErrorKind::NestingOverflow));
        }
        self.frames.push(Frame { end, number });
        Ok(())
    }

    fn pop_frame<E: Events<U>>(&mut self, events: &mut E, number: u32) -> Result<(), Error> {
        let index = self.frames.len() - 1;
        let suppressed = self.skip_from.is_some_and(|from| from <= index);
        if !suppressed {
            events.message_end(&mut self.udata[index], number)?;
        }
        self.frames.pop();
        if self.skip_from == Some(self.frames.len()) {
            self.skip_from = None;
        }
        Ok(())
    }
}

impl<U: Default> Default for EventParser<U> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{EventParser, Events, TagAction};
    use crate::buffer::ByteString;
    use crate::error::{Error, ErrorKind};
    use crate::schema::FieldType;
    use crate::value::Value;
    use crate::wire::{encode_varint, Tag, WireType};

    /// Recorded callback activity, excluding tags: a suspended element
    /// re-delivers its tag when parsing resumes, so tag callbacks are not
    /// stable across different chunkings of the same input.
    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Value(u32, Value),
        Bytes(u32, Vec<u8>),
        Start(u32),
        End(u32),
    }

    /// Test handler that rules on fields via a fixed number → type table.
    struct Recorder {
        types: Vec<(u32, FieldType)>,
        events: Vec<Event>,
    }

    impl Recorder {
        fn new(types: &[(u32, FieldType)]) -> Recorder {
            Recorder {
                types: types.to_vec(),
                events: Vec::new(),
            }
        }
    }

    impl Events for Recorder {
        fn tag(&mut self, _: &mut (), tag: Tag) -> Result<TagAction, Error> {
            let known = self.types.iter().find(|(number, _)| *number == tag.number);
            Ok(match known {
                Some(&(_, field_type)) => TagAction::Parse(field_type),
                None => TagAction::Skip,
            })
        }

        fn value(&mut self, _: &mut (), number: u32, value: Value) -> Result<(), Error> {
            self.events.push(Event::Value(number, value));
            Ok(())
        }

        fn bytes(&mut self, _: &mut (), number: u32, data: ByteString<'_>) -> Result<(), Error> {
            self.events.push(Event::Bytes(number, data.into_vec()));
            Ok(())
        }

        fn message_start(&mut self, _: &mut (), number: u32) -> Result<(), Error> {
            self.events.push(Event::Start(number));
            Ok(())
        }

        fn message_end(&mut self, _: &mut (), number: u32) -> Result<(), Error> {
            self.events.push(Event::End(number));
            Ok(())
        }
    }

    fn run(types: &[(u32, FieldType)], input: &[u8]) -> Vec<Event> {
        let mut parser = EventParser::new();
        let mut handler = Recorder::new(types);
        let consumed = parser.parse(&mut handler, input).unwrap();
        assert_eq!(consumed, input.len());
        parser.finish().unwrap();
        handler.events
    }

    #[test]
    fn test_single_varint_field() {
        let events = run(&[(1, FieldType::Int32)], &[0x08, 0x96, 0x01]);
        assert_eq!(events, [Event::Value(1, Value::Int32(150))]);
    }

    #[test]
    fn test_string_field() {
        let events = run(
            &[(1, FieldType::String)],
            &[0x0a, 0x05, b'h', b'e', b'l', b'l', b'o'],
        );
        assert_eq!(events, [Event::Bytes(1, b"hello".to_vec())]);
    }

    #[test]
    fn test_nested_submessage() {
        let events = run(
            &[(1, FieldType::Int32), (3, FieldType::Message)],
            &[0x1a, 0x03, 0x08, 0x96, 0x01],
        );
        assert_eq!(
            events,
            [
                Event::Start(3),
                Event::Value(1, Value::Int32(150)),
                Event::End(3),
            ]
        );
    }

    #[test]
    fn test_packed_run() {
        let events = run(
            &[(4, FieldType::Int32)],
            &[0x22, 0x06, 0x03, 0x8e, 0x02, 0x9e, 0xa7, 0x05],
        );
        assert_eq!(
            events,
            [
                Event::Value(4, Value::Int32(3)),
                Event::Value(4, Value::Int32(270)),
                Event::Value(4, Value::Int32(86942)),
            ]
        );
    }

    #[test]
    fn test_group() {
        let events = run(
            &[(1, FieldType::Int32), (2, FieldType::Group)],
            &[0x13, 0x08, 0x2a, 0x14],
        );
        assert_eq!(
            events,
            [
                Event::Start(2),
                Event::Value(1, Value::Int32(42)),
                Event::End(2),
            ]
        );
    }

    #[test]
    fn test_truncated_varint() {
        let mut parser = EventParser::new();
        let mut handler = Recorder::new(&[(1, FieldType::Int32)]);

        // The second varint byte still has its continuation bit set, so no
        // complete element is available and nothing is consumed.
        let consumed = parser.parse(&mut handler, &[0x08, 0x96]).unwrap();
        assert_eq!(consumed, 0);
        assert!(handler.events.is_empty());

        // At true end of input the dangling varint is an error.
        let err = parser.finish().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnterminatedVarint));

        // With the rest of the data the element parses.
        let consumed = parser.parse(&mut handler, &[0x08, 0x96, 0x01]).unwrap();
        assert_eq!(consumed, 3);
        parser.finish().unwrap();
        assert_eq!(handler.events, [Event::Value(1, Value::Int32(150))]);
    }

    #[test]
    fn test_nesting_overflow() {
        // 65 nested length-delimited submessages against the default limit
        // of 64.
        let mut input = Vec::new();
        for _ in 0..65 {
            let mut outer = Vec::new();
            encode_varint(Tag::new(3, WireType::Delimited).to_raw(), &mut outer);
            encode_varint(input.len() as u64, &mut outer);
            outer.extend(&input);
            input = outer;
        }

        let mut parser = EventParser::new();
        let mut handler = Recorder::new(&[(3, FieldType::Message)]);
        let err = parser.parse(&mut handler, &input).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::NestingOverflow));
    }

    #[test]
    fn test_submessage_exceeds_parent() {
        // Outer message claims 3 payload bytes, nested one claims 10.
        let input = [0x0a, 0x03, 0x12, 0x0a, 0x00];
        let mut parser = EventParser::new();
        let mut handler =
            Recorder::new(&[(1, FieldType::Message), (2, FieldType::Message)]);
        let err = parser.parse(&mut handler, &input).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::SubmsgExceedsParent));
    }

    #[test]
    fn test_group_mismatch() {
        // Group 2 closed by the end tag of group 3.
        let input = [0x13, 0x1c];
        let mut parser = EventParser::new();
        let mut handler = Recorder::new(&[(2, FieldType::Group)]);
        let err = parser.parse(&mut handler, &input).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::GroupMismatch));
    }

    #[test]
    fn test_skipped_fields_fire_no_callbacks() {
        let mut input = Vec::new();
        // Unknown scalar and string fields.
        encode_varint(Tag::new(50, WireType::Varint).to_raw(), &mut input);
        encode_varint(9, &mut input);
        encode_varint(Tag::new(51, WireType::Delimited).to_raw(), &mut input);
        encode_varint(3, &mut input);
        input.extend([1, 2, 3]);
        // Unknown group with known-numbered fields inside: still silent.
        encode_varint(Tag::new(52, WireType::StartGroup).to_raw(), &mut input);
        input.extend([0x08, 0x07]);
        encode_varint(Tag::new(53, WireType::StartGroup).to_raw(), &mut input);
        encode_varint(Tag::new(53, WireType::EndGroup).to_raw(), &mut input);
        encode_varint(Tag::new(52, WireType::EndGroup).to_raw(), &mut input);
        // Known field.
        input.extend([0x08, 0x2a]);

        let events = run(&[(1, FieldType::Int32)], &input);
        assert_eq!(events, [Event::Value(1, Value::Int32(42))]);
    }

    #[test]
    fn test_large_skipped_field_spans_chunks() {
        let mut input = Vec::new();
        encode_varint(Tag::new(9, WireType::Delimited).to_raw(), &mut input);
        encode_varint(1000, &mut input);
        input.extend(std::iter::repeat(0xaa).take(1000));
        input.extend([0x08, 0x05]);

        let mut parser = EventParser::new();
        let mut handler = Recorder::new(&[(1, FieldType::Int32)]);
        let mut fed = 0;
        while fed < input.len() {
            let end = (fed + 64).min(input.len());
            let consumed = parser.parse(&mut handler, &input[fed..end]).unwrap();
            fed += consumed;
            // The skip path always makes progress.
            assert!(consumed > 0);
        }
        parser.finish().unwrap();
        assert_eq!(handler.events, [Event::Value(1, Value::Int32(5))]);
    }

    #[test]
    fn test_resume_at_any_split() {
        let mut input = Vec::new();
        input.extend([0x08, 0x96, 0x01]);
        // Submessage with a string inside.
        let mut sub = Vec::new();
        encode_varint(Tag::new(2, WireType::Delimited).to_raw(), &mut sub);
        encode_varint(5, &mut sub);
        sub.extend(b"hello");
        encode_varint(Tag::new(3, WireType::Delimited).to_raw(), &mut input);
        encode_varint(sub.len() as u64, &mut input);
        input.extend(&sub);
        // Fixed-width value.
        encode_varint(Tag::new(4, WireType::Fixed64).to_raw(), &mut input);
        input.extend(2.5f64.to_le_bytes());

        let types = [
            (1, FieldType::Int32),
            (2, FieldType::String),
            (3, FieldType::Message),
            (4, FieldType::Double),
        ];
        let expected = run(&types, &input);

        for split in 0..input.len() {
            let mut parser = EventParser::new();
            let mut handler = Recorder::new(&types);

            let consumed = parser.parse(&mut handler, &input[..split]).unwrap();
            assert!(consumed <= split);
            let consumed2 = parser.parse(&mut handler, &input[consumed..]).unwrap();
            assert_eq!(consumed + consumed2, input.len());

            parser.finish().unwrap();
            assert_eq!(handler.events, expected, "split at {}", split);
        }
    }

    #[test]
    fn test_finish_inside_submessage() {
        // Submessage claims 5 bytes but input ends after its tag.
        let input = [0x1a, 0x05];
        let mut parser = EventParser::new();
        let mut handler = Recorder::new(&[(3, FieldType::Message)]);
        let consumed = parser.parse(&mut handler, &input).unwrap();
        assert_eq!(consumed, 2);
        let err = parser.finish().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::PrematureEof));
    }

    #[test]
    fn test_callback_error_aborts_parse() {
        struct Failing;

        impl Events for Failing {
            fn tag(&mut self, _: &mut (), _tag: Tag) -> Result<TagAction, Error> {
                Err(Error::new(ErrorKind::BadSequence))
            }
        }

        let mut parser = EventParser::new();
        let err = parser.parse(&mut Failing, &[0x08, 0x01]).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::BadSequence));

        parser.reset();
        assert_eq!(parser.offset(), 0);
        assert_eq!(parser.depth(), 0);
    }

    #[test]
    fn test_frame_user_data() {
        /// Count values per nesting level using the frame slots.
        struct PerFrame {
            per_depth: Vec<(u32, u32)>,
        }

        impl Events<u32> for PerFrame {
            fn tag(&mut self, _: &mut u32, tag: Tag) -> Result<TagAction, Error> {
                Ok(match tag.wire_type {
                    WireType::Delimited => TagAction::Parse(FieldType::Message),
                    _ => TagAction::Parse(FieldType::Int32),
                })
            }

            fn value(&mut self, frame: &mut u32, _number: u32, _value: Value) -> Result<(), Error> {
                *frame += 1;
                Ok(())
            }

            fn message_start(&mut self, frame: &mut u32, _number: u32) -> Result<(), Error> {
                // Slots are reused across submessages at the same depth.
                *frame = 0;
                Ok(())
            }

            fn message_end(&mut self, frame: &mut u32, number: u32) -> Result<(), Error> {
                self.per_depth.push((number, *frame));
                Ok(())
            }
        }

        let mut input = Vec::new();
        input.extend([0x08, 0x01, 0x08, 0x02]);
        // Submessage with one value.
        encode_varint(Tag::new(3, WireType::Delimited).to_raw(), &mut input);
        encode_varint(2, &mut input);
        input.extend([0x08, 0x07]);
        // Second submessage with two values, reusing the same frame slot.
        encode_varint(Tag::new(4, WireType::Delimited).to_raw(), &mut input);
        encode_varint(4, &mut input);
        input.extend([0x08, 0x07, 0x08, 0x08]);

        let mut parser: EventParser<u32> = EventParser::new();
        let mut handler = PerFrame {
            per_depth: Vec::new(),
        };
        let consumed = parser.parse(&mut handler, &input).unwrap();
        assert_eq!(consumed, input.len());
        parser.finish().unwrap();

        assert_eq!(handler.per_depth, [(3, 1), (4, 2)]);
        // Top-level frame counted its own two values.
        assert_eq!(*parser.frame_data(), 2);
    }
}
