//! The four streaming contracts that glue the engine together.
//!
//! Protobuf data flows through two typed interfaces, [`Source`] (pull) and
//! [`Sink`] (push), layered over two byte interfaces, [`ByteSource`] and
//! [`ByteSink`]. The wire decoder is a `Source` reading a `ByteSource`; the
//! wire encoder is a `Sink` writing a `ByteSink`; [`stream_data`] pumps any
//! `Source` into any `Sink`.
//!
//! End-of-stream reporting follows C `feof` semantics throughout: the `eof`
//! flag only becomes true after a read has come up short, so it cannot be
//! used predictively.

use std::io::{Read, Write};
use std::sync::Arc;

use crate::buffer::ByteString;
use crate::error::Error;
use crate::schema::FieldDescriptor;
use crate::value::Value;

/// Pull interface for typed protobuf data.
///
/// The reading rhythm is: [`next_field`](Source::next_field) announces the
/// next field, then exactly one of [`read_value`](Source::read_value),
/// [`read_bytes`](Source::read_bytes), [`start_message`](Source::start_message)
/// or [`skip_value`](Source::skip_value) consumes it. A value left unread is
/// skipped by the next `next_field` call.
///
/// `next_field` returning `None` means the current submessage (or, at depth
/// zero, the stream) is exhausted; [`end_message`](Source::end_message) pops
/// back into the parent and clears the submessage-scope eof. `end_message`
/// may also be called early, in which case the rest of the submessage is
/// skipped. Packed runs surface as the same field descriptor returned once
/// per element.
pub trait Source<'buf> {
    /// Advance to the next field and return its descriptor.
    fn next_field(&mut self) -> Result<Option<Arc<FieldDescriptor>>, Error>;

    /// Read the scalar value of the field just returned by `next_field`.
    fn read_value(&mut self) -> Result<Value, Error>;

    /// Read the contents of a string or bytes field.
    ///
    /// The result aliases the input buffer when the underlying byte source
    /// supports it and is owned otherwise.
    fn read_bytes(&mut self) -> Result<ByteString<'buf>, Error>;

    /// Discard the pending value, whatever its wire type.
    fn skip_value(&mut self) -> Result<(), Error>;

    /// Descend into the submessage or group field just returned by
    /// `next_field`.
    fn start_message(&mut self) -> Result<(), Error>;

    /// Leave the current submessage, skipping anything not yet read.
    fn end_message(&mut self) -> Result<(), Error>;

    /// True after a read has failed at end of stream or end of submessage.
    fn eof(&self) -> bool;
}

/// Push interface for typed protobuf data; the mirror of [`Source`].
///
/// `start_message`/`end_message` bracket a submessage explicitly so that a
/// caller holding an already-serialized submessage can instead pass it as one
/// blob to [`put_bytes`](Sink::put_bytes).
pub trait Sink {
    /// Announce the field the next value belongs to.
    fn put_field(&mut self, field: &FieldDescriptor) -> Result<(), Error>;

    /// Write the scalar value of the announced field.
    fn put_value(&mut self, value: Value) -> Result<(), Error>;

    /// Write a string, bytes or pre-serialized submessage payload.
    fn put_bytes(&mut self, bytes: &[u8]) -> Result<(), Error>;

    /// Open a submessage under the announced field.
    fn start_message(&mut self) -> Result<(), Error>;

    /// Close the innermost open submessage.
    fn end_message(&mut self) -> Result<(), Error>;
}

/// Pull interface for bytes.
///
/// `'buf` is the lifetime of buffers handed out: a source over an in-memory
/// slice lends aliases into it, while a source over a reader produces owned
/// buffers and implements `ByteSource<'static>`.
pub trait ByteSource<'buf> {
    /// Recycle `dst` and refill it with the next chunk of the stream.
    ///
    /// At least `min_len` bytes are returned unless the stream ends first;
    /// zero is returned only at end of stream, which also raises the eof
    /// flag.
    fn pull(&mut self, dst: &mut ByteString<'buf>, min_len: usize) -> Result<usize, Error>;

    /// Extend `dst` in place with up to `len` further bytes.
    ///
    /// `dst` must be the buffer most recently filled by this source. This is
    /// how a consumer grows a contiguous view when a value straddles a chunk
    /// boundary.
    fn append(&mut self, dst: &mut ByteString<'buf>, len: usize) -> Result<usize, Error>;

    /// True after a read has come up short at end of stream.
    fn eof(&self) -> bool;
}

/// Push interface for bytes.
pub trait ByteSink {
    /// Consume as much of `bytes` as possible, returning how many were
    /// taken. A short count is not an error; the caller retries with the
    /// remainder.
    fn put(&mut self, bytes: &[u8]) -> Result<usize, Error>;
}

/// A [`ByteSource`] over an in-memory slice.
///
/// Buffers handed out alias the slice, so strings decoded from this source
/// are zero-copy. By default the whole remaining input is offered at once;
/// [`with_chunk_size`](SliceSource::with_chunk_size) limits each `pull` to
/// exercise the consumer's suspension paths.
pub struct SliceSource<'buf> {
    buf: &'buf [u8],
    pos: usize,
    chunk: usize,
    eof: bool,
}

impl<'buf> SliceSource<'buf> {
    pub fn new(buf: &'buf [u8]) -> Self {
        Self::with_chunk_size(buf, usize::MAX)
    }

    /// Create a source that offers at most `chunk` bytes per `pull`.
    pub fn with_chunk_size(buf: &'buf [u8], chunk: usize) -> Self {
        Self {
            buf,
            pos: 0,
            chunk: chunk.max(1),
            eof: false,
        }
    }
}

impl<'buf> ByteSource<'buf> for SliceSource<'buf> {
    fn pull(&mut self, dst: &mut ByteString<'buf>, min_len: usize) -> Result<usize, Error> {
        let remaining = self.buf.len() - self.pos;
        if remaining == 0 {
            self.eof = true;
            dst.recycle();
            return Ok(0);
        }
        let n = remaining.min(self.chunk.max(min_len));
        *dst = ByteString::from_alias(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn append(&mut self, dst: &mut ByteString<'buf>, len: usize) -> Result<usize, Error> {
        let n = len.min(self.buf.len() - self.pos);
        if n == 0 {
            self.eof = true;
            return Ok(0);
        }
        // The usual case: `dst` is the alias we handed out, immediately
        // preceding the unread remainder, so the grown view stays zero-copy.
        let start = self.pos - dst.len();
        if dst.is_alias() && self.buf[start..].as_ptr() == dst.as_bytes().as_ptr() {
            *dst = ByteString::from_alias(&self.buf[start..self.pos + n]);
        } else {
            dst.append(&self.buf[self.pos..self.pos + n]);
        }
        self.pos += n;
        Ok(n)
    }

    fn eof(&self) -> bool {
        self.eof
    }
}

/// A [`ByteSource`] over any [`Read`] implementation.
///
/// Buffers are owned; strings decoded from this source copy out of it.
pub struct ReaderSource<R: Read> {
    reader: R,
    chunk: usize,
    eof: bool,
}

impl<R: Read> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self::with_chunk_size(reader, 8192)
    }

    /// Create a source that reads about `chunk` bytes per `pull`.
    pub fn with_chunk_size(reader: R, chunk: usize) -> Self {
        Self {
            reader,
            chunk: chunk.max(1),
            eof: false,
        }
    }

    /// Read at least `min` of `max` requested bytes onto the end of `vec`.
    fn fill(&mut self, vec: &mut Vec<u8>, min: usize, max: usize) -> Result<usize, Error> {
        let start = vec.len();
        vec.resize(start + max, 0);
        let mut filled = 0;
        while filled < min {
            let n = self.reader.read(&mut vec[start + filled..])?;
            if n == 0 {
                self.eof = true;
                break;
            }
            filled += n;
        }
        vec.truncate(start + filled);
        Ok(filled)
    }
}

impl<R: Read> ByteSource<'static> for ReaderSource<R> {
    fn pull(&mut self, dst: &mut ByteString<'static>, min_len: usize) -> Result<usize, Error> {
        dst.recycle();
        let max = self.chunk.max(min_len);
        self.fill(dst.owned_mut(), min_len.max(1), max)
    }

    fn append(&mut self, dst: &mut ByteString<'static>, len: usize) -> Result<usize, Error> {
        self.fill(dst.owned_mut(), len, len)
    }

    fn eof(&self) -> bool {
        self.eof
    }
}

impl ByteSink for Vec<u8> {
    fn put(&mut self, bytes: &[u8]) -> Result<usize, Error> {
        self.extend_from_slice(bytes);
        Ok(bytes.len())
    }
}

/// A [`ByteSink`] over any [`Write`] implementation.
pub struct WriteSink<W: Write> {
    writer: W,
}

impl<W: Write> WriteSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ByteSink for WriteSink<W> {
    fn put(&mut self, bytes: &[u8]) -> Result<usize, Error> {
        let n = self.writer.write(bytes)?;
        Ok(n)
    }
}

/// Pump `src` into `sink` until end of stream or error, propagating
/// submessage nesting.
pub fn stream_data<'buf>(
    src: &mut (impl Source<'buf> + ?Sized),
    sink: &mut (impl Sink + ?Sized),
) -> Result<(), Error> {
    let mut depth = 0usize;
    loop {
        match src.next_field()? {
            Some(field) => {
                sink.put_field(&field)?;
                if field.is_submessage() {
                    src.start_message()?;
                    sink.start_message()?;
                    depth += 1;
                } else if field.field_type().is_length_delimited() {
                    let bytes = src.read_bytes()?;
                    sink.put_bytes(&bytes)?;
                } else {
                    sink.put_value(src.read_value()?)?;
                }
            }
            None => {
                if depth == 0 {
                    return Ok(());
                }
                src.end_message()?;
                sink.end_message()?;
                depth -= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::{ByteSink, ByteSource, ReaderSource, SliceSource, WriteSink};
    use crate::buffer::ByteString;

    #[test]
    fn test_slice_source_aliases_input() {
        let input = b"hello world".to_vec();
        let mut src = SliceSource::new(&input);
        let mut buf = ByteString::new();

        assert_eq!(src.pull(&mut buf, 1).unwrap(), input.len());
        assert!(buf.is_alias());
        assert_eq!(buf, *b"hello world");
        assert!(!src.eof());

        // Only a failing read reports end of stream.
        assert_eq!(src.pull(&mut buf, 1).unwrap(), 0);
        assert!(src.eof());
    }

    #[test]
    fn test_slice_source_chunked_append() {
        let input = b"abcdefgh".to_vec();
        let mut src = SliceSource::with_chunk_size(&input, 3);
        let mut buf = ByteString::new();

        assert_eq!(src.pull(&mut buf, 1).unwrap(), 3);
        assert_eq!(buf, *b"abc");

        // Growing the view keeps it aliased and contiguous.
        assert_eq!(src.append(&mut buf, 2).unwrap(), 2);
        assert!(buf.is_alias());
        assert_eq!(buf, *b"abcde");

        assert_eq!(src.pull(&mut buf, 1).unwrap(), 3);
        assert_eq!(buf, *b"fgh");
        assert_eq!(src.append(&mut buf, 4).unwrap(), 0);
        assert!(src.eof());
    }

    #[test]
    fn test_slice_source_min_len_overrides_chunk() {
        let input = b"abcdefgh".to_vec();
        let mut src = SliceSource::with_chunk_size(&input, 2);
        let mut buf = ByteString::new();
        assert_eq!(src.pull(&mut buf, 5).unwrap(), 5);
        assert_eq!(buf, *b"abcde");
    }

    #[test]
    fn test_reader_source_owns_buffers() {
        let input = b"hello world".to_vec();
        let mut src = ReaderSource::with_chunk_size(Cursor::new(input), 4);
        let mut buf = ByteString::new();

        assert_eq!(src.pull(&mut buf, 1).unwrap(), 4);
        assert!(buf.is_owned());
        assert_eq!(buf, *b"hell");

        assert_eq!(src.append(&mut buf, 3).unwrap(), 3);
        assert_eq!(buf, *b"hello w");

        // Request past the end: a short count, then eof.
        assert_eq!(src.append(&mut buf, 10).unwrap(), 4);
        assert_eq!(buf, *b"hello world");
        assert!(src.eof());
    }

    #[test]
    fn test_write_sink() {
        let mut sink = WriteSink::new(Vec::new());
        assert_eq!(sink.put(b"abc").unwrap(), 3);
        assert_eq!(sink.put(b"def").unwrap(), 3);
        assert_eq!(sink.into_inner(), b"abcdef");
    }
}
