use std::error::Error as StdError;
use std::fmt;
use std::fmt::{Display, Formatter};

/// Error decoding, encoding or loading Protocol Buffers data.
///
/// Errors carry a category ([`ErrorKind`]) plus, when available, the
/// fully-qualified name of the message type and the field number that was
/// being processed when the error occurred.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    context: Option<String>,
    field: Option<u32>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
            field: None,
        }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Return the name of the message type associated with this error.
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Return the field number associated with this error.
    pub fn field(&self) -> Option<u32> {
        self.field
    }

    /// Associate a message type name and/or field number with this error.
    ///
    /// Context set by an inner frame is preserved; outer frames only fill in
    /// what is still missing, so the most precise location wins.
    pub fn with_context(mut self, context: Option<&str>, field: Option<u32>) -> Self {
        if self.context.is_none() {
            self.context = context.map(|c| c.to_string());
        }
        if self.field.is_none() {
            self.field = field;
        }
        self
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match (self.context.as_deref(), self.field) {
            (Some(ctx), Some(num)) => write!(f, "in message {} field {}: {}", ctx, num, self.kind),
            (Some(ctx), None) => write!(f, "in message {}: {}", ctx, self.kind),
            (None, Some(num)) => write!(f, "in field {}: {}", num, self.kind),
            (None, None) => self.kind.fmt(f),
        }
    }
}

impl StdError for Error {}

impl From<std::io::Error> for Error {
    fn from(val: std::io::Error) -> Self {
        Self::new(ErrorKind::Io(val))
    }
}

impl From<ErrorKind> for Error {
    fn from(val: ErrorKind) -> Self {
        Self::new(val)
    }
}

/// Enum describing the kind of an [`Error`].
#[derive(Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// An I/O error was reported by the underlying byte source or sink.
    Io(std::io::Error),

    /// A varint ran past its 10-byte maximum, or the input ended while a
    /// varint was still incomplete.
    UnterminatedVarint,

    /// A field's wire type does not match its declared type, or a tag used
    /// one of the two reserved wire-type values.
    BadWireType,

    /// Submessages or groups were nested deeper than the configured limit.
    NestingOverflow,

    /// A length-delimited field claimed to extend past the end of its
    /// enclosing submessage.
    SubmsgExceedsParent,

    /// An end-group tag did not match the group currently being parsed.
    GroupMismatch,

    /// The input ended in the middle of a value or an unfinished submessage.
    PrematureEof,

    /// A field referenced a message or enum type that is not present in the
    /// schema, or names the wrong kind of type.
    BadRef,

    /// Two schema entities were registered under the same fully-qualified
    /// name.
    DuplicateSymbol,

    /// A descriptor set could not be decoded, or one of its descriptors
    /// carried an invalid label, type or field number.
    MalformedDescriptor,

    /// Stream operations were called out of sequence, e.g. reading a value
    /// before fetching its field, or descending into a scalar field.
    BadSequence,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Io(err) => write!(f, "io error: {err}"),
            ErrorKind::UnterminatedVarint => write!(f, "unterminated varint"),
            ErrorKind::BadWireType => write!(f, "wire type does not match declared type"),
            ErrorKind::NestingOverflow => write!(f, "submessage nesting too deep"),
            ErrorKind::SubmsgExceedsParent => {
                write!(f, "submessage extends past end of enclosing message")
            }
            ErrorKind::GroupMismatch => write!(f, "mismatched end-group tag"),
            ErrorKind::PrematureEof => write!(f, "unexpected end of input"),
            ErrorKind::BadRef => write!(f, "reference to unknown type"),
            ErrorKind::DuplicateSymbol => write!(f, "duplicate symbol name"),
            ErrorKind::MalformedDescriptor => write!(f, "malformed descriptor"),
            ErrorKind::BadSequence => write!(f, "stream operations called out of sequence"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorKind};

    #[test]
    fn test_error_display() {
        let err = Error::new(ErrorKind::BadWireType);
        assert_eq!(err.to_string(), "wire type does not match declared type");

        let err = Error::new(ErrorKind::BadWireType).with_context(Some("test.Msg"), Some(7));
        assert_eq!(
            err.to_string(),
            "in message test.Msg field 7: wire type does not match declared type"
        );
        assert_eq!(err.context(), Some("test.Msg"));
        assert_eq!(err.field(), Some(7));
    }

    #[test]
    fn test_inner_context_wins() {
        let err = Error::new(ErrorKind::PrematureEof)
            .with_context(Some("test.Inner"), Some(1))
            .with_context(Some("test.Outer"), Some(3));
        assert_eq!(err.context(), Some("test.Inner"));
        assert_eq!(err.field(), Some(1));
    }
}
