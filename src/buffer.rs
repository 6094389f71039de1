//! Byte strings that can either own their contents or alias foreign memory.
//!
//! The decoder hands out values of string and bytes fields as
//! [`ByteString`]s. When the input is an in-memory buffer these alias the
//! input directly, so decoding a large message allocates nothing for its
//! strings. When the input is a reader the contents are owned instead.

use std::fmt;
use std::ops::Deref;
use std::str::Utf8Error;

/// A byte blob with owned, aliasing or static storage.
///
/// The aliasing form borrows its bytes from an external buffer (typically the
/// decoder's input) for the lifetime `'a`. Appending to an aliasing string
/// first promotes it to owned storage by copying the aliased bytes.
#[derive(Clone)]
pub struct ByteString<'a> {
    data: Storage<'a>,
}

#[derive(Clone)]
enum Storage<'a> {
    Owned(Vec<u8>),
    Alias(&'a [u8]),
    Static(&'static [u8]),
}

impl<'a> ByteString<'a> {
    /// Create an empty owned string.
    pub fn new() -> Self {
        Self {
            data: Storage::Owned(Vec::new()),
        }
    }

    /// Create an empty owned string with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Storage::Owned(Vec::with_capacity(capacity)),
        }
    }

    /// Create a string that aliases `bytes` without copying.
    pub fn from_alias(bytes: &'a [u8]) -> Self {
        Self {
            data: Storage::Alias(bytes),
        }
    }

    /// Create a string over bytes with process lifetime.
    pub fn from_static(bytes: &'static [u8]) -> Self {
        Self {
            data: Storage::Static(bytes),
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        match &self.data {
            Storage::Owned(vec) => vec,
            Storage::Alias(bytes) => bytes,
            Storage::Static(bytes) => bytes,
        }
    }

    /// True if this string owns its storage.
    pub fn is_owned(&self) -> bool {
        matches!(self.data, Storage::Owned(_))
    }

    /// True if this string borrows its storage from an input buffer.
    pub fn is_alias(&self) -> bool {
        matches!(self.data, Storage::Alias(_))
    }

    /// Empty the string for reuse.
    ///
    /// This is the caller's promise that no other view of the contents
    /// exists. Owned storage keeps its capacity; an alias is dropped and the
    /// string becomes an empty owned string.
    pub fn recycle(&mut self) {
        match &mut self.data {
            Storage::Owned(vec) => vec.clear(),
            Storage::Alias(_) | Storage::Static(_) => self.data = Storage::Owned(Vec::new()),
        }
    }

    /// Append `bytes`, promoting an aliasing string to owned storage first.
    pub fn append(&mut self, bytes: &[u8]) {
        match &mut self.data {
            Storage::Owned(vec) => vec.extend_from_slice(bytes),
            Storage::Alias(alias) => {
                let mut vec = Vec::with_capacity(alias.len() + bytes.len());
                vec.extend_from_slice(alias);
                vec.extend_from_slice(bytes);
                self.data = Storage::Owned(vec);
            }
            Storage::Static(alias) => {
                let mut vec = Vec::with_capacity(alias.len() + bytes.len());
                vec.extend_from_slice(alias);
                vec.extend_from_slice(bytes);
                self.data = Storage::Owned(vec);
            }
        }
    }

    /// Return the sub-range `start..end` as a new string.
    ///
    /// Aliasing and static strings re-alias the range without copying; owned
    /// strings copy it out.
    pub fn slice(&self, start: usize, end: usize) -> ByteString<'a> {
        match &self.data {
            Storage::Owned(vec) => ByteString {
                data: Storage::Owned(vec[start..end].to_vec()),
            },
            Storage::Alias(bytes) => ByteString {
                data: Storage::Alias(&bytes[start..end]),
            },
            Storage::Static(bytes) => ByteString {
                data: Storage::Static(&bytes[start..end]),
            },
        }
    }

    /// View the contents as UTF-8 text.
    pub fn as_str(&self) -> Result<&str, Utf8Error> {
        std::str::from_utf8(self.as_bytes())
    }

    /// Convert into an owned byte vector, copying only if aliasing.
    pub fn into_vec(self) -> Vec<u8> {
        match self.data {
            Storage::Owned(vec) => vec,
            Storage::Alias(bytes) => bytes.to_vec(),
            Storage::Static(bytes) => bytes.to_vec(),
        }
    }

    /// Mutable access to owned storage, promoting an alias first.
    ///
    /// Used by byte sources that fill a recycled string from a reader.
    pub(crate) fn owned_mut(&mut self) -> &mut Vec<u8> {
        if let Storage::Alias(alias) | Storage::Static(alias) = self.data {
            self.data = Storage::Owned(alias.to_vec());
        }
        match &mut self.data {
            Storage::Owned(vec) => vec,
            _ => unreachable!(),
        }
    }
}

impl Default for ByteString<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for ByteString<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl<'a> From<&'a [u8]> for ByteString<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Self::from_alias(bytes)
    }
}

impl From<Vec<u8>> for ByteString<'_> {
    fn from(vec: Vec<u8>) -> Self {
        Self {
            data: Storage::Owned(vec),
        }
    }
}

impl PartialEq for ByteString<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for ByteString<'_> {}

impl PartialEq<[u8]> for ByteString<'_> {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_bytes() == other
    }
}

impl<const N: usize> PartialEq<[u8; N]> for ByteString<'_> {
    fn eq(&self, other: &[u8; N]) -> bool {
        self.as_bytes() == other
    }
}

impl PartialEq<&str> for ByteString<'_> {
    fn eq(&self, other: &&str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl fmt::Display for ByteString<'_> {
    /// Formats the contents as text, replacing invalid UTF-8.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.as_bytes()))
    }
}

impl fmt::Debug for ByteString<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.data {
            Storage::Owned(_) => "owned",
            Storage::Alias(_) => "alias",
            Storage::Static(_) => "static",
        };
        write!(f, "ByteString({}, {} bytes", mode, self.len())?;
        if let Ok(text) = self.as_str() {
            if self.len() <= 32 {
                write!(f, ", {:?}", text)?;
            }
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::ByteString;

    #[test]
    fn test_append_promotes_alias() {
        let input = b"hello".to_vec();
        let mut s = ByteString::from_alias(&input);
        assert!(s.is_alias());
        assert_eq!(s, *b"hello");

        s.append(b" world");
        assert!(s.is_owned());
        assert_eq!(s, *b"hello world");
    }

    #[test]
    fn test_recycle_keeps_owned_capacity() {
        let mut s = ByteString::with_capacity(64);
        s.append(b"abc");
        s.recycle();
        assert!(s.is_empty());
        assert!(s.is_owned());

        let input = [1u8, 2, 3];
        let mut s = ByteString::from_alias(&input);
        s.recycle();
        assert!(s.is_owned());
        assert!(s.is_empty());
    }

    #[test]
    fn test_slice_preserves_aliasing() {
        let input = b"hello world".to_vec();
        let s = ByteString::from_alias(&input);
        let sub = s.slice(6, 11);
        assert!(sub.is_alias());
        assert_eq!(sub, *b"world");

        let owned = ByteString::from(b"hello world".to_vec());
        let sub = owned.slice(0, 5);
        assert!(sub.is_owned());
        assert_eq!(sub, *b"hello");
    }

    #[test]
    fn test_as_str() {
        let s = ByteString::from_static(b"hi");
        assert_eq!(s.as_str().unwrap(), "hi");

        let s = ByteString::from_static(&[0xff, 0xfe]);
        assert!(s.as_str().is_err());
    }
}
