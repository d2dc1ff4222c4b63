use std::borrow::Cow;
use std::fmt::Display;
use std::hash::Hash;

use bytes::Bytes;
use bytestring::ByteString;

/// A [`Cow`]-like type for byte buffers that can additionally hold a
/// reference-counted [`Bytes`] without forcing a copy into an owned `Vec`.
#[derive(Debug, Clone, Eq)]
pub enum BytesCow<'a> {
    /// A borrowed slice.
    Slice(&'a [u8]),
    /// A statically borrowed slice.
    StaticSlice(&'static [u8]),
    /// An owned `Vec<u8>`.
    Vec(Vec<u8>),
    /// An owned, reference-counted [`Bytes`].
    Bytes(Bytes),
}

impl Default for BytesCow<'_> {
    fn default() -> Self {
        Self::from_static(b"")
    }
}

impl<'a> BytesCow<'a> {
    /// Creates a [`BytesCow`] from a static slice.
    pub fn from_static(slice: &'static [u8]) -> Self {
        Self::StaticSlice(slice)
    }

    /// Creates a [`BytesCow`] from a borrowed slice.
    pub fn from_slice(slice: &'a [u8]) -> Self {
        Self::Slice(slice)
    }

    /// Creates a [`BytesCow`] from an owned [`Bytes`].
    pub fn from_bytes(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }

    /// Creates a [`BytesCow`] from a [`Cow<[u8]>`].
    pub fn from_cow(cow: Cow<'a, [u8]>) -> Self {
        match cow {
            Cow::Borrowed(slice) => Self::Slice(slice),
            Cow::Owned(bytes) => Self::Vec(bytes),
        }
    }

    /// Creates a [`BytesCow`] from an owned `Vec<u8>`.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self::Vec(bytes)
    }

    /// Converts into an owned [`Bytes`], copying if currently borrowed.
    pub fn into_bytes(self) -> Bytes {
        match self {
            Self::Slice(slice) => Bytes::copy_from_slice(slice),
            Self::StaticSlice(slice) => Bytes::from_static(slice),
            Self::Vec(bytes) => Bytes::from(bytes),
            Self::Bytes(bytes) => bytes,
        }
    }

    /// Returns the contents as a byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        self.as_ref()
    }
}

impl AsRef<[u8]> for BytesCow<'_> {
    fn as_ref(&self) -> &[u8] {
        match self {
            Self::Slice(slice) => slice,
            Self::StaticSlice(slice) => slice,
            Self::Vec(bytes) => bytes.as_slice(),
            Self::Bytes(bytes) => bytes.as_ref(),
        }
    }
}

impl<T: AsRef<[u8]>> PartialEq<T> for BytesCow<'_> {
    fn eq(&self, other: &T) -> bool {
        self.as_bytes() == other.as_ref()
    }
}

impl Hash for BytesCow<'_> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}

impl<'a> From<Cow<'a, [u8]>> for BytesCow<'a> {
    fn from(cow: Cow<'a, [u8]>) -> Self {
        Self::from_cow(cow)
    }
}

impl From<Bytes> for BytesCow<'_> {
    fn from(bytes: Bytes) -> Self {
        Self::from_bytes(bytes)
    }
}

impl<'a> From<&'a [u8]> for BytesCow<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Self::from_slice(bytes)
    }
}

impl From<Vec<u8>> for BytesCow<'_> {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_vec(bytes)
    }
}

/// A [`Cow`]-like type for strings, mirroring [`BytesCow`] but for `str`/[`String`].
#[derive(Debug, Clone, Eq)]
pub enum StringCow<'a> {
    /// A borrowed `&str`.
    Ref(&'a str),
    /// A statically borrowed `&'static str`.
    StaticRef(&'static str),
    /// An owned [`String`].
    String(String),
    /// An owned, reference-counted [`ByteString`].
    Bytes(ByteString),
}

impl Default for StringCow<'_> {
    fn default() -> Self {
        Self::from_static("")
    }
}

impl<'a> StringCow<'a> {
    /// Creates a [`StringCow`] from a static string slice.
    pub fn from_static(slice: &'static str) -> Self {
        Self::StaticRef(slice)
    }

    /// Creates a [`StringCow`] from an owned [`ByteString`].
    pub fn from_bytes(bytes: ByteString) -> Self {
        Self::Bytes(bytes)
    }

    /// Creates a [`StringCow`] from a [`Cow<str>`].
    pub fn from_cow(cow: Cow<'a, str>) -> Self {
        match cow {
            Cow::Borrowed(slice) => Self::Ref(slice),
            Cow::Owned(string) => Self::String(string),
        }
    }

    /// Creates a [`StringCow`] from a borrowed `&str`.
    pub fn from_ref(slice: &'a str) -> Self {
        Self::Ref(slice)
    }

    /// Creates a [`StringCow`] from an owned [`String`].
    pub fn from_string(string: String) -> Self {
        Self::String(string)
    }

    /// Converts into an owned [`ByteString`].
    pub fn into_bytes(self) -> ByteString {
        match self {
            Self::Ref(slice) => ByteString::from(slice),
            Self::StaticRef(slice) => ByteString::from_static(slice),
            Self::String(string) => ByteString::from(string),
            Self::Bytes(bytes) => bytes,
        }
    }

    /// Converts this [`StringCow`] into one with no borrowed data.
    pub fn into_owned(self) -> StringCow<'static> {
        match self {
            Self::Ref(slice) => StringCow::String(slice.to_owned()),
            Self::StaticRef(slice) => StringCow::StaticRef(slice),
            Self::String(string) => StringCow::String(string),
            Self::Bytes(bytes) => StringCow::Bytes(bytes),
        }
    }

    /// Returns the contents as a string slice.
    pub fn as_str(&self) -> &str {
        self.as_ref()
    }
}

impl AsRef<str> for StringCow<'_> {
    fn as_ref(&self) -> &str {
        match self {
            Self::Ref(slice) => slice,
            Self::StaticRef(slice) => slice,
            Self::String(string) => string.as_str(),
            Self::Bytes(bytes) => bytes.as_ref(),
        }
    }
}

impl<T: AsRef<str>> PartialEq<T> for StringCow<'_> {
    fn eq(&self, other: &T) -> bool {
        self.as_str() == other.as_ref()
    }
}

impl Hash for StringCow<'_> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl PartialOrd for StringCow<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StringCow<'_> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl Display for StringCow<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'a> From<Cow<'a, str>> for StringCow<'a> {
    fn from(cow: Cow<'a, str>) -> Self {
        Self::from_cow(cow)
    }
}

impl<'a> From<&'a str> for StringCow<'a> {
    fn from(slice: &'a str) -> Self {
        Self::from_ref(slice)
    }
}

impl From<String> for StringCow<'_> {
    fn from(string: String) -> Self {
        Self::from_string(string)
    }
}

impl From<ByteString> for StringCow<'_> {
    fn from(bytes: ByteString) -> Self {
        Self::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_cow_eq_across_variants() {
        let a = BytesCow::from_static(b"abc");
        let b = BytesCow::from_vec(b"abc".to_vec());
        assert_eq!(a, b"abc");
        assert_eq!(b, b"abc");
    }

    #[test]
    fn string_cow_ordering() {
        let a = StringCow::from("a");
        let b = StringCow::from("b".to_owned());
        assert!(a < b);
    }

    #[test]
    fn string_cow_into_owned_detaches_lifetime() {
        let s = String::from("hello");
        let borrowed = StringCow::from_ref(&s);
        let owned = borrowed.into_owned();
        assert_eq!(owned, "hello");
    }
}
