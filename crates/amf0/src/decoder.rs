//! AMF0 decoder

use std::io;

use byteorder::{BigEndian, ByteOrder};
use num_traits::FromPrimitive;
use scuffle_bytes_util::StringCow;
use scuffle_bytes_util::zero_copy::{BytesBuf, IoRead, Slice, ZeroCopyReader};

use crate::{Amf0Array, Amf0Error, Amf0Marker, Amf0Object, Amf0Value};

/// AMF0 decoder.
///
/// Generic over anything that can hand back borrowed or owned chunks of
/// bytes through [`ZeroCopyReader`], so decoding from an in-memory slice
/// never has to copy.
#[derive(Debug, Clone)]
pub struct Amf0Decoder<R> {
    reader: R,
    pub(crate) next_marker: Option<Amf0Marker>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ObjectHeader<'a> {
    Object,
    TypedObject { name: StringCow<'a> },
    EcmaArray { size: u32 },
}

impl<B: bytes::Buf> Amf0Decoder<BytesBuf<B>> {
    /// Creates a decoder over anything implementing [`bytes::Buf`].
    pub fn from_buf(buf: B) -> Self {
        Self {
            reader: BytesBuf(buf),
            next_marker: None,
        }
    }
}

impl<R: io::Read> Amf0Decoder<IoRead<R>> {
    /// Creates a decoder over anything implementing [`std::io::Read`].
    pub fn from_reader(reader: R) -> Self {
        Self {
            reader: IoRead(reader),
            next_marker: None,
        }
    }
}

impl<'a> Amf0Decoder<Slice<'a>> {
    /// Creates a decoder over a borrowed byte slice, never copying.
    pub fn from_slice(bytes: &'a [u8]) -> Self {
        Self {
            reader: Slice::new(bytes),
            next_marker: None,
        }
    }
}

impl<'de, R> Amf0Decoder<R>
where
    R: ZeroCopyReader<'de>,
{
    /// Returns whether there is more data left to decode.
    pub fn has_remaining(&mut self) -> Result<bool, Amf0Error> {
        match self.peek_marker() {
            Ok(_) => Ok(true),
            Err(Amf0Error::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Decodes a single [`Amf0Value`] from the stream.
    pub fn decode_value(&mut self) -> Result<Amf0Value<'de>, Amf0Error> {
        let marker = self.peek_marker()?;

        match marker {
            Amf0Marker::Boolean => self.decode_boolean().map(Into::into),
            Amf0Marker::Number | Amf0Marker::Date => self.decode_number().map(Into::into),
            Amf0Marker::String | Amf0Marker::LongString | Amf0Marker::XmlDocument => self.decode_string().map(Into::into),
            Amf0Marker::Null | Amf0Marker::Undefined => self.decode_null().map(|()| Amf0Value::Null),
            Amf0Marker::Object | Amf0Marker::TypedObject | Amf0Marker::EcmaArray => self.decode_object().map(Into::into),
            Amf0Marker::StrictArray => self.decode_strict_array().map(Into::into),
            _ => Err(Amf0Error::UnsupportedMarker(marker)),
        }
    }

    /// Deserializes a value using [`serde`].
    pub fn deserialize<T>(&mut self) -> Result<T, Amf0Error>
    where
        T: serde::de::Deserialize<'de>,
    {
        T::deserialize(self)
    }

    /// Decodes every remaining value in the stream.
    pub fn decode_all(&mut self) -> Result<Vec<Amf0Value<'de>>, Amf0Error> {
        let mut values = Vec::new();

        while self.has_remaining()? {
            values.push(self.decode_value()?);
        }

        Ok(values)
    }

    /// Peeks the next marker without consuming it.
    pub(crate) fn peek_marker(&mut self) -> Result<Amf0Marker, Amf0Error> {
        let marker = self.read_marker()?;
        self.next_marker = Some(marker);
        Ok(marker)
    }

    fn read_marker(&mut self) -> Result<Amf0Marker, Amf0Error> {
        if let Some(marker) = self.next_marker.take() {
            return Ok(marker);
        }

        let byte = self.reader.try_read(1)?.as_bytes()[0];
        Amf0Marker::from_u8(byte).ok_or(Amf0Error::UnknownMarker(byte))
    }

    fn expect_marker(&mut self, expect: &'static [Amf0Marker]) -> Result<Amf0Marker, Amf0Error> {
        let marker = self.read_marker()?;

        if expect.contains(&marker) {
            Ok(marker)
        } else {
            Err(Amf0Error::UnexpectedType {
                expected: expect,
                got: marker,
            })
        }
    }

    fn read_u16(&mut self) -> Result<u16, Amf0Error> {
        Ok(BigEndian::read_u16(self.reader.try_read(2)?.as_bytes()))
    }

    fn read_u32(&mut self) -> Result<u32, Amf0Error> {
        Ok(BigEndian::read_u32(self.reader.try_read(4)?.as_bytes()))
    }

    fn read_i16(&mut self) -> Result<i16, Amf0Error> {
        Ok(BigEndian::read_i16(self.reader.try_read(2)?.as_bytes()))
    }

    fn read_f64(&mut self) -> Result<f64, Amf0Error> {
        Ok(BigEndian::read_f64(self.reader.try_read(8)?.as_bytes()))
    }

    /// Decodes a number.
    pub fn decode_number(&mut self) -> Result<f64, Amf0Error> {
        let marker = self.expect_marker(&[Amf0Marker::Number, Amf0Marker::Date])?;
        let number = self.read_f64()?;

        if marker == Amf0Marker::Date {
            // Timezone offset, always zero in practice, discarded.
            self.read_i16()?;
        }

        Ok(number)
    }

    /// Decodes a boolean.
    pub fn decode_boolean(&mut self) -> Result<bool, Amf0Error> {
        self.expect_marker(&[Amf0Marker::Boolean])?;
        Ok(self.reader.try_read(1)?.as_bytes()[0] != 0)
    }

    pub(crate) fn decode_normal_string(&mut self) -> Result<StringCow<'de>, Amf0Error> {
        let len = self.read_u16()? as usize;
        let chunk = self.reader.try_read(len)?;
        string_cow_from_bytes(chunk)
    }

    /// Decodes a string, including the long-string and XML-document variants.
    pub fn decode_string(&mut self) -> Result<StringCow<'de>, Amf0Error> {
        let marker = self.expect_marker(&[Amf0Marker::String, Amf0Marker::LongString, Amf0Marker::XmlDocument])?;

        let len = if marker == Amf0Marker::String {
            self.read_u16()? as usize
        } else {
            self.read_u32()? as usize
        };

        let chunk = self.reader.try_read(len)?;
        string_cow_from_bytes(chunk)
    }

    /// Decodes a null or undefined value.
    pub fn decode_null(&mut self) -> Result<(), Amf0Error> {
        self.expect_marker(&[Amf0Marker::Null, Amf0Marker::Undefined])?;
        Ok(())
    }

    /// Returns a lazy iterator that deserializes a series of values from the
    /// remainder of the stream.
    pub fn deserialize_stream<T>(&mut self) -> crate::de::Amf0DeserializerStream<'_, R, T> {
        crate::de::Amf0DeserializerStream::new(self)
    }

    pub(crate) fn decode_object_header(&mut self) -> Result<ObjectHeader<'de>, Amf0Error> {
        let marker = self.expect_marker(&[Amf0Marker::Object, Amf0Marker::TypedObject, Amf0Marker::EcmaArray])?;

        match marker {
            Amf0Marker::Object => Ok(ObjectHeader::Object),
            Amf0Marker::TypedObject => Ok(ObjectHeader::TypedObject {
                name: self.decode_normal_string()?,
            }),
            _ => Ok(ObjectHeader::EcmaArray { size: self.read_u32()? }),
        }
    }

    pub(crate) fn decode_object_key(&mut self) -> Result<Option<StringCow<'de>>, Amf0Error> {
        let key = self.decode_normal_string()?;

        if key.as_str().is_empty() && self.peek_marker()? == Amf0Marker::ObjectEnd {
            self.next_marker = None;
            return Ok(None);
        }

        Ok(Some(key))
    }

    /// Decodes an object, typed object or ECMA array as a key/value list.
    pub fn decode_object(&mut self) -> Result<Amf0Object<'de>, Amf0Error> {
        let header = self.decode_object_header()?;

        let entries = match header {
            ObjectHeader::Object | ObjectHeader::TypedObject { .. } => {
                let mut entries = Vec::new();
                while let Some(key) = self.decode_object_key()? {
                    let value = self.decode_value()?;
                    entries.push((key, value));
                }
                entries
            }
            ObjectHeader::EcmaArray { size } => {
                let mut entries = Vec::with_capacity(size as usize);
                for _ in 0..size {
                    let key = self.decode_normal_string()?;
                    let value = self.decode_value()?;
                    entries.push((key, value));
                }

                if self.peek_marker()? == Amf0Marker::ObjectEnd {
                    self.next_marker = None;
                }

                entries
            }
        };

        Ok(std::borrow::Cow::Owned(entries))
    }

    pub(crate) fn decode_strict_array_header(&mut self) -> Result<u32, Amf0Error> {
        self.expect_marker(&[Amf0Marker::StrictArray])?;
        self.read_u32()
    }

    /// Decodes a strict array.
    pub fn decode_strict_array(&mut self) -> Result<Amf0Array<'de>, Amf0Error> {
        let size = self.decode_strict_array_header()? as usize;
        let mut array = Vec::with_capacity(size);

        for _ in 0..size {
            array.push(self.decode_value()?);
        }

        Ok(Amf0Array::from(array))
    }
}

fn string_cow_from_bytes<'a>(cow: scuffle_bytes_util::BytesCow<'a>) -> Result<StringCow<'a>, Amf0Error> {
    match cow {
        scuffle_bytes_util::BytesCow::Slice(s) => Ok(StringCow::from_ref(std::str::from_utf8(s)?)),
        scuffle_bytes_util::BytesCow::StaticSlice(s) => Ok(StringCow::from_static(std::str::from_utf8(s)?)),
        other => {
            let bytes = other.into_bytes();
            let s = std::str::from_utf8(&bytes)?.to_owned();
            Ok(StringCow::from_string(s))
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn decodes_number() {
        let mut bytes = vec![Amf0Marker::Number as u8];
        bytes.extend_from_slice(&1.0f64.to_be_bytes());
        let mut decoder = Amf0Decoder::from_buf(Bytes::from(bytes));
        assert_eq!(decoder.decode_number().unwrap(), 1.0);
    }

    #[test]
    fn decodes_object() {
        #[rustfmt::skip]
        let bytes = [
            Amf0Marker::Object as u8,
            0, 1, b'a', Amf0Marker::Boolean as u8, 1,
            0, 0, Amf0Marker::ObjectEnd as u8,
        ];
        let mut decoder = Amf0Decoder::from_slice(&bytes);
        let object = decoder.decode_object().unwrap();
        assert_eq!(object.len(), 1);
        assert_eq!(object[0].0, "a");
        assert_eq!(object[0].1, Amf0Value::Boolean(true));
    }

    #[test]
    fn has_remaining_reflects_eof() {
        let bytes = [Amf0Marker::Null as u8];
        let mut decoder = Amf0Decoder::from_slice(&bytes);
        assert!(decoder.has_remaining().unwrap());
        decoder.decode_null().unwrap();
        assert!(!decoder.has_remaining().unwrap());
    }
}
