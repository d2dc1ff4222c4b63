use crate::{BytesCow, StringCow};

impl serde::Serialize for BytesCow<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bytes(self.as_bytes())
    }
}

impl<'de> serde::Deserialize<'de> for BytesCow<'de> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct Visitor;

        impl<'de> serde::de::Visitor<'de> for Visitor {
            type Value = BytesCow<'de>;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a byte slice")
            }

            fn visit_byte_buf<E>(self, v: Vec<u8>) -> Result<Self::Value, E> {
                Ok(BytesCow::from_vec(v))
            }

            fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E> {
                Ok(BytesCow::from_vec(v.to_vec()))
            }

            fn visit_borrowed_bytes<E>(self, v: &'de [u8]) -> Result<Self::Value, E> {
                Ok(BytesCow::from_slice(v))
            }
        }

        deserializer.deserialize_bytes(Visitor)
    }
}

impl serde::Serialize for StringCow<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for StringCow<'de> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct Visitor;

        impl<'de> serde::de::Visitor<'de> for Visitor {
            type Value = StringCow<'de>;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a string")
            }

            fn visit_string<E>(self, v: String) -> Result<Self::Value, E> {
                Ok(StringCow::from_string(v))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E> {
                Ok(StringCow::from_string(v.to_owned()))
            }

            fn visit_borrowed_str<E>(self, v: &'de str) -> Result<Self::Value, E> {
                Ok(StringCow::from_ref(v))
            }
        }

        deserializer.deserialize_str(Visitor)
    }
}

impl<'de, E> serde::de::IntoDeserializer<'de, E> for StringCow<'de>
where
    E: serde::de::Error,
{
    type Deserializer = serde::de::value::CowStrDeserializer<'de, E>;

    fn into_deserializer(self) -> Self::Deserializer {
        match self {
            StringCow::Ref(s) => serde::de::value::CowStrDeserializer::new(std::borrow::Cow::Borrowed(s)),
            StringCow::StaticRef(s) => serde::de::value::CowStrDeserializer::new(std::borrow::Cow::Borrowed(s)),
            StringCow::String(s) => serde::de::value::CowStrDeserializer::new(std::borrow::Cow::Owned(s)),
            StringCow::Bytes(s) => serde::de::value::CowStrDeserializer::new(std::borrow::Cow::Owned(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_cow_json_roundtrip() {
        let value = StringCow::from("hello");
        let json = serde_json::to_string(&value).unwrap();
        let back: StringCow = serde_json::from_str(&json).unwrap();
        assert_eq!(back, "hello");
    }
}
