//! A helper macro to declare a "nutype" — a newtype around a primitive
//! integer that behaves like a C-style enum while still accepting and
//! round-tripping values it doesn't have a name for.
//!
//! Wire formats (like RTMP's message type IDs or event codes) routinely
//! define a handful of named values but require implementations to pass
//! unrecognized ones through rather than reject them. A plain Rust `enum`
//! can't represent "some other byte I don't have a name for" without an
//! explicit catch-all variant that then has to be unwrapped everywhere.
//! This macro generates a tuple struct around the underlying integer type
//! instead, with one associated constant per named value, so unknown values
//! are just `TheType(raw)` rather than a parse error.
//!
//! ```
//! use nutype_enum::nutype_enum;
//!
//! nutype_enum! {
//!     pub enum MessageType(u8) {
//!         SetChunkSize = 1,
//!         Audio = 8,
//!         Video = 9,
//!     }
//! }
//!
//! assert_eq!(MessageType::Audio, MessageType(8));
//! assert_eq!(MessageType(200), MessageType(200));
//! assert_eq!(format!("{:?}", MessageType::Audio), "MessageType::Audio(8)");
//! assert_eq!(format!("{:?}", MessageType(200)), "MessageType::Unknown(200)");
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

/// Declares one or more nutype enums.
///
/// See the [crate-level docs](crate) for the rationale and an example.
#[macro_export]
macro_rules! nutype_enum {
    ($(#[$meta:meta])* $vis:vis enum $name:ident($repr:ty) {
        $(
            $(#[$variant_meta:meta])*
            $variant:ident = $value:expr
        ),* $(,)?
    }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        $vis struct $name(pub $repr);

        impl $name {
            $(
                $(#[$variant_meta])*
                #[allow(non_upper_case_globals)]
                $vis const $variant: $name = $name($value);
            )*

            /// Returns the variant name for this value, if it has one.
            #[allow(unreachable_patterns)]
            pub const fn name(&self) -> Option<&'static str> {
                match *self {
                    $(
                        $name::$variant => Some(stringify!($variant)),
                    )*
                    _ => None,
                }
            }
        }

        impl From<$repr> for $name {
            fn from(value: $repr) -> Self {
                $name(value)
            }
        }

        impl From<$name> for $repr {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl std::fmt::Debug for $name {
            #[allow(unreachable_patterns)]
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self.name() {
                    Some(name) => write!(f, "{}::{}({:?})", stringify!($name), name, self.0),
                    None => write!(f, "{}::Unknown({:?})", stringify!($name), self.0),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::nutype_enum;

    nutype_enum! {
        /// A tiny test enum mimicking an RTMP-ish message type.
        pub enum TestKind(u8) {
            Foo = 1,
            Bar = 2,
        }
    }

    #[test]
    fn named_roundtrip() {
        assert_eq!(TestKind::from(1), TestKind::Foo);
        assert_eq!(u8::from(TestKind::Bar), 2);
        assert_eq!(TestKind::Foo.name(), Some("Foo"));
    }

    #[test]
    fn unknown_value_is_preserved() {
        let unknown = TestKind::from(42);
        assert_eq!(unknown.0, 42);
        assert_eq!(unknown.name(), None);
        assert_eq!(format!("{unknown:?}"), "TestKind::Unknown(42)");
    }

    #[test]
    fn debug_named() {
        assert_eq!(format!("{:?}", TestKind::Foo), "TestKind::Foo(1)");
    }
}
