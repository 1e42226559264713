/// Declares a transparent newtype over a primitive integer.
///
/// Besides the usual value-type derives (ordering, hashing, serde as the bare
/// integer), the generated type gets:
/// - `Deref` to the inner integer and `From` conversions both ways
/// - `Debug` as `Name(value)`, `Display` as the bare value
/// - `const fn raw()` and little-endian `to_le_bytes` / `from_le_bytes`,
///   used by the wire codec so header fields never go through `as` casts
#[macro_export]
macro_rules! strong_type {
    ($(#[$meta:meta])* $name:ident, $inner:ty) => {
        $(#[$meta])*
        #[derive(
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            Default,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        #[repr(transparent)]
        pub struct $name(pub $inner);

        impl $name {
            pub const SIZE: usize = ::std::mem::size_of::<$inner>();

            #[inline]
            pub const fn raw(self) -> $inner {
                self.0
            }

            #[inline]
            pub fn to_le_bytes(self) -> [u8; ::std::mem::size_of::<$inner>()] {
                self.0.to_le_bytes()
            }

            #[inline]
            pub fn from_le_bytes(bytes: [u8; ::std::mem::size_of::<$inner>()]) -> Self {
                Self(<$inner>::from_le_bytes(bytes))
            }
        }

        impl ::std::ops::Deref for $name {
            type Target = $inner;

            #[inline]
            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$inner> for $name {
            #[inline]
            fn from(val: $inner) -> Self {
                Self(val)
            }
        }

        impl From<$name> for $inner {
            #[inline]
            fn from(val: $name) -> Self {
                val.0
            }
        }
    };
}

#[cfg(test)]
mod tests {
    strong_type!(
        /// A throwaway id for exercising the macro.
        ProbeId,
        u32
    );

    #[test]
    fn test_raw_and_deref() {
        let id = ProbeId(42);
        assert_eq!(id.raw(), 42);
        assert_eq!(*id, 42u32);
        let raw: u32 = id.into();
        assert_eq!(raw, 42);
    }

    #[test]
    fn test_le_bytes() {
        let id = ProbeId(0x0403_0201);
        assert_eq!(id.to_le_bytes(), [1, 2, 3, 4]);
        assert_eq!(ProbeId::from_le_bytes([1, 2, 3, 4]), id);
        assert_eq!(ProbeId::SIZE, 4);
    }

    #[test]
    fn test_display_debug() {
        let id = ProbeId(7);
        assert_eq!(id.to_string(), "7");
        assert_eq!(format!("{:?}", id), "ProbeId(7)");
    }

    #[test]
    fn test_serde_transparent() {
        let json = serde_json::to_string(&ProbeId(9)).unwrap();
        assert_eq!(json, "9");
        let parsed: ProbeId = serde_json::from_str("9").unwrap();
        assert_eq!(parsed, ProbeId(9));
    }
}
