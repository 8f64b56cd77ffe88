//! Record type tags.
//!
//! Tag 0 is reserved for the end-of-stream marker. Every other tag belongs to
//! exactly one adapter registration.

use std::fmt;

/// One-byte discriminator naming the shape of a marshalled record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeTag(u8);

/// Terminal marker closing a marshalled stream.
pub const END_OF_STREAM: TypeTag = TypeTag(0);

/// Wire form of the end-of-stream marker: the reserved tag and a zero length.
pub const END_MARKER: [u8; 3] = [END_OF_STREAM.0, 0, 0];

impl TypeTag {
    /// Wrap a raw tag value.
    pub const fn new(raw: u8) -> Self {
        Self(raw)
    }

    /// Raw wire value.
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Returns true if the tag is reserved for the stream itself.
    pub const fn is_reserved(self) -> bool {
        self.0 == END_OF_STREAM.0
    }
}

impl From<u8> for TypeTag {
    fn from(raw: u8) -> Self {
        Self(raw)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_of_stream_is_reserved() {
        assert!(END_OF_STREAM.is_reserved());
        assert!(!TypeTag::new(1).is_reserved());
    }

    #[test]
    fn display_is_hex() {
        assert_eq!(TypeTag::new(0x1a).to_string(), "0x1a");
        assert_eq!(TypeTag::from(3).get(), 3);
    }
}
