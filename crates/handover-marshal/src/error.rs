use crate::tag::TypeTag;

/// Errors that can occur while marshalling or unmarshalling records.
#[derive(Debug, thiserror::Error)]
pub enum MarshalError {
    /// The record type is not in the type table.
    #[error("unknown record type {0}")]
    UnknownType(TypeTag),

    /// The record type is reserved for the stream itself.
    #[error("record type {0} is reserved")]
    ReservedType(TypeTag),

    /// Two descriptors claim the same record type.
    #[error("record type {0} registered twice")]
    DuplicateType(TypeTag),

    /// The payload length exceeds the bound for its type.
    #[error("record {tag} payload too large ({size} bytes, max {max})")]
    PayloadTooLarge {
        tag: TypeTag,
        size: usize,
        max: usize,
    },

    /// A field read ran past the end of the payload.
    #[error("record {tag} truncated (needed {needed} bytes, {remaining} remaining)")]
    Truncated {
        tag: TypeTag,
        needed: usize,
        remaining: usize,
    },

    /// The payload holds bytes that no field consumed.
    #[error("record {tag} has {remaining} trailing bytes")]
    TrailingBytes { tag: TypeTag, remaining: usize },

    /// A field value is outside its valid range.
    #[error("record {tag} field '{field}' has invalid value {value}")]
    InvalidValue {
        tag: TypeTag,
        field: &'static str,
        value: u64,
    },

    /// A single field is larger than an empty output buffer.
    #[error("field of {size} bytes cannot fit an empty {capacity}-byte buffer")]
    FieldExceedsBuffer { size: usize, capacity: usize },

    /// The end-of-stream marker was malformed.
    #[error("end-of-stream marker carries {0} payload bytes")]
    MalformedTerminator(usize),

    /// Bytes arrived after the end-of-stream marker.
    #[error("{0} bytes received after end of stream")]
    DataAfterTerminator(usize),
}

impl MarshalError {
    /// True for errors that mean the byte stream itself cannot be trusted.
    pub fn is_corrupt_stream(&self) -> bool {
        matches!(
            self,
            MarshalError::UnknownType(_)
                | MarshalError::PayloadTooLarge { .. }
                | MarshalError::MalformedTerminator(_)
                | MarshalError::DataAfterTerminator(_)
        )
    }

    /// True for errors raised while decoding a received record's payload.
    pub fn is_malformed_payload(&self) -> bool {
        matches!(
            self,
            MarshalError::Truncated { .. }
                | MarshalError::TrailingBytes { .. }
                | MarshalError::InvalidValue { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, MarshalError>;
