//! Buffer-bounded, resumable marshalling of typed connection snapshots.
//!
//! This is the lowest layer of the handover stack. Every record is written as:
//! - A 1-byte type tag naming the record shape
//! - A 2-byte little-endian payload length
//! - The payload, a sequence of fixed-width fields and length-prefixed blobs
//!
//! The [`Marshaller`] writes whole fields into caller-supplied buffers and holds
//! the remainder until the next buffer arrives. The [`Unmarshaller`] decodes
//! whole records only, so callers re-supply the undecoded tail with more data.

pub mod config;
pub mod error;
pub mod marshaller;
pub mod snapshot;
pub mod table;
pub mod tag;
pub mod unmarshaller;

pub use config::{MarshalConfig, DEFAULT_MAX_PAYLOAD};
pub use error::{MarshalError, Result};
pub use marshaller::{Marshaller, OutBuf};
pub use snapshot::{
    decode_snapshot, ConnectionSnapshot, Decoded, SnapshotReader, SnapshotWriter, ADDR_LEN,
    HEADER_SIZE,
};
pub use table::{TypeDescriptor, TypeTable};
pub use tag::{TypeTag, END_MARKER, END_OF_STREAM};
pub use unmarshaller::{Records, Unmarshaller};
