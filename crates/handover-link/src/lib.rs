//! Chunked transport for the handover stream between two earbuds.
//!
//! Every chunk is framed with:
//! - A 2-byte magic number ("HO") for stream synchronization
//! - A 1-byte kind: DATA, END or ABORT
//! - A 2-byte little-endian payload length
//!
//! [`send_handover`] and [`receive_handover`] pump a coordinator's stream
//! through a [`LinkWriter`] and [`LinkReader`]. Record boundaries need not line
//! up with chunk boundaries.

#[cfg(feature = "async")]
pub mod codec;
pub mod error;
pub mod frame;
pub mod pump;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub use codec::LinkCodec;
pub use error::{LinkError, Result};
pub use frame::{
    decode_frame, encode_frame, FrameKind, LinkConfig, LinkFrame, DEFAULT_MAX_CHUNK, HEADER_SIZE,
    MAGIC,
};
pub use pump::{receive_handover, send_handover, Transfer};
pub use reader::LinkReader;
pub use writer::LinkWriter;
