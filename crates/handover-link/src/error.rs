use handover_coordinator::HandoverError;

/// Errors that can occur while carrying a handover stream over a link.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// The frame header contains an invalid magic number.
    #[error("invalid link magic (expected 0x484f \"HO\")")]
    InvalidMagic,

    /// The frame kind byte is not DATA, END or ABORT.
    #[error("unknown link frame kind {0:#04x}")]
    UnknownKind(u8),

    /// The chunk exceeds the configured maximum size.
    #[error("chunk too large ({size} bytes, max {max})")]
    ChunkTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,

    /// The peer abandoned the handover.
    #[error("peer aborted the handover")]
    PeerAborted,

    /// The coordinator produced nothing into a non-full chunk.
    #[error("handover stream stalled with {capacity}-byte chunks")]
    Stalled { capacity: usize },

    /// The local coordinator rejected the stream or failed to produce it.
    #[error(transparent)]
    Handover(#[from] HandoverError),
}

pub type Result<T> = std::result::Result<T, LinkError>;
