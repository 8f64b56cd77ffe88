use handover_marshal::{MarshalError, TypeTag};

use crate::event::FailureReason;
use crate::session::Phase;

/// Failures an adapter may report from marshal or unmarshal.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// Building or reading a snapshot failed.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] MarshalError),

    /// The record refers to an object this adapter does not know about.
    #[error("unknown object: {0}")]
    UnknownObject(String),

    /// A transport channel id could not be bound locally.
    #[error("invalid channel id {0:#06x}")]
    InvalidChannel(u16),

    /// The adapter produced a record of a type it was not asked for.
    #[error("adapter produced record type {actual} while marshalling {expected}")]
    UnexpectedType { expected: TypeTag, actual: TypeTag },

    /// The adapter refused the operation.
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Errors surfaced by the handover coordinator.
#[derive(Debug, thiserror::Error)]
pub enum HandoverError {
    /// One or more subsystems refused the handover. The attempt never started.
    #[error("handover vetoed by {}", subsystems.join(", "))]
    Vetoed { subsystems: Vec<&'static str> },

    /// The received byte stream cannot be trusted.
    #[error("corrupt stream: {0}")]
    CorruptStream(MarshalError),

    /// An operation was called in a phase that does not allow it.
    #[error("contract violation: {operation} called while {phase}")]
    ContractViolation {
        operation: &'static str,
        phase: Phase,
    },

    /// A subsystem failed while marshalling or unmarshalling.
    #[error("subsystem {subsystem} failed: {source}")]
    Adapter {
        subsystem: &'static str,
        #[source]
        source: AdapterError,
    },

    /// The adapter registration table is inconsistent.
    #[error("invalid registration: {0}")]
    Registration(String),

    /// Local marshalling failed.
    #[error("marshal error: {0}")]
    Marshal(MarshalError),
}

impl HandoverError {
    /// Vetoes are the only failure the caller is expected to retry.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, HandoverError::Vetoed { .. })
    }

    /// Reason carried by the terminal event for this error.
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            HandoverError::Vetoed { .. } => FailureReason::Vetoed,
            HandoverError::CorruptStream(_) => FailureReason::CorruptStream,
            HandoverError::ContractViolation { .. } | HandoverError::Registration(_) => {
                FailureReason::ContractViolation
            }
            HandoverError::Adapter { .. } | HandoverError::Marshal(_) => {
                FailureReason::AdapterFailure
            }
        }
    }
}

impl From<MarshalError> for HandoverError {
    fn from(err: MarshalError) -> Self {
        if err.is_corrupt_stream() {
            HandoverError::CorruptStream(err)
        } else {
            HandoverError::Marshal(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, HandoverError>;
