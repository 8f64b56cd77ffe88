use std::fmt;

use serde::{Deserialize, Serialize};

use crate::device::Role;

/// Why an attempt ended without committing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Vetoed,
    CorruptStream,
    ContractViolation,
    AdapterFailure,
    /// Aborted by the local application, e.g. on timeout.
    Aborted,
    /// The other earbud aborted its side of the attempt.
    PeerAborted,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureReason::Vetoed => "vetoed",
            FailureReason::CorruptStream => "corrupt_stream",
            FailureReason::ContractViolation => "contract_violation",
            FailureReason::AdapterFailure => "adapter_failure",
            FailureReason::Aborted => "aborted",
            FailureReason::PeerAborted => "peer_aborted",
        };
        f.write_str(name)
    }
}

/// Terminal outcome of one handover attempt, consumed by the application
/// layer that flips which earbud answers as primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HandoverEvent {
    Succeeded { role: Role },
    Failed { reason: FailureReason },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_tagged() {
        let ok = HandoverEvent::Succeeded {
            role: Role::Primary,
        };
        assert_eq!(
            serde_json::to_string(&ok).unwrap(),
            r#"{"event":"succeeded","role":"primary"}"#
        );

        let failed: HandoverEvent =
            serde_json::from_str(r#"{"event":"failed","reason":"peer_aborted"}"#).unwrap();
        assert_eq!(
            failed,
            HandoverEvent::Failed {
                reason: FailureReason::PeerAborted
            }
        );
    }
}
