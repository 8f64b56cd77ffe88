/// Default upper bound on a single record payload, in bytes.
pub const DEFAULT_MAX_PAYLOAD: usize = 512;

/// Controls marshalling limits shared by both devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarshalConfig {
    /// Largest payload accepted for a type that does not declare its own bound.
    /// Values above `u16::MAX` are clamped to the wire limit.
    pub max_payload: usize,
}

impl Default for MarshalConfig {
    fn default() -> Self {
        Self {
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}
