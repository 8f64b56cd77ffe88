use handover_marshal::MarshalConfig;

/// Coordinator behavior knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Limits for the marshaller and unmarshaller.
    pub marshal: MarshalConfig,
    /// Poll every adapter during veto so the failure names every vetoing
    /// subsystem. When false, polling stops at the first veto.
    pub poll_all_vetoes: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            marshal: MarshalConfig::default(),
            poll_all_vetoes: true,
        }
    }
}
