//! Live connection handover between the two earbuds of a true-wireless pair.
//!
//! The primary earbud owns the connection to the handset. Handover moves that
//! connection, with every profile's state, to the secondary earbud without
//! dropping the link.
//!
//! # Crate Structure
//!
//! - [`marshal`]: Buffer-bounded, resumable record stream
//! - [`coordinator`]: Adapter contract and the handover state machine
//! - [`profiles`]: Adapters for the link manager and Bluetooth profiles
//! - [`link`]: Chunked earbud-to-earbud transport for the stream

/// Re-export marshalling types.
pub mod marshal {
    pub use handover_marshal::*;
}

/// Re-export coordinator types.
pub mod coordinator {
    pub use handover_coordinator::*;
}

/// Re-export profile adapters.
pub mod profiles {
    pub use handover_profiles::*;
}

/// Re-export link types.
pub mod link {
    pub use handover_link::*;
}
