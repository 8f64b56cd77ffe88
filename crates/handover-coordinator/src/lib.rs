//! Coordination of a live connection handover between two earbuds.
//!
//! The [`Coordinator`] polls every registered [`HandoverAdapter`] for a veto,
//! marshals their live state into a single ordered byte stream across as many
//! buffer-sized calls as the transport needs, dispatches received records to
//! the adapter owning each record type, and finally commits or aborts every
//! adapter together.

pub mod adapter;
pub mod config;
pub mod coordinator;
pub mod device;
pub mod error;
pub mod event;
pub mod registry;
pub mod session;

pub use adapter::HandoverAdapter;
pub use config::CoordinatorConfig;
pub use coordinator::{Chunks, Consumed, Coordinator, Produced};
pub use device::{BdAddr, ParseAddrError, Role};
pub use error::{AdapterError, HandoverError, Result};
pub use event::{FailureReason, HandoverEvent};
pub use registry::{AdapterRegistration, AdapterRegistry, TypeEntry};
pub use session::{Cursor, Direction, HandoverSession, Phase};
