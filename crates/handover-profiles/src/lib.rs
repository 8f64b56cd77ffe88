//! Handover adapters for the subsystems of a true-wireless earbud.
//!
//! Each adapter stages what it receives and only touches live state on
//! commit. [`Subsystem`] ties them together in the fixed registration order
//! both earbuds must share.

pub mod binding;
pub mod handset;
pub mod link_manager;
pub mod remote_control;
pub mod stream;
pub mod subsystem;
pub mod voice;
mod wire;

pub use binding::{BindingTable, ChannelBinder};
pub use handset::{HandsetService, HandsetServiceState, HandsetState};
pub use link_manager::{AclLink, LinkManager, LinkManagerState, LinkMode, LinkRole, LinkState};
pub use remote_control::{ControlConnection, ControlRole, RemoteControl, RemoteControlState};
pub use stream::{
    ChannelState, MediaChannel, StreamDevice, StreamState, StreamTransport, StreamTransportState,
};
pub use subsystem::{
    default_registrations, default_registry, DeviceState, RfcommRoute, Subsystem,
};
pub use voice::{CallState, SlcState, VoiceCall, VoiceCallState, VoiceLink};
pub use wire::{
    ACL_LINK, CONTROL_CONNECTION, DATA_BLOCK_SEGMENT, MAX_DATA_BLOCKS, MEDIA_CHANNEL,
    STREAM_DATA_BLOCKS, STREAM_DEVICE, VOICE_LINK, VOICE_TASK,
};
