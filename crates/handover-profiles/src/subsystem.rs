use serde::{Deserialize, Serialize};

use handover_coordinator::{
    AdapterError, AdapterRegistration, AdapterRegistry, BdAddr, HandoverAdapter, Role,
};
use handover_marshal::{ConnectionSnapshot, TypeDescriptor, TypeTag};

use crate::binding::BindingTable;
use crate::handset::{HandsetService, HandsetServiceState};
use crate::link_manager::{LinkManager, LinkManagerState};
use crate::remote_control::{RemoteControl, RemoteControlState};
use crate::stream::{StreamTransport, StreamTransportState};
use crate::voice::{VoiceCall, VoiceCallState};
use crate::wire::{
    ACL_LINK_TYPE, CONTROL_CONNECTION_TYPE, MEDIA_CHANNEL_TYPE, STREAM_DATA_BLOCKS_TYPE,
    STREAM_DEVICE_TYPE, VOICE_LINK_TYPE, VOICE_TASK_TYPE,
};

/// Every subsystem that takes part in handover on an earbud.
#[derive(Debug)]
pub enum Subsystem {
    LinkManager(LinkManager),
    StreamTransport(StreamTransport),
    RemoteControl(RemoteControl),
    VoiceCall(VoiceCall),
    HandsetService(HandsetService),
}

macro_rules! delegate {
    ($self:expr, $adapter:ident => $body:expr) => {
        match $self {
            Subsystem::LinkManager($adapter) => $body,
            Subsystem::StreamTransport($adapter) => $body,
            Subsystem::RemoteControl($adapter) => $body,
            Subsystem::VoiceCall($adapter) => $body,
            Subsystem::HandsetService($adapter) => $body,
        }
    };
}

impl Subsystem {
    /// Record types owned by this subsystem, in marshalling order.
    pub fn types(&self) -> &'static [TypeDescriptor] {
        match self {
            Subsystem::LinkManager(_) => &[ACL_LINK_TYPE],
            Subsystem::StreamTransport(_) => &[
                STREAM_DEVICE_TYPE,
                MEDIA_CHANNEL_TYPE,
                STREAM_DATA_BLOCKS_TYPE,
            ],
            Subsystem::RemoteControl(_) => &[CONTROL_CONNECTION_TYPE],
            Subsystem::VoiceCall(_) => &[VOICE_TASK_TYPE, VOICE_LINK_TYPE],
            Subsystem::HandsetService(_) => &[],
        }
    }

    fn into_registration(self) -> AdapterRegistration<Subsystem> {
        let types = self.types();
        AdapterRegistration::new(self, types)
    }
}

impl HandoverAdapter for Subsystem {
    fn name(&self) -> &'static str {
        delegate!(self, adapter => adapter.name())
    }

    fn veto(&self) -> bool {
        delegate!(self, adapter => adapter.veto())
    }

    fn marshal(
        &mut self,
        handset: &BdAddr,
        tag: TypeTag,
    ) -> Result<Option<ConnectionSnapshot>, AdapterError> {
        delegate!(self, adapter => adapter.marshal(handset, tag))
    }

    fn unmarshal(
        &mut self,
        handset: &BdAddr,
        snapshot: ConnectionSnapshot,
    ) -> Result<(), AdapterError> {
        delegate!(self, adapter => adapter.unmarshal(handset, snapshot))
    }

    fn commit(&mut self, role: Role) {
        delegate!(self, adapter => adapter.commit(role))
    }

    fn abort(&mut self) {
        delegate!(self, adapter => adapter.abort())
    }
}

/// RFCOMM connection known to the local transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfcommRoute {
    pub addr: BdAddr,
    pub server_channel: u8,
    pub conn_id: u16,
}

/// Handover-relevant state of one earbud, as loaded from a scenario file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceState {
    pub link_manager: LinkManagerState,
    pub stream_transport: StreamTransportState,
    pub remote_control: RemoteControlState,
    pub voice_call: VoiceCallState,
    pub handset_service: HandsetServiceState,
    pub rfcomm: Vec<RfcommRoute>,
}

impl DeviceState {
    /// Build the subsystems for this state in registration order.
    pub fn into_registrations(self) -> Vec<AdapterRegistration<Subsystem>> {
        let mut voice_binder = BindingTable::new();
        for route in &self.rfcomm {
            voice_binder.add_rfcomm(route.addr, route.server_channel, route.conn_id);
        }
        [
            Subsystem::LinkManager(LinkManager::new(self.link_manager)),
            Subsystem::StreamTransport(StreamTransport::new(self.stream_transport)),
            Subsystem::RemoteControl(RemoteControl::new(self.remote_control)),
            Subsystem::VoiceCall(VoiceCall::with_binder(
                self.voice_call,
                Box::new(voice_binder),
            )),
            Subsystem::HandsetService(HandsetService::new(self.handset_service)),
        ]
        .into_iter()
        .map(Subsystem::into_registration)
        .collect()
    }

    /// Read the current state back out of a registry.
    pub fn capture(registry: &AdapterRegistry<Subsystem>) -> Self {
        let mut state = DeviceState::default();
        for subsystem in registry.adapters() {
            match subsystem {
                Subsystem::LinkManager(adapter) => state.link_manager = adapter.state().clone(),
                Subsystem::StreamTransport(adapter) => {
                    state.stream_transport = adapter.state().clone()
                }
                Subsystem::RemoteControl(adapter) => {
                    state.remote_control = adapter.state().clone()
                }
                Subsystem::VoiceCall(adapter) => state.voice_call = adapter.state().clone(),
                Subsystem::HandsetService(adapter) => {
                    state.handset_service = adapter.state().clone()
                }
            }
        }
        state
    }
}

/// Registration table for a freshly booted earbud.
pub fn default_registrations() -> Vec<AdapterRegistration<Subsystem>> {
    DeviceState::default().into_registrations()
}

/// Registry for a freshly booted earbud.
pub fn default_registry() -> handover_coordinator::Result<AdapterRegistry<Subsystem>> {
    AdapterRegistry::new(default_registrations())
}
