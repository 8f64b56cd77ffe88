use serde::{Deserialize, Serialize};
use tracing::debug;

use handover_coordinator::{AdapterError, BdAddr, HandoverAdapter, Role};
use handover_marshal::{ConnectionSnapshot, TypeTag};

use crate::binding::{BindingTable, ChannelBinder};
use crate::wire::{get_enum, wire_enum, Attempt, VOICE_LINK, VOICE_TASK};

pub const NAME: &str = "voice_call";

/// Service links the profile can hold.
pub const MAX_LINKS: usize = 2;

wire_enum! {
    /// Service level connection state.
    pub enum SlcState {
        Idle = 0,
        Disabled = 1,
        Searching = 2,
        Connecting = 3,
        Connected = 4,
    }
}

wire_enum! {
    pub enum CallState {
        Idle = 0,
        Incoming = 1,
        Outgoing = 2,
        Active = 3,
        Held = 4,
    }
}

/// Voice-call service link to one handset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceLink {
    pub addr: BdAddr,
    pub slc_state: SlcState,
    /// Remote RFCOMM server channel. Zero when not connected.
    pub server_channel: u8,
    /// Local RFCOMM connection id, resolved after handover.
    #[serde(default)]
    pub conn_id: u16,
    #[serde(default = "idle_call")]
    pub call_state: CallState,
    #[serde(default)]
    pub speaker_volume: u8,
    #[serde(default)]
    pub mic_gain: u8,
}

fn idle_call() -> CallState {
    CallState::Idle
}

impl VoiceLink {
    fn is_connected(&self) -> bool {
        !matches!(self.slc_state, SlcState::Idle | SlcState::Disabled) && self.server_channel != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceCallState {
    pub initialised: bool,
    pub at_response_pending: bool,
    pub queued_messages: usize,
    /// Negotiated feature bits, shared by every link.
    pub features: u32,
    pub links: Vec<VoiceLink>,
}

impl Default for VoiceCallState {
    fn default() -> Self {
        Self {
            initialised: true,
            at_response_pending: false,
            queued_messages: 0,
            features: 0,
            links: Vec::new(),
        }
    }
}

/// Handover adapter for the voice-call profile.
///
/// Only the handset's link moves. The profile-wide record is sent ahead of
/// it, and only when that link is connected.
#[derive(Debug)]
pub struct VoiceCall {
    state: VoiceCallState,
    binder: Box<dyn ChannelBinder>,
    staged_features: Option<u32>,
    staged: Option<VoiceLink>,
    handed_over: Option<BdAddr>,
    attempt: Attempt,
}

impl VoiceCall {
    pub fn new(state: VoiceCallState) -> Self {
        Self::with_binder(state, Box::new(BindingTable::new()))
    }

    pub fn with_binder(state: VoiceCallState, binder: Box<dyn ChannelBinder>) -> Self {
        Self {
            state,
            binder,
            staged_features: None,
            staged: None,
            handed_over: None,
            attempt: Attempt::default(),
        }
    }

    pub fn state(&self) -> &VoiceCallState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut VoiceCallState {
        &mut self.state
    }

    pub fn staged(&self) -> Option<&VoiceLink> {
        self.staged.as_ref()
    }

    pub fn binder(&self) -> &dyn ChannelBinder {
        self.binder.as_ref()
    }

    pub fn in_handover(&self) -> bool {
        self.attempt.is_active()
    }

    fn handset_link(&self, handset: &BdAddr) -> Option<&VoiceLink> {
        self.state
            .links
            .iter()
            .find(|link| link.addr == *handset && link.is_connected())
    }
}

impl HandoverAdapter for VoiceCall {
    fn name(&self) -> &'static str {
        NAME
    }

    fn veto(&self) -> bool {
        !self.state.initialised
            || self.state.links.len() > 1
            || self.state.at_response_pending
            || self.state.queued_messages != 0
    }

    fn marshal(
        &mut self,
        handset: &BdAddr,
        tag: TypeTag,
    ) -> Result<Option<ConnectionSnapshot>, AdapterError> {
        if tag != VOICE_TASK && tag != VOICE_LINK {
            return Ok(None);
        }
        if self.attempt.advance(tag) != 0 {
            return Ok(None);
        }
        let Some(link) = self.handset_link(handset) else {
            return Ok(None);
        };
        let snapshot = if tag == VOICE_TASK {
            ConnectionSnapshot::builder(VOICE_TASK)
                .put_u32(self.state.features)
                .finish()?
        } else {
            ConnectionSnapshot::builder(VOICE_LINK)
                .put_u8(link.server_channel)
                .put_u8(link.slc_state.to_wire())
                .put_u8(link.call_state.to_wire())
                .put_u8(link.speaker_volume)
                .put_u8(link.mic_gain)
                .finish()?
        };
        if tag == VOICE_LINK {
            self.handed_over = Some(*handset);
        }
        Ok(Some(snapshot))
    }

    fn unmarshal(
        &mut self,
        handset: &BdAddr,
        snapshot: ConnectionSnapshot,
    ) -> Result<(), AdapterError> {
        self.attempt.begin();
        let mut reader = snapshot.reader();
        match snapshot.tag() {
            VOICE_TASK => {
                let features = reader.get_u32()?;
                reader.finish()?;
                self.staged_features = Some(features);
                Ok(())
            }
            VOICE_LINK => {
                let server_channel = reader.get_u8()?;
                let slc_state = get_enum(&mut reader, "slc_state", SlcState::from_wire)?;
                let call_state = get_enum(&mut reader, "call_state", CallState::from_wire)?;
                let speaker_volume = reader.get_u8()?;
                let mic_gain = reader.get_u8()?;
                reader.finish()?;

                let occupied = self
                    .state
                    .links
                    .iter()
                    .filter(|link| link.addr != *handset)
                    .count();
                if occupied >= MAX_LINKS {
                    return Err(AdapterError::Rejected(format!(
                        "no idle voice link for {handset}"
                    )));
                }
                let conn_id = self
                    .binder
                    .resolve_rfcomm(handset, server_channel)
                    .ok_or(AdapterError::InvalidChannel(u16::from(server_channel)))?;
                self.binder.bind(conn_id, NAME)?;
                debug!(%handset, server_channel, conn_id, "stage voice link");
                self.staged = Some(VoiceLink {
                    addr: *handset,
                    slc_state,
                    server_channel,
                    conn_id,
                    call_state,
                    speaker_volume,
                    mic_gain,
                });
                Ok(())
            }
            other => Err(AdapterError::UnexpectedType {
                expected: VOICE_LINK,
                actual: other,
            }),
        }
    }

    fn commit(&mut self, role: Role) {
        match role {
            Role::Primary => {
                if let Some(features) = self.staged_features.take() {
                    self.state.features = features;
                }
                if let Some(link) = self.staged.take() {
                    self.state.links.retain(|live| live.addr != link.addr);
                    self.state.links.push(link);
                }
            }
            Role::Secondary => {
                if let Some(handset) = self.handed_over {
                    let binder = &mut self.binder;
                    self.state.links.retain(|link| {
                        if link.addr != handset {
                            return true;
                        }
                        if link.conn_id != 0 {
                            binder.release(link.conn_id);
                        }
                        false
                    });
                }
                self.staged = None;
                self.staged_features = None;
            }
        }
        self.handed_over = None;
        self.attempt.end();
    }

    fn abort(&mut self) {
        if let Some(link) = self.staged.take() {
            self.binder.release(link.conn_id);
        }
        self.staged_features = None;
        self.handed_over = None;
        self.attempt.end();
    }
}
