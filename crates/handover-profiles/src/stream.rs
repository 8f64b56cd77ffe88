use serde::{Deserialize, Serialize};
use tracing::debug;

use handover_coordinator::{AdapterError, BdAddr, HandoverAdapter, Role};
use handover_marshal::{ConnectionSnapshot, TypeTag};

use crate::binding::{BindingTable, ChannelBinder};
use crate::wire::{
    get_addr, get_enum, wire_enum, Attempt, DATA_BLOCK_SEGMENT, MAX_DATA_BLOCKS, MEDIA_CHANNEL,
    STREAM_DATA_BLOCKS, STREAM_DEVICE,
};

pub const NAME: &str = "stream_transport";

/// Remote devices the profile tracks at once.
pub const MAX_DEVICES: usize = 3;

wire_enum! {
    /// L2CAP channel state of a signalling or media channel.
    pub enum ChannelState {
        Idle = 0,
        Connecting = 1,
        Connected = 2,
        Disconnecting = 3,
        DisconnectPending = 4,
    }
}

impl ChannelState {
    /// States in which the channel id is live and must be rebound.
    fn carries_traffic(self) -> bool {
        matches!(
            self,
            ChannelState::Connected | ChannelState::Disconnecting | ChannelState::DisconnectPending
        )
    }

    fn is_settled(self) -> bool {
        matches!(self, ChannelState::Idle | ChannelState::Connected)
    }
}

wire_enum! {
    /// Stream endpoint state machine.
    pub enum StreamState {
        Idle = 0,
        Discovering = 1,
        Configuring = 2,
        Configured = 3,
        Opening = 4,
        Open = 5,
        Starting = 6,
        Streaming = 7,
        Suspending = 8,
        Closing = 9,
        Aborting = 10,
    }
}

impl StreamState {
    fn is_settled(self) -> bool {
        matches!(
            self,
            StreamState::Idle | StreamState::Configured | StreamState::Open | StreamState::Streaming
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaChannel {
    pub cid: u16,
    pub state: ChannelState,
    pub mtu: u16,
}

/// One remote device of the stream-transport profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDevice {
    pub addr: BdAddr,
    #[serde(default)]
    pub device_id: u8,
    pub signal_cid: u16,
    pub signal_state: ChannelState,
    pub stream_state: StreamState,
    #[serde(default)]
    pub pending_issued: bool,
    #[serde(default)]
    pub pending_received: bool,
    #[serde(default)]
    pub media: Vec<MediaChannel>,
    /// Codec configuration, opaque to handover.
    #[serde(default)]
    pub data_blocks: Vec<u8>,
}

impl StreamDevice {
    fn is_connected(&self) -> bool {
        !self.addr.is_zero() && self.signal_state == ChannelState::Connected
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamTransportState {
    pub initialised: bool,
    pub queued_messages: usize,
    pub devices: Vec<StreamDevice>,
}

impl Default for StreamTransportState {
    fn default() -> Self {
        Self {
            initialised: true,
            queued_messages: 0,
            devices: Vec::new(),
        }
    }
}

/// Handover adapter for the stream-transport profile.
///
/// Every connected device is handed over, the peer earbud's included. A
/// received device whose signalling channel matches an existing device is
/// merged into it and keeps that device's id.
#[derive(Debug)]
pub struct StreamTransport {
    state: StreamTransportState,
    binder: Box<dyn ChannelBinder>,
    staged: Vec<StreamDevice>,
    handed_over: Vec<BdAddr>,
    /// Channel ids this attempt bound that had no owner before it.
    bound: Vec<u16>,
    attempt: Attempt,
}

impl StreamTransport {
    pub fn new(state: StreamTransportState) -> Self {
        Self::with_binder(state, Box::new(BindingTable::new()))
    }

    pub fn with_binder(state: StreamTransportState, binder: Box<dyn ChannelBinder>) -> Self {
        Self {
            state,
            binder,
            staged: Vec::new(),
            handed_over: Vec::new(),
            bound: Vec::new(),
            attempt: Attempt::default(),
        }
    }

    pub fn state(&self) -> &StreamTransportState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut StreamTransportState {
        &mut self.state
    }

    pub fn staged(&self) -> &[StreamDevice] {
        &self.staged
    }

    pub fn binder(&self) -> &dyn ChannelBinder {
        self.binder.as_ref()
    }

    pub fn in_handover(&self) -> bool {
        self.attempt.is_active()
    }

    fn connected(&self, position: usize) -> Option<&StreamDevice> {
        self.state
            .devices
            .iter()
            .filter(|device| device.is_connected())
            .nth(position)
    }

    fn device_record(&mut self, position: usize) -> Result<Option<ConnectionSnapshot>, AdapterError> {
        let Some(device) = self.connected(position) else {
            return Ok(None);
        };
        let snapshot = ConnectionSnapshot::builder(STREAM_DEVICE)
            .put_addr(device.addr.bytes())
            .put_u8(device.device_id)
            .put_u16(device.signal_cid)
            .put_u8(device.signal_state.to_wire())
            .put_u8(device.stream_state.to_wire())
            .finish()?;
        let addr = device.addr;
        self.handed_over.push(addr);
        Ok(Some(snapshot))
    }

    fn media_record(&self, position: usize) -> Result<Option<ConnectionSnapshot>, AdapterError> {
        let channel = self
            .state
            .devices
            .iter()
            .filter(|device| device.is_connected())
            .flat_map(|device| {
                device
                    .media
                    .iter()
                    .enumerate()
                    .filter(|(_, media)| media.state == ChannelState::Connected)
                    .map(move |(index, media)| (device.addr, index, media))
            })
            .nth(position);
        let Some((addr, index, media)) = channel else {
            return Ok(None);
        };
        let index = u8::try_from(index).map_err(|_| {
            AdapterError::Rejected(format!("media channel {index} of {addr} has no wire index"))
        })?;
        let snapshot = ConnectionSnapshot::builder(MEDIA_CHANNEL)
            .put_addr(addr.bytes())
            .put_u8(index)
            .put_u16(media.cid)
            .put_u8(media.state.to_wire())
            .put_u16(media.mtu)
            .finish()?;
        Ok(Some(snapshot))
    }

    fn data_block_record(&self, position: usize) -> Result<Option<ConnectionSnapshot>, AdapterError> {
        let device = self
            .state
            .devices
            .iter()
            .filter(|device| device.is_connected() && !device.data_blocks.is_empty())
            .nth(position);
        let Some(device) = device else {
            return Ok(None);
        };
        if device.data_blocks.len() > MAX_DATA_BLOCKS {
            return Err(AdapterError::Rejected(format!(
                "data blocks of {} exceed {MAX_DATA_BLOCKS} bytes",
                device.addr
            )));
        }
        let segments = device.data_blocks.chunks(DATA_BLOCK_SEGMENT);
        let count = u8::try_from(segments.len())
            .map_err(|_| AdapterError::Rejected(format!("too many data blocks for {}", device.addr)))?;
        let mut builder = ConnectionSnapshot::builder(STREAM_DATA_BLOCKS);
        builder.put_addr(device.addr.bytes()).put_u8(count);
        for segment in segments {
            builder.put_blob(segment);
        }
        Ok(Some(builder.finish()?))
    }

    fn stitch_device(&mut self, snapshot: ConnectionSnapshot) -> Result<(), AdapterError> {
        let mut reader = snapshot.reader();
        let addr = get_addr(&mut reader)?;
        let _sender_id = reader.get_u8()?;
        let signal_cid = reader.get_u16()?;
        let signal_state = get_enum(&mut reader, "signal_state", ChannelState::from_wire)?;
        let stream_state = get_enum(&mut reader, "stream_state", StreamState::from_wire)?;
        reader.finish()?;

        if signal_cid == 0 {
            return Err(AdapterError::InvalidChannel(signal_cid));
        }

        // A peer-earbud connection already exists locally under the same
        // signalling channel; the local device id wins.
        let device_id = match self
            .state
            .devices
            .iter()
            .find(|device| !device.addr.is_zero() && device.signal_cid == signal_cid)
        {
            Some(existing) => existing.device_id,
            None => self.free_device_id(&addr)?,
        };

        self.bind(signal_cid)?;
        debug!(%addr, device_id, signal_cid, "stage stream device");
        self.staged.retain(|device| device.addr != addr);
        self.staged.push(StreamDevice {
            addr,
            device_id,
            signal_cid,
            signal_state,
            stream_state,
            pending_issued: false,
            pending_received: false,
            media: Vec::new(),
            data_blocks: Vec::new(),
        });
        Ok(())
    }

    fn stitch_media(&mut self, snapshot: ConnectionSnapshot) -> Result<(), AdapterError> {
        let mut reader = snapshot.reader();
        let addr = get_addr(&mut reader)?;
        let index = reader.get_u8()? as usize;
        let cid = reader.get_u16()?;
        let state = get_enum(&mut reader, "state", ChannelState::from_wire)?;
        let mtu = reader.get_u16()?;
        reader.finish()?;

        let Some(device) = self.staged.iter_mut().find(|device| device.addr == addr) else {
            return Err(AdapterError::UnknownObject(format!(
                "media channel for unknown device {addr}"
            )));
        };
        if state.carries_traffic() {
            if cid == 0 {
                return Err(AdapterError::InvalidChannel(cid));
            }
            let fresh = self.binder.owner(cid).is_none();
            self.binder.bind(cid, NAME)?;
            if fresh {
                self.bound.push(cid);
            }
        }
        if device.media.len() <= index {
            device.media.resize(
                index + 1,
                MediaChannel {
                    cid: 0,
                    state: ChannelState::Idle,
                    mtu: 0,
                },
            );
        }
        device.media[index] = MediaChannel { cid, state, mtu };
        debug!(%addr, index, cid, "stage media channel");
        Ok(())
    }

    fn stitch_data_blocks(&mut self, snapshot: ConnectionSnapshot) -> Result<(), AdapterError> {
        let mut reader = snapshot.reader();
        let addr = get_addr(&mut reader)?;
        let count = reader.get_u8()?;
        let mut blocks = Vec::new();
        for _ in 0..count {
            let segment = reader.get_blob()?;
            if segment.len() > DATA_BLOCK_SEGMENT || blocks.len() + segment.len() > MAX_DATA_BLOCKS
            {
                return Err(reader.invalid("data_blocks", segment.len() as u64).into());
            }
            blocks.extend_from_slice(&segment);
        }
        reader.finish()?;

        let Some(device) = self.staged.iter_mut().find(|device| device.addr == addr) else {
            return Err(AdapterError::UnknownObject(format!(
                "data blocks for unknown device {addr}"
            )));
        };
        device.data_blocks = blocks;
        Ok(())
    }

    /// Lowest id not used by a live device (other than `addr`) or a staged one.
    fn free_device_id(&self, addr: &BdAddr) -> Result<u8, AdapterError> {
        let used = |id: u8| {
            self.state
                .devices
                .iter()
                .any(|device| device.addr != *addr && device.device_id == id)
                || self
                    .staged
                    .iter()
                    .any(|device| device.addr != *addr && device.device_id == id)
        };
        (0..MAX_DEVICES as u8)
            .find(|id| !used(*id))
            .ok_or_else(|| AdapterError::Rejected(format!("no free device slot for {addr}")))
    }

    fn bind(&mut self, cid: u16) -> Result<(), AdapterError> {
        let fresh = self.binder.owner(cid).is_none();
        self.binder.bind(cid, NAME)?;
        if fresh {
            self.bound.push(cid);
        }
        Ok(())
    }

    fn release_bound(&mut self) {
        for cid in std::mem::take(&mut self.bound) {
            self.binder.release(cid);
        }
    }

    fn release_channels(&mut self, device: &StreamDevice) {
        self.binder.release(device.signal_cid);
        for media in &device.media {
            if media.cid != 0 {
                self.binder.release(media.cid);
            }
        }
    }
}

impl HandoverAdapter for StreamTransport {
    fn name(&self) -> &'static str {
        NAME
    }

    fn veto(&self) -> bool {
        if !self.state.initialised || self.state.queued_messages != 0 {
            return true;
        }
        self.state
            .devices
            .iter()
            .filter(|device| !device.addr.is_zero())
            .any(|device| {
                !device.signal_state.is_settled()
                    || device.media.iter().any(|media| !media.state.is_settled())
                    || !device.stream_state.is_settled()
                    || device.pending_issued
                    || device.pending_received
            })
    }

    fn marshal(
        &mut self,
        _handset: &BdAddr,
        tag: TypeTag,
    ) -> Result<Option<ConnectionSnapshot>, AdapterError> {
        let position = self.attempt.advance(tag);
        match tag {
            STREAM_DEVICE => self.device_record(position),
            MEDIA_CHANNEL => self.media_record(position),
            STREAM_DATA_BLOCKS => self.data_block_record(position),
            _ => Ok(None),
        }
    }

    fn unmarshal(
        &mut self,
        _handset: &BdAddr,
        snapshot: ConnectionSnapshot,
    ) -> Result<(), AdapterError> {
        self.attempt.begin();
        match snapshot.tag() {
            STREAM_DEVICE => self.stitch_device(snapshot),
            MEDIA_CHANNEL => self.stitch_media(snapshot),
            STREAM_DATA_BLOCKS => self.stitch_data_blocks(snapshot),
            other => Err(AdapterError::UnexpectedType {
                expected: STREAM_DEVICE,
                actual: other,
            }),
        }
    }

    fn commit(&mut self, role: Role) {
        match role {
            Role::Primary => {
                for device in std::mem::take(&mut self.staged) {
                    self.state
                        .devices
                        .retain(|live| live.addr != device.addr && live.device_id != device.device_id);
                    self.state.devices.push(device);
                }
                self.state.devices.sort_by_key(|device| device.device_id);
                self.bound.clear();
            }
            Role::Secondary => {
                let (released, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.state.devices)
                    .into_iter()
                    .partition(|device| self.handed_over.contains(&device.addr));
                self.state.devices = kept;
                for device in &released {
                    self.release_channels(device);
                }
                self.staged.clear();
                self.release_bound();
            }
        }
        self.handed_over.clear();
        self.attempt.end();
    }

    fn abort(&mut self) {
        // Channels bound before the attempt stay with their live devices.
        self.staged.clear();
        self.release_bound();
        self.handed_over.clear();
        self.attempt.end();
    }
}
