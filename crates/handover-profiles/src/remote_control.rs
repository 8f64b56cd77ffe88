use serde::{Deserialize, Serialize};
use tracing::debug;

use handover_coordinator::{AdapterError, BdAddr, HandoverAdapter, Role};
use handover_marshal::{ConnectionSnapshot, TypeTag};

use crate::binding::{BindingTable, ChannelBinder};
use crate::wire::{get_addr, get_enum, wire_enum, Attempt, CONTROL_CONNECTION};

pub const NAME: &str = "remote_control";

const BASIC_CONNECTED: u8 = 0x01;
const BROWSING_CONNECTED: u8 = 0x02;

wire_enum! {
    /// Which side of the remote-control protocol the local device plays.
    pub enum ControlRole {
        Unconfigured = 0,
        Target = 1,
        Controller = 2,
        TargetAndController = 3,
    }
}

/// One remote-control connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlConnection {
    pub addr: BdAddr,
    pub cid: u16,
    /// Zero when no browsing channel is open.
    #[serde(default)]
    pub browsing_cid: u16,
    #[serde(default)]
    pub pending_command: bool,
    #[serde(default)]
    pub fragmented_response: bool,
    #[serde(default)]
    pub absolute_volume: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteControlState {
    pub role: ControlRole,
    pub queued_messages: usize,
    pub connections: Vec<ControlConnection>,
}

impl Default for RemoteControlState {
    fn default() -> Self {
        Self {
            role: ControlRole::TargetAndController,
            queued_messages: 0,
            connections: Vec::new(),
        }
    }
}

impl ControlConnection {
    fn flags(&self) -> u8 {
        let mut flags = BASIC_CONNECTED;
        if self.browsing_cid != 0 {
            flags |= BROWSING_CONNECTED;
        }
        flags
    }
}

/// Handover adapter for the remote-control profile.
#[derive(Debug)]
pub struct RemoteControl {
    state: RemoteControlState,
    binder: Box<dyn ChannelBinder>,
    staged: Vec<ControlConnection>,
    handed_over: Vec<BdAddr>,
    attempt: Attempt,
}

impl RemoteControl {
    pub fn new(state: RemoteControlState) -> Self {
        Self::with_binder(state, Box::new(BindingTable::new()))
    }

    pub fn with_binder(state: RemoteControlState, binder: Box<dyn ChannelBinder>) -> Self {
        Self {
            state,
            binder,
            staged: Vec::new(),
            handed_over: Vec::new(),
            attempt: Attempt::default(),
        }
    }

    pub fn state(&self) -> &RemoteControlState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut RemoteControlState {
        &mut self.state
    }

    pub fn staged(&self) -> &[ControlConnection] {
        &self.staged
    }

    pub fn binder(&self) -> &dyn ChannelBinder {
        self.binder.as_ref()
    }

    pub fn in_handover(&self) -> bool {
        self.attempt.is_active()
    }

    fn release(&mut self, connection: &ControlConnection) {
        self.binder.release(connection.cid);
        if connection.browsing_cid != 0 {
            self.binder.release(connection.browsing_cid);
        }
    }
}

impl HandoverAdapter for RemoteControl {
    fn name(&self) -> &'static str {
        NAME
    }

    fn veto(&self) -> bool {
        self.state.role == ControlRole::Unconfigured
            || self.state.queued_messages != 0
            || self
                .state
                .connections
                .iter()
                .any(|connection| connection.pending_command || connection.fragmented_response)
    }

    fn marshal(
        &mut self,
        _handset: &BdAddr,
        tag: TypeTag,
    ) -> Result<Option<ConnectionSnapshot>, AdapterError> {
        if tag != CONTROL_CONNECTION {
            return Ok(None);
        }
        let position = self.attempt.advance(tag);
        let Some(connection) = self.state.connections.get(position) else {
            return Ok(None);
        };
        let snapshot = ConnectionSnapshot::builder(CONTROL_CONNECTION)
            .put_addr(connection.addr.bytes())
            .put_u8(self.state.role.to_wire())
            .put_u8(connection.flags())
            .put_u16(connection.cid)
            .put_u16(connection.browsing_cid)
            .put_u8(connection.absolute_volume)
            .finish()?;
        let addr = connection.addr;
        self.handed_over.push(addr);
        Ok(Some(snapshot))
    }

    fn unmarshal(
        &mut self,
        _handset: &BdAddr,
        snapshot: ConnectionSnapshot,
    ) -> Result<(), AdapterError> {
        self.attempt.begin();
        let mut reader = snapshot.reader();
        let addr = get_addr(&mut reader)?;
        let role = get_enum(&mut reader, "role", ControlRole::from_wire)?;
        let flags = reader.get_u8()?;
        if flags & BASIC_CONNECTED == 0 || flags & !(BASIC_CONNECTED | BROWSING_CONNECTED) != 0 {
            return Err(reader.invalid("flags", u64::from(flags)).into());
        }
        let cid = reader.get_u16()?;
        let mut browsing_cid = reader.get_u16()?;
        let absolute_volume = reader.get_u8()?;
        reader.finish()?;

        if flags & BROWSING_CONNECTED == 0 {
            browsing_cid = 0;
        } else if browsing_cid == 0 {
            return Err(AdapterError::InvalidChannel(browsing_cid));
        }

        if role != self.state.role {
            return Err(AdapterError::Rejected(format!(
                "peer plays {role:?}, local device plays {:?}",
                self.state.role
            )));
        }
        self.binder.bind(cid, NAME)?;
        if browsing_cid != 0 {
            self.binder.bind(browsing_cid, NAME)?;
        }
        debug!(%addr, cid, browsing_cid, "stage control connection");
        self.staged.push(ControlConnection {
            addr,
            cid,
            browsing_cid,
            pending_command: false,
            fragmented_response: false,
            absolute_volume,
        });
        Ok(())
    }

    fn commit(&mut self, role: Role) {
        match role {
            Role::Primary => {
                for connection in std::mem::take(&mut self.staged) {
                    self.state
                        .connections
                        .retain(|live| live.addr != connection.addr);
                    self.state.connections.push(connection);
                }
            }
            Role::Secondary => {
                let (released, kept): (Vec<_>, Vec<_>) =
                    std::mem::take(&mut self.state.connections)
                        .into_iter()
                        .partition(|connection| self.handed_over.contains(&connection.addr));
                self.state.connections = kept;
                for connection in &released {
                    self.release(connection);
                }
                self.staged.clear();
            }
        }
        self.handed_over.clear();
        self.attempt.end();
    }

    fn abort(&mut self) {
        for connection in std::mem::take(&mut self.staged) {
            self.release(&connection);
        }
        self.handed_over.clear();
        self.attempt.end();
    }
}
