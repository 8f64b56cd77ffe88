use serde::{Deserialize, Serialize};
use tracing::debug;

use handover_coordinator::{AdapterError, BdAddr, HandoverAdapter, Role};
use handover_marshal::{ConnectionSnapshot, TypeTag};

use crate::wire::{get_addr, get_enum, wire_enum, Attempt, ACL_LINK};

pub const NAME: &str = "link_manager";

wire_enum! {
    /// Local role on the ACL link.
    pub enum LinkRole {
        Central = 0,
        Peripheral = 1,
    }
}

wire_enum! {
    /// Baseband power mode.
    pub enum LinkMode {
        Active = 0,
        Sniff = 1,
    }
}

wire_enum! {
    pub enum LinkState {
        Connecting = 0,
        Connected = 1,
        Disconnecting = 2,
    }
}

/// One ACL link to a remote device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclLink {
    pub addr: BdAddr,
    pub handle: u16,
    pub role: LinkRole,
    pub mode: LinkMode,
    pub encrypted: bool,
    pub state: LinkState,
}

/// Connection library state visible to handover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkManagerState {
    pub initialised: bool,
    /// Held while the library runs a multi-step operation.
    pub locked: bool,
    /// Scan-enable writes sent to the controller and not yet confirmed.
    pub scan_enable_writes: u8,
    pub queued_messages: usize,
    pub links: Vec<AclLink>,
}

impl Default for LinkManagerState {
    fn default() -> Self {
        Self {
            initialised: true,
            locked: false,
            scan_enable_writes: 0,
            queued_messages: 0,
            links: Vec::new(),
        }
    }
}

/// Handover adapter for the connection library's ACL links.
#[derive(Debug, Default)]
pub struct LinkManager {
    state: LinkManagerState,
    staged: Vec<AclLink>,
    handed_over: Vec<BdAddr>,
    attempt: Attempt,
}

impl LinkManager {
    pub fn new(state: LinkManagerState) -> Self {
        Self {
            state,
            ..Self::default()
        }
    }

    pub fn state(&self) -> &LinkManagerState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut LinkManagerState {
        &mut self.state
    }

    /// Links rebuilt from received records, not yet committed.
    pub fn staged(&self) -> &[AclLink] {
        &self.staged
    }

    pub fn in_handover(&self) -> bool {
        self.attempt.is_active()
    }
}

impl HandoverAdapter for LinkManager {
    fn name(&self) -> &'static str {
        NAME
    }

    fn veto(&self) -> bool {
        let state = &self.state;
        !state.initialised
            || state.locked
            || state.scan_enable_writes != 0
            || state.queued_messages != 0
            || state
                .links
                .iter()
                .any(|link| link.state != LinkState::Connected)
    }

    fn marshal(
        &mut self,
        handset: &BdAddr,
        tag: TypeTag,
    ) -> Result<Option<ConnectionSnapshot>, AdapterError> {
        if tag != ACL_LINK {
            return Ok(None);
        }
        let position = self.attempt.advance(tag);
        let Some(link) = self
            .state
            .links
            .iter()
            .filter(|link| link.addr == *handset)
            .nth(position)
        else {
            return Ok(None);
        };

        self.handed_over.push(link.addr);
        let snapshot = ConnectionSnapshot::builder(ACL_LINK)
            .put_addr(link.addr.bytes())
            .put_u16(link.handle)
            .put_u8(link.role.to_wire())
            .put_u8(link.mode.to_wire())
            .put_bool(link.encrypted)
            .put_u8(link.state.to_wire())
            .finish()?;
        Ok(Some(snapshot))
    }

    fn unmarshal(
        &mut self,
        _handset: &BdAddr,
        snapshot: ConnectionSnapshot,
    ) -> Result<(), AdapterError> {
        self.attempt.begin();
        let mut reader = snapshot.reader();
        let link = AclLink {
            addr: get_addr(&mut reader)?,
            handle: reader.get_u16()?,
            role: get_enum(&mut reader, "role", LinkRole::from_wire)?,
            mode: get_enum(&mut reader, "mode", LinkMode::from_wire)?,
            encrypted: reader.get_bool("encrypted")?,
            state: get_enum(&mut reader, "state", LinkState::from_wire)?,
        };
        reader.finish()?;

        if link.handle == 0 {
            return Err(AdapterError::InvalidChannel(link.handle));
        }
        debug!(addr = %link.addr, handle = link.handle, "stage acl link");
        self.staged.push(link);
        Ok(())
    }

    fn commit(&mut self, role: Role) {
        match role {
            Role::Primary => {
                for link in self.staged.drain(..) {
                    self.state.links.retain(|live| live.addr != link.addr);
                    self.state.links.push(link);
                }
            }
            Role::Secondary => {
                let handed_over = &self.handed_over;
                self.state
                    .links
                    .retain(|link| !handed_over.contains(&link.addr));
                self.staged.clear();
            }
        }
        self.handed_over.clear();
        self.attempt.end();
    }

    fn abort(&mut self) {
        self.staged.clear();
        self.handed_over.clear();
        self.attempt.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HANDSET: BdAddr = BdAddr::new([0x00, 0x1a, 0x7d, 0xda, 0x71, 0x13]);
    const PEER: BdAddr = BdAddr::new([0x00, 0x02, 0x5b, 0x00, 0x00, 0x01]);

    fn link(addr: BdAddr, handle: u16) -> AclLink {
        AclLink {
            addr,
            handle,
            role: LinkRole::Peripheral,
            mode: LinkMode::Sniff,
            encrypted: true,
            state: LinkState::Connected,
        }
    }

    fn primary() -> LinkManager {
        LinkManager::new(LinkManagerState {
            links: vec![link(HANDSET, 0x0081), link(PEER, 0x0082)],
            ..LinkManagerState::default()
        })
    }

    #[test]
    fn veto_conditions() {
        let mut manager = primary();
        assert!(!manager.veto());

        manager.state_mut().locked = true;
        assert!(manager.veto());
        manager.state_mut().locked = false;

        manager.state_mut().scan_enable_writes = 1;
        assert!(manager.veto());
        manager.state_mut().scan_enable_writes = 0;

        manager.state_mut().links[1].state = LinkState::Connecting;
        assert!(manager.veto());
        manager.state_mut().links[1].state = LinkState::Connected;

        manager.state_mut().initialised = false;
        assert!(manager.veto());
    }

    #[test]
    fn marshals_only_the_handset_link() {
        let mut manager = primary();
        let record = manager.marshal(&HANDSET, ACL_LINK).unwrap().unwrap();
        assert!(manager.marshal(&HANDSET, ACL_LINK).unwrap().is_none());

        let mut secondary = LinkManager::default();
        secondary.unmarshal(&HANDSET, record).unwrap();
        assert_eq!(secondary.staged(), &[link(HANDSET, 0x0081)]);
        assert!(secondary.state().links.is_empty());

        secondary.commit(Role::Primary);
        assert_eq!(secondary.state().links, vec![link(HANDSET, 0x0081)]);
        assert!(!secondary.in_handover());

        manager.commit(Role::Secondary);
        assert_eq!(manager.state().links, vec![link(PEER, 0x0082)]);
    }

    #[test]
    fn rejects_bad_records() {
        let mut manager = LinkManager::default();
        let zero_handle = ConnectionSnapshot::builder(ACL_LINK)
            .put_addr(HANDSET.bytes())
            .put_u16(0)
            .put_u8(0)
            .put_u8(0)
            .put_bool(false)
            .put_u8(1)
            .finish()
            .unwrap();
        assert!(matches!(
            manager.unmarshal(&HANDSET, zero_handle),
            Err(AdapterError::InvalidChannel(0))
        ));

        let bad_mode = ConnectionSnapshot::builder(ACL_LINK)
            .put_addr(HANDSET.bytes())
            .put_u16(1)
            .put_u8(0)
            .put_u8(5)
            .put_bool(false)
            .put_u8(1)
            .finish()
            .unwrap();
        assert!(matches!(
            manager.unmarshal(&HANDSET, bad_mode),
            Err(AdapterError::Snapshot(_))
        ));
    }

    #[test]
    fn abort_discards_staged_links() {
        let mut sender = primary();
        let record = sender.marshal(&HANDSET, ACL_LINK).unwrap().unwrap();

        let mut receiver = LinkManager::default();
        receiver.unmarshal(&HANDSET, record).unwrap();
        receiver.abort();
        receiver.abort();
        assert!(receiver.staged().is_empty());
        assert!(receiver.state().links.is_empty());

        sender.abort();
        assert_eq!(sender.state().links.len(), 2);
        // The walk restarts on the next attempt.
        assert!(sender.marshal(&HANDSET, ACL_LINK).unwrap().is_some());
    }
}
