use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use handover_coordinator::{AdapterError, BdAddr, HandoverAdapter, Role};
use handover_marshal::{ConnectionSnapshot, TypeTag};

pub const NAME: &str = "handset_service";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandsetState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandsetServiceState {
    pub state: HandsetState,
    pub handset: Option<BdAddr>,
    /// Most recently used handset from the device list.
    pub mru: Option<BdAddr>,
}

/// Handset connection service. Carries no records of its own: after
/// handover it rebuilds its view from the device list.
#[derive(Debug, Default)]
pub struct HandsetService {
    state: HandsetServiceState,
}

impl HandsetService {
    pub fn new(state: HandsetServiceState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &HandsetServiceState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut HandsetServiceState {
        &mut self.state
    }
}

impl HandoverAdapter for HandsetService {
    fn name(&self) -> &'static str {
        NAME
    }

    fn veto(&self) -> bool {
        self.state.state != HandsetState::Connected
    }

    fn marshal(
        &mut self,
        _handset: &BdAddr,
        _tag: TypeTag,
    ) -> Result<Option<ConnectionSnapshot>, AdapterError> {
        Ok(None)
    }

    fn unmarshal(
        &mut self,
        _handset: &BdAddr,
        snapshot: ConnectionSnapshot,
    ) -> Result<(), AdapterError> {
        Err(AdapterError::UnknownObject(format!(
            "handset service owns no record type, got {}",
            snapshot.tag()
        )))
    }

    fn commit(&mut self, role: Role) {
        match role {
            Role::Primary => match self.state.mru {
                Some(mru) => {
                    debug!(handset = %mru, "handset service connected after handover");
                    self.state.handset = Some(mru);
                    self.state.state = HandsetState::Connected;
                }
                None => {
                    error!("no most-recently-used handset after handover");
                    self.state.handset = None;
                    self.state.state = HandsetState::Disconnected;
                }
            },
            Role::Secondary => {
                self.state.handset = None;
                self.state.state = HandsetState::Disconnected;
            }
        }
    }

    fn abort(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    const HANDSET: BdAddr = BdAddr::new([0x00, 0x1a, 0x7d, 0xda, 0x71, 0x13]);

    #[test]
    fn vetoes_unless_connected() {
        let mut service = HandsetService::default();
        assert!(service.veto());
        service.state_mut().state = HandsetState::Connected;
        assert!(!service.veto());
        service.state_mut().state = HandsetState::Disconnecting;
        assert!(service.veto());
    }

    #[test]
    fn commit_takes_over_the_mru_handset() {
        let mut service = HandsetService::new(HandsetServiceState {
            mru: Some(HANDSET),
            ..HandsetServiceState::default()
        });
        assert!(service.marshal(&HANDSET, TypeTag::new(1)).unwrap().is_none());

        service.commit(Role::Primary);
        assert_eq!(service.state().state, HandsetState::Connected);
        assert_eq!(service.state().handset, Some(HANDSET));

        service.commit(Role::Secondary);
        assert_eq!(service.state().state, HandsetState::Disconnected);
        assert_eq!(service.state().handset, None);
    }

    #[test]
    fn commit_without_mru_stays_disconnected() {
        let mut service = HandsetService::default();
        service.commit(Role::Primary);
        assert_eq!(service.state().state, HandsetState::Disconnected);
    }
}
