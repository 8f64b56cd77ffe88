use handover_marshal::{ConnectionSnapshot, TypeTag};

use crate::device::{BdAddr, Role};
use crate::error::AdapterError;

/// Contract every connection-owning subsystem implements to take part in a
/// handover.
///
/// All operations run on the coordinator's thread and must return quickly.
/// None of them may wait on I/O.
pub trait HandoverAdapter {
    /// Stable subsystem name, used in logs and veto reports.
    fn name(&self) -> &'static str;

    /// Returns true if handover must not proceed right now.
    ///
    /// Must not change adapter state.
    fn veto(&self) -> bool;

    /// Produce the next record of type `tag` for `handset`, or `None` once
    /// every live object of that type has been marshalled.
    ///
    /// Each call after a returned record advances to the next live object.
    fn marshal(
        &mut self,
        handset: &BdAddr,
        tag: TypeTag,
    ) -> Result<Option<ConnectionSnapshot>, AdapterError>;

    /// Rebuild the live object described by `snapshot` and bind it to local
    /// transport handles.
    fn unmarshal(
        &mut self,
        handset: &BdAddr,
        snapshot: ConnectionSnapshot,
    ) -> Result<(), AdapterError>;

    /// Finalize the attempt under `role`. Cannot fail.
    fn commit(&mut self, role: Role);

    /// Discard anything built during the attempt. Must be idempotent.
    fn abort(&mut self);
}

impl<T: HandoverAdapter + ?Sized> HandoverAdapter for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn veto(&self) -> bool {
        (**self).veto()
    }

    fn marshal(
        &mut self,
        handset: &BdAddr,
        tag: TypeTag,
    ) -> Result<Option<ConnectionSnapshot>, AdapterError> {
        (**self).marshal(handset, tag)
    }

    fn unmarshal(
        &mut self,
        handset: &BdAddr,
        snapshot: ConnectionSnapshot,
    ) -> Result<(), AdapterError> {
        (**self).unmarshal(handset, snapshot)
    }

    fn commit(&mut self, role: Role) {
        (**self).commit(role)
    }

    fn abort(&mut self) {
        (**self).abort()
    }
}
