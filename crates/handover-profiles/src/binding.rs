use std::collections::BTreeMap;
use std::fmt;

use handover_coordinator::{AdapterError, BdAddr};

/// Seam between the adapters and the local transport: associates channel ids
/// that moved with the handover with the subsystem that now services them.
pub trait ChannelBinder: fmt::Debug {
    /// Route traffic on `cid` to `owner`. Rebinding to the same owner is a no-op.
    fn bind(&mut self, cid: u16, owner: &'static str) -> Result<(), AdapterError>;

    /// Drop the binding for `cid`, if any.
    fn release(&mut self, cid: u16);

    /// Current owner of `cid`.
    fn owner(&self, cid: u16) -> Option<&'static str>;

    /// Connection id of the RFCOMM link to `addr` on `server_channel`.
    fn resolve_rfcomm(&self, addr: &BdAddr, server_channel: u8) -> Option<u16>;
}

/// In-memory [`ChannelBinder`].
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    bindings: BTreeMap<u16, &'static str>,
    rfcomm: BTreeMap<(BdAddr, u8), u16>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make an RFCOMM connection resolvable by address and server channel.
    pub fn add_rfcomm(&mut self, addr: BdAddr, server_channel: u8, conn_id: u16) {
        self.rfcomm.insert((addr, server_channel), conn_id);
    }

    /// Bound channel ids in ascending order.
    pub fn bound(&self) -> impl Iterator<Item = (u16, &'static str)> + '_ {
        self.bindings.iter().map(|(cid, owner)| (*cid, *owner))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl ChannelBinder for BindingTable {
    fn bind(&mut self, cid: u16, owner: &'static str) -> Result<(), AdapterError> {
        if cid == 0 {
            return Err(AdapterError::InvalidChannel(cid));
        }
        match self.bindings.get(&cid) {
            Some(existing) if *existing != owner => Err(AdapterError::Rejected(format!(
                "channel {cid:#06x} already bound to {existing}"
            ))),
            _ => {
                self.bindings.insert(cid, owner);
                Ok(())
            }
        }
    }

    fn release(&mut self, cid: u16) {
        self.bindings.remove(&cid);
    }

    fn owner(&self, cid: u16) -> Option<&'static str> {
        self.bindings.get(&cid).copied()
    }

    fn resolve_rfcomm(&self, addr: &BdAddr, server_channel: u8) -> Option<u16> {
        self.rfcomm.get(&(*addr, server_channel)).copied()
    }
}
