use std::fmt;

use serde::Serialize;

use handover_marshal::{Marshaller, Unmarshaller};

use crate::device::{BdAddr, Role};

/// Coordinator state machine phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Veto,
    Marshalling,
    Unmarshalling,
    Committing,
    Aborting,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Veto => "veto",
            Phase::Marshalling => "marshalling",
            Phase::Unmarshalling => "unmarshalling",
            Phase::Committing => "committing",
            Phase::Aborting => "aborting",
        };
        f.write_str(name)
    }
}

/// Which side of the stream this device is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// Position of the marshalling walk: adapter index, then index into that
/// adapter's record types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Cursor {
    pub adapter: usize,
    pub tag: usize,
}

impl Cursor {
    pub(crate) fn next_tag(&mut self) {
        self.tag += 1;
    }

    pub(crate) fn next_adapter(&mut self) {
        self.adapter += 1;
        self.tag = 0;
    }
}

#[derive(Debug)]
pub(crate) enum Engine {
    Idle,
    Marshal(Marshaller),
    Unmarshal(Unmarshaller),
}

/// State of the one open handover attempt.
#[derive(Debug)]
pub struct HandoverSession {
    pub(crate) direction: Direction,
    pub(crate) target_role: Role,
    pub(crate) handset: BdAddr,
    pub(crate) cursor: Cursor,
    pub(crate) engine: Engine,
    pub(crate) touched: Vec<bool>,
    pub(crate) complete: bool,
    pub(crate) records: usize,
    pub(crate) bytes: usize,
}

impl HandoverSession {
    pub(crate) fn new(
        direction: Direction,
        target_role: Role,
        handset: BdAddr,
        adapters: usize,
    ) -> Self {
        Self {
            direction,
            target_role,
            handset,
            cursor: Cursor::default(),
            engine: Engine::Idle,
            touched: vec![false; adapters],
            complete: false,
            records: 0,
            bytes: 0,
        }
    }

    pub(crate) fn touch(&mut self, adapter: usize) {
        if let Some(flag) = self.touched.get_mut(adapter) {
            *flag = true;
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The role this device takes if the attempt commits.
    pub fn target_role(&self) -> Role {
        self.target_role
    }

    /// The handset whose connections are being handed over.
    pub fn handset(&self) -> &BdAddr {
        &self.handset
    }

    /// Marshalling position. Stays at the default on the receiving side.
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// True once every record and the end-of-stream marker have been written
    /// (sending side) or the end of the stream was seen (receiving side).
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Records marshalled or dispatched so far.
    pub fn records(&self) -> usize {
        self.records
    }

    /// Stream bytes produced or consumed so far.
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Indices of adapters that had marshal or unmarshal called.
    pub fn touched(&self) -> impl Iterator<Item = usize> + '_ {
        self.touched
            .iter()
            .enumerate()
            .filter_map(|(index, touched)| touched.then_some(index))
    }

    /// Bytes held by the encoder waiting for buffer space.
    pub fn pending_bytes(&self) -> usize {
        match &self.engine {
            Engine::Marshal(marshaller) => marshaller.pending_bytes(),
            _ => 0,
        }
    }
}
