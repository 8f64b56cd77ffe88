use std::mem;

use bytes::Bytes;
use tracing::{debug, info, warn};

use handover_marshal::{Decoded, MarshalError, Marshaller, OutBuf, Unmarshaller};

use crate::adapter::HandoverAdapter;
use crate::config::CoordinatorConfig;
use crate::device::{BdAddr, Role};
use crate::error::{AdapterError, HandoverError, Result};
use crate::event::{FailureReason, HandoverEvent};
use crate::registry::{AdapterRegistration, AdapterRegistry};
use crate::session::{Direction, Engine, HandoverSession, Phase};

/// Result of one [`Coordinator::produce_bytes`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Produced {
    /// Bytes written into the caller's buffer.
    pub written: usize,
    /// True once the whole stream, end marker included, has been produced.
    pub done: bool,
}

/// Result of one [`Coordinator::consume_bytes`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Consumed {
    /// Bytes covered by whole records. The rest must be supplied again.
    pub consumed: usize,
    /// True once the end-of-stream marker has been received.
    pub done: bool,
}

/// Drives one device's side of the handover protocol.
///
/// At most one attempt is open at a time. The sending device calls
/// [`request_handover`](Self::request_handover) then
/// [`produce_bytes`](Self::produce_bytes) until `done`; the receiving device
/// calls [`consume_bytes`](Self::consume_bytes) until `done`. Both finish with
/// [`commit`](Self::commit) or [`abort`](Self::abort).
#[derive(Debug)]
pub struct Coordinator<A> {
    registry: AdapterRegistry<A>,
    config: CoordinatorConfig,
    phase: Phase,
    session: Option<HandoverSession>,
    events: Vec<HandoverEvent>,
}

impl<A: HandoverAdapter> Coordinator<A> {
    /// Create a coordinator with default configuration.
    pub fn new(registrations: Vec<AdapterRegistration<A>>) -> Result<Self> {
        Self::with_config(registrations, CoordinatorConfig::default())
    }

    /// Create a coordinator with explicit configuration.
    pub fn with_config(
        registrations: Vec<AdapterRegistration<A>>,
        config: CoordinatorConfig,
    ) -> Result<Self> {
        let registry = AdapterRegistry::with_config(registrations, config.marshal)?;
        Ok(Self {
            registry,
            config,
            phase: Phase::Idle,
            session: None,
            events: Vec::new(),
        })
    }

    /// Start an outgoing attempt: poll every adapter's veto and, if none
    /// objects, open a session ready for [`produce_bytes`](Self::produce_bytes).
    ///
    /// `target_role` is the role this device takes once the attempt commits.
    /// Rejected without side effects while another attempt is open.
    pub fn request_handover(&mut self, target_role: Role, handset: BdAddr) -> Result<()> {
        if self.phase != Phase::Idle || self.session.is_some() {
            warn!(phase = %self.phase, "handover requested while an attempt is open");
            return Err(HandoverError::ContractViolation {
                operation: "request_handover",
                phase: self.phase,
            });
        }

        self.set_phase(Phase::Veto);
        let subsystems = self.vetoes();
        if !subsystems.is_empty() {
            warn!(?subsystems, %handset, "handover vetoed");
            self.set_phase(Phase::Idle);
            self.events.push(HandoverEvent::Failed {
                reason: FailureReason::Vetoed,
            });
            return Err(HandoverError::Vetoed { subsystems });
        }

        self.session = Some(HandoverSession::new(
            Direction::Outgoing,
            target_role,
            handset,
            self.registry.len(),
        ));
        self.set_phase(Phase::Marshalling);
        info!(%handset, %target_role, "handover started");
        Ok(())
    }

    /// Names of the subsystems currently vetoing.
    ///
    /// Stops at the first veto unless `poll_all_vetoes` is set.
    pub fn vetoes(&self) -> Vec<&'static str> {
        let mut subsystems = Vec::new();
        for adapter in self.registry.adapters() {
            if adapter.veto() {
                debug!(subsystem = adapter.name(), "veto");
                subsystems.push(adapter.name());
                if !self.config.poll_all_vetoes {
                    break;
                }
            }
        }
        subsystems
    }

    /// Marshal the next part of the stream into `buf`.
    ///
    /// Returns with `done == false` whenever the buffer fills; call again with
    /// a fresh buffer to resume exactly where this call stopped. Once `done`,
    /// the encoder is released and the attempt waits for commit or abort.
    pub fn produce_bytes(&mut self, buf: &mut [u8]) -> Result<Produced> {
        match self.marshal_step(buf) {
            Ok(produced) => Ok(produced),
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Decode and dispatch every complete record at the front of `src`.
    ///
    /// Opens an incoming attempt for `handset` on first use. Bytes past
    /// `consumed` belong to an incomplete record and must be passed again,
    /// followed by more data.
    pub fn consume_bytes(&mut self, handset: &BdAddr, src: &[u8]) -> Result<Consumed> {
        if self.phase == Phase::Idle && self.session.is_none() {
            self.session = Some(HandoverSession::new(
                Direction::Incoming,
                Role::Primary,
                *handset,
                self.registry.len(),
            ));
            self.set_phase(Phase::Unmarshalling);
            info!(%handset, "incoming handover started");
        }

        match self.unmarshal_step(handset, src) {
            Ok(consumed) => Ok(consumed),
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Treat transport-level EOF as the end of the incoming stream.
    pub fn end_of_stream(&mut self) -> Result<()> {
        if self.phase == Phase::Unmarshalling {
            if let Some(session) = self.session.as_mut() {
                if !session.complete {
                    info!(records = session.records, "transport closed, stream complete");
                    session.complete = true;
                }
                return Ok(());
            }
        }
        let err = HandoverError::ContractViolation {
            operation: "end_of_stream",
            phase: self.phase,
        };
        Err(self.fail(err))
    }

    /// Commit every adapter, in registration order, under `role`.
    ///
    /// Only valid once the stream is complete on this side.
    pub fn commit(&mut self, role: Role) -> Result<()> {
        let ready = matches!(self.phase, Phase::Marshalling | Phase::Unmarshalling)
            && self.session.as_ref().is_some_and(|session| session.complete);
        if !ready {
            let err = HandoverError::ContractViolation {
                operation: "commit",
                phase: self.phase,
            };
            return Err(self.fail(err));
        }

        self.set_phase(Phase::Committing);
        for adapter in self.registry.adapters_mut() {
            debug!(subsystem = adapter.name(), %role, "commit");
            adapter.commit(role);
        }
        let records = self.session.take().map_or(0, |session| session.records);
        self.set_phase(Phase::Idle);
        self.events.push(HandoverEvent::Succeeded { role });
        info!(%role, records, "handover committed");
        Ok(())
    }

    /// Abort the open attempt, if any.
    ///
    /// Only adapters that took part in this attempt are aborted. Calling this
    /// with no open attempt does nothing.
    pub fn abort(&mut self, reason: FailureReason) {
        let Some(session) = self.session.take() else {
            return;
        };

        self.set_phase(Phase::Aborting);
        warn!(%reason, direction = ?session.direction, records = session.records, "aborting handover");
        for index in session.touched() {
            if let Some(adapter) = self.registry.adapter_mut(index) {
                debug!(subsystem = adapter.name(), "abort");
                adapter.abort();
            }
        }
        self.set_phase(Phase::Idle);
        self.events.push(HandoverEvent::Failed { reason });
    }

    /// Lazily produce the outgoing stream in chunks of at most `capacity` bytes.
    ///
    /// Dropping the iterator early leaves the attempt open; a later call
    /// resumes at the saved cursor.
    pub fn chunks(&mut self, capacity: usize) -> Chunks<'_, A> {
        Chunks {
            coordinator: self,
            capacity,
            finished: false,
        }
    }

    /// Take the terminal events emitted since the last call.
    pub fn drain_events(&mut self) -> Vec<HandoverEvent> {
        mem::take(&mut self.events)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The open attempt, if any.
    pub fn session(&self) -> Option<&HandoverSession> {
        self.session.as_ref()
    }

    pub fn registry(&self) -> &AdapterRegistry<A> {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut AdapterRegistry<A> {
        &mut self.registry
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    fn marshal_step(&mut self, buf: &mut [u8]) -> Result<Produced> {
        let phase = self.phase;
        let Self {
            registry, session, ..
        } = self;
        let session = match session.as_mut() {
            Some(session) if phase == Phase::Marshalling => session,
            _ => {
                return Err(HandoverError::ContractViolation {
                    operation: "produce_bytes",
                    phase,
                })
            }
        };
        if session.complete {
            return Ok(Produced {
                written: 0,
                done: true,
            });
        }

        let mut marshaller = match mem::replace(&mut session.engine, Engine::Idle) {
            Engine::Marshal(marshaller) => marshaller,
            Engine::Idle => {
                debug!("encoder started");
                Marshaller::new(registry.table().clone())
            }
            Engine::Unmarshal(_) => {
                return Err(HandoverError::ContractViolation {
                    operation: "produce_bytes",
                    phase,
                })
            }
        };

        let mut out = OutBuf::new(buf);
        let done = fill(registry, session, &mut marshaller, &mut out)?;
        let written = out.written();
        session.bytes += written;

        if done {
            session.complete = true;
            info!(
                records = session.records,
                bytes = session.bytes,
                "marshalling complete"
            );
        } else {
            debug!(
                written,
                pending = marshaller.pending_bytes(),
                adapter = session.cursor.adapter,
                tag = session.cursor.tag,
                "buffer full"
            );
            session.engine = Engine::Marshal(marshaller);
        }
        Ok(Produced { written, done })
    }

    fn unmarshal_step(&mut self, handset: &BdAddr, src: &[u8]) -> Result<Consumed> {
        let phase = self.phase;
        let Self {
            registry, session, ..
        } = self;
        let session = match session.as_mut() {
            Some(session) if phase == Phase::Unmarshalling && session.handset == *handset => {
                session
            }
            _ => {
                return Err(HandoverError::ContractViolation {
                    operation: "consume_bytes",
                    phase,
                })
            }
        };

        let mut unmarshaller = match mem::replace(&mut session.engine, Engine::Idle) {
            Engine::Unmarshal(unmarshaller) => unmarshaller,
            Engine::Idle => {
                debug!("decoder started");
                Unmarshaller::new(registry.table().clone())
            }
            Engine::Marshal(_) => {
                return Err(HandoverError::ContractViolation {
                    operation: "consume_bytes",
                    phase,
                })
            }
        };

        let mut consumed = 0usize;
        while let Some((decoded, size)) = unmarshaller.decode(&src[consumed..])? {
            consumed += size;
            let snapshot = match decoded {
                Decoded::Record(snapshot) => snapshot,
                Decoded::EndOfStream => {
                    info!(records = session.records, "end of stream received");
                    session.complete = true;
                    continue;
                }
            };

            let tag = snapshot.tag();
            let owner = registry
                .owner(tag)
                .ok_or(HandoverError::CorruptStream(MarshalError::UnknownType(tag)))?;
            let Some(adapter) = registry.adapter_mut(owner) else {
                return Err(HandoverError::CorruptStream(MarshalError::UnknownType(tag)));
            };
            session.touch(owner);

            let subsystem = adapter.name();
            debug!(subsystem, tag = %tag, size, "unmarshal record");
            adapter
                .unmarshal(&session.handset, snapshot)
                .map_err(|source| unmarshal_error(subsystem, source))?;
            session.records += 1;
        }

        session.bytes += consumed;
        session.engine = Engine::Unmarshal(unmarshaller);
        Ok(Consumed {
            consumed,
            done: session.complete,
        })
    }

    fn fail(&mut self, err: HandoverError) -> HandoverError {
        if self.session.is_some() {
            warn!(error = %err, "handover attempt failed");
        }
        self.abort(err.failure_reason());
        err
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            info!(from = %self.phase, to = %phase, "phase");
            self.phase = phase;
        }
    }
}

/// Walk adapters and their record types from the saved cursor, feeding
/// records to the encoder until the buffer fills or the stream ends.
fn fill<A: HandoverAdapter>(
    registry: &mut AdapterRegistry<A>,
    session: &mut HandoverSession,
    marshaller: &mut Marshaller,
    out: &mut OutBuf<'_>,
) -> Result<bool> {
    if !marshaller.flush(out).map_err(HandoverError::Marshal)? {
        return Ok(false);
    }

    while session.cursor.adapter < registry.len() {
        let index = session.cursor.adapter;
        let Some(descriptor) = registry.types(index).get(session.cursor.tag).copied() else {
            session.cursor.next_adapter();
            continue;
        };
        let Some(adapter) = registry.adapter_mut(index) else {
            break;
        };
        session.touch(index);

        let subsystem = adapter.name();
        let tag = descriptor.tag;
        let snapshot = adapter
            .marshal(&session.handset, tag)
            .map_err(|source| HandoverError::Adapter { subsystem, source })?;
        let Some(snapshot) = snapshot else {
            session.cursor.next_tag();
            continue;
        };
        if snapshot.tag() != tag {
            return Err(HandoverError::Adapter {
                subsystem,
                source: AdapterError::UnexpectedType {
                    expected: tag,
                    actual: snapshot.tag(),
                },
            });
        }

        session.records += 1;
        debug!(
            subsystem,
            tag = %tag,
            name = descriptor.name,
            size = snapshot.payload().len(),
            "marshal record"
        );
        if !marshaller
            .encode(&snapshot, out)
            .map_err(HandoverError::Marshal)?
        {
            return Ok(false);
        }
    }

    marshaller.finish(out).map_err(HandoverError::Marshal)
}

/// Lazy, restartable sequence of outgoing chunks.
///
/// Yields nothing for a zero capacity.
pub struct Chunks<'a, A> {
    coordinator: &'a mut Coordinator<A>,
    capacity: usize,
    finished: bool,
}

impl<A: HandoverAdapter> Iterator for Chunks<'_, A> {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.capacity == 0 {
            return None;
        }

        let mut buf = vec![0u8; self.capacity];
        match self.coordinator.produce_bytes(&mut buf) {
            Ok(Produced { written, done }) => {
                self.finished = done;
                if written == 0 && done {
                    return None;
                }
                buf.truncate(written);
                Some(Ok(Bytes::from(buf)))
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

/// A payload the owning adapter cannot decode came off a corrupt stream.
fn unmarshal_error(subsystem: &'static str, source: AdapterError) -> HandoverError {
    match source {
        AdapterError::Snapshot(err) if err.is_malformed_payload() => {
            debug!(subsystem, error = %err, "malformed record payload");
            HandoverError::CorruptStream(err)
        }
        source => HandoverError::Adapter { subsystem, source },
    }
}
