use std::io::Cursor;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use handover::coordinator::{
    BdAddr, Coordinator, FailureReason, HandoverError, HandoverEvent, HandoverSession, Role,
};
use handover::link::{
    receive_handover, send_handover, LinkConfig, LinkReader, LinkWriter, Transfer, HEADER_SIZE,
};
use handover::profiles::{DeviceState, HandsetState, Subsystem};

use crate::cmd::{SimulateArgs, VetoTarget};
use crate::exit::{
    handover_error, io_error, link_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE,
    VETOED,
};
use crate::output::{print_fields, print_json, OutputFormat};

const BUILTIN_SCENARIO: &str = include_str!("../../scenarios/streaming.json");

/// Record tag no subsystem registers.
const CORRUPT_TAG: u8 = 0x7f;

/// Both earbuds before the attempt.
#[derive(Debug, Deserialize)]
struct Scenario {
    handset: BdAddr,
    #[serde(default)]
    primary: DeviceState,
    #[serde(default)]
    secondary: DeviceState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum Outcome {
    Committed,
    Vetoed,
    Failed,
}

#[derive(Debug, Serialize)]
struct Report {
    outcome: Outcome,
    handset: BdAddr,
    chunk_size: usize,
    chunks: usize,
    bytes: usize,
    records_sent: usize,
    records_received: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    vetoed_by: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    /// Role each earbud holds once the attempt is over.
    primary_role: Role,
    secondary_role: Role,
    primary_events: Vec<HandoverEvent>,
    secondary_events: Vec<HandoverEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    final_state: Option<FinalState>,
    #[serde(skip)]
    code: i32,
}

#[derive(Debug, Serialize)]
struct FinalState {
    primary: DeviceState,
    secondary: DeviceState,
}

pub fn run(args: SimulateArgs, format: OutputFormat) -> CliResult<i32> {
    if args.chunk_size == 0 {
        return Err(CliError::new(USAGE, "--chunk-size must be at least 1"));
    }

    let mut scenario = load_scenario(&args)?;
    if let Some(target) = args.veto {
        force_veto(&mut scenario.primary, target);
    }

    let mut primary = Coordinator::new(scenario.primary.into_registrations())
        .map_err(|err| handover_error("primary", err))?;
    let mut secondary = Coordinator::new(scenario.secondary.into_registrations())
        .map_err(|err| handover_error("secondary", err))?;

    let report = simulate(
        &mut primary,
        &mut secondary,
        scenario.handset,
        args.chunk_size,
        args.corrupt,
        args.show_state,
    );
    print_report(&report, format);
    Ok(report.code)
}

fn load_scenario(args: &SimulateArgs) -> CliResult<Scenario> {
    let (text, source) = match &args.scenario {
        Some(path) => (
            std::fs::read_to_string(path)
                .map_err(|err| io_error(&format!("read {}", path.display()), err))?,
            path.display().to_string(),
        ),
        None => (BUILTIN_SCENARIO.to_string(), "built-in".to_string()),
    };
    serde_json::from_str(&text)
        .map_err(|err| CliError::new(DATA_INVALID, format!("scenario {source}: {err}")))
}

fn force_veto(state: &mut DeviceState, target: VetoTarget) {
    match target {
        VetoTarget::LinkManager => state.link_manager.locked = true,
        VetoTarget::StreamTransport => state.stream_transport.queued_messages += 1,
        VetoTarget::RemoteControl => state.remote_control.queued_messages += 1,
        VetoTarget::VoiceCall => state.voice_call.at_response_pending = true,
        VetoTarget::HandsetService => state.handset_service.state = HandsetState::Connecting,
    }
}

fn simulate(
    primary: &mut Coordinator<Subsystem>,
    secondary: &mut Coordinator<Subsystem>,
    handset: BdAddr,
    chunk_size: usize,
    corrupt: bool,
    show_state: bool,
) -> Report {
    let mut report = Report {
        outcome: Outcome::Committed,
        handset,
        chunk_size,
        chunks: 0,
        bytes: 0,
        records_sent: 0,
        records_received: 0,
        vetoed_by: Vec::new(),
        error: None,
        primary_role: Role::Primary,
        secondary_role: Role::Secondary,
        primary_events: Vec::new(),
        secondary_events: Vec::new(),
        final_state: None,
        code: SUCCESS,
    };

    match transfer(primary, secondary, handset, chunk_size, corrupt, &mut report) {
        Ok(()) => {
            info!(%handset, "handover committed");
            report.primary_role = Role::Secondary;
            report.secondary_role = Role::Primary;
        }
        Err(err) => {
            warn!(error = %err, "handover did not complete");
            report.outcome = if err.code == VETOED {
                Outcome::Vetoed
            } else {
                Outcome::Failed
            };
            report.code = err.code;
            report.error = Some(err.message);
        }
    }

    report.primary_events = primary.drain_events();
    report.secondary_events = secondary.drain_events();
    if show_state {
        report.final_state = Some(FinalState {
            primary: DeviceState::capture(primary.registry()),
            secondary: DeviceState::capture(secondary.registry()),
        });
    }
    report
}

fn transfer(
    primary: &mut Coordinator<Subsystem>,
    secondary: &mut Coordinator<Subsystem>,
    handset: BdAddr,
    chunk_size: usize,
    corrupt: bool,
    report: &mut Report,
) -> CliResult<()> {
    if let Err(err) = primary.request_handover(Role::Secondary, handset) {
        if let HandoverError::Vetoed { subsystems } = &err {
            report.vetoed_by = subsystems.clone();
        }
        return Err(handover_error("request", err));
    }

    let config = LinkConfig {
        max_chunk: chunk_size,
        ..LinkConfig::default()
    };

    let mut writer = LinkWriter::with_config(Vec::new(), config.clone());
    let sent = send_handover(primary, &mut writer).map_err(|err| link_error("send", err))?;
    record(report, sent, primary.session());

    let mut wire = writer.into_inner();
    if corrupt && wire.len() > HEADER_SIZE {
        wire[HEADER_SIZE] = CORRUPT_TAG;
    }

    let mut reader = LinkReader::with_config(Cursor::new(wire), config);
    if let Err(err) = receive_handover(secondary, &mut reader, &handset) {
        primary.abort(FailureReason::PeerAborted);
        return Err(link_error("receive", err));
    }
    report.records_received = secondary.session().map_or(0, HandoverSession::records);

    secondary
        .commit(Role::Primary)
        .map_err(|err| handover_error("commit", err))?;
    primary
        .commit(Role::Secondary)
        .map_err(|err| handover_error("commit", err))?;
    Ok(())
}

fn record(report: &mut Report, sent: Transfer, session: Option<&HandoverSession>) {
    report.chunks = sent.chunks;
    report.bytes = sent.bytes;
    report.records_sent = session.map_or(0, HandoverSession::records);
}

fn print_report(report: &Report, format: OutputFormat) {
    if let OutputFormat::Json = format {
        print_json(report);
        return;
    }

    let mut fields = vec![
        ("outcome", outcome_name(report.outcome).to_string()),
        ("handset", report.handset.to_string()),
        ("chunk size", report.chunk_size.to_string()),
        ("chunks", report.chunks.to_string()),
        ("bytes", report.bytes.to_string()),
        ("records sent", report.records_sent.to_string()),
        ("records received", report.records_received.to_string()),
        ("primary now", report.primary_role.to_string()),
        ("secondary now", report.secondary_role.to_string()),
    ];
    if !report.vetoed_by.is_empty() {
        fields.push(("vetoed by", report.vetoed_by.join(",")));
    }
    if let Some(error) = &report.error {
        fields.push(("error", error.clone()));
    }
    print_fields(fields, format);
}

fn outcome_name(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Committed => "committed",
        Outcome::Vetoed => "vetoed",
        Outcome::Failed => "failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtin() -> Scenario {
        serde_json::from_str(BUILTIN_SCENARIO).unwrap()
    }

    fn run_builtin(chunk_size: usize, corrupt: bool, veto: Option<VetoTarget>) -> Report {
        let mut scenario = builtin();
        if let Some(target) = veto {
            force_veto(&mut scenario.primary, target);
        }
        let mut primary = Coordinator::new(scenario.primary.into_registrations()).unwrap();
        let mut secondary = Coordinator::new(scenario.secondary.into_registrations()).unwrap();
        simulate(
            &mut primary,
            &mut secondary,
            scenario.handset,
            chunk_size,
            corrupt,
            true,
        )
    }

    #[test]
    fn builtin_scenario_commits() {
        let report = run_builtin(48, false, None);
        assert_eq!(report.outcome, Outcome::Committed, "{:?}", report.error);
        assert_eq!(report.code, SUCCESS);
        // ACL link, stream device, media channel, data blocks, control
        // connection, voice task, voice link.
        assert_eq!(report.records_sent, 7);
        assert_eq!(report.records_received, 7);
        assert!(report.chunks > 1);

        let state = report.final_state.unwrap();
        assert_eq!(state.secondary.link_manager.links.len(), 2);
        assert_eq!(state.secondary.voice_call.links[0].conn_id, 513);
        assert_eq!(
            state.secondary.handset_service.state,
            HandsetState::Connected
        );
        assert_eq!(state.primary.link_manager.links.len(), 1);
    }

    #[test]
    fn every_subsystem_can_veto() {
        for target in [
            VetoTarget::LinkManager,
            VetoTarget::StreamTransport,
            VetoTarget::RemoteControl,
            VetoTarget::VoiceCall,
            VetoTarget::HandsetService,
        ] {
            let report = run_builtin(64, false, Some(target));
            assert_eq!(report.outcome, Outcome::Vetoed);
            assert_eq!(report.code, VETOED);
            assert_eq!(report.vetoed_by.len(), 1);
            assert_eq!(report.chunks, 0);
        }
    }

    #[test]
    fn corrupt_stream_aborts_both_sides() {
        let report = run_builtin(64, true, None);
        assert_eq!(report.outcome, Outcome::Failed);
        assert_eq!(report.code, DATA_INVALID);
        assert_eq!(
            report.primary_events,
            vec![HandoverEvent::Failed {
                reason: FailureReason::PeerAborted
            }]
        );
        assert_eq!(
            report.secondary_events,
            vec![HandoverEvent::Failed {
                reason: FailureReason::CorruptStream
            }]
        );
        assert_eq!(report.primary_role, Role::Primary);
    }

    #[test]
    fn chunk_smaller_than_a_field_fails() {
        let report = run_builtin(4, false, None);
        assert_eq!(report.outcome, Outcome::Failed);
        assert!(report.error.unwrap().contains("send"));
        assert_eq!(report.records_received, 0);
        assert!(report.secondary_events.is_empty());
    }
}
