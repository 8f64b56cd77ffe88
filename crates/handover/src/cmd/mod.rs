use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod simulate;
pub mod types;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a full handover between two simulated earbuds.
    Simulate(SimulateArgs),
    /// Print the record-type registration table.
    Types(TypesArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Simulate(args) => simulate::run(args, format),
        Command::Types(args) => types::run(args, format),
        Command::Version(args) => version::run(args, format),
    }
}

/// Subsystem to put into a state that vetoes handover.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum VetoTarget {
    LinkManager,
    StreamTransport,
    RemoteControl,
    VoiceCall,
    HandsetService,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Largest chunk carried per link frame, in bytes.
    #[arg(long, default_value_t = handover::link::DEFAULT_MAX_CHUNK)]
    pub chunk_size: usize,
    /// Scenario file (JSON) describing both earbuds. Default: built-in
    /// streaming scenario.
    #[arg(long, value_name = "FILE")]
    pub scenario: Option<PathBuf>,
    /// Make one subsystem on the primary veto the attempt.
    #[arg(long, value_name = "SUBSYSTEM")]
    pub veto: Option<VetoTarget>,
    /// Replace the first record type on the wire with an unknown one.
    #[arg(long)]
    pub corrupt: bool,
    /// Include both earbuds' final state in the report.
    #[arg(long)]
    pub show_state: bool,
}

#[derive(Args, Debug, Default)]
pub struct TypesArgs {}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
