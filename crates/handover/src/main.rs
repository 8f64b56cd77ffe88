mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "handover", version, about = "Earbud handover simulator")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        env = "HANDOVER_LOG_LEVEL",
        default_value = "warn",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::VetoTarget;

    #[test]
    fn parses_simulate_subcommand() {
        let cli = Cli::try_parse_from([
            "handover",
            "simulate",
            "--chunk-size",
            "32",
            "--veto",
            "voice-call",
        ])
        .expect("simulate args should parse");

        match cli.command {
            Command::Simulate(args) => {
                assert_eq!(args.chunk_size, 32);
                assert!(matches!(args.veto, Some(VetoTarget::VoiceCall)));
                assert!(!args.corrupt);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_veto_target() {
        let err = Cli::try_parse_from(["handover", "simulate", "--veto", "modem"])
            .expect_err("unknown subsystem should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }

    #[test]
    fn format_is_global() {
        let cli = Cli::try_parse_from(["handover", "types", "--format", "pretty"])
            .expect("types args should parse");
        assert!(matches!(cli.format, Some(OutputFormat::Pretty)));
        assert!(matches!(cli.command, Command::Types(_)));
    }
}
