use handover::profiles::default_registry;

use crate::cmd::TypesArgs;
use crate::exit::{handover_error, CliResult, SUCCESS};
use crate::output::{print_json, print_table, OutputFormat};

pub fn run(_args: TypesArgs, format: OutputFormat) -> CliResult<i32> {
    let registry = default_registry().map_err(|err| handover_error("registry", err))?;
    let entries = registry.describe();

    match format {
        OutputFormat::Json => print_json(&entries),
        OutputFormat::Table => print_table(
            &["TAG", "TYPE", "SUBSYSTEM", "MAX PAYLOAD"],
            entries
                .iter()
                .map(|entry| {
                    vec![
                        format!("{:#04x}", entry.tag),
                        entry.name.to_string(),
                        entry.subsystem.to_string(),
                        entry.max_payload.to_string(),
                    ]
                })
                .collect(),
        ),
        OutputFormat::Pretty => {
            for entry in &entries {
                println!(
                    "{:#04x} {} subsystem={} max_payload={}",
                    entry.tag, entry.name, entry.subsystem, entry.max_payload
                );
            }
        }
    }

    Ok(SUCCESS)
}
