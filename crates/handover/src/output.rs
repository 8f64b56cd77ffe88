use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_table(header: &[&str], rows: Vec<Vec<String>>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.to_vec());
    for row in rows {
        table.add_row(row);
    }
    println!("{table}");
}

/// Print a flat list of named values: an object in json, a FIELD/VALUE table,
/// or one `name=value` line.
pub fn print_fields(fields: Vec<(&str, String)>, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let object: Map<String, Value> = fields
                .into_iter()
                .map(|(name, value)| (field_key(name), Value::String(value)))
                .collect();
            print_json(&object);
        }
        OutputFormat::Table => print_table(
            &["FIELD", "VALUE"],
            fields
                .into_iter()
                .map(|(name, value)| vec![name.to_string(), value])
                .collect(),
        ),
        OutputFormat::Pretty => {
            let line: Vec<String> = fields
                .iter()
                .map(|(name, value)| format!("{}={value}", field_key(name)))
                .collect();
            println!("{}", line.join(" "));
        }
    }
}

fn field_key(name: &str) -> String {
    name.replace(' ', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_names_become_keys() {
        assert_eq!(field_key("records sent"), "records_sent");
        assert_eq!(field_key("outcome"), "outcome");
    }
}
