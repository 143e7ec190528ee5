//! Shared helpers for command handlers.

use std::path::Path;

use chrono::{DateTime, Local, Utc};
use serde_json::Value;

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

/// Read and parse a JSON file for `--from-file` flags.
pub fn read_json_file(path: &Path) -> Result<serde_json::Value, CliError> {
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|e| CliError::Validation {
        field: "from-file".into(),
        reason: format!("invalid JSON: {e}"),
    })
}

/// Split `light.turn_on` into (`light`, `turn_on`).
pub fn parse_service(raw: &str) -> Result<(&str, &str), CliError> {
    match raw.split_once('.') {
        Some((domain, service)) if !domain.is_empty() && !service.is_empty() => {
            Ok((domain, service))
        }
        _ => Err(CliError::Validation {
            field: "service".into(),
            reason: format!("expected domain.service, got '{raw}'"),
        }),
    }
}

/// Local wall-clock rendering for table views.
pub fn format_timestamp(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

/// Print a command reply for structured formats, a short note otherwise.
pub fn report_reply(reply: &Value, message: &str, global: &GlobalOpts) -> Result<(), CliError> {
    match global.output {
        OutputFormat::Table | OutputFormat::Plain => {
            if !global.quiet {
                eprintln!("{message}");
            }
        }
        _ => {
            let out =
                output::render_single(&global.output, reply, Value::to_string, Value::to_string)?;
            output::print_output(&out, global.quiet);
        }
    }
    Ok(())
}

/// Map a dialoguer / interactive I/O failure into CliError.
pub fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn service_splits_on_first_dot() {
        assert_eq!(parse_service("light.turn_on").unwrap(), ("light", "turn_on"));
        assert_eq!(
            parse_service("script.wake.up").unwrap(),
            ("script", "wake.up")
        );
    }

    #[test]
    fn service_without_domain_is_rejected() {
        assert!(parse_service("turn_on").is_err());
        assert!(parse_service(".turn_on").is_err());
        assert!(parse_service("light.").is_err());
    }

    #[test]
    fn missing_timestamp_renders_empty() {
        assert_eq!(format_timestamp(None), "");
    }
}
