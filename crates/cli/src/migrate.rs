//! `lure migrate`: bring a data file up to the current schema.

use std::path::Path;
use std::process;

use lure_storage::{add_is_screened_column, MigrationReport};

use crate::store::write_atomic;
use crate::{report_error, OutputFormat};

pub(crate) fn cmd_migrate(path: &Path, output: OutputFormat, quiet: bool) {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            report_error(
                &format!("error: could not read '{}': {}", path.display(), e),
                output,
                quiet,
            );
            process::exit(1);
        }
    };
    let mut doc: serde_json::Value = match serde_json::from_str(&text) {
        Ok(d) => d,
        Err(e) => {
            report_error(
                &format!("error: '{}' is not valid JSON: {}", path.display(), e),
                output,
                quiet,
            );
            process::exit(1);
        }
    };

    let report = match add_is_screened_column(&mut doc) {
        Ok(r) => r,
        Err(e) => {
            report_error(&format!("error: {}", e), output, quiet);
            process::exit(1);
        }
    };

    let written = serde_json::to_string_pretty(&doc)
        .map_err(|e| e.to_string())
        .and_then(|s| write_atomic(path, s.as_bytes()).map_err(|e| e.to_string()));
    if let Err(e) = written {
        report_error(&format!("error: {}", e), output, quiet);
        process::exit(1);
    }

    tracing::info!(
        file = %path.display(),
        events = report.events_migrated,
        "data file migrated"
    );
    print_report(path, &report, output, quiet);
}

fn print_report(path: &Path, report: &MigrationReport, output: OutputFormat, quiet: bool) {
    match output {
        OutputFormat::Json => {
            let mut value = serde_json::json!(report);
            value["file"] = serde_json::Value::from(path.display().to_string());
            println!("{}", value);
        }
        OutputFormat::Text => {
            if !quiet {
                println!(
                    "Migrated {}: added column '{}' to {} event(s), schema {} -> {}",
                    path.display(),
                    report.column,
                    report.events_migrated,
                    report.from_version,
                    report.to_version
                );
            }
        }
    }
}
