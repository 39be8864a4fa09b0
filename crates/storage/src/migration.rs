//! One-shot schema migration: add the `is_screened` event column.
//!
//! Operates on the raw JSON document, since an unmigrated dump does not
//! deserialize into the current record types. Every existing event gets
//! `is_screened: false` and the schema version moves from 1 to 2.
//!
//! The migration is not idempotent: applying it to an already-migrated
//! dump fails with [`MigrationError::DuplicateColumn`] instead of silently
//! succeeding.

use serde::Serialize;

use crate::dump::{schema_version_of, SCHEMA_VERSION};

pub const SCREENED_COLUMN: &str = "is_screened";

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("malformed dump: {0}")]
    MalformedDump(String),

    #[error("no such table: {0}")]
    MissingTable(&'static str),

    #[error("duplicate column name: {column} (table {table})")]
    DuplicateColumn {
        table: &'static str,
        column: &'static str,
    },
}

/// Summary of an applied migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub column: &'static str,
    pub events_migrated: usize,
    pub from_version: u32,
    pub to_version: u32,
}

/// Add `is_screened` (default `false`) to every event in the dump.
pub fn add_is_screened_column(
    doc: &mut serde_json::Value,
) -> Result<MigrationReport, MigrationError> {
    let from_version = schema_version_of(doc);
    let root = doc
        .as_object_mut()
        .ok_or_else(|| MigrationError::MalformedDump("top level is not an object".to_string()))?;

    let events = root
        .get_mut("events")
        .ok_or(MigrationError::MissingTable("events"))?
        .as_array_mut()
        .ok_or_else(|| MigrationError::MalformedDump("events is not an array".to_string()))?;

    let already_present = events
        .iter()
        .any(|e| e.get(SCREENED_COLUMN).is_some());
    if from_version >= SCHEMA_VERSION || already_present {
        return Err(MigrationError::DuplicateColumn {
            table: "events",
            column: SCREENED_COLUMN,
        });
    }

    for (i, event) in events.iter_mut().enumerate() {
        let obj = event
            .as_object_mut()
            .ok_or_else(|| MigrationError::MalformedDump(format!("event {i} is not an object")))?;
        obj.insert(SCREENED_COLUMN.to_string(), serde_json::Value::Bool(false));
    }
    let events_migrated = events.len();

    root.insert(
        "schema_version".to_string(),
        serde_json::Value::from(SCHEMA_VERSION),
    );

    Ok(MigrationReport {
        column: SCREENED_COLUMN,
        events_migrated,
        from_version,
        to_version: SCHEMA_VERSION,
    })
}
