//! Persisted store layout.
//!
//! A dump is a single JSON document holding both tables:
//!
//! ```json
//! { "schema_version": 2, "results": [ ... ], "events": [ ... ] }
//! ```
//!
//! Version 1 predates the `is_screened` event column; see
//! [`crate::migration`].

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::record::{EventRecord, ResultRecord};

/// Schema version written by this build.
pub const SCHEMA_VERSION: u32 = 2;

/// Schema version assumed for dumps without a `schema_version` field.
pub const LEGACY_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreDump {
    pub schema_version: u32,
    pub results: Vec<ResultRecord>,
    pub events: Vec<EventRecord>,
}

impl StoreDump {
    pub fn empty() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            results: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, StorageError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| StorageError::Backend(format!("failed to serialize dump: {e}")))
    }
}

/// Read the schema version of a raw dump document.
pub fn schema_version_of(doc: &serde_json::Value) -> u32 {
    doc.get("schema_version")
        .and_then(|v| v.as_u64())
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(LEGACY_SCHEMA_VERSION)
}

/// Parse a dump, checking the schema version before the table contents so
/// an unmigrated file reports `UnsupportedSchema` rather than a missing
/// field.
pub fn parse_dump(text: &str) -> Result<StoreDump, StorageError> {
    let doc: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| StorageError::Backend(format!("malformed dump: {e}")))?;
    let found = schema_version_of(&doc);
    if found != SCHEMA_VERSION {
        return Err(StorageError::UnsupportedSchema {
            found,
            expected: SCHEMA_VERSION,
        });
    }
    serde_json::from_value(doc).map_err(|e| StorageError::Backend(format!("malformed dump: {e}")))
}
