//! Schema loading errors

use thiserror::Error;

/// Failures while loading or indexing a device capability document.
///
/// All of these surface at catalog construction, before any connection
/// attempt is made with the schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read schema document '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed schema document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate {kind} name '{name}' in schema document")]
    DuplicateName { kind: &'static str, name: String },

    #[error("duplicate {kind} id {id} in schema document")]
    DuplicateId { kind: &'static str, id: u32 },

    #[error("table '{table}' references unknown action id {action_id}")]
    UnknownActionRef { table: String, action_id: u32 },
}
