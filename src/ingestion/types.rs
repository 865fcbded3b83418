//! Type definitions for the ingestion module.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Schema family a descriptor was validated against.
///
/// Resolved once during normalization; downstream code matches on the tag
/// instead of probing descriptor keys again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaVariant {
    Basic,
    Enhanced,
}

/// A normalized, validated tool descriptor.
///
/// `raw_descriptor` keeps the descriptor object as received so it can be handed back
/// to agents unchanged; the remaining fields are the searchable summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRecord {
    /// Tool identity within its source
    pub tool_id: String,

    pub description: String,

    pub when_to_use: Option<String>,

    /// Declared schema version, "1.0.0" when absent
    pub schema_version: String,

    pub variant: SchemaVariant,

    /// Sorted locale codes, `["default"]` when the descriptor is not localized
    pub languages: Vec<String>,

    pub tags: Vec<String>,

    /// Origin identifier: `file://` directory URI, label, or remote URL
    pub source: String,

    #[serde(skip_serializing, default)]
    pub raw_descriptor: Value,
}

impl ToolRecord {
    /// Key used for the in-memory catalog map.
    pub fn key(&self) -> (String, String) {
        (self.source.clone(), self.tool_id.clone())
    }

    /// Key used by the feedback summary: `<source>::<tool_id>`.
    pub fn feedback_key(&self) -> String {
        feedback_key(&self.source, &self.tool_id)
    }
}

pub fn feedback_key(source: &str, tool_id: &str) -> String {
    format!("{}::{}", source, tool_id)
}

/// Result of a successful remote catalog fetch.
#[derive(Debug, Clone)]
pub struct RemoteFetch {
    pub payload: Value,
    /// `ETag` response header, when the endpoint sends one
    pub etag: Option<String>,
}
