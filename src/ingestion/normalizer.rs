//! Descriptor normalization.
//!
//! Turns a raw descriptor (basic or enhanced schema, or a foreign MCP tool
//! entry) into a [`ToolRecord`]. Validation failures and missing identity
//! fields surface as `AppError::Validation`; callers decide whether to skip
//! or abort.

use crate::error::{AppError, Result};
use crate::ingestion::types::{SchemaVariant, ToolRecord};
use crate::ingestion::validator::SchemaValidator;
use serde_json::{json, Map, Value};
use std::sync::Arc;

pub const DEFAULT_SCHEMA_VERSION: &str = "1.0.0";

/// Top-level keys that only exist in the enhanced schema.
const ENHANCED_KEYS: [&str; 5] = [
    "metadata",
    "localization",
    "examples",
    "prerequisites",
    "feedback",
];

/// Identity fields, in priority order.
const IDENTITY_KEYS: [&str; 3] = ["tool_id", "id", "name"];

pub struct Normalizer {
    validator: Arc<dyn SchemaValidator>,
}

impl Normalizer {
    pub fn new(validator: Arc<dyn SchemaValidator>) -> Self {
        Self { validator }
    }

    /// Validate `descriptor` and build its canonical record.
    pub fn normalize(&self, descriptor: Value, source: &str) -> Result<ToolRecord> {
        let descriptor = if is_mcp_shaped(&descriptor) {
            convert_mcp_tool(&descriptor)
        } else {
            descriptor
        };

        let fields = descriptor.as_object().ok_or_else(|| {
            AppError::Validation("descriptor must be a JSON object".to_string())
        })?;

        let schema_version = schema_version_of(fields);
        let variant = resolve_variant(fields, &schema_version);

        self.validator
            .validate(&descriptor, variant)
            .map_err(AppError::Validation)?;

        let tool_id = extract_tool_id(fields)
            .ok_or_else(|| AppError::Validation("missing identity field".to_string()))?;

        let description = extract_localized(fields, "description").unwrap_or_default();
        let when_to_use = extract_localized(fields, "when_to_use");
        let languages = extract_languages(fields);
        let tags = extract_tags(fields);

        Ok(ToolRecord {
            tool_id,
            description,
            when_to_use,
            schema_version,
            variant,
            languages,
            tags,
            source: source.to_string(),
            raw_descriptor: descriptor,
        })
    }
}

/// Declared `schema_version` (trimmed, numbers stringified) or the default.
pub fn schema_version_of(fields: &Map<String, Value>) -> String {
    fields
        .get("schema_version")
        .and_then(scalar_to_string)
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_SCHEMA_VERSION.to_string())
}

/// Enhanced when the version is 2.x or any enhanced-only key is present.
pub fn resolve_variant(fields: &Map<String, Value>, schema_version: &str) -> SchemaVariant {
    if schema_version.starts_with('2') || ENHANCED_KEYS.iter().any(|k| fields.contains_key(*k)) {
        SchemaVariant::Enhanced
    } else {
        SchemaVariant::Basic
    }
}

/// An MCP tool entry: `name` + `inputSchema` and no native identity field.
pub fn is_mcp_shaped(value: &Value) -> bool {
    value.get("inputSchema").is_some()
        && value.get("name").is_some()
        && value.get("tool_id").is_none()
}

/// Rewrite an MCP tool entry into a minimal basic-schema descriptor.
///
/// `inputSchema` is kept under `input_schema` when it is an object.
pub fn convert_mcp_tool(tool: &Value) -> Value {
    let description = tool
        .get("description")
        .and_then(|v| v.as_str())
        .unwrap_or("");

    let mut descriptor = json!({
        "tool_id": tool.get("name").cloned().unwrap_or(Value::Null),
        "description": description,
        "schema_version": DEFAULT_SCHEMA_VERSION,
        "how_to_use": {
            "inputs": [],
            "outputs": {
                "success": "",
                "failure": []
            }
        }
    });

    if let Some(input_schema) = tool.get("inputSchema").filter(|s| s.is_object()) {
        descriptor["input_schema"] = input_schema.clone();
    }
    descriptor
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn extract_tool_id(fields: &Map<String, Value>) -> Option<String> {
    IDENTITY_KEYS
        .iter()
        .find_map(|key| non_empty_str(fields.get(*key)))
}

/// Top-level `field`, else the first non-empty `localization.<lang>.field`.
///
/// A bare string localization entry counts as a description.
fn extract_localized(fields: &Map<String, Value>, field: &str) -> Option<String> {
    if let Some(value) = non_empty_str(fields.get(field)) {
        return Some(value);
    }

    let localization = fields.get("localization")?.as_object()?;
    localization.values().find_map(|entry| match entry {
        Value::Object(map) => non_empty_str(map.get(field)),
        Value::String(_) if field == "description" => non_empty_str(Some(entry)),
        _ => None,
    })
}

fn extract_languages(fields: &Map<String, Value>) -> Vec<String> {
    let mut languages: Vec<String> = fields
        .get("localization")
        .and_then(|l| l.as_object())
        .map(|l| l.keys().cloned().collect())
        .unwrap_or_default();

    if languages.is_empty() {
        return vec!["default".to_string()];
    }
    languages.sort();
    languages
}

fn extract_tags(fields: &Map<String, Value>) -> Vec<String> {
    fields
        .get("metadata")
        .and_then(|m| m.get("tags"))
        .and_then(|t| t.as_array())
        .map(|tags| {
            tags.iter()
                .filter_map(|tag| match tag {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}
