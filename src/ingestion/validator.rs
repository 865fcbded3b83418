//! Structural validation of descriptors against JSON Schema.
//!
//! The normalizer only needs a pass/fail answer plus a message, so the
//! validator sits behind [`SchemaValidator`] and can be swapped in tests.

use crate::error::{AppError, Result};
use crate::ingestion::types::SchemaVariant;
use jsonschema::{Draft, JSONSchema};
use serde_json::Value;
use std::path::Path;

const BUNDLED_BASIC_SCHEMA: &str = include_str!("../../schema/atdf_basic.schema.json");
const BUNDLED_ENHANCED_SCHEMA: &str = include_str!("../../schema/atdf_enhanced.schema.json");

/// File names looked up when schemas are loaded from a directory.
pub const BASIC_SCHEMA_FILE: &str = "atdf_schema.json";
pub const ENHANCED_SCHEMA_FILE: &str = "enhanced_atdf_schema.json";

pub trait SchemaValidator: Send + Sync {
    /// Returns the validator's message on failure.
    fn validate(&self, descriptor: &Value, variant: SchemaVariant) -> std::result::Result<(), String>;
}

/// Accepts every descriptor.
pub struct NoopValidator;

impl SchemaValidator for NoopValidator {
    fn validate(&self, _descriptor: &Value, _variant: SchemaVariant) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// Draft-07 validator holding one compiled schema per variant.
///
/// A missing enhanced schema falls back to the basic one; with neither
/// present validation is skipped.
pub struct JsonSchemaValidator {
    basic: Option<JSONSchema>,
    enhanced: Option<JSONSchema>,
}

impl JsonSchemaValidator {
    /// Validator over the schemas compiled into the binary.
    pub fn bundled() -> Result<Self> {
        let basic: Value = serde_json::from_str(BUNDLED_BASIC_SCHEMA)?;
        let enhanced: Value = serde_json::from_str(BUNDLED_ENHANCED_SCHEMA)?;
        Ok(Self {
            basic: Some(compile(&basic)?),
            enhanced: Some(compile(&enhanced)?),
        })
    }

    /// Load `atdf_schema.json` and `enhanced_atdf_schema.json` from `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let validator = Self {
            basic: load_schema(&dir.join(BASIC_SCHEMA_FILE))?,
            enhanced: load_schema(&dir.join(ENHANCED_SCHEMA_FILE))?,
        };
        tracing::info!(
            dir = %dir.display(),
            basic = validator.basic.is_some(),
            enhanced = validator.enhanced.is_some(),
            "Descriptor schemas loaded"
        );
        Ok(validator)
    }

    fn schema_for(&self, variant: SchemaVariant) -> Option<&JSONSchema> {
        match variant {
            SchemaVariant::Enhanced => self.enhanced.as_ref().or(self.basic.as_ref()),
            SchemaVariant::Basic => self.basic.as_ref(),
        }
    }
}

impl SchemaValidator for JsonSchemaValidator {
    fn validate(&self, descriptor: &Value, variant: SchemaVariant) -> std::result::Result<(), String> {
        let Some(schema) = self.schema_for(variant) else {
            tracing::debug!(?variant, "No schema available for validation; skipping");
            return Ok(());
        };

        if let Err(mut errors) = schema.validate(descriptor) {
            let message = errors
                .next()
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() {
                        e.to_string()
                    } else {
                        format!("{} (at {})", e, path)
                    }
                })
                .unwrap_or_else(|| "descriptor does not match schema".to_string());
            return Err(message);
        }
        Ok(())
    }
}

fn compile(schema: &Value) -> Result<JSONSchema> {
    JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(schema)
        .map_err(|e| AppError::Validation(format!("invalid schema document: {}", e)))
}

fn load_schema(path: &Path) -> Result<Option<JSONSchema>> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "Schema not found");
        return Ok(None);
    }
    let text = std::fs::read_to_string(path)?;
    let schema: Value = serde_json::from_str(&text)?;
    compile(&schema).map(Some)
}
