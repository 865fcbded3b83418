//! Ingestion module: reading raw tool descriptors and normalizing them.
//!
//! Descriptors come from descriptor files on disk or remote MCP-style
//! catalog endpoints and end up as [`ToolRecord`]s.

pub mod normalizer;
pub mod reader;
pub mod types;
pub mod validator;

pub use normalizer::{convert_mcp_tool, Normalizer};
pub use types::{feedback_key, RemoteFetch, SchemaVariant, ToolRecord};
pub use validator::{JsonSchemaValidator, NoopValidator, SchemaValidator};
