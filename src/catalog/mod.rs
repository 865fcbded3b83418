//! Tool catalog: the in-memory index over normalized records.
//!
//! The catalog drives sync passes over directory and remote sources and
//! mirrors them into [`CatalogStorage`] when one is attached. Per-descriptor
//! failures never abort a pass; they are appended to [`ToolCatalog::errors`]
//! and the pass continues.

use crate::error::{AppError, Result};
use crate::ingestion::normalizer::{convert_mcp_tool, Normalizer};
use crate::ingestion::reader;
use crate::ingestion::types::{RemoteFetch, ToolRecord};
use crate::ingestion::validator::SchemaValidator;
use crate::persistence::{
    CatalogStorage, FeedbackOutcome, FeedbackSummary, ServerMetadata, ServerRow,
};
use chrono::Utc;
use serde_json::Value;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub struct ToolCatalog {
    normalizer: Normalizer,
    storage: Option<Arc<CatalogStorage>>,
    tools: BTreeMap<(String, String), ToolRecord>,
    errors: Vec<String>,
}

impl ToolCatalog {
    /// Catalog without persistence.
    pub fn new(validator: Arc<dyn SchemaValidator>) -> Self {
        Self {
            normalizer: Normalizer::new(validator),
            storage: None,
            tools: BTreeMap::new(),
            errors: Vec::new(),
        }
    }

    /// Catalog backed by `storage`, pre-populated with its active tools.
    pub fn with_storage(
        validator: Arc<dyn SchemaValidator>,
        storage: Arc<CatalogStorage>,
    ) -> Result<Self> {
        let mut catalog = Self::new(validator);
        for record in storage.fetch_records(None, None)? {
            catalog.tools.insert(record.key(), record);
        }
        tracing::info!(tools = catalog.tools.len(), "Catalog bootstrapped from storage");
        catalog.storage = Some(storage);
        Ok(catalog)
    }

    pub fn storage(&self) -> Option<&Arc<CatalogStorage>> {
        self.storage.as_ref()
    }

    /// Records currently held in memory, keyed by `(source, tool_id)`.
    pub fn tools(&self) -> &BTreeMap<(String, String), ToolRecord> {
        &self.tools
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Drop in-memory records and the error log, returning the dropped
    /// records so a failed reload can put them back. Storage is untouched.
    pub fn clear(&mut self) -> BTreeMap<(String, String), ToolRecord> {
        self.errors.clear();
        std::mem::take(&mut self.tools)
    }

    /// Reinstate records returned by [`ToolCatalog::clear`].
    pub fn restore(&mut self, tools: BTreeMap<(String, String), ToolRecord>) {
        self.tools = tools;
    }

    /// Normalize and register one descriptor.
    ///
    /// Returns `None` (and logs to `errors`) when the descriptor is invalid or
    /// cannot be persisted.
    pub fn add_tool(
        &mut self,
        descriptor: Value,
        source: &str,
        server_id: Option<i64>,
    ) -> Option<&ToolRecord> {
        let record = match self.normalizer.normalize(descriptor, source) {
            Ok(record) => record,
            Err(e) => {
                self.log_error(format!("Skipping tool from {}: {}", source, e));
                return None;
            }
        };

        if let (Some(storage), Some(server_id)) = (&self.storage, server_id) {
            if let Err(e) = storage.upsert_tool(server_id, &record) {
                let message = format!("Failed to persist tool '{}': {}", record.tool_id, e);
                self.log_error(message);
                return None;
            }
        }

        match self.tools.entry(record.key()) {
            Entry::Occupied(mut entry) => {
                tracing::debug!(source, tool_id = %record.tool_id, "Replacing existing descriptor");
                entry.insert(record);
                Some(entry.into_mut())
            }
            Entry::Vacant(entry) => Some(entry.insert(record)),
        }
    }

    /// Sync every descriptor file under `path`.
    ///
    /// The source identifier is `label`, or `file://<absolute path>`. Returns
    /// the number of tools ingested; unreadable or invalid files are skipped.
    pub fn load_directory(
        &mut self,
        path: &Path,
        recursive: bool,
        label: Option<&str>,
    ) -> Result<usize> {
        if !path.is_dir() {
            return Err(AppError::NotFound(format!(
                "directory not found: {}",
                path.display()
            )));
        }

        let absolute = std::fs::canonicalize(path)?;
        let source = match label {
            Some(label) => label.to_string(),
            None => format!("file://{}", absolute.display()),
        };
        let name = absolute
            .file_name()
            .map(|n| n.to_string_lossy().to_string());

        let storage = self.storage.clone();
        let server_id = match &storage {
            Some(storage) => Some(storage.register_server(&source, name.as_deref())?),
            None => None,
        };
        let sync_lock = storage
            .as_ref()
            .zip(server_id)
            .map(|(storage, id)| storage.sync_lock(id));
        let _guard = sync_lock.as_ref().map(|lock| lock.lock());

        let files = reader::discover_descriptor_files(&absolute, recursive);
        let mut active_ids = Vec::with_capacity(files.len());

        for file in &files {
            let descriptor = match reader::read_descriptor(file) {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    self.log_error(format!("Failed to read descriptor: {}", e));
                    continue;
                }
            };
            if let Some(record) = self.add_tool(descriptor, &source, server_id) {
                active_ids.push(record.tool_id.clone());
            }
        }

        if let (Some(storage), Some(server_id)) = (&storage, server_id) {
            let metadata = ServerMetadata {
                last_sync: Some(Utc::now()),
                ..Default::default()
            };
            self.finish_sync(storage, server_id, &source, &active_ids, &metadata);
        }

        metrics::counter!("catalog_sync_total", "kind" => "directory").increment(1);
        tracing::info!(
            source = %source,
            files = files.len(),
            ingested = active_ids.len(),
            "Directory sync complete"
        );
        Ok(active_ids.len())
    }

    /// Sync a remote MCP-style `/tools` endpoint using a blocking request.
    ///
    /// Must not be called from inside an async runtime; use
    /// [`ToolCatalog::load_from_mcp_async`] there.
    pub fn load_from_mcp(
        &mut self,
        url: &str,
        server_name: Option<&str>,
        timeout: Duration,
    ) -> usize {
        let fetched = reader::fetch_remote_blocking(url, timeout);
        self.ingest_remote(url, server_name, fetched)
    }

    pub async fn load_from_mcp_async(
        &mut self,
        url: &str,
        server_name: Option<&str>,
        timeout: Duration,
    ) -> usize {
        let fetched = reader::fetch_remote(url, timeout).await;
        self.ingest_remote(url, server_name, fetched)
    }

    /// Ingest the outcome of a remote fetch.
    ///
    /// Any fetch or envelope failure is logged once and returns 0 without
    /// touching storage, so previously synced tools stay active.
    pub fn ingest_remote(
        &mut self,
        url: &str,
        server_name: Option<&str>,
        fetched: Result<RemoteFetch>,
    ) -> usize {
        let fetch = match fetched {
            Ok(fetch) => fetch,
            Err(e) => {
                self.log_error(format!("Failed to load tools from MCP endpoint {}: {}", url, e));
                return 0;
            }
        };

        let Some(tools) = fetch.payload.get("tools").and_then(|t| t.as_array()) else {
            self.log_error(format!(
                "Failed to load tools from MCP endpoint {}: response has no 'tools' array",
                url
            ));
            return 0;
        };

        if tools.is_empty() {
            tracing::info!(url, "No tools returned by MCP endpoint");
            return 0;
        }

        let storage = self.storage.clone();
        let server_id = match &storage {
            Some(storage) => match storage.register_server(url, server_name) {
                Ok(id) => Some(id),
                Err(e) => {
                    self.log_error(format!("Failed to register server {}: {}", url, e));
                    return 0;
                }
            },
            None => None,
        };
        let sync_lock = storage
            .as_ref()
            .zip(server_id)
            .map(|(storage, id)| storage.sync_lock(id));
        let _guard = sync_lock.as_ref().map(|lock| lock.lock());

        let mut active_ids = Vec::with_capacity(tools.len());
        for (index, tool) in tools.iter().enumerate() {
            if !tool.is_object() {
                self.log_error(format!("Skipping non-object tool entry #{} from {}", index, url));
                continue;
            }
            let descriptor = if tool.get("tool_id").is_some() {
                tool.clone()
            } else {
                convert_mcp_tool(tool)
            };
            if let Some(record) = self.add_tool(descriptor, url, server_id) {
                active_ids.push(record.tool_id.clone());
            }
        }

        if let (Some(storage), Some(server_id)) = (&storage, server_id) {
            let metadata = ServerMetadata {
                cache_timestamp: fetch
                    .payload
                    .get("cache_timestamp")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
                etag: fetch.etag.clone(),
                last_sync: Some(Utc::now()),
            };
            self.finish_sync(storage, server_id, url, &active_ids, &metadata);
        }

        metrics::counter!("catalog_sync_total", "kind" => "remote").increment(1);
        tracing::info!(url, received = tools.len(), ingested = active_ids.len(), "Remote sync complete");
        active_ids.len()
    }

    /// Soft-delete tools the pass did not observe and stamp server metadata.
    ///
    /// A pass that ingested nothing never deactivates anything.
    fn finish_sync(
        &mut self,
        storage: &CatalogStorage,
        server_id: i64,
        source: &str,
        active_ids: &[String],
        metadata: &ServerMetadata,
    ) {
        if active_ids.is_empty() {
            tracing::warn!(source, "Sync ingested no tools; keeping existing entries active");
        } else {
            match storage.mark_inactive(server_id, active_ids) {
                Ok(_) => self.drop_unobserved(source, active_ids),
                Err(e) => {
                    self.log_error(format!("Failed to deactivate stale tools for {}: {}", source, e));
                }
            }
        }

        if let Err(e) = storage.update_server_metadata(server_id, metadata) {
            self.log_error(format!("Failed to update server metadata for {}: {}", source, e));
        }
    }

    /// Forget in-memory records of `source` that the last pass did not observe.
    fn drop_unobserved(&mut self, source: &str, active_ids: &[String]) {
        let observed: HashSet<&str> = active_ids.iter().map(String::as_str).collect();
        self.tools
            .retain(|(src, tool_id), _| src != source || observed.contains(tool_id.as_str()));
    }

    /// Registered tools, optionally filtered by source and tool id.
    ///
    /// With storage attached the persisted active set is authoritative and
    /// refreshes the in-memory map (an unfiltered listing replaces it);
    /// otherwise the map is filtered directly (sources compared
    /// case-insensitively) in `(source, tool_id)` order.
    pub fn list_tools(
        &mut self,
        sources: Option<&[String]>,
        tool_ids: Option<&[String]>,
    ) -> Result<Vec<ToolRecord>> {
        if let Some(storage) = &self.storage {
            let records = storage.fetch_records(sources, tool_ids)?;
            let unfiltered = sources.map_or(true, <[String]>::is_empty)
                && tool_ids.map_or(true, <[String]>::is_empty);
            if unfiltered {
                self.tools = records.iter().map(|r| (r.key(), r.clone())).collect();
            } else {
                for record in &records {
                    self.tools.insert(record.key(), record.clone());
                }
            }
            return Ok(records);
        }

        let sources: Option<HashSet<String>> = sources
            .filter(|s| !s.is_empty())
            .map(|s| s.iter().map(|v| v.to_lowercase()).collect());
        let tool_ids: Option<HashSet<&str>> = tool_ids
            .filter(|t| !t.is_empty())
            .map(|t| t.iter().map(String::as_str).collect());

        Ok(self
            .tools
            .values()
            .filter(|r| {
                sources
                    .as_ref()
                    .map_or(true, |s| s.contains(&r.source.to_lowercase()))
            })
            .filter(|r| {
                tool_ids
                    .as_ref()
                    .map_or(true, |t| t.contains(r.tool_id.as_str()))
            })
            .cloned()
            .collect())
    }

    pub fn record_feedback(
        &self,
        server_url: &str,
        tool_id: &str,
        outcome: FeedbackOutcome,
        detail: Option<&str>,
    ) -> Result<()> {
        self.require_storage("feedback requires persistent storage")?
            .record_feedback(server_url, tool_id, outcome, detail)
    }

    pub fn feedback_summary(&self) -> Result<FeedbackSummary> {
        self.require_storage("feedback requires persistent storage")?
            .feedback_summary()
    }

    pub fn list_servers(&self) -> Result<Vec<ServerRow>> {
        self.require_storage("server listing requires persistent storage")?
            .list_servers()
    }

    fn require_storage(&self, what: &str) -> Result<&CatalogStorage> {
        self.storage
            .as_deref()
            .ok_or_else(|| AppError::StorageNotReady(what.to_string()))
    }

    fn log_error(&mut self, message: String) {
        tracing::warn!("{}", message);
        metrics::counter!("catalog_sync_errors_total").increment(1);
        self.errors.push(message);
    }
}
