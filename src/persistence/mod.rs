//! Durable catalog storage backed by SQLite.
//!
//! Servers (sources), tool descriptors and execution feedback live in three
//! tables. Tool rows are versioned with a SHA-256 hash of their canonical
//! JSON and are soft-deleted (`active = 0`) rather than removed when a sync
//! pass no longer observes them. Feedback is append-only.

use crate::error::{AppError, Result};
use crate::ingestion::normalizer::{resolve_variant, schema_version_of, DEFAULT_SCHEMA_VERSION};
use crate::ingestion::types::{feedback_key, SchemaVariant, ToolRecord};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS servers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT UNIQUE NOT NULL,
    name TEXT,
    cache_timestamp TEXT,
    etag TEXT,
    last_sync TEXT,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS tools (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    server_id INTEGER NOT NULL,
    tool_id TEXT NOT NULL,
    version_hash TEXT NOT NULL,
    descriptor TEXT NOT NULL,
    description TEXT,
    when_to_use TEXT,
    languages TEXT,
    tags TEXT,
    active INTEGER DEFAULT 1,
    updated_at TEXT DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY(server_id) REFERENCES servers(id) ON DELETE CASCADE,
    UNIQUE(server_id, tool_id)
);

CREATE TABLE IF NOT EXISTS feedback (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    server_id INTEGER NOT NULL,
    tool_id TEXT NOT NULL,
    outcome TEXT NOT NULL CHECK(outcome IN ('success','error')),
    detail TEXT,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY(server_id) REFERENCES servers(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_tools_server_active ON tools(server_id, active);
CREATE INDEX IF NOT EXISTS idx_feedback_server_tool ON feedback(server_id, tool_id);
"#;

/// Outcome of one tool execution reported back by an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackOutcome {
    Success,
    Error,
}

impl FeedbackOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackOutcome::Success => "success",
            FeedbackOutcome::Error => "error",
        }
    }
}

impl fmt::Display for FeedbackOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedbackOutcome {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "success" => Ok(FeedbackOutcome::Success),
            "error" => Ok(FeedbackOutcome::Error),
            other => Err(AppError::InvalidArgument(format!(
                "outcome must be 'success' or 'error', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackStats {
    pub success: u64,
    pub error: u64,
}

/// Aggregated feedback keyed by `<server_url>::<tool_id>`.
pub type FeedbackSummary = HashMap<String, FeedbackStats>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerRow {
    pub id: i64,
    pub url: String,
    pub name: Option<String>,
    pub cache_timestamp: Option<String>,
    pub etag: Option<String>,
    pub last_sync: Option<String>,
}

/// Fields refreshed after a sync pass; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct ServerMetadata {
    pub cache_timestamp: Option<String>,
    pub etag: Option<String>,
    pub last_sync: Option<DateTime<Utc>>,
}

/// Persisted version state of one tool row, active or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredToolState {
    pub version_hash: String,
    pub active: bool,
}

pub struct CatalogStorage {
    conn: Mutex<Connection>,
    sync_locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl CatalogStorage {
    /// Open (or create) the database at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        // WAL lets readers run while a sync pass writes.
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        conn.busy_timeout(Duration::from_secs(5))?;

        tracing::info!(path = %path.display(), journal_mode = %mode, "Catalog storage opened");
        Self::from_connection(conn)
    }

    /// Private in-memory database, mostly for tests and ephemeral hosts.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            sync_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Lock serializing sync passes for one server.
    ///
    /// Held from the first upsert of a pass through `mark_inactive`.
    pub fn sync_lock(&self, server_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.sync_locks.lock();
        Arc::clone(locks.entry(server_id).or_default())
    }

    /// Return the id for `url`, inserting the server on first sight.
    ///
    /// A different non-empty `name` replaces the stored one.
    pub fn register_server(&self, url: &str, name: Option<&str>) -> Result<i64> {
        let conn = self.conn.lock();
        let existing: Option<(i64, Option<String>)> = conn
            .query_row(
                "SELECT id, name FROM servers WHERE url = ?1",
                params![url],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if let Some((id, current_name)) = existing {
            if let Some(name) = name.filter(|n| !n.is_empty()) {
                if current_name.as_deref() != Some(name) {
                    conn.execute(
                        "UPDATE servers SET name = ?1, updated_at = ?2 WHERE id = ?3",
                        params![name, timestamp(Utc::now()), id],
                    )?;
                }
            }
            return Ok(id);
        }

        let now = timestamp(Utc::now());
        conn.execute(
            "INSERT INTO servers (url, name, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            params![url, name, now],
        )?;
        let id = conn.last_insert_rowid();
        tracing::debug!(url, id, "Registered catalog server");
        Ok(id)
    }

    pub fn update_server_metadata(&self, server_id: i64, metadata: &ServerMetadata) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE servers SET
                cache_timestamp = COALESCE(?1, cache_timestamp),
                etag = COALESCE(?2, etag),
                last_sync = COALESCE(?3, last_sync),
                updated_at = ?4
             WHERE id = ?5",
            params![
                metadata.cache_timestamp,
                metadata.etag,
                metadata.last_sync.map(timestamp),
                timestamp(Utc::now()),
                server_id
            ],
        )?;
        Ok(())
    }

    pub fn list_servers(&self) -> Result<Vec<ServerRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, url, name, cache_timestamp, etag, last_sync FROM servers ORDER BY url",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ServerRow {
                    id: row.get(0)?,
                    url: row.get(1)?,
                    name: row.get(2)?,
                    cache_timestamp: row.get(3)?,
                    etag: row.get(4)?,
                    last_sync: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Insert or refresh a tool row and return its content hash.
    ///
    /// The row is (re)activated whether or not the hash changed.
    pub fn upsert_tool(&self, server_id: i64, record: &ToolRecord) -> Result<String> {
        let descriptor_json = canonical_json(&record.raw_descriptor)?;
        let version_hash = content_hash(&descriptor_json);
        let languages = serde_json::to_string(&record.languages)?;
        let tags = serde_json::to_string(&record.tags)?;

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO tools (
                server_id, tool_id, version_hash, descriptor,
                description, when_to_use, languages, tags, active, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9)
             ON CONFLICT(server_id, tool_id) DO UPDATE SET
                version_hash = excluded.version_hash,
                descriptor = excluded.descriptor,
                description = excluded.description,
                when_to_use = excluded.when_to_use,
                languages = excluded.languages,
                tags = excluded.tags,
                active = 1,
                updated_at = excluded.updated_at",
            params![
                server_id,
                record.tool_id,
                version_hash,
                descriptor_json,
                record.description,
                record.when_to_use,
                languages,
                tags,
                timestamp(Utc::now()),
            ],
        )?;

        Ok(version_hash)
    }

    /// Deactivate every active tool of `server_id` not listed in `active_tool_ids`.
    ///
    /// Runs as one statement. An empty list deactivates the whole server, so
    /// callers must only reach this after a successful, non-empty pass.
    pub fn mark_inactive(&self, server_id: i64, active_tool_ids: &[String]) -> Result<usize> {
        // One JSON array parameter, whatever the keep-list size.
        let keep = serde_json::to_string(active_tool_ids)?;

        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE tools SET active = 0, updated_at = ?1 \
             WHERE server_id = ?2 AND active = 1 \
               AND tool_id NOT IN (SELECT value FROM json_each(?3))",
            params![timestamp(Utc::now()), server_id, keep],
        )?;
        if changed > 0 {
            tracing::info!(server_id, deactivated = changed, "Marked stale tools inactive");
        }
        Ok(changed)
    }

    /// Active tools joined with their server, ordered by `(server_url, tool_id)`.
    ///
    /// Empty filter slices behave like `None`.
    pub fn fetch_records(
        &self,
        server_urls: Option<&[String]>,
        tool_ids: Option<&[String]>,
    ) -> Result<Vec<ToolRecord>> {
        let urls = json_filter(server_urls)?;
        let ids = json_filter(tool_ids)?;

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT t.tool_id, t.descriptor, t.description, t.when_to_use, \
                    t.languages, t.tags, s.url \
             FROM tools t JOIN servers s ON s.id = t.server_id \
             WHERE t.active = 1 \
               AND (?1 IS NULL OR s.url IN (SELECT value FROM json_each(?1))) \
               AND (?2 IS NULL OR t.tool_id IN (SELECT value FROM json_each(?2))) \
             ORDER BY s.url, t.tool_id",
        )?;
        let rows = stmt
            .query_map(params![urls, ids], |row| {
                Ok(StoredRow {
                    tool_id: row.get(0)?,
                    descriptor: row.get(1)?,
                    description: row.get(2)?,
                    when_to_use: row.get(3)?,
                    languages: row.get(4)?,
                    tags: row.get(5)?,
                    source: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(StoredRow::into_record).collect()
    }

    /// Hash and active flag of one tool row, including inactive rows.
    pub fn tool_state(&self, server_id: i64, tool_id: &str) -> Result<Option<StoredToolState>> {
        let conn = self.conn.lock();
        let state = conn
            .query_row(
                "SELECT version_hash, active FROM tools WHERE server_id = ?1 AND tool_id = ?2",
                params![server_id, tool_id],
                |row| {
                    Ok(StoredToolState {
                        version_hash: row.get(0)?,
                        active: row.get::<_, i64>(1)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(state)
    }

    /// Append one feedback row, registering the server if it is unknown.
    pub fn record_feedback(
        &self,
        server_url: &str,
        tool_id: &str,
        outcome: FeedbackOutcome,
        detail: Option<&str>,
    ) -> Result<()> {
        let server_id = self.register_server(server_url, None)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO feedback (server_id, tool_id, outcome, detail, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![server_id, tool_id, outcome.as_str(), detail, timestamp(Utc::now())],
        )?;
        tracing::debug!(server_url, tool_id, %outcome, "Feedback recorded");
        Ok(())
    }

    pub fn feedback_summary(&self) -> Result<FeedbackSummary> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT s.url, f.tool_id,
                    SUM(CASE WHEN f.outcome = 'success' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN f.outcome = 'error' THEN 1 ELSE 0 END)
             FROM feedback f JOIN servers s ON s.id = f.server_id
             GROUP BY s.url, f.tool_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let url: String = row.get(0)?;
                let tool_id: String = row.get(1)?;
                let success: Option<i64> = row.get(2)?;
                let error: Option<i64> = row.get(3)?;
                Ok((url, tool_id, success.unwrap_or(0), error.unwrap_or(0)))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows
            .into_iter()
            .map(|(url, tool_id, success, error)| {
                (
                    feedback_key(&url, &tool_id),
                    FeedbackStats {
                        success: success.max(0) as u64,
                        error: error.max(0) as u64,
                    },
                )
            })
            .collect())
    }
}

struct StoredRow {
    tool_id: String,
    descriptor: String,
    description: Option<String>,
    when_to_use: Option<String>,
    languages: Option<String>,
    tags: Option<String>,
    source: String,
}

impl StoredRow {
    fn into_record(self) -> Result<ToolRecord> {
        let descriptor: Value = serde_json::from_str(&self.descriptor)?;
        let languages = decode_list(self.languages.as_deref())?;
        let tags = decode_list(self.tags.as_deref())?;

        let (schema_version, variant) = match descriptor.as_object() {
            Some(fields) => {
                let version = schema_version_of(fields);
                let variant = resolve_variant(fields, &version);
                (version, variant)
            }
            None => (DEFAULT_SCHEMA_VERSION.to_string(), SchemaVariant::Basic),
        };

        Ok(ToolRecord {
            tool_id: self.tool_id,
            description: self.description.unwrap_or_default(),
            when_to_use: self.when_to_use,
            schema_version,
            variant,
            languages,
            tags,
            source: self.source,
            raw_descriptor: descriptor,
        })
    }
}

fn decode_list(text: Option<&str>) -> Result<Vec<String>> {
    match text {
        Some(text) if !text.is_empty() => Ok(serde_json::from_str(text)?),
        _ => Ok(Vec::new()),
    }
}

/// JSON array for a `json_each` filter; `None` for an absent or empty slice.
fn json_filter(values: Option<&[String]>) -> Result<Option<String>> {
    match values.filter(|v| !v.is_empty()) {
        Some(values) => Ok(Some(serde_json::to_string(values)?)),
        None => Ok(None),
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Serialize with object keys sorted at every level.
pub fn canonical_json(value: &Value) -> Result<String> {
    Ok(serde_json::to_string(&sort_keys(value))?)
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), sort_keys(&map[key.as_str()]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// Hex SHA-256 of a canonical descriptor.
pub fn content_hash(canonical: &str) -> String {
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn make_record(tool_id: &str, source: &str, descriptor: Value) -> ToolRecord {
        ToolRecord {
            tool_id: tool_id.to_string(),
            description: format!("{} description", tool_id),
            when_to_use: Some(format!("use {}", tool_id)),
            schema_version: "1.0.0".to_string(),
            variant: SchemaVariant::Basic,
            languages: vec!["default".to_string()],
            tags: vec!["travel".to_string()],
            source: source.to_string(),
            raw_descriptor: descriptor,
        }
    }

    #[test]
    fn test_register_server_is_idempotent() {
        let storage = CatalogStorage::open_in_memory().unwrap();

        let first = storage.register_server("file:///tools", Some("tools")).unwrap();
        let second = storage.register_server("file:///tools", None).unwrap();
        assert_eq!(first, second);

        storage.register_server("file:///tools", Some("renamed")).unwrap();
        let servers = storage.list_servers().unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].name.as_deref(), Some("renamed"));
    }

    #[test]
    fn test_upsert_round_trips_descriptor() {
        let storage = CatalogStorage::open_in_memory().unwrap();
        let server_id = storage.register_server("https://mcp.example/tools", None).unwrap();
        let descriptor = json!({
            "tool_id": "hotel_reservation",
            "description": "Book a hotel",
            "how_to_use": { "inputs": [{ "name": "city", "type": "string" }] },
            "localization": { "es": { "description": "Reserva" } }
        });

        storage
            .upsert_tool(
                server_id,
                &make_record("hotel_reservation", "https://mcp.example/tools", descriptor.clone()),
            )
            .unwrap();

        let records = storage.fetch_records(None, None).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].raw_descriptor, descriptor);
        assert_eq!(records[0].source, "https://mcp.example/tools");
        assert_eq!(records[0].tags, vec!["travel"]);
        assert_eq!(records[0].variant, SchemaVariant::Enhanced);
    }

    #[test]
    fn test_hash_is_independent_of_key_order() {
        let a = canonical_json(&json!({ "b": 1, "a": { "y": 2, "x": 3 } })).unwrap();
        let b = canonical_json(&json!({ "a": { "x": 3, "y": 2 }, "b": 1 })).unwrap();

        assert_eq!(a, b);
        assert_eq!(a, r#"{"a":{"x":3,"y":2},"b":1}"#);
        assert_eq!(content_hash(&a).len(), 64);
    }

    #[test]
    fn test_upsert_returns_stable_hash() {
        let storage = CatalogStorage::open_in_memory().unwrap();
        let server_id = storage.register_server("s", None).unwrap();
        let record = make_record("t", "s", json!({ "tool_id": "t" }));

        let first = storage.upsert_tool(server_id, &record).unwrap();
        let second = storage.upsert_tool(server_id, &record).unwrap();
        assert_eq!(first, second);

        let changed = make_record("t", "s", json!({ "tool_id": "t", "description": "new" }));
        assert_ne!(storage.upsert_tool(server_id, &changed).unwrap(), first);
    }

    #[test]
    fn test_mark_inactive_keeps_rows() {
        let storage = CatalogStorage::open_in_memory().unwrap();
        let server_id = storage.register_server("s", None).unwrap();
        for id in ["a", "b", "c"] {
            storage
                .upsert_tool(server_id, &make_record(id, "s", json!({ "tool_id": id })))
                .unwrap();
        }

        let changed = storage
            .mark_inactive(server_id, &["a".to_string(), "c".to_string()])
            .unwrap();
        assert_eq!(changed, 1);

        let ids: Vec<_> = storage
            .fetch_records(None, None)
            .unwrap()
            .into_iter()
            .map(|r| r.tool_id)
            .collect();
        assert_eq!(ids, vec!["a", "c"]);

        let state = storage.tool_state(server_id, "b").unwrap().unwrap();
        assert!(!state.active);

        // Re-observing the tool reactivates it.
        storage
            .upsert_tool(server_id, &make_record("b", "s", json!({ "tool_id": "b" })))
            .unwrap();
        assert!(storage.tool_state(server_id, "b").unwrap().unwrap().active);
    }

    #[test]
    fn test_mark_inactive_accepts_large_keep_list() {
        let storage = CatalogStorage::open_in_memory().unwrap();
        let server_id = storage.register_server("s", None).unwrap();
        for id in ["kept", "stale"] {
            storage
                .upsert_tool(server_id, &make_record(id, "s", json!({ "tool_id": id })))
                .unwrap();
        }

        let mut keep: Vec<String> = (0..40_000).map(|i| format!("tool_{}", i)).collect();
        keep.push("kept".to_string());
        assert_eq!(storage.mark_inactive(server_id, &keep).unwrap(), 1);

        let ids: Vec<_> = storage
            .fetch_records(None, Some(keep.as_slice()))
            .unwrap()
            .into_iter()
            .map(|r| r.tool_id)
            .collect();
        assert_eq!(ids, vec!["kept"]);
        assert!(!storage.tool_state(server_id, "stale").unwrap().unwrap().active);
    }

    #[test]
    fn test_rehydrated_schema_version_matches_normalizer() {
        let storage = CatalogStorage::open_in_memory().unwrap();
        let server_id = storage.register_server("s", None).unwrap();
        let padded = json!({ "tool_id": "padded", "schema_version": " 2.0.0 " });
        let numeric = json!({ "tool_id": "numeric", "schema_version": 2 });
        storage
            .upsert_tool(server_id, &make_record("padded", "s", padded))
            .unwrap();
        storage
            .upsert_tool(server_id, &make_record("numeric", "s", numeric))
            .unwrap();

        let records = storage.fetch_records(None, None).unwrap();
        assert_eq!(records[0].tool_id, "numeric");
        assert_eq!(records[0].schema_version, "2");
        assert_eq!(records[0].variant, SchemaVariant::Enhanced);
        assert_eq!(records[1].schema_version, "2.0.0");
        assert_eq!(records[1].variant, SchemaVariant::Enhanced);
    }

    #[test]
    fn test_mark_inactive_is_scoped_to_server() {
        let storage = CatalogStorage::open_in_memory().unwrap();
        let one = storage.register_server("one", None).unwrap();
        let two = storage.register_server("two", None).unwrap();
        storage
            .upsert_tool(one, &make_record("x", "one", json!({ "tool_id": "x" })))
            .unwrap();
        storage
            .upsert_tool(two, &make_record("x", "two", json!({ "tool_id": "x" })))
            .unwrap();

        storage.mark_inactive(one, &["other".to_string()]).unwrap();

        let sources: Vec<_> = storage
            .fetch_records(None, None)
            .unwrap()
            .into_iter()
            .map(|r| r.source)
            .collect();
        assert_eq!(sources, vec!["two"]);
    }

    #[test]
    fn test_fetch_records_filters_and_orders() {
        let storage = CatalogStorage::open_in_memory().unwrap();
        let b = storage.register_server("b-server", None).unwrap();
        let a = storage.register_server("a-server", None).unwrap();
        storage
            .upsert_tool(b, &make_record("zeta", "b-server", json!({ "tool_id": "zeta" })))
            .unwrap();
        storage
            .upsert_tool(a, &make_record("omega", "a-server", json!({ "tool_id": "omega" })))
            .unwrap();
        storage
            .upsert_tool(a, &make_record("alpha", "a-server", json!({ "tool_id": "alpha" })))
            .unwrap();

        let all: Vec<_> = storage
            .fetch_records(None, None)
            .unwrap()
            .into_iter()
            .map(|r| (r.source, r.tool_id))
            .collect();
        assert_eq!(
            all,
            vec![
                ("a-server".to_string(), "alpha".to_string()),
                ("a-server".to_string(), "omega".to_string()),
                ("b-server".to_string(), "zeta".to_string()),
            ]
        );

        let filtered = storage
            .fetch_records(Some(&["a-server".to_string()]), Some(&["omega".to_string()]))
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].tool_id, "omega");

        let unfiltered = storage.fetch_records(Some(&[]), Some(&[])).unwrap();
        assert_eq!(unfiltered.len(), 3);
    }

    #[test]
    fn test_feedback_summary_aggregates() {
        let storage = CatalogStorage::open_in_memory().unwrap();
        storage
            .record_feedback("s", "t", FeedbackOutcome::Success, None)
            .unwrap();
        storage
            .record_feedback("s", "t", FeedbackOutcome::Success, Some("fast"))
            .unwrap();
        storage
            .record_feedback("s", "t", FeedbackOutcome::Error, Some("timeout"))
            .unwrap();
        storage
            .record_feedback("s", "u", FeedbackOutcome::Error, None)
            .unwrap();

        let summary = storage.feedback_summary().unwrap();
        assert_eq!(summary["s::t"], FeedbackStats { success: 2, error: 1 });
        assert_eq!(summary["s::u"], FeedbackStats { success: 0, error: 1 });
        assert_eq!(storage.list_servers().unwrap().len(), 1);
    }

    #[test]
    fn test_outcome_parsing_rejects_unknown_values() {
        assert_eq!("success".parse::<FeedbackOutcome>().unwrap(), FeedbackOutcome::Success);
        assert_eq!("error".parse::<FeedbackOutcome>().unwrap(), FeedbackOutcome::Error);

        let err = "maybe".parse::<FeedbackOutcome>().unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));
        assert!("SUCCESS".parse::<FeedbackOutcome>().is_err());
    }

    #[test]
    fn test_server_metadata_update_keeps_unset_fields() {
        let storage = CatalogStorage::open_in_memory().unwrap();
        let id = storage.register_server("https://mcp.example/tools", None).unwrap();

        storage
            .update_server_metadata(
                id,
                &ServerMetadata {
                    cache_timestamp: Some("2025-01-01T00:00:00Z".to_string()),
                    etag: Some("\"v1\"".to_string()),
                    last_sync: Some(Utc::now()),
                },
            )
            .unwrap();
        storage
            .update_server_metadata(
                id,
                &ServerMetadata {
                    last_sync: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .unwrap();

        let server = &storage.list_servers().unwrap()[0];
        assert_eq!(server.cache_timestamp.as_deref(), Some("2025-01-01T00:00:00Z"));
        assert_eq!(server.etag.as_deref(), Some("\"v1\""));
        assert!(server.last_sync.is_some());
    }

    #[test]
    fn test_file_backed_storage_survives_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("catalog.db");

        {
            let storage = CatalogStorage::open(&db_path).unwrap();
            let id = storage.register_server("s", None).unwrap();
            storage
                .upsert_tool(id, &make_record("t", "s", json!({ "tool_id": "t" })))
                .unwrap();
        }

        let reopened = CatalogStorage::open(&db_path).unwrap();
        let records = reopened.fetch_records(None, None).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tool_id, "t");
    }
}
