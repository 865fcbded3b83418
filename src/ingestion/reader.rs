//! Raw descriptor access: files on disk and remote catalog endpoints.
//!
//! Nothing here interprets descriptor contents; callers get a parsed
//! `serde_json::Value` (or an error) and hand it to the normalizer.

use crate::error::{AppError, Result};
use crate::ingestion::types::RemoteFetch;
use reqwest::header::{ACCEPT, ETAG};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use walkdir::WalkDir;

/// File extensions picked up by directory scans (compared case-insensitively).
pub const DESCRIPTOR_EXTENSIONS: [&str; 3] = ["json", "yaml", "yml"];

/// Default timeout for remote catalog requests.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// List descriptor files under `dir`, sorted by path.
///
/// With `recursive == false` only direct children are returned.
pub fn discover_descriptor_files(dir: &Path, recursive: bool) -> Vec<PathBuf> {
    let walker = WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .max_depth(if recursive { usize::MAX } else { 1 });

    walker
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_descriptor_file(path))
        .collect()
}

fn is_descriptor_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            DESCRIPTOR_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "yaml" | "yml"))
        .unwrap_or(false)
}

/// Read and parse one descriptor file (YAML by extension, JSON otherwise).
pub fn read_descriptor(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| AppError::Io(format!("failed to read {}: {}", path.display(), e)))?;
    parse_descriptor(&text, is_yaml(path))
        .map_err(|e| AppError::Parse(format!("failed to parse {}: {}", path.display(), e)))
}

fn parse_descriptor(text: &str, yaml: bool) -> std::result::Result<Value, String> {
    if yaml {
        serde_yaml::from_str::<Value>(text).map_err(|e| e.to_string())
    } else {
        serde_json::from_str::<Value>(text).map_err(|e| e.to_string())
    }
}

/// Fetch a remote catalog envelope without blocking the runtime.
///
/// One attempt, bounded by `timeout`; HTTP error statuses and undecodable
/// bodies are reported as `AppError::Network`.
pub async fn fetch_remote(url: &str, timeout: Duration) -> Result<RemoteFetch> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let response = client
        .get(url)
        .header(ACCEPT, "application/json")
        .send()
        .await?
        .error_for_status()?;

    let etag = header_value(response.headers().get(ETAG));
    let payload = response
        .json::<Value>()
        .await
        .map_err(|e| AppError::Network(format!("invalid JSON body: {}", e)))?;

    Ok(RemoteFetch { payload, etag })
}

/// Blocking variant of [`fetch_remote`] for synchronous hosts.
///
/// Must not be called from inside an async runtime.
pub fn fetch_remote_blocking(url: &str, timeout: Duration) -> Result<RemoteFetch> {
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()?;
    let response = client
        .get(url)
        .header(ACCEPT, "application/json")
        .send()?
        .error_for_status()?;

    let etag = header_value(response.headers().get(ETAG));
    let payload = response
        .json::<Value>()
        .map_err(|e| AppError::Network(format!("invalid JSON body: {}", e)))?;

    Ok(RemoteFetch { payload, etag })
}

fn header_value(value: Option<&reqwest::header::HeaderValue>) -> Option<String> {
    value
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_discover_filters_extensions() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.json"), "{}").unwrap();
        fs::write(dir.path().join("b.YAML"), "x: 1").unwrap();
        fs::write(dir.path().join("c.yml"), "x: 1").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let files = discover_descriptor_files(dir.path(), true);
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();

        assert_eq!(names, vec!["a.json", "b.YAML", "c.yml"]);
    }

    #[test]
    fn test_discover_non_recursive_skips_subdirectories() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("top.json"), "{}").unwrap();
        fs::write(dir.path().join("nested").join("deep.json"), "{}").unwrap();

        assert_eq!(discover_descriptor_files(dir.path(), false).len(), 1);
        assert_eq!(discover_descriptor_files(dir.path(), true).len(), 2);
    }

    #[test]
    fn test_read_yaml_descriptor() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tool.yaml");
        fs::write(&path, "tool_id: weather\ndescription: Forecasts\n").unwrap();

        let value = read_descriptor(&path).unwrap();
        assert_eq!(value["tool_id"], "weather");
        assert_eq!(value["description"], "Forecasts");
    }

    #[test]
    fn test_read_malformed_json_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        let err = read_descriptor(&path).unwrap_err();
        assert!(matches!(err, AppError::Parse(_)));
    }

    #[test]
    fn test_read_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let err = read_descriptor(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, AppError::Io(_)));
    }

    #[test]
    fn test_blocking_fetch_unreachable_is_network_error() {
        // Port 9 (discard) on localhost is closed in test environments.
        let err = fetch_remote_blocking("http://127.0.0.1:9/tools", Duration::from_secs(2))
            .unwrap_err();
        assert!(matches!(err, AppError::Network(_)));
    }
}
