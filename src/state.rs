use crate::catalog::ToolCatalog;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::ingestion::reader;
use crate::ingestion::types::RemoteFetch;
use crate::ingestion::validator::{JsonSchemaValidator, SchemaValidator};
use crate::persistence::CatalogStorage;
use crate::ranking::ToolRanker;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Application state shared across all request handlers.
///
/// The catalog is synchronous; handlers take the lock inside
/// `spawn_blocking` and never across an `.await`.
pub struct AppState {
    pub catalog: Arc<Mutex<ToolCatalog>>,
    pub ranker: Arc<ToolRanker>,
    /// Set once the startup sync has finished
    pub ready: AtomicBool,
    /// Active tools after the last sync; readable without the catalog lock
    tool_count: Arc<AtomicUsize>,
    pub config: Arc<Config>,
}

/// Outcome of [`AppState::reload`].
#[derive(Debug, Clone)]
pub struct ReloadReport {
    pub tool_count: usize,
    pub loaded: usize,
    pub errors: Vec<String>,
}

fn reload_pass(
    catalog: &mut ToolCatalog,
    directory: Option<&Path>,
    remote: Option<(&str, Result<RemoteFetch>)>,
    default_dirs: &[PathBuf],
    recursive: bool,
    label: Option<&str>,
) -> Result<usize> {
    let mut loaded = 0;
    if let Some(dir) = directory {
        loaded += catalog.load_directory(dir, recursive, label)?;
    }
    if let Some((url, fetched)) = remote {
        loaded += catalog.ingest_remote(url, label, fetched);
    }
    for dir in default_dirs {
        loaded += catalog.load_directory(dir, recursive, None)?;
    }
    Ok(loaded)
}

/// Active tool count, falling back to the in-memory map if storage fails.
fn active_count(catalog: &mut ToolCatalog) -> usize {
    match catalog.list_tools(None, None) {
        Ok(records) => records.len(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to count active tools");
            catalog.tools().len()
        }
    }
}

impl AppState {
    /// Build the catalog (opening storage when configured) without syncing.
    pub fn new(config: Config) -> Result<Self> {
        let validator: Arc<dyn SchemaValidator> = match &config.schema_dir {
            Some(dir) => {
                tracing::info!(dir = %dir.display(), "Loading descriptor schemas");
                Arc::new(JsonSchemaValidator::from_dir(dir)?)
            }
            None => Arc::new(JsonSchemaValidator::bundled()?),
        };

        let catalog = match &config.database_path {
            Some(path) => {
                let storage = CatalogStorage::open(path)?;
                ToolCatalog::with_storage(validator, Arc::new(storage))?
            }
            None => {
                tracing::info!("No SELECTOR_DB configured; catalog is memory-only");
                ToolCatalog::new(validator)
            }
        };

        Ok(Self::from_parts(catalog, config))
    }

    /// Wrap an already built catalog. The state starts not ready.
    pub fn from_parts(catalog: ToolCatalog, config: Config) -> Self {
        let ranker = ToolRanker::new(config.ranking_weights());
        let tool_count = catalog.tools().len();
        Self {
            catalog: Arc::new(Mutex::new(catalog)),
            ranker: Arc::new(ranker),
            ready: AtomicBool::new(false),
            tool_count: Arc::new(AtomicUsize::new(tool_count)),
            config: Arc::new(config),
        }
    }

    /// Build the state, run the startup sync and mark the service ready.
    pub async fn initialize(config: Config) -> Result<Self> {
        let state = Self::new(config)?;
        state.initial_sync().await;
        state.mark_ready();
        Ok(state)
    }

    /// Sync configured sources unless storage already holds a catalog.
    pub async fn initial_sync(&self) {
        let catalog = Arc::clone(&self.catalog);
        let bootstrapped = tokio::task::spawn_blocking(move || {
            let catalog = catalog.lock();
            catalog.storage().is_some() && !catalog.tools().is_empty()
        })
        .await;
        let bootstrapped = match bootstrapped {
            Ok(bootstrapped) => bootstrapped,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to inspect restored catalog");
                false
            }
        };
        if bootstrapped {
            tracing::info!("Catalog restored from storage; skipping startup sync");
            return;
        }

        let dirs = self.config.catalog_dirs.clone();
        for dir in dirs {
            if !dir.exists() {
                tracing::warn!(dir = %dir.display(), "Catalog directory does not exist; skipping");
                continue;
            }
            if let Err(e) = self.sync_directory(dir.clone(), None).await {
                tracing::warn!(dir = %dir.display(), error = %e, "Catalog directory sync failed");
            }
        }

        if let Some(url) = self.config.mcp_tools_url.clone() {
            if let Err(e) = self.sync_remote(url.clone(), None).await {
                tracing::warn!(url = %url, error = %e, "Remote catalog sync failed");
            }
        }
    }

    /// Run one directory sync pass on the blocking pool.
    pub async fn sync_directory(&self, dir: PathBuf, label: Option<String>) -> Result<usize> {
        let catalog = Arc::clone(&self.catalog);
        let tool_count = Arc::clone(&self.tool_count);
        let recursive = self.config.catalog_recursive;
        tokio::task::spawn_blocking(move || {
            let mut catalog = catalog.lock();
            let loaded = catalog.load_directory(&dir, recursive, label.as_deref());
            tool_count.store(active_count(&mut catalog), Ordering::SeqCst);
            loaded
        })
        .await?
    }

    /// Fetch a remote catalog without holding the lock, then ingest it.
    pub async fn sync_remote(&self, url: String, server_name: Option<String>) -> Result<usize> {
        let fetched = reader::fetch_remote(&url, self.config.mcp_timeout()).await;
        let catalog = Arc::clone(&self.catalog);
        let tool_count = Arc::clone(&self.tool_count);
        let loaded = tokio::task::spawn_blocking(move || {
            let mut catalog = catalog.lock();
            let loaded = catalog.ingest_remote(&url, server_name.as_deref(), fetched);
            tool_count.store(active_count(&mut catalog), Ordering::SeqCst);
            loaded
        })
        .await?;
        Ok(loaded)
    }

    /// Drop the in-memory catalog and sync the given sources again.
    ///
    /// With neither a directory nor an endpoint the configured directories
    /// are synced. The remote catalog is fetched before the lock is taken and
    /// the whole pass runs under one lock. When the pass fails, or loads
    /// nothing while logging errors, the previous records are put back.
    pub async fn reload(
        &self,
        directory: Option<PathBuf>,
        endpoint: Option<String>,
        label: Option<String>,
    ) -> Result<ReloadReport> {
        let fetched = match &endpoint {
            Some(url) => Some(reader::fetch_remote(url, self.config.mcp_timeout()).await),
            None => None,
        };
        let default_dirs: Vec<PathBuf> = if directory.is_none() && endpoint.is_none() {
            self.config
                .catalog_dirs
                .iter()
                .filter(|d| d.exists())
                .cloned()
                .collect()
        } else {
            Vec::new()
        };

        let catalog = Arc::clone(&self.catalog);
        let tool_count = Arc::clone(&self.tool_count);
        let recursive = self.config.catalog_recursive;
        tokio::task::spawn_blocking(move || {
            let mut catalog = catalog.lock();
            let previous = catalog.clear();

            let pass = reload_pass(
                &mut catalog,
                directory.as_deref(),
                endpoint.as_deref().zip(fetched),
                &default_dirs,
                recursive,
                label.as_deref(),
            );

            let outcome = match pass {
                Ok(0) if !catalog.errors().is_empty() => {
                    tracing::warn!("Reload loaded no tools; keeping the previous catalog");
                    catalog.restore(previous);
                    Ok(0)
                }
                Ok(loaded) => Ok(loaded),
                Err(e) => {
                    tracing::warn!(error = %e, "Reload failed; keeping the previous catalog");
                    catalog.restore(previous);
                    Err(e)
                }
            };

            let count = active_count(&mut catalog);
            tool_count.store(count, Ordering::SeqCst);
            Ok::<_, AppError>(ReloadReport {
                tool_count: count,
                loaded: outcome?,
                errors: catalog.errors().to_vec(),
            })
        })
        .await?
    }

    /// Active tools after the last sync pass.
    pub fn tool_count(&self) -> usize {
        self.tool_count.load(Ordering::SeqCst)
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Check if the service is ready to handle requests.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}
