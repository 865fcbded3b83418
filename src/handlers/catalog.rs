use crate::error::{AppError, Result};
use crate::ingestion::types::ToolRecord;
use crate::persistence::ServerRow;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
pub struct CatalogQuery {
    /// 0 returns everything
    #[serde(default)]
    pub limit: usize,
    pub server: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CatalogResponse {
    pub count: usize,
    pub tools: Vec<ToolRecord>,
}

#[derive(Debug, Serialize)]
pub struct ServersResponse {
    pub servers: Vec<ServerRow>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReloadRequest {
    pub directory: Option<String>,
    pub mcp_endpoint: Option<String>,
    pub server_label: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub tool_count: usize,
    pub loaded: usize,
    pub errors: Vec<String>,
}

/// GET /catalog - List registered tools, optionally for one server.
pub async fn catalog_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CatalogQuery>,
) -> Result<Json<CatalogResponse>> {
    let catalog = Arc::clone(&state.catalog);
    let sources: Option<Vec<String>> = params.server.filter(|s| !s.is_empty()).map(|s| vec![s]);

    let mut tools = tokio::task::spawn_blocking(move || {
        let mut catalog = catalog.lock();
        catalog.list_tools(sources.as_deref(), None)
    })
    .await??;

    if params.limit > 0 {
        tools.truncate(params.limit);
    }

    Ok(Json(CatalogResponse {
        count: tools.len(),
        tools,
    }))
}

/// GET /servers - Registered sources; empty without persistent storage.
pub async fn servers_handler(State(state): State<Arc<AppState>>) -> Result<Json<ServersResponse>> {
    let catalog = Arc::clone(&state.catalog);
    let servers = tokio::task::spawn_blocking(move || {
        let catalog = catalog.lock();
        match catalog.list_servers() {
            Err(AppError::StorageNotReady(_)) => Ok(Vec::new()),
            other => other,
        }
    })
    .await??;

    Ok(Json(ServersResponse { servers }))
}

/// POST /catalog/reload - Drop the in-memory catalog and sync again.
///
/// With neither `directory` nor `mcp_endpoint`, the configured directories
/// are synced. A failed reload keeps the previous catalog.
pub async fn reload_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ReloadRequest>,
) -> Result<Json<ReloadResponse>> {
    let directory = non_empty(request.directory).map(PathBuf::from);
    let endpoint = non_empty(request.mcp_endpoint);
    let label = non_empty(request.server_label);

    let report = state.reload(directory, endpoint, label).await?;

    tracing::info!(
        loaded = report.loaded,
        tool_count = report.tool_count,
        errors = report.errors.len(),
        "Catalog reloaded"
    );

    Ok(Json(ReloadResponse {
        tool_count: report.tool_count,
        loaded: report.loaded,
        errors: report.errors,
    }))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
