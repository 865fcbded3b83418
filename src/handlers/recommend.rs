use crate::error::{AppError, Result};
use crate::ranking::validate_query;
use crate::state::AppState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

const MAX_TOP_N: usize = 50;

#[derive(Debug, Deserialize)]
pub struct RecommendRequest {
    pub query: String,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    /// Preferred language code, e.g. "en" or "es"
    pub language: Option<String>,
    /// Return the full descriptor with each result
    #[serde(default)]
    pub include_raw: bool,
    pub servers: Option<Vec<String>>,
    pub allowed_tools: Option<Vec<String>>,
}

fn default_top_n() -> usize {
    5
}

#[derive(Debug, Serialize)]
pub struct RecommendResponse {
    pub count: usize,
    pub results: Vec<Value>,
}

/// POST /recommend - Rank catalog tools for a task description.
///
/// # Flow
/// 1. Validate input
/// 2. Snapshot records and feedback under the catalog lock
/// 3. Score with the lock released
pub async fn recommend_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RecommendRequest>,
) -> Result<Json<RecommendResponse>> {
    validate_query(&request.query)?;
    if !(1..=MAX_TOP_N).contains(&request.top_n) {
        return Err(AppError::InvalidArgument(format!(
            "top_n must be between 1 and {}",
            MAX_TOP_N
        )));
    }

    let start = Instant::now();
    let catalog = Arc::clone(&state.catalog);
    let ranker = Arc::clone(&state.ranker);
    let include_raw = request.include_raw;

    let ranked = tokio::task::spawn_blocking(move || {
        let (records, feedback) = {
            let mut catalog = catalog.lock();
            let records = catalog.list_tools(
                request.servers.as_deref(),
                request.allowed_tools.as_deref(),
            )?;
            let feedback = match catalog.storage() {
                Some(_) => Some(catalog.feedback_summary()?),
                None => None,
            };
            (records, feedback)
        };

        ranker.rank_records(
            records,
            feedback.as_ref(),
            &request.query,
            request.top_n,
            request.language.as_deref(),
        )
    })
    .await??;

    let results: Vec<Value> = ranked.iter().map(|r| r.to_json(include_raw)).collect();

    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    tracing::debug!(results = results.len(), elapsed_ms, "Recommendation completed");
    metrics::counter!("recommend_requests_total").increment(1);
    metrics::histogram!("recommend_latency_ms").record(elapsed_ms);

    Ok(Json(RecommendResponse {
        count: results.len(),
        results,
    }))
}
