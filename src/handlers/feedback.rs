use crate::error::{AppError, Result};
use crate::ingestion::types::feedback_key;
use crate::persistence::{FeedbackOutcome, FeedbackStats};
use crate::state::AppState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub tool_id: String,
    /// Server URL or source identifier the tool was ranked from
    pub server: String,
    /// "success" or "error"
    pub outcome: String,
    pub detail: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FeedbackResponse {
    pub status: &'static str,
    pub stats: FeedbackStats,
}

/// POST /feedback - Record one execution outcome and return updated counts.
pub async fn feedback_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FeedbackRequest>,
) -> Result<Json<FeedbackResponse>> {
    let outcome: FeedbackOutcome = request.outcome.parse()?;
    if request.tool_id.trim().is_empty() || request.server.trim().is_empty() {
        return Err(AppError::InvalidArgument(
            "tool_id and server are required".to_string(),
        ));
    }

    let catalog = Arc::clone(&state.catalog);
    let stats = tokio::task::spawn_blocking(move || {
        let catalog = catalog.lock();
        catalog.record_feedback(
            &request.server,
            &request.tool_id,
            outcome,
            request.detail.as_deref(),
        )?;
        let summary = catalog.feedback_summary()?;
        Ok::<_, AppError>(
            summary
                .get(&feedback_key(&request.server, &request.tool_id))
                .copied()
                .unwrap_or_default(),
        )
    })
    .await??;

    tracing::info!(outcome = %outcome, success = stats.success, error = stats.error, "Feedback recorded");
    metrics::counter!("feedback_recorded_total", "outcome" => outcome.as_str()).increment(1);

    Ok(Json(FeedbackResponse {
        status: "recorded",
        stats,
    }))
}
