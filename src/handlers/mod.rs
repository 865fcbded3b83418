pub mod catalog;
pub mod feedback;
pub mod health;
pub mod recommend;

pub use catalog::{catalog_handler, reload_handler, servers_handler};
pub use feedback::feedback_handler;
pub use health::{health_handler, ready_handler};
pub use recommend::recommend_handler;

use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Catalog API routes. `/metrics` and middleware are attached by the binary.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/catalog", get(catalog_handler))
        .route("/catalog/reload", post(reload_handler))
        .route("/servers", get(servers_handler))
        .route("/recommend", post(recommend_handler))
        .route("/feedback", post(feedback_handler))
        .with_state(state)
}
