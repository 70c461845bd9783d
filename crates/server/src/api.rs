use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use tracing::warn;

use tagwatch_core::domain::AlertStats;
use tagwatch_core::notify::Notification;
use tagwatch_db::DbPool;
use tagwatch_engine::{Core, EngineError, SummaryComposer};

use crate::{health, sse};

/// State shared by the HTTP surface the admin console consumes.
#[derive(Clone)]
pub struct ApiState {
    pub core: Core,
    pub composer: Arc<SummaryComposer>,
    pub db_pool: DbPool,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/events", get(sse::events))
        .route("/health", get(health::health))
        .route("/notifications", get(notifications))
        .route("/summary", post(summary))
        .route("/dashboard/stats/{user_id}", get(dashboard_stats))
        .with_state(state)
}

async fn notifications(State(state): State<ApiState>) -> Json<Vec<Notification>> {
    Json(state.core.notifications.snapshot())
}

#[derive(Debug, Deserialize)]
struct SummaryRequest {
    email: String,
}

#[derive(Debug, Serialize)]
struct SummaryResponse {
    summary: String,
    dm_sent: bool,
}

/// The admin console's on-demand daily summary trigger.
async fn summary(
    State(state): State<ApiState>,
    Json(request): Json<SummaryRequest>,
) -> Result<Json<SummaryResponse>, (StatusCode, String)> {
    match state.composer.compose(&request.email).await {
        Ok(outcome) => {
            Ok(Json(SummaryResponse { summary: outcome.text, dm_sent: outcome.dm_sent }))
        }
        Err(EngineError::NotFound(reason)) => Err((StatusCode::NOT_FOUND, reason)),
        Err(EngineError::ConfigMissing(key)) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            format!("configuration key `{key}` is missing"),
        )),
        Err(error) => {
            warn!(error = %error, "summary composition failed");
            Err((StatusCode::BAD_GATEWAY, error.to_string()))
        }
    }
}

/// 14-day alert aggregation for the console dashboard.
async fn dashboard_stats(
    State(state): State<ApiState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<AlertStats>>, (StatusCode, String)> {
    state
        .core
        .alert_log
        .stats_for_user(user_id)
        .await
        .map(Json)
        .map_err(|error| (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()))
}
