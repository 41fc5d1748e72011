use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct RevalidateParams {
    pub secret: Option<String>,
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RevalidateResponse {
    pub revalidated: bool,
    /// Milliseconds since the Unix epoch.
    pub now: i64,
}

/// Drop cached page renders so the next request rebuilds them.
pub async fn revalidate(
    State(state): State<AppState>,
    Query(params): Query<RevalidateParams>,
) -> ApiResult<Json<RevalidateResponse>> {
    let authorized = matches!(
        (&state.settings.revalidate_secret, &params.secret),
        (Some(expected), Some(given)) if expected == given
    );
    if !authorized {
        return Err(ApiError::Unauthorized("Invalid revalidation secret".to_string()));
    }

    let path = params.path.as_deref().filter(|p| !p.is_empty());
    let removed = state.pages.invalidate(path);
    info!(path = path.unwrap_or("*"), removed, "Revalidated pages");

    Ok(Json(RevalidateResponse {
        revalidated: true,
        now: Utc::now().timestamp_millis(),
    }))
}
