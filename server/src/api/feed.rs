use crate::auth::MaybeSession;
use crate::error::ApiResult;
use crate::paywall::{load_feed, plan_for, FeedPage};
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct FeedParams {
    pub category: Option<String>,
}

/// Published OKC Pulse posts, capped by the caller's plan.
pub async fn list_businesses(
    State(state): State<AppState>,
    MaybeSession(user): MaybeSession,
    Query(params): Query<FeedParams>,
) -> ApiResult<Json<FeedPage>> {
    let plan = plan_for(&state, user.as_ref()).await?;
    let page = load_feed(&state, plan, params.category).await?;
    Ok(Json(page))
}
