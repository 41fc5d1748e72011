//! Moderation endpoints. Everything here needs an admin session, except the
//! scraper trigger which also accepts the cron secret.

use crate::auth::{bearer_token, AdminSession, MaybeSession};
use crate::error::{ApiError, ApiResult};
use crate::pages::PULSE_PATH;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use interfaces::{Member, Plan, PostQuery, PostStatus, PostUpdate, ScrapedPost};
use pulse_scraper::{recategorize_posts, utils::url::is_http_url, IngestReport, RecategorizeReport};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Outlets whose articles may not be republished. Rows from these sources
/// are removed by the copyright cleanup.
pub const COPYRIGHTED_SOURCES: &[&str] = &[
    "The Oklahoman",
    "Oklahoman",
    "NewsOK",
    "KOCO",
    "KOCO 5 News",
    "KFOR",
    "KFOR 4 News",
    "News 9",
    "KOKH Fox 25",
    "Journal Record",
    "The Journal Record",
];

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 500;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts))
        .route("/attach-photo", post(attach_photo))
        .route("/publish-post", post(publish_post))
        .route("/unpublish-post", post(unpublish_post))
        .route("/reject-post", post(reject_post))
        .route("/delete-post", post(delete_post))
        .route("/cleanup-copyrighted", post(cleanup_copyrighted))
        .route("/fix-post-category", post(fix_post_category))
        .route("/force-upgrade", post(force_upgrade))
        .route("/run-scraper", get(run_scraper).post(run_scraper))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<PostStatus>,
    pub limit: Option<i64>,
}

pub async fn list_posts(
    State(state): State<AppState>,
    AdminSession(_admin): AdminSession,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<ScrapedPost>>> {
    let query = PostQuery {
        status: params.status,
        limit: Some(params.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)),
        ..Default::default()
    };
    Ok(Json(state.store.list_posts(&query).await?))
}

#[derive(Debug, Deserialize)]
pub struct PostIdBody {
    pub post_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct AttachPhotoBody {
    pub post_id: Uuid,
    pub photo_url: String,
}

#[derive(Debug, Serialize)]
pub struct PostResponse {
    pub success: bool,
    pub post: ScrapedPost,
}

async fn existing_post(state: &AppState, id: Uuid) -> ApiResult<ScrapedPost> {
    state
        .store
        .get_post(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Post {} not found", id)))
}

async fn apply_update(state: &AppState, id: Uuid, update: PostUpdate) -> ApiResult<Json<PostResponse>> {
    let post = state
        .store
        .update_post(id, update)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Post {} not found", id)))?;
    Ok(Json(PostResponse { success: true, post }))
}

/// Published content changed; anonymous renders of the feed are stale.
fn feed_changed(state: &AppState) {
    state.pages.invalidate(Some(PULSE_PATH));
}

pub async fn attach_photo(
    State(state): State<AppState>,
    AdminSession(_admin): AdminSession,
    Json(body): Json<AttachPhotoBody>,
) -> ApiResult<Json<PostResponse>> {
    let photo_url = body.photo_url.trim().to_string();
    if !is_http_url(&photo_url) {
        return Err(ApiError::BadRequest("photo_url must be an http(s) URL".to_string()));
    }

    let response = apply_update(
        &state,
        body.post_id,
        PostUpdate {
            photo_url: Some(Some(photo_url)),
            ..Default::default()
        },
    )
    .await?;
    if response.post.status == PostStatus::Published {
        feed_changed(&state);
    }
    Ok(response)
}

pub async fn publish_post(
    State(state): State<AppState>,
    AdminSession(admin): AdminSession,
    Json(body): Json<PostIdBody>,
) -> ApiResult<Json<PostResponse>> {
    let post = existing_post(&state, body.post_id).await?;
    if post.photo_url.as_deref().is_none_or(|url| url.trim().is_empty()) {
        return Err(ApiError::BadRequest(
            "Attach a photo before publishing".to_string(),
        ));
    }

    let response = apply_update(
        &state,
        post.id,
        PostUpdate {
            status: Some(PostStatus::Published),
            published_at: Some(Some(Utc::now())),
            ..Default::default()
        },
    )
    .await?;
    feed_changed(&state);
    info!(post_id = %post.id, by = %admin.email, "Post published");
    Ok(response)
}

pub async fn unpublish_post(
    State(state): State<AppState>,
    AdminSession(admin): AdminSession,
    Json(body): Json<PostIdBody>,
) -> ApiResult<Json<PostResponse>> {
    let response = apply_update(
        &state,
        body.post_id,
        PostUpdate {
            status: Some(PostStatus::PendingPhoto),
            published_at: Some(None),
            ..Default::default()
        },
    )
    .await?;
    feed_changed(&state);
    info!(post_id = %body.post_id, by = %admin.email, "Post unpublished");
    Ok(response)
}

pub async fn reject_post(
    State(state): State<AppState>,
    AdminSession(admin): AdminSession,
    Json(body): Json<PostIdBody>,
) -> ApiResult<Json<PostResponse>> {
    let response = apply_update(
        &state,
        body.post_id,
        PostUpdate {
            status: Some(PostStatus::Deleted),
            published_at: Some(None),
            ..Default::default()
        },
    )
    .await?;
    feed_changed(&state);
    info!(post_id = %body.post_id, by = %admin.email, "Post rejected");
    Ok(response)
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub post_id: Uuid,
}

pub async fn delete_post(
    State(state): State<AppState>,
    AdminSession(admin): AdminSession,
    Json(body): Json<PostIdBody>,
) -> ApiResult<Json<DeleteResponse>> {
    if !state.store.delete_post(body.post_id).await? {
        return Err(ApiError::NotFound(format!("Post {} not found", body.post_id)));
    }
    feed_changed(&state);
    info!(post_id = %body.post_id, by = %admin.email, "Post deleted");
    Ok(Json(DeleteResponse {
        success: true,
        post_id: body.post_id,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct DryRunBody {
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceCount {
    pub source_name: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct CleanupReport {
    pub dry_run: bool,
    pub sources: Vec<SourceCount>,
    pub total: i64,
    pub deleted: u64,
}

pub async fn cleanup_copyrighted(
    State(state): State<AppState>,
    AdminSession(admin): AdminSession,
    body: Option<Json<DryRunBody>>,
) -> ApiResult<Json<CleanupReport>> {
    let dry_run = body.map(|Json(b)| b.dry_run).unwrap_or(false);
    let names: Vec<String> = COPYRIGHTED_SOURCES.iter().map(|s| s.to_string()).collect();

    let mut sources: Vec<SourceCount> = state
        .store
        .count_posts_by_source(&names)
        .await?
        .into_iter()
        .map(|(source_name, count)| SourceCount { source_name, count })
        .collect();
    sources.sort_by(|a, b| a.source_name.cmp(&b.source_name));
    let total = sources.iter().map(|s| s.count).sum();

    let deleted = if dry_run {
        0
    } else {
        let deleted = state.store.delete_posts_by_source(&names).await?;
        feed_changed(&state);
        deleted
    };

    info!(dry_run, total, deleted, by = %admin.email, "Copyright cleanup");
    Ok(Json(CleanupReport {
        dry_run,
        sources,
        total,
        deleted,
    }))
}

pub async fn fix_post_category(
    State(state): State<AppState>,
    AdminSession(_admin): AdminSession,
    body: Option<Json<DryRunBody>>,
) -> ApiResult<Json<RecategorizeReport>> {
    let dry_run = body.map(|Json(b)| b.dry_run).unwrap_or(false);
    let report = recategorize_posts(state.store.as_ref(), dry_run)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;
    if !dry_run && !report.changes.is_empty() {
        feed_changed(&state);
    }
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct ForceUpgradeBody {
    pub email: String,
    pub plan: Plan,
}

pub async fn force_upgrade(
    State(state): State<AppState>,
    AdminSession(admin): AdminSession,
    Json(body): Json<ForceUpgradeBody>,
) -> ApiResult<Json<Member>> {
    let email = body.email.trim();
    let member = state
        .store
        .get_member_by_email(email)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No member with email {}", email)))?;

    state.store.set_plan(member.user_id, body.plan, None).await?;
    info!(member = %member.email, plan = %body.plan, by = %admin.email, "Plan forced");

    Ok(Json(Member {
        plan: body.plan,
        updated_at: Utc::now(),
        ..member
    }))
}

/// Accepts `Authorization: Bearer $CRON_SECRET` from the scheduler, or an
/// admin session.
pub async fn run_scraper(
    State(state): State<AppState>,
    headers: HeaderMap,
    MaybeSession(user): MaybeSession,
) -> ApiResult<Json<IngestReport>> {
    let cron_ok = matches!(
        (&state.settings.cron_secret, bearer_token(&headers)),
        (Some(secret), Some(token)) if *secret == token
    );
    let admin_ok = user.as_ref().is_some_and(|u| state.settings.is_admin(&u.email));

    if !cron_ok && !admin_ok {
        return Err(match user {
            Some(_) => ApiError::Forbidden("Admin access required".to_string()),
            None => ApiError::Unauthorized("Cron secret or admin session required".to_string()),
        });
    }

    let ingester = state
        .ingester
        .clone()
        .ok_or_else(|| ApiError::Unavailable("No scraper sources configured".to_string()))?;

    info!(trigger = if cron_ok { "cron" } else { "admin" }, "Running scraper");
    let report = ingester.run().await;
    Ok(Json(report))
}
