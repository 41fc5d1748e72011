//! How many feed posts a visitor may see.
//!
//! The limit is applied in the query itself, so a free session can never be
//! handed more than the free allowance.

use crate::auth::SessionUser;
use crate::config::Settings;
use crate::state::AppState;
use chrono::{DateTime, Duration, Utc};
use interfaces::{Plan, PostQuery, ScrapedPost};
use serde::Serialize;
use uuid::Uuid;

/// Plan for the visitor. Anonymous visitors are on the free plan; the first
/// lookup for a signed-in user creates their member row.
pub async fn plan_for(state: &AppState, user: Option<&SessionUser>) -> anyhow::Result<Plan> {
    match user {
        None => Ok(Plan::Free),
        Some(user) => Ok(state.store.ensure_member(user.user_id, &user.email).await?.plan),
    }
}

pub fn post_limit(plan: Plan, settings: &Settings) -> i64 {
    if plan.is_paying() {
        settings.member_post_limit
    } else {
        settings.free_post_limit
    }
}

pub fn feed_query(
    plan: Plan,
    settings: &Settings,
    category: Option<String>,
    now: DateTime<Utc>,
) -> PostQuery {
    PostQuery::published_feed(
        now - Duration::days(settings.feed_window_days),
        post_limit(plan, settings),
    )
    .with_category(category)
}

/// A published post as shown to readers.
#[derive(Debug, Clone, Serialize)]
pub struct FeedPost {
    pub id: Uuid,
    pub title: String,
    pub summary: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub tags: Vec<String>,
    pub photo_url: Option<String>,
    pub source_name: String,
    pub source_url: String,
    pub published_at: Option<DateTime<Utc>>,
}

impl From<ScrapedPost> for FeedPost {
    fn from(post: ScrapedPost) -> Self {
        Self {
            id: post.id,
            title: post.title,
            summary: post.summary,
            category: post.category,
            location: post.location,
            tags: post.tags,
            photo_url: post.photo_url,
            source_name: post.source_name,
            source_url: post.source_url,
            published_at: post.published_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedPage {
    pub plan: Plan,
    pub limit: i64,
    /// More published posts exist than the plan allows.
    pub has_more: bool,
    pub total_available: i64,
    pub posts: Vec<FeedPost>,
}

pub async fn load_feed(
    state: &AppState,
    plan: Plan,
    category: Option<String>,
) -> anyhow::Result<FeedPage> {
    let query = feed_query(plan, &state.settings, category, Utc::now());
    let posts = state.store.list_posts(&query).await?;
    let total_available = state.store.count_posts(&query.without_limit()).await?;

    Ok(FeedPage {
        plan,
        limit: post_limit(plan, &state.settings),
        has_more: total_available > posts.len() as i64,
        total_available,
        posts: posts.into_iter().map(FeedPost::from).collect(),
    })
}
