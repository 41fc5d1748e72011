use crate::defs::{
    Assessment, AssessmentStatus, DataType, LeadNote, Member, NewAssessment, NewScrapedPost, Plan,
    PostStatus, ScrapedPost,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// Filter for post listings. Results are always newest first
/// (`published_at` for published posts, otherwise `created_at`).
#[derive(Debug, Clone, Default)]
pub struct PostQuery {
    pub status: Option<PostStatus>,
    pub published_since: Option<DateTime<Utc>>,
    /// Matches `scraped_date`, or `created_at` when the row has none.
    pub scraped_since: Option<DateTime<Utc>>,
    pub category: Option<String>,
    pub data_types: Vec<DataType>,
    pub only_public_records: bool,
    pub limit: Option<i64>,
}

impl PostQuery {
    pub fn published_feed(since: DateTime<Utc>, limit: i64) -> Self {
        Self {
            status: Some(PostStatus::Published),
            published_since: Some(since),
            limit: Some(limit),
            ..Default::default()
        }
    }

    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.category = category.filter(|c| !c.trim().is_empty());
        self
    }

    pub fn without_limit(mut self) -> Self {
        self.limit = None;
        self
    }

    /// Stored `data_type` spellings the query accepts, or `None` when it
    /// does not filter on type. Unknown spellings never match.
    pub fn stored_data_types(&self) -> Option<Vec<&'static str>> {
        let types: &[DataType] = if !self.data_types.is_empty() {
            &self.data_types
        } else if self.only_public_records {
            &DataType::ALL
        } else {
            return None;
        };
        Some(types.iter().flat_map(|t| t.aliases().iter().copied()).collect())
    }

    /// In-process predicate mirroring the SQL filter.
    pub fn matches(&self, post: &ScrapedPost) -> bool {
        if let Some(status) = self.status {
            if post.status != status {
                return false;
            }
        }
        if let Some(since) = self.published_since {
            match post.published_at {
                Some(at) if at >= since => {}
                _ => return false,
            }
        }
        if let Some(since) = self.scraped_since {
            if post.scraped_date.unwrap_or(post.created_at) < since {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if post.category.as_deref() != Some(category.as_str()) {
                return false;
            }
        }
        if self.only_public_records && post.data_type.is_none() {
            return false;
        }
        if !self.data_types.is_empty() {
            match post.data_type {
                Some(data_type) if self.data_types.contains(&data_type) => {}
                _ => return false,
            }
        }
        true
    }
}

/// Partial update for a post. `None` leaves a field untouched; the nested
/// options allow clearing nullable columns.
#[derive(Debug, Clone, Default)]
pub struct PostUpdate {
    pub status: Option<PostStatus>,
    pub photo_url: Option<Option<String>>,
    pub published_at: Option<Option<DateTime<Utc>>>,
    pub summary: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl PostUpdate {
    pub fn apply(self, post: &mut ScrapedPost) {
        if let Some(status) = self.status {
            post.status = status;
        }
        if let Some(photo_url) = self.photo_url {
            post.photo_url = photo_url;
        }
        if let Some(published_at) = self.published_at {
            post.published_at = published_at;
        }
        if let Some(summary) = self.summary {
            post.summary = Some(summary);
        }
        if let Some(category) = self.category {
            post.category = Some(category);
        }
        if let Some(tags) = self.tags {
            post.tags = tags;
        }
    }
}

#[async_trait]
pub trait PostStore: Send + Sync {
    async fn insert_post(&self, post: NewScrapedPost) -> Result<ScrapedPost>;

    async fn get_post(&self, id: Uuid) -> Result<Option<ScrapedPost>>;

    async fn source_url_exists(&self, source_url: &str) -> Result<bool>;

    async fn list_posts(&self, query: &PostQuery) -> Result<Vec<ScrapedPost>>;

    /// Counts rows matching the query, ignoring its limit.
    async fn count_posts(&self, query: &PostQuery) -> Result<i64>;

    /// Returns the updated row, or `None` when the post does not exist.
    async fn update_post(&self, id: Uuid, update: PostUpdate) -> Result<Option<ScrapedPost>>;

    async fn delete_post(&self, id: Uuid) -> Result<bool>;

    /// Row counts per source name, only for the given names that have rows.
    async fn count_posts_by_source(&self, sources: &[String]) -> Result<Vec<(String, i64)>>;

    async fn delete_posts_by_source(&self, sources: &[String]) -> Result<u64>;
}

#[async_trait]
pub trait MemberStore: Send + Sync {
    async fn get_member(&self, user_id: Uuid) -> Result<Option<Member>>;

    async fn get_member_by_email(&self, email: &str) -> Result<Option<Member>>;

    async fn get_member_by_customer(&self, customer_id: &str) -> Result<Option<Member>>;

    /// Inserts a member if none exists, returning the stored row. A new row
    /// starts on the free plan unless a pending plan was recorded for its
    /// email, which is applied and removed.
    async fn ensure_member(&self, user_id: Uuid, email: &str) -> Result<Member>;

    /// Hold a paid plan for an email that has no member row yet.
    async fn record_pending_plan(
        &self,
        email: &str,
        plan: Plan,
        stripe_customer_id: Option<&str>,
    ) -> Result<()>;

    /// Drop pending plans bought by `customer_id`. Returns whether any existed.
    async fn forget_pending_plan(&self, customer_id: &str) -> Result<bool>;

    /// Returns `false` when no member row matched.
    async fn set_plan(
        &self,
        user_id: Uuid,
        plan: Plan,
        stripe_customer_id: Option<&str>,
    ) -> Result<bool>;
}

#[async_trait]
pub trait LeadNoteStore: Send + Sync {
    async fn upsert_note(&self, note: LeadNote) -> Result<LeadNote>;

    async fn notes_for_user(&self, user_id: Uuid) -> Result<Vec<LeadNote>>;
}

#[async_trait]
pub trait AssessmentStore: Send + Sync {
    async fn insert_assessment(&self, assessment: NewAssessment) -> Result<Assessment>;

    async fn list_assessments(&self, status: Option<AssessmentStatus>) -> Result<Vec<Assessment>>;

    async fn update_assessment(
        &self,
        id: Uuid,
        status: Option<AssessmentStatus>,
        admin_notes: Option<String>,
    ) -> Result<Option<Assessment>>;
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Counts a hit against `key` in the fixed window of length `window`
    /// containing `now`, returning the count including this hit.
    async fn hit(&self, key: &str, window: Duration, now: DateTime<Utc>) -> Result<u32>;
}

/// Everything the web server and the scraper need from persistence.
pub trait Store: PostStore + MemberStore + LeadNoteStore + AssessmentStore + RateLimitStore {}

impl<T> Store for T where T: PostStore + MemberStore + LeadNoteStore + AssessmentStore + RateLimitStore {}

/// Start of the fixed window of length `window` that contains `now`.
pub fn window_start(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    let window_secs = window.num_seconds().max(1);
    let ts = now.timestamp();
    let start = ts - ts.rem_euclid(window_secs);
    DateTime::from_timestamp(start, 0).unwrap_or(now)
}
