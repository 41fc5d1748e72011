use crate::defs::{
    Assessment, AssessmentStatus, LeadNote, Member, NewAssessment, NewScrapedPost, Plan,
    ScrapedPost,
};
use crate::store::{
    window_start, AssessmentStore, LeadNoteStore, MemberStore, PostQuery, PostStore, PostUpdate,
    RateLimitStore,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug, info};
use uuid::Uuid;

const POST_COLUMNS: &str = "id, title, summary, category, location, tags, status, photo_url, \
    source_name, source_url, published_at, data_type, data_value, data_address, scraped_date, created_at";

const ASSESSMENT_COLUMNS: &str = "id, contact_name, email, phone, business_name, industry, \
    annual_revenue, cash_flow, years_in_business, employees, reason_for_selling, timeline, \
    status, admin_notes, created_at";

/// Postgres-backed store (the Supabase database).
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("connecting to Postgres")?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("running migrations")?;
        info!("Database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn post_from_row(row: &PgRow) -> Result<ScrapedPost> {
    let status: String = row.try_get("status")?;
    let data_type: Option<String> = row.try_get("data_type")?;
    Ok(ScrapedPost {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        summary: row.try_get("summary")?,
        category: row.try_get("category")?,
        location: row.try_get("location")?,
        tags: row.try_get("tags")?,
        status: status.parse()?,
        photo_url: row.try_get("photo_url")?,
        source_name: row.try_get("source_name")?,
        source_url: row.try_get("source_url")?,
        published_at: row.try_get("published_at")?,
        // Rows written by older scrapers may carry types we no longer score.
        data_type: data_type.and_then(|t| t.parse().ok()),
        data_value: row.try_get("data_value")?,
        data_address: row.try_get("data_address")?,
        scraped_date: row.try_get("scraped_date")?,
        created_at: row.try_get("created_at")?,
    })
}

fn member_from_row(row: &PgRow) -> Result<Member> {
    let plan: String = row.try_get("plan")?;
    Ok(Member {
        user_id: row.try_get("user_id")?,
        email: row.try_get("email")?,
        plan: plan.parse().unwrap_or(Plan::Free),
        stripe_customer_id: row.try_get("stripe_customer_id")?,
        verified: row.try_get("verified")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn note_from_row(row: &PgRow) -> Result<LeadNote> {
    let contact_status: String = row.try_get("contact_status")?;
    Ok(LeadNote {
        user_id: row.try_get("user_id")?,
        lead_id: row.try_get("lead_id")?,
        note: row.try_get("note")?,
        contact_status: contact_status.parse()?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn assessment_from_row(row: &PgRow) -> Result<Assessment> {
    let status: String = row.try_get("status")?;
    Ok(Assessment {
        id: row.try_get("id")?,
        contact_name: row.try_get("contact_name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        business_name: row.try_get("business_name")?,
        industry: row.try_get("industry")?,
        annual_revenue: row.try_get("annual_revenue")?,
        cash_flow: row.try_get("cash_flow")?,
        years_in_business: row.try_get("years_in_business")?,
        employees: row.try_get("employees")?,
        reason_for_selling: row.try_get("reason_for_selling")?,
        timeline: row.try_get("timeline")?,
        status: status.parse()?,
        admin_notes: row.try_get("admin_notes")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Appends the WHERE clause for `query` to `builder`.
fn push_post_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &PostQuery) {
    builder.push(" WHERE TRUE");
    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(since) = query.published_since {
        builder.push(" AND published_at >= ").push_bind(since);
    }
    if let Some(since) = query.scraped_since {
        builder
            .push(" AND COALESCE(scraped_date, created_at) >= ")
            .push_bind(since);
    }
    if let Some(category) = &query.category {
        builder.push(" AND category = ").push_bind(category.clone());
    }
    if let Some(names) = query.stored_data_types() {
        builder
            .push(" AND LOWER(TRIM(data_type)) = ANY(")
            .push_bind(names)
            .push(")");
    }
}

#[async_trait]
impl PostStore for PgStore {
    async fn insert_post(&self, post: NewScrapedPost) -> Result<ScrapedPost> {
        let post = post.into_post(Uuid::new_v4(), Utc::now());
        sqlx::query(
            r#"
            INSERT INTO scraped_posts (id, title, summary, category, location, tags, status,
                photo_url, source_name, source_url, published_at, data_type, data_value,
                data_address, scraped_date, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(post.id)
        .bind(&post.title)
        .bind(&post.summary)
        .bind(&post.category)
        .bind(&post.location)
        .bind(&post.tags)
        .bind(post.status.as_str())
        .bind(&post.photo_url)
        .bind(&post.source_name)
        .bind(&post.source_url)
        .bind(post.published_at)
        .bind(post.data_type.map(|t| t.as_str()))
        .bind(post.data_value)
        .bind(&post.data_address)
        .bind(post.scraped_date)
        .bind(post.created_at)
        .execute(&self.pool)
        .await?;

        debug!("Inserted scraped post {} ({})", post.id, post.source_url);
        Ok(post)
    }

    async fn get_post(&self, id: Uuid) -> Result<Option<ScrapedPost>> {
        let row = sqlx::query(&format!("SELECT {POST_COLUMNS} FROM scraped_posts WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(post_from_row).transpose()
    }

    async fn source_url_exists(&self, source_url: &str) -> Result<bool> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM scraped_posts WHERE source_url = $1) AS found")
            .bind(source_url)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("found")?)
    }

    async fn list_posts(&self, query: &PostQuery) -> Result<Vec<ScrapedPost>> {
        let mut builder = QueryBuilder::new(format!("SELECT {POST_COLUMNS} FROM scraped_posts"));
        push_post_filters(&mut builder, query);
        builder.push(" ORDER BY COALESCE(published_at, created_at) DESC");
        if let Some(limit) = query.limit {
            builder.push(" LIMIT ").push_bind(limit.max(0));
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(post_from_row).collect()
    }

    async fn count_posts(&self, query: &PostQuery) -> Result<i64> {
        let mut builder = QueryBuilder::new("SELECT COUNT(*) AS count FROM scraped_posts");
        push_post_filters(&mut builder, query);
        let row = builder.build().fetch_one(&self.pool).await?;
        Ok(row.try_get("count")?)
    }

    async fn update_post(&self, id: Uuid, update: PostUpdate) -> Result<Option<ScrapedPost>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE scraped_posts SET id = id");
        if let Some(status) = update.status {
            builder.push(", status = ").push_bind(status.as_str());
        }
        if let Some(photo_url) = update.photo_url {
            builder.push(", photo_url = ").push_bind(photo_url);
        }
        if let Some(published_at) = update.published_at {
            builder.push(", published_at = ").push_bind(published_at);
        }
        if let Some(summary) = update.summary {
            builder.push(", summary = ").push_bind(summary);
        }
        if let Some(category) = update.category {
            builder.push(", category = ").push_bind(category);
        }
        if let Some(tags) = update.tags {
            builder.push(", tags = ").push_bind(tags);
        }
        builder
            .push(" WHERE id = ")
            .push_bind(id)
            .push(format!(" RETURNING {POST_COLUMNS}"));

        let row = builder.build().fetch_optional(&self.pool).await?;
        row.as_ref().map(post_from_row).transpose()
    }

    async fn delete_post(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM scraped_posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_posts_by_source(&self, sources: &[String]) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT source_name, COUNT(*) AS count
            FROM scraped_posts
            WHERE source_name = ANY($1)
            GROUP BY source_name
            ORDER BY source_name
            "#,
        )
        .bind(sources)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<(String, i64)> {
                Ok((row.try_get("source_name")?, row.try_get("count")?))
            })
            .collect()
    }

    async fn delete_posts_by_source(&self, sources: &[String]) -> Result<u64> {
        let result = sqlx::query("DELETE FROM scraped_posts WHERE source_name = ANY($1)")
            .bind(sources)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl MemberStore for PgStore {
    async fn get_member(&self, user_id: Uuid) -> Result<Option<Member>> {
        let row = sqlx::query("SELECT * FROM members WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(member_from_row).transpose()
    }

    async fn get_member_by_email(&self, email: &str) -> Result<Option<Member>> {
        let row = sqlx::query("SELECT * FROM members WHERE LOWER(email) = LOWER($1) LIMIT 1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(member_from_row).transpose()
    }

    async fn get_member_by_customer(&self, customer_id: &str) -> Result<Option<Member>> {
        let row = sqlx::query("SELECT * FROM members WHERE stripe_customer_id = $1 LIMIT 1")
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(member_from_row).transpose()
    }

    async fn ensure_member(&self, user_id: Uuid, email: &str) -> Result<Member> {
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            r#"
            INSERT INTO members (user_id, email, plan, verified, created_at, updated_at)
            VALUES ($1, $2, 'free', FALSE, NOW(), NOW())
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(email)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if inserted {
            let pending = sqlx::query(
                "DELETE FROM pending_plans WHERE email = LOWER(TRIM($1)) RETURNING plan, stripe_customer_id",
            )
            .bind(email)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(row) = pending {
                let plan: String = row.try_get("plan")?;
                let customer: Option<String> = row.try_get("stripe_customer_id")?;
                sqlx::query(
                    "UPDATE members SET plan = $2, stripe_customer_id = $3, updated_at = NOW() WHERE user_id = $1",
                )
                .bind(user_id)
                .bind(plan)
                .bind(customer)
                .execute(&mut *tx)
                .await?;
                debug!("Applied pending plan to new member {}", user_id);
            }
        }
        tx.commit().await?;

        self.get_member(user_id)
            .await?
            .context("member row missing after insert")
    }

    async fn record_pending_plan(
        &self,
        email: &str,
        plan: Plan,
        stripe_customer_id: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pending_plans (email, plan, stripe_customer_id, created_at)
            VALUES (LOWER(TRIM($1)), $2, $3, NOW())
            ON CONFLICT (email) DO UPDATE SET
                plan = EXCLUDED.plan,
                stripe_customer_id = EXCLUDED.stripe_customer_id,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(email)
        .bind(plan.as_str())
        .bind(stripe_customer_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn forget_pending_plan(&self, customer_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM pending_plans WHERE stripe_customer_id = $1")
            .bind(customer_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_plan(
        &self,
        user_id: Uuid,
        plan: Plan,
        stripe_customer_id: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE members
            SET plan = $2, stripe_customer_id = COALESCE($3, stripe_customer_id), updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(plan.as_str())
        .bind(stripe_customer_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl LeadNoteStore for PgStore {
    async fn upsert_note(&self, note: LeadNote) -> Result<LeadNote> {
        let row = sqlx::query(
            r#"
            INSERT INTO lead_notes (user_id, lead_id, note, contact_status, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, lead_id) DO UPDATE SET
                note = EXCLUDED.note,
                contact_status = EXCLUDED.contact_status,
                updated_at = EXCLUDED.updated_at
            RETURNING user_id, lead_id, note, contact_status, updated_at
            "#,
        )
        .bind(note.user_id)
        .bind(note.lead_id)
        .bind(&note.note)
        .bind(note.contact_status.as_str())
        .bind(note.updated_at)
        .fetch_one(&self.pool)
        .await?;
        note_from_row(&row)
    }

    async fn notes_for_user(&self, user_id: Uuid) -> Result<Vec<LeadNote>> {
        let rows = sqlx::query(
            "SELECT user_id, lead_id, note, contact_status, updated_at FROM lead_notes \
             WHERE user_id = $1 ORDER BY updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(note_from_row).collect()
    }
}

#[async_trait]
impl AssessmentStore for PgStore {
    async fn insert_assessment(&self, assessment: NewAssessment) -> Result<Assessment> {
        let a = assessment.into_assessment(Uuid::new_v4(), Utc::now());
        sqlx::query(&format!(
            "INSERT INTO assessments ({ASSESSMENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"
        ))
        .bind(a.id)
        .bind(&a.contact_name)
        .bind(&a.email)
        .bind(&a.phone)
        .bind(&a.business_name)
        .bind(&a.industry)
        .bind(a.annual_revenue)
        .bind(a.cash_flow)
        .bind(a.years_in_business)
        .bind(a.employees)
        .bind(&a.reason_for_selling)
        .bind(&a.timeline)
        .bind(a.status.as_str())
        .bind(&a.admin_notes)
        .bind(a.created_at)
        .execute(&self.pool)
        .await?;
        Ok(a)
    }

    async fn list_assessments(&self, status: Option<AssessmentStatus>) -> Result<Vec<Assessment>> {
        let mut builder = QueryBuilder::new(format!("SELECT {ASSESSMENT_COLUMNS} FROM assessments"));
        if let Some(status) = status {
            builder.push(" WHERE status = ").push_bind(status.as_str());
        }
        builder.push(" ORDER BY created_at DESC");
        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(assessment_from_row).collect()
    }

    async fn update_assessment(
        &self,
        id: Uuid,
        status: Option<AssessmentStatus>,
        admin_notes: Option<String>,
    ) -> Result<Option<Assessment>> {
        let row = sqlx::query(&format!(
            "UPDATE assessments SET status = COALESCE($2, status), \
             admin_notes = COALESCE($3, admin_notes) WHERE id = $1 RETURNING {ASSESSMENT_COLUMNS}"
        ))
        .bind(id)
        .bind(status.map(|s| s.as_str()))
        .bind(admin_notes)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(assessment_from_row).transpose()
    }
}

#[async_trait]
impl RateLimitStore for PgStore {
    async fn hit(&self, key: &str, window: Duration, now: DateTime<Utc>) -> Result<u32> {
        let start = window_start(now, window);
        let row = sqlx::query(
            r#"
            INSERT INTO rate_limit_hits (key, window_start, hits)
            VALUES ($1, $2, 1)
            ON CONFLICT (key, window_start) DO UPDATE SET hits = rate_limit_hits.hits + 1
            RETURNING hits
            "#,
        )
        .bind(key)
        .bind(start)
        .fetch_one(&self.pool)
        .await?;

        // Expired windows are garbage; prune them opportunistically.
        sqlx::query("DELETE FROM rate_limit_hits WHERE window_start < $1")
            .bind(start - window)
            .execute(&self.pool)
            .await?;

        let hits: i32 = row.try_get("hits")?;
        Ok(hits.max(0) as u32)
    }
}
