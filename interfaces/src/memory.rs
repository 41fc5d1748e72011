use crate::defs::{
    Assessment, AssessmentStatus, LeadNote, Member, NewAssessment, NewScrapedPost, Plan,
    ScrapedPost,
};
use crate::store::{
    window_start, AssessmentStore, LeadNoteStore, MemberStore, PostQuery, PostStore, PostUpdate,
    RateLimitStore,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Process-local store used by tests and by `--memory` development runs.
/// Nothing here survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    posts: RwLock<HashMap<Uuid, ScrapedPost>>,
    members: RwLock<HashMap<Uuid, Member>>,
    notes: RwLock<HashMap<(Uuid, Uuid), LeadNote>>,
    assessments: RwLock<Vec<Assessment>>,
    hits: RwLock<HashMap<(String, DateTime<Utc>), u32>>,
    pending_plans: RwLock<HashMap<String, (Plan, Option<String>)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fully formed post, bypassing the `pending_photo` default.
    pub async fn put_post(&self, post: ScrapedPost) {
        self.posts.write().await.insert(post.id, post);
    }

    pub async fn put_member(&self, member: Member) {
        self.members.write().await.insert(member.user_id, member);
    }

    pub async fn post_count(&self) -> usize {
        self.posts.read().await.len()
    }
}

fn sort_key(post: &ScrapedPost) -> DateTime<Utc> {
    post.published_at.unwrap_or(post.created_at)
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn insert_post(&self, post: NewScrapedPost) -> Result<ScrapedPost> {
        let post = post.into_post(Uuid::new_v4(), Utc::now());
        self.posts.write().await.insert(post.id, post.clone());
        Ok(post)
    }

    async fn get_post(&self, id: Uuid) -> Result<Option<ScrapedPost>> {
        Ok(self.posts.read().await.get(&id).cloned())
    }

    async fn source_url_exists(&self, source_url: &str) -> Result<bool> {
        Ok(self
            .posts
            .read()
            .await
            .values()
            .any(|p| p.source_url == source_url))
    }

    async fn list_posts(&self, query: &PostQuery) -> Result<Vec<ScrapedPost>> {
        let posts = self.posts.read().await;
        let mut matching: Vec<ScrapedPost> =
            posts.values().filter(|p| query.matches(p)).cloned().collect();
        matching.sort_by(|a, b| sort_key(b).cmp(&sort_key(a)));
        if let Some(limit) = query.limit {
            matching.truncate(limit.max(0) as usize);
        }
        Ok(matching)
    }

    async fn count_posts(&self, query: &PostQuery) -> Result<i64> {
        let posts = self.posts.read().await;
        Ok(posts.values().filter(|p| query.matches(p)).count() as i64)
    }

    async fn update_post(&self, id: Uuid, update: PostUpdate) -> Result<Option<ScrapedPost>> {
        let mut posts = self.posts.write().await;
        Ok(posts.get_mut(&id).map(|post| {
            update.apply(post);
            post.clone()
        }))
    }

    async fn delete_post(&self, id: Uuid) -> Result<bool> {
        Ok(self.posts.write().await.remove(&id).is_some())
    }

    async fn count_posts_by_source(&self, sources: &[String]) -> Result<Vec<(String, i64)>> {
        let posts = self.posts.read().await;
        let mut counts: HashMap<String, i64> = HashMap::new();
        for post in posts.values().filter(|p| sources.contains(&p.source_name)) {
            *counts.entry(post.source_name.clone()).or_insert(0) += 1;
        }
        let mut counts: Vec<(String, i64)> = counts.into_iter().collect();
        counts.sort();
        Ok(counts)
    }

    async fn delete_posts_by_source(&self, sources: &[String]) -> Result<u64> {
        let mut posts = self.posts.write().await;
        let before = posts.len();
        posts.retain(|_, p| !sources.contains(&p.source_name));
        Ok((before - posts.len()) as u64)
    }
}

#[async_trait]
impl MemberStore for MemoryStore {
    async fn get_member(&self, user_id: Uuid) -> Result<Option<Member>> {
        Ok(self.members.read().await.get(&user_id).cloned())
    }

    async fn get_member_by_email(&self, email: &str) -> Result<Option<Member>> {
        Ok(self
            .members
            .read()
            .await
            .values()
            .find(|m| m.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn get_member_by_customer(&self, customer_id: &str) -> Result<Option<Member>> {
        Ok(self
            .members
            .read()
            .await
            .values()
            .find(|m| m.stripe_customer_id.as_deref() == Some(customer_id))
            .cloned())
    }

    async fn ensure_member(&self, user_id: Uuid, email: &str) -> Result<Member> {
        let mut members = self.members.write().await;
        if let Some(member) = members.get(&user_id) {
            return Ok(member.clone());
        }

        let (plan, stripe_customer_id) = self
            .pending_plans
            .write()
            .await
            .remove(&email.trim().to_lowercase())
            .unwrap_or((Plan::Free, None));
        let now = Utc::now();
        let member = Member {
            user_id,
            email: email.to_string(),
            plan,
            stripe_customer_id,
            verified: false,
            created_at: now,
            updated_at: now,
        };
        members.insert(user_id, member.clone());
        Ok(member)
    }

    async fn record_pending_plan(
        &self,
        email: &str,
        plan: Plan,
        stripe_customer_id: Option<&str>,
    ) -> Result<()> {
        self.pending_plans.write().await.insert(
            email.trim().to_lowercase(),
            (plan, stripe_customer_id.map(str::to_string)),
        );
        Ok(())
    }

    async fn forget_pending_plan(&self, customer_id: &str) -> Result<bool> {
        let mut pending = self.pending_plans.write().await;
        let before = pending.len();
        pending.retain(|_, (_, customer)| customer.as_deref() != Some(customer_id));
        Ok(pending.len() < before)
    }

    async fn set_plan(
        &self,
        user_id: Uuid,
        plan: Plan,
        stripe_customer_id: Option<&str>,
    ) -> Result<bool> {
        let mut members = self.members.write().await;
        match members.get_mut(&user_id) {
            Some(member) => {
                member.plan = plan;
                if let Some(customer_id) = stripe_customer_id {
                    member.stripe_customer_id = Some(customer_id.to_string());
                }
                member.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl LeadNoteStore for MemoryStore {
    async fn upsert_note(&self, note: LeadNote) -> Result<LeadNote> {
        self.notes
            .write()
            .await
            .insert((note.user_id, note.lead_id), note.clone());
        Ok(note)
    }

    async fn notes_for_user(&self, user_id: Uuid) -> Result<Vec<LeadNote>> {
        let notes = self.notes.read().await;
        let mut mine: Vec<LeadNote> = notes
            .values()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        mine.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(mine)
    }
}

#[async_trait]
impl AssessmentStore for MemoryStore {
    async fn insert_assessment(&self, assessment: NewAssessment) -> Result<Assessment> {
        let assessment = assessment.into_assessment(Uuid::new_v4(), Utc::now());
        self.assessments.write().await.push(assessment.clone());
        Ok(assessment)
    }

    async fn list_assessments(&self, status: Option<AssessmentStatus>) -> Result<Vec<Assessment>> {
        let assessments = self.assessments.read().await;
        let mut out: Vec<Assessment> = assessments
            .iter()
            .filter(|a| status.is_none_or(|s| a.status == s))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn update_assessment(
        &self,
        id: Uuid,
        status: Option<AssessmentStatus>,
        admin_notes: Option<String>,
    ) -> Result<Option<Assessment>> {
        let mut assessments = self.assessments.write().await;
        Ok(assessments.iter_mut().find(|a| a.id == id).map(|a| {
            if let Some(status) = status {
                a.status = status;
            }
            if admin_notes.is_some() {
                a.admin_notes = admin_notes;
            }
            a.clone()
        }))
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn hit(&self, key: &str, window: Duration, now: DateTime<Utc>) -> Result<u32> {
        let start = window_start(now, window);
        let mut hits = self.hits.write().await;
        hits.retain(|(_, window_began), _| *window_began + window > now);
        let count = hits.entry((key.to_string(), start)).or_insert(0);
        *count += 1;
        Ok(*count)
    }
}
