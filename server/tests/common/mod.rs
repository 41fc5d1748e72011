#![allow(dead_code)]

use axum::{
    body::{Body, Bytes},
    http::{header, Method, Request, StatusCode},
    Router,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use dealsprints_server::{
    auth::{Claims, SUPABASE_AUDIENCE},
    billing::{BillingError, CheckoutProvider, CheckoutRequest, CheckoutSession},
    router, AppState, Settings,
};
use http_body_util::BodyExt;
use interfaces::{DataType, Member, MemoryStore, NewScrapedPost, Plan, PostStatus, ScrapedPost};
use jsonwebtoken::{encode, EncodingKey, Header};
use pulse_scraper::MockLlmAdapter;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use uuid::Uuid;

pub const JWT_SECRET: &str = "test-jwt-secret-with-at-least-32-characters";
pub const ADMIN_EMAIL: &str = "admin@dealsprints.com";
pub const CRON_SECRET: &str = "cron-secret";
pub const REVALIDATE_SECRET: &str = "revalidate-secret";
pub const WEBHOOK_SECRET: &str = "whsec_test";

/// Answers both the assessment preview and the business analysis shapes.
pub const LLM_RESPONSE: &str = r#"{"headline": "Strong fundamentals", "insights": ["Steady cash flow"], "valuation_hint": "2.5x SDE", "summary": "A healthy local shop", "strengths": ["Loyal customers"], "risks": ["Owner dependence"], "next_steps": ["Gather financials"]}"#;

/// Records checkout requests instead of calling Stripe.
#[derive(Default)]
pub struct FakeCheckout {
    pub requests: Mutex<Vec<CheckoutRequest>>,
}

#[async_trait]
impl CheckoutProvider for FakeCheckout {
    async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, BillingError> {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request);
        let id = format!("cs_test_{}", requests.len());
        Ok(CheckoutSession {
            url: Some(format!("https://checkout.stripe.test/{}", id)),
            id,
        })
    }
}

pub fn test_settings() -> Settings {
    Settings {
        admin_emails: vec![ADMIN_EMAIL.to_string()],
        cron_secret: Some(CRON_SECRET.to_string()),
        revalidate_secret: Some(REVALIDATE_SECRET.to_string()),
        stripe_webhook_secret: Some(WEBHOOK_SECRET.to_string()),
        member_price_id: Some("price_member".to_string()),
        realtor_price_id: Some("price_realtor".to_string()),
        analyze_rate_limit: 2,
        ..Default::default()
    }
}

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub checkout: Arc<FakeCheckout>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    pub fn with_settings(settings: Settings) -> Self {
        let store = Arc::new(MemoryStore::new());
        let checkout = Arc::new(FakeCheckout::default());
        let llm = Arc::new(MockLlmAdapter::new("test").with_response(LLM_RESPONSE));
        let state = AppState::new(store.clone(), llm, checkout.clone(), JWT_SECRET, settings);
        Self {
            app: router(state.clone()),
            state,
            store,
            checkout,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Bytes) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body)
    }

    pub async fn send_json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = self.send(request).await;
        let value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, value)
    }

    /// A member row on `plan` plus a session token for it.
    pub async fn member(&self, email: &str, plan: Plan) -> (Uuid, String) {
        let user_id = Uuid::new_v4();
        let now = Utc::now();
        self.store
            .put_member(Member {
                user_id,
                email: email.to_string(),
                plan,
                stripe_customer_id: None,
                verified: true,
                created_at: now,
                updated_at: now,
            })
            .await;
        (user_id, token(user_id, email))
    }

    pub async fn admin_token(&self) -> String {
        self.member(ADMIN_EMAIL, Plan::Free).await.1
    }
}

pub fn token(user_id: Uuid, email: &str) -> String {
    let claims = Claims {
        sub: user_id,
        email: Some(email.to_string()),
        exp: (Utc::now().timestamp() + 3600) as u64,
        aud: Some(SUPABASE_AUDIENCE.to_string()),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn json_request(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    json_request(Method::POST, uri, token, body)
}

/// A scraped news post awaiting a photo.
pub fn pending_post(title: &str, source_name: &str) -> ScrapedPost {
    NewScrapedPost {
        title: title.to_string(),
        summary: Some(format!("{} summary", title)),
        category: Some("restaurants".to_string()),
        source_name: source_name.to_string(),
        source_url: format!("https://news.example.com/{}", Uuid::new_v4()),
        ..Default::default()
    }
    .into_post(Uuid::new_v4(), Utc::now())
}

/// A live post, published `hours_ago`.
pub fn published_post(title: &str, hours_ago: i64) -> ScrapedPost {
    let mut post = pending_post(title, "OKC Business Wire");
    post.status = PostStatus::Published;
    post.photo_url = Some("https://images.example.com/photo.jpg".to_string());
    post.published_at = Some(Utc::now() - Duration::hours(hours_ago));
    post
}

/// A public-record post as the lead feed sees it.
pub fn record_post(title: &str, data_type: DataType, value: Option<f64>, days_ago: i64) -> ScrapedPost {
    let mut post = pending_post(title, "OKC permits records (data.okc.gov)");
    post.category = Some("development".to_string());
    post.data_type = Some(data_type);
    post.data_value = value;
    post.data_address = Some("100 N Broadway Ave".to_string());
    post.scraped_date = Some(Utc::now() - Duration::days(days_ago));
    post
}
