//! Stripe checkout sessions and webhook verification.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use interfaces::Plan;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

const STRIPE_CHECKOUT_URL: &str = "https://api.stripe.com/v1/checkout/sessions";

/// Maximum age of a webhook signature timestamp.
pub const WEBHOOK_TOLERANCE_SECS: i64 = 300;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("{0} not set")]
    NotConfigured(&'static str),

    #[error("Stripe request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Stripe returned {status}: {message}")]
    Stripe { status: u16, message: String },

    #[error("{0}")]
    InvalidSignature(String),

    #[error("Failed to encode request: {0}")]
    Encode(#[from] serde_urlencoded::ser::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRequest {
    pub plan: Plan,
    pub price_id: String,
    pub customer_email: Option<String>,
    pub user_id: Option<Uuid>,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[async_trait]
pub trait CheckoutProvider: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, BillingError>;
}

pub struct StripeClient {
    secret_key: Option<String>,
    client: reqwest::Client,
}

impl StripeClient {
    pub fn new(secret_key: Option<String>) -> Result<Self, BillingError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            secret_key: secret_key.filter(|k| !k.is_empty()),
            client,
        })
    }
}

/// Form fields for a subscription checkout session. The plan and user id
/// ride along in metadata so the webhook can apply them.
pub fn checkout_form(request: &CheckoutRequest) -> Vec<(String, String)> {
    let mut form = vec![
        ("mode".to_string(), "subscription".to_string()),
        ("line_items[0][price]".to_string(), request.price_id.clone()),
        ("line_items[0][quantity]".to_string(), "1".to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
        ("metadata[plan]".to_string(), request.plan.as_str().to_string()),
    ];
    if let Some(email) = &request.customer_email {
        form.push(("customer_email".to_string(), email.clone()));
    }
    if let Some(user_id) = request.user_id {
        form.push(("client_reference_id".to_string(), user_id.to_string()));
        form.push(("metadata[user_id]".to_string(), user_id.to_string()));
    }
    form
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: String,
}

#[async_trait]
impl CheckoutProvider for StripeClient {
    async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, BillingError> {
        let secret_key = self
            .secret_key
            .as_deref()
            .ok_or(BillingError::NotConfigured("STRIPE_SECRET_KEY"))?;

        let body = serde_urlencoded::to_string(checkout_form(&request))?;
        let response = self
            .client
            .post(STRIPE_CHECKOUT_URL)
            .bearer_auth(secret_key)
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<StripeErrorBody>(&text)
                .map(|b| b.error.message)
                .unwrap_or(text);
            return Err(BillingError::Stripe {
                status: status.as_u16(),
                message,
            });
        }

        let session: CheckoutSession = response.json().await?;
        info!("Created {} checkout session {}", request.plan, session.id);
        Ok(session)
    }
}

fn signature_for(payload: &[u8], secret: &str, timestamp: i64) -> Result<HmacSha256, BillingError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| BillingError::InvalidSignature(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Build a `Stripe-Signature` header value for `payload`.
pub fn sign_webhook_payload(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, BillingError> {
    let signature = signature_for(payload, secret, timestamp)?.finalize().into_bytes();
    Ok(format!("t={},v1={}", timestamp, hex::encode(signature)))
}

/// Check a `Stripe-Signature` header (`t=...,v1=...[,v1=...]`) against the
/// raw request body.
pub fn verify_webhook_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), BillingError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| BillingError::InvalidSignature("missing timestamp".to_string()))?;
    if (now - timestamp).abs() > WEBHOOK_TOLERANCE_SECS {
        return Err(BillingError::InvalidSignature(
            "timestamp outside tolerance".to_string(),
        ));
    }

    let matched = signatures.iter().any(|sig| {
        let Ok(expected) = hex::decode(sig) else {
            return false;
        };
        signature_for(payload, secret, timestamp)
            .map(|mac| mac.verify_slice(&expected).is_ok())
            .unwrap_or(false)
    });

    if matched {
        debug!("Webhook signature verified");
        Ok(())
    } else {
        Err(BillingError::InvalidSignature(
            "no matching v1 signature".to_string(),
        ))
    }
}

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEventData {
    pub object: serde_json::Value,
}
