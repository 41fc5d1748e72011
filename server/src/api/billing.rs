//! Checkout endpoints and the Stripe webhook.

use crate::auth::Session;
use crate::billing::{verify_webhook_signature, CheckoutRequest, CheckoutSession, WebhookEvent};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use interfaces::{Member, Plan};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

/// Build and send a checkout for `plan`.
pub(crate) async fn start_checkout(
    state: &AppState,
    plan: Plan,
    customer_email: Option<String>,
    user_id: Option<Uuid>,
) -> ApiResult<CheckoutSession> {
    let settings = &state.settings;
    let (price_id, price_var) = match plan {
        Plan::Realtor => (settings.realtor_price_id.clone(), "STRIPE_REALTOR_PRICE_ID"),
        Plan::Member => (settings.member_price_id.clone(), "STRIPE_PRICE_ID"),
        Plan::Free => return Err(ApiError::BadRequest("The free plan needs no checkout".to_string())),
    };
    let price_id = price_id
        .ok_or_else(|| ApiError::Unavailable(format!("Billing is not configured: {} not set", price_var)))?;

    let request = CheckoutRequest {
        plan,
        price_id,
        customer_email,
        user_id,
        success_url: format!("{}/okc-pulse?checkout=success", settings.site_url),
        cancel_url: format!("{}/pricing?checkout=cancelled", settings.site_url),
    };
    Ok(state.billing.create_checkout_session(request).await?)
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckoutBody {
    pub plan: Option<Plan>,
}

pub async fn checkout(
    State(state): State<AppState>,
    Session(user): Session,
    body: Option<Json<CheckoutBody>>,
) -> ApiResult<Json<CheckoutSession>> {
    let plan = body.and_then(|Json(b)| b.plan).unwrap_or(Plan::Member);
    state.store.ensure_member(user.user_id, &user.email).await?;
    let email = Some(user.email.clone()).filter(|e| !e.is_empty());
    let session = start_checkout(&state, plan, email, Some(user.user_id)).await?;
    Ok(Json(session))
}

#[derive(Debug, Default, Deserialize)]
pub struct AnonymousCheckoutBody {
    pub email: Option<String>,
}

pub async fn checkout_anonymous(
    State(state): State<AppState>,
    body: Option<Json<AnonymousCheckoutBody>>,
) -> ApiResult<Json<CheckoutSession>> {
    let email = body
        .and_then(|Json(b)| b.email)
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty());
    if email.as_deref().is_some_and(|e| !e.contains('@')) {
        return Err(ApiError::Validation("email must be a valid address".to_string()));
    }
    let session = start_checkout(&state, Plan::Member, email, None).await?;
    Ok(Json(session))
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

fn str_at<'a>(object: &'a Value, pointer: &str) -> Option<&'a str> {
    object.pointer(pointer).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn checkout_email(session: &Value) -> Option<&str> {
    str_at(session, "/customer_details/email").or_else(|| str_at(session, "/customer_email"))
}

/// Member a completed checkout belongs to: the user id from metadata,
/// otherwise the checkout email.
async fn checkout_member(state: &AppState, session: &Value) -> anyhow::Result<Option<Member>> {
    if let Some(user_id) = str_at(session, "/metadata/user_id").and_then(|id| id.parse::<Uuid>().ok()) {
        if let Some(member) = state.store.get_member(user_id).await? {
            return Ok(Some(member));
        }
    }

    match checkout_email(session) {
        Some(email) => state.store.get_member_by_email(email).await,
        None => Ok(None),
    }
}

async fn handle_checkout_completed(state: &AppState, session: &Value) -> anyhow::Result<()> {
    let plan = str_at(session, "/metadata/plan")
        .and_then(|p| p.parse::<Plan>().ok())
        .unwrap_or(Plan::Member);
    let customer = str_at(session, "/customer");

    if let Some(member) = checkout_member(state, session).await? {
        state.store.set_plan(member.user_id, plan, customer).await?;
        info!(user_id = %member.user_id, %plan, "Checkout completed, plan updated");
        return Ok(());
    }

    // Paid before signing up: hold the plan until the first sign-in.
    match checkout_email(session) {
        Some(email) => {
            state.store.record_pending_plan(email, plan, customer).await?;
            info!(%plan, "Checkout completed before sign-up, plan held for the buyer's email");
        }
        None => warn!(
            session = str_at(session, "/id").unwrap_or("unknown"),
            "Checkout completed without a member or an email"
        ),
    }
    Ok(())
}

async fn handle_subscription_deleted(state: &AppState, subscription: &Value) -> anyhow::Result<()> {
    let Some(customer) = str_at(subscription, "/customer") else {
        warn!("Subscription deleted without a customer id");
        return Ok(());
    };

    match state.store.get_member_by_customer(customer).await? {
        Some(member) => {
            state.store.set_plan(member.user_id, Plan::Free, None).await?;
            info!(user_id = %member.user_id, "Subscription ended, downgraded to free");
        }
        None => {
            if state.store.forget_pending_plan(customer).await? {
                info!(customer, "Subscription ended before sign-up, pending plan dropped");
            } else {
                warn!(customer, "Subscription deleted for an unknown customer");
            }
        }
    }
    Ok(())
}

pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookAck>> {
    let secret = state
        .settings
        .stripe_webhook_secret
        .as_deref()
        .ok_or_else(|| ApiError::Unavailable("STRIPE_WEBHOOK_SECRET not set".to_string()))?;
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("Missing Stripe-Signature header".to_string()))?;

    verify_webhook_signature(&body, signature, secret, Utc::now().timestamp())?;

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid event payload: {}", e)))?;

    match event.event_type.as_str() {
        "checkout.session.completed" => handle_checkout_completed(&state, &event.data.object).await?,
        "customer.subscription.deleted" => {
            handle_subscription_deleted(&state, &event.data.object).await?
        }
        other => info!(event = other, "Ignoring Stripe event"),
    }

    Ok(Json(WebhookAck { received: true }))
}
