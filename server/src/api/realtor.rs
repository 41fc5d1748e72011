//! Realtor lead feed, CSV export, notes and checkout.

use crate::api::billing::start_checkout;
use crate::auth::{Session, SessionUser};
use crate::billing::CheckoutSession;
use crate::error::{ApiError, ApiResult};
use crate::leads::{leads_to_csv, sort_leads, LeadFilter, ScoredLead};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::{Duration, Utc};
use interfaces::{ContactStatus, DataType, LeadNote, Plan, PostQuery, PostStatus};
use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;

const DEFAULT_LEAD_LIMIT: usize = 100;
const MAX_LEAD_LIMIT: usize = 1000;

/// Leads are for the realtor plan; admins can always look.
async fn require_realtor(state: &AppState, user: &SessionUser) -> ApiResult<()> {
    if state.settings.is_admin(&user.email) {
        return Ok(());
    }
    let member = state.store.ensure_member(user.user_id, &user.email).await?;
    if member.plan != Plan::Realtor {
        return Err(ApiError::Forbidden("Realtor plan required".to_string()));
    }
    Ok(())
}

async fn load_leads(state: &AppState, user: &SessionUser, filter: &LeadFilter) -> ApiResult<Vec<ScoredLead>> {
    let data_types = match filter.data_type.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        Some(t) => vec![t
            .parse::<DataType>()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?],
        None => Vec::new(),
    };

    let now = Utc::now();
    let query = PostQuery {
        scraped_since: Some(now - Duration::days(state.settings.leads_window_days)),
        only_public_records: true,
        data_types,
        ..Default::default()
    };
    let posts = state.store.list_posts(&query).await?;

    let notes: HashMap<Uuid, LeadNote> = state
        .store
        .notes_for_user(user.user_id)
        .await?
        .into_iter()
        .map(|note| (note.lead_id, note))
        .collect();

    let mut leads: Vec<ScoredLead> = posts
        .into_iter()
        .filter(|post| post.status != PostStatus::Deleted)
        .map(|post| {
            let id = post.id;
            ScoredLead::new(post, now).with_note(notes.get(&id))
        })
        .filter(|lead| filter.keeps(lead))
        .collect();

    sort_leads(&mut leads);
    leads.truncate(filter.limit.unwrap_or(DEFAULT_LEAD_LIMIT).min(MAX_LEAD_LIMIT));
    Ok(leads)
}

pub async fn list_leads(
    State(state): State<AppState>,
    Session(user): Session,
    Query(filter): Query<LeadFilter>,
) -> ApiResult<Json<Vec<ScoredLead>>> {
    require_realtor(&state, &user).await?;
    Ok(Json(load_leads(&state, &user, &filter).await?))
}

pub async fn export_leads(
    State(state): State<AppState>,
    Session(user): Session,
    Query(filter): Query<LeadFilter>,
) -> ApiResult<impl IntoResponse> {
    require_realtor(&state, &user).await?;
    let leads = load_leads(&state, &user, &filter).await?;
    let filename = format!("okc-leads-{}.csv", Utc::now().format("%Y-%m-%d"));

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        leads_to_csv(&leads),
    ))
}

pub async fn list_notes(
    State(state): State<AppState>,
    Session(user): Session,
) -> ApiResult<Json<Vec<LeadNote>>> {
    require_realtor(&state, &user).await?;
    Ok(Json(state.store.notes_for_user(user.user_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct NoteBody {
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub contact_status: ContactStatus,
}

pub async fn upsert_note(
    State(state): State<AppState>,
    Session(user): Session,
    Path(lead_id): Path<Uuid>,
    Json(body): Json<NoteBody>,
) -> ApiResult<Json<LeadNote>> {
    require_realtor(&state, &user).await?;
    if state.store.get_post(lead_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Lead {} not found", lead_id)));
    }

    let note = state
        .store
        .upsert_note(LeadNote {
            user_id: user.user_id,
            lead_id,
            note: body.note.trim().to_string(),
            contact_status: body.contact_status,
            updated_at: Utc::now(),
        })
        .await?;
    Ok(Json(note))
}

pub async fn checkout(
    State(state): State<AppState>,
    Session(user): Session,
) -> ApiResult<Json<CheckoutSession>> {
    state.store.ensure_member(user.user_id, &user.email).await?;
    let email = Some(user.email.clone()).filter(|e| !e.is_empty());
    let session = start_checkout(&state, Plan::Realtor, email, Some(user.user_id)).await?;
    Ok(Json(session))
}
