pub mod admin;
pub mod assessment;
pub mod billing;
pub mod business;
pub mod feed;
pub mod realtor;
pub mod revalidate;

use crate::state::AppState;
use axum::routing::{get, post, put};
use axum::Router;

/// Routes under `/api`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/okc-businesses", get(feed::list_businesses))
        .route("/assessment", post(assessment::submit_assessment))
        .route("/assessment/preview", post(assessment::preview_assessment))
        .route(
            "/assessments",
            get(assessment::list_assessments).patch(assessment::update_assessment),
        )
        .route("/business/analyze", post(business::analyze))
        .route("/business/analyze/stream", post(business::analyze_stream))
        .route("/realtor/leads", get(realtor::list_leads))
        .route("/realtor/leads/export", get(realtor::export_leads))
        .route("/realtor/leads/{id}/note", put(realtor::upsert_note))
        .route("/realtor/notes", get(realtor::list_notes))
        .route("/realtor/checkout", post(realtor::checkout))
        .route("/stripe/checkout", post(billing::checkout))
        .route("/stripe/checkout-anonymous", post(billing::checkout_anonymous))
        .route("/stripe/webhook", post(billing::webhook))
        .route(
            "/revalidate",
            get(revalidate::revalidate).post(revalidate::revalidate),
        )
        .nest("/admin", admin::router())
}
