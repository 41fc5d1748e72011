//! Sell-side assessment intake, the instant LLM preview, and admin review.

use crate::auth::AdminSession;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use interfaces::{Assessment, AssessmentStatus, NewAssessment};
use pulse_scraper::llm_adapter::parse_json_response;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

const PREVIEW_MAX_TOKENS: u32 = 600;

fn required(value: &str, field: &str, problems: &mut Vec<String>) {
    if value.trim().is_empty() {
        problems.push(format!("{} is required", field));
    }
}

pub fn validate_assessment(form: &NewAssessment) -> Result<(), ApiError> {
    let mut problems = Vec::new();
    required(&form.contact_name, "contact_name", &mut problems);
    required(&form.business_name, "business_name", &mut problems);
    required(&form.industry, "industry", &mut problems);
    if !form.email.contains('@') {
        problems.push("email must be a valid address".to_string());
    }
    for (field, value) in [("annual_revenue", form.annual_revenue), ("cash_flow", form.cash_flow)] {
        if value.is_some_and(|v| v < 0.0) {
            problems.push(format!("{} cannot be negative", field));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(problems.join("; ")))
    }
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub id: Uuid,
}

pub async fn submit_assessment(
    State(state): State<AppState>,
    Json(form): Json<NewAssessment>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    validate_assessment(&form)?;
    let assessment = state.store.insert_assessment(form).await?;
    info!(id = %assessment.id, business = %assessment.business_name, "Assessment submitted");
    Ok((StatusCode::CREATED, Json(SubmitResponse { id: assessment.id })))
}

/// Partially filled form used for the instant preview.
#[derive(Debug, Default, Deserialize)]
pub struct PreviewRequest {
    pub industry: Option<String>,
    pub business_name: Option<String>,
    pub annual_revenue: Option<f64>,
    pub cash_flow: Option<f64>,
    pub years_in_business: Option<i32>,
    pub employees: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentPreview {
    pub headline: String,
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default)]
    pub valuation_hint: Option<String>,
}

fn describe(label: &str, value: Option<String>) -> String {
    format!("- {}: {}\n", label, value.unwrap_or_else(|| "not provided".to_string()))
}

fn preview_prompt(industry: &str, form: &PreviewRequest) -> String {
    let mut facts = describe("Industry", Some(industry.to_string()));
    facts.push_str(&describe("Business", form.business_name.clone()));
    facts.push_str(&describe("Annual revenue", form.annual_revenue.map(|v| format!("${:.0}", v))));
    facts.push_str(&describe("Cash flow (SDE)", form.cash_flow.map(|v| format!("${:.0}", v))));
    facts.push_str(&describe("Years in business", form.years_in_business.map(|v| v.to_string())));
    facts.push_str(&describe("Employees", form.employees.map(|v| v.to_string())));

    format!(
        "You advise owners of small Oklahoma businesses who are thinking about selling.\n\
         Based only on the facts below, give a short, encouraging first read.\n\n\
         {facts}\n\
         Respond with only a JSON object: {{\"headline\": string, \"insights\": [three short strings], \
         \"valuation_hint\": string or null}}. Give valuation_hint as a typical multiple of cash flow \
         for this industry when cash flow is known."
    )
}

pub async fn preview_assessment(
    State(state): State<AppState>,
    Json(form): Json<PreviewRequest>,
) -> ApiResult<Json<AssessmentPreview>> {
    let industry = form
        .industry
        .as_deref()
        .map(str::trim)
        .filter(|i| !i.is_empty())
        .ok_or_else(|| ApiError::BadRequest("industry is required".to_string()))?;

    let text = state.llm.complete(&preview_prompt(industry, &form), PREVIEW_MAX_TOKENS).await?;
    let preview: AssessmentPreview = parse_json_response(&text)?;
    Ok(Json(preview))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<AssessmentStatus>,
}

pub async fn list_assessments(
    State(state): State<AppState>,
    AdminSession(_admin): AdminSession,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<Assessment>>> {
    Ok(Json(state.store.list_assessments(params.status).await?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub id: Uuid,
    pub status: Option<AssessmentStatus>,
    pub admin_notes: Option<String>,
}

pub async fn update_assessment(
    State(state): State<AppState>,
    AdminSession(admin): AdminSession,
    Json(request): Json<UpdateRequest>,
) -> ApiResult<Json<Assessment>> {
    let updated = state
        .store
        .update_assessment(request.id, request.status, request.admin_notes)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Assessment {} not found", request.id)))?;
    info!(id = %updated.id, status = ?updated.status, by = %admin.email, "Assessment updated");
    Ok(Json(updated))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> NewAssessment {
        NewAssessment {
            contact_name: "Dana".to_string(),
            email: "dana@example.com".to_string(),
            business_name: "Paseo Print Shop".to_string(),
            industry: "printing".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn complete_form_passes() {
        assert!(validate_assessment(&form()).is_ok());
    }

    #[test]
    fn problems_are_collected() {
        let mut bad = form();
        bad.email = "dana.example.com".to_string();
        bad.industry = "  ".to_string();
        bad.cash_flow = Some(-1.0);
        let Err(ApiError::Validation(details)) = validate_assessment(&bad) else {
            panic!("expected validation error");
        };
        assert!(details.contains("industry is required"));
        assert!(details.contains("email"));
        assert!(details.contains("cash_flow"));
    }
}
