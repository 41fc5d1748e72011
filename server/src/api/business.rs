//! LLM business analysis for prospective sellers and buyers.

use crate::error::{ApiError, ApiResult};
use crate::rate_limit;
use crate::state::AppState;
use axum::{
    extract::State,
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use chrono::Duration;
use futures::stream::{self, Stream, StreamExt};
use pulse_scraper::llm_adapter::{parse_json_response, TextStream};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tracing::warn;

const ANALYZE_MAX_TOKENS: u32 = 1200;
const RATE_SCOPE: &str = "analyze";

#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeRequest {
    pub business_name: Option<String>,
    pub industry: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub annual_revenue: Option<f64>,
    pub cash_flow: Option<f64>,
    pub asking_price: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessAnalysis {
    pub summary: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub valuation_range: Option<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
}

fn money(value: Option<f64>) -> String {
    value
        .map(|v| format!("${:.0}", v))
        .unwrap_or_else(|| "unknown".to_string())
}

fn text(value: &Option<String>) -> &str {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty()).unwrap_or("unknown")
}

fn analysis_prompt(request: &AnalyzeRequest) -> ApiResult<String> {
    let has_subject = [&request.industry, &request.description]
        .iter()
        .any(|v| v.as_deref().is_some_and(|s| !s.trim().is_empty()));
    if !has_subject {
        return Err(ApiError::BadRequest(
            "industry or description is required".to_string(),
        ));
    }

    Ok(format!(
        "You are an experienced business broker in Oklahoma City.\n\
         Analyze this small business for a potential sale.\n\n\
         - Name: {name}\n\
         - Industry: {industry}\n\
         - Location: {location}\n\
         - Description: {description}\n\
         - Annual revenue: {revenue}\n\
         - Cash flow (SDE): {cash_flow}\n\
         - Asking price: {asking}\n\n\
         Respond with only a JSON object: {{\"summary\": string, \"strengths\": [strings], \
         \"risks\": [strings], \"valuation_range\": string, \"next_steps\": [strings]}}.",
        name = text(&request.business_name),
        industry = text(&request.industry),
        location = text(&request.location),
        description = text(&request.description),
        revenue = money(request.annual_revenue),
        cash_flow = money(request.cash_flow),
        asking = money(request.asking_price),
    ))
}

async fn enforce_rate_limit(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    rate_limit::enforce(
        state,
        RATE_SCOPE,
        headers,
        state.settings.analyze_rate_limit,
        Duration::seconds(state.settings.analyze_rate_window_secs),
    )
    .await
}

pub async fn analyze(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AnalyzeRequest>,
) -> ApiResult<Json<BusinessAnalysis>> {
    let prompt = analysis_prompt(&request)?;
    enforce_rate_limit(&state, &headers).await?;

    let text = state.llm.complete(&prompt, ANALYZE_MAX_TOKENS).await?;
    let analysis: BusinessAnalysis = parse_json_response(&text)?;
    Ok(Json(analysis))
}

/// Turn model deltas into SSE events: one `chunk` per delta, then `done`,
/// or a single `error` if the upstream stream fails part way.
pub fn sse_events(deltas: TextStream) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(Some(deltas), |state| async move {
        let mut deltas = state?;
        let event = match deltas.next().await {
            Some(Ok(chunk)) => {
                let event = Event::default()
                    .event("chunk")
                    .json_data(serde_json::json!({ "text": chunk }))
                    .unwrap_or_else(|_| Event::default().event("chunk"));
                return Some((Ok(event), Some(deltas)));
            }
            Some(Err(e)) => {
                warn!("Analysis stream failed: {}", e);
                Event::default().event("error").data(e.to_string().replace(['\r', '\n'], " "))
            }
            None => Event::default().event("done").data("[DONE]"),
        };
        Some((Ok(event), None))
    })
}

pub async fn analyze_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AnalyzeRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let prompt = analysis_prompt(&request)?;
    enforce_rate_limit(&state, &headers).await?;

    let deltas = state.llm.complete_stream(&prompt, ANALYZE_MAX_TOKENS).await?;
    Ok(Sse::new(sse_events(deltas)).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_needs_a_subject() {
        assert!(analysis_prompt(&AnalyzeRequest::default()).is_err());

        let prompt = analysis_prompt(&AnalyzeRequest {
            industry: Some("HVAC".to_string()),
            cash_flow: Some(250_000.0),
            ..Default::default()
        })
        .unwrap();
        assert!(prompt.contains("Industry: HVAC"));
        assert!(prompt.contains("Cash flow (SDE): $250000"));
        assert!(prompt.contains("Asking price: unknown"));
    }
}
