mod common;

use axum::http::{Method, StatusCode};
use common::*;
use serde_json::json;

fn form() -> serde_json::Value {
    json!({
        "contact_name": "Dana Ruiz",
        "email": "dana@example.com",
        "phone": "405-555-0100",
        "business_name": "Paseo Print Shop",
        "industry": "printing",
        "annual_revenue": 850000.0,
        "cash_flow": 210000.0,
        "years_in_business": 12,
        "employees": 6,
        "reason_for_selling": "Retiring",
        "timeline": "6-12 months",
    })
}

#[tokio::test]
async fn assessment_is_stored_and_reviewed() {
    let app = TestApp::new();

    let (status, created) = app.send_json(post_json("/api/assessment", None, form())).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap().to_string();

    let admin = app.admin_token().await;
    let (status, list) = app.send_json(get("/api/assessments", Some(&admin))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["business_name"], "Paseo Print Shop");
    assert_eq!(list[0]["status"], "new");

    let (status, updated) = app
        .send_json(json_request(
            Method::PATCH,
            "/api/assessments",
            Some(&admin),
            json!({ "id": id, "status": "contacted", "admin_notes": "Left voicemail" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "contacted");
    assert_eq!(updated["admin_notes"], "Left voicemail");

    let (status, _) = app
        .send(json_request(
            Method::PATCH,
            "/api/assessments",
            Some(&admin),
            json!({ "id": uuid::Uuid::new_v4(), "status": "contacted" }),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_assessment_is_rejected() {
    let app = TestApp::new();
    let mut bad = form();
    bad["email"] = json!("dana.example.com");
    bad["industry"] = json!("");

    let (status, body) = app.send_json(post_json("/api/assessment", None, bad)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Validation failed");
    assert!(body["details"].as_str().unwrap().contains("industry is required"));
}

#[tokio::test]
async fn assessments_are_admin_only() {
    let app = TestApp::new();
    let (_, owner) = app.member("owner@example.com", interfaces::Plan::Member).await;
    let (status, _) = app.send(get("/api/assessments", Some(&owner))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn preview_uses_llm() {
    let app = TestApp::new();

    let (status, _) = app
        .send(post_json("/api/assessment/preview", None, json!({ "business_name": "Shop" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, preview) = app
        .send_json(post_json(
            "/api/assessment/preview",
            None,
            json!({ "industry": "printing", "cash_flow": 210000.0 }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(preview["headline"], "Strong fundamentals");
    assert_eq!(preview["valuation_hint"], "2.5x SDE");
}

#[tokio::test]
async fn analysis_is_rate_limited_per_client() {
    let app = TestApp::new();
    let request = |ip: &str| {
        let mut request = post_json(
            "/api/business/analyze",
            None,
            json!({ "industry": "HVAC", "description": "Residential service company" }),
        );
        request
            .headers_mut()
            .insert("x-forwarded-for", ip.parse().unwrap());
        request
    };

    for _ in 0..2 {
        let (status, body) = app.send_json(request("203.0.113.7")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["summary"], "A healthy local shop");
    }

    let response = tower::ServiceExt::oneshot(app.app.clone(), request("203.0.113.7"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));

    // Another client has its own budget.
    let (status, _) = app.send(request("198.51.100.4")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn analysis_needs_a_subject() {
    let app = TestApp::new();
    let (status, _) = app
        .send(post_json("/api/business/analyze", None, json!({ "business_name": "Shop" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn streamed_analysis_ends_with_done() {
    let app = TestApp::new();
    let (status, body) = app
        .send(post_json(
            "/api/business/analyze/stream",
            None,
            json!({ "industry": "HVAC" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8_lossy(&body);
    assert!(text.contains("event: chunk"));
    assert!(text.trim_end().ends_with("data: [DONE]"));
}
