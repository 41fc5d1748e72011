mod common;

use axum::http::StatusCode;
use common::*;
use interfaces::{MemberStore, Plan};

async fn seed_feed(app: &TestApp, count: i64) {
    for i in 0..count {
        app.store.put_post(published_post(&format!("Story {}", i), i + 1)).await;
    }
}

#[tokio::test]
async fn anonymous_visitors_get_the_free_allowance() {
    let app = TestApp::new();
    seed_feed(&app, 12).await;

    let (status, body) = app.send_json(get("/api/okc-businesses", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["plan"], "free");
    assert_eq!(body["posts"].as_array().unwrap().len(), 5);
    assert_eq!(body["has_more"], true);
    assert_eq!(body["total_available"], 12);
    // Newest first.
    assert_eq!(body["posts"][0]["title"], "Story 0");
}

#[tokio::test]
async fn free_session_never_sees_more_than_five() {
    let app = TestApp::new();
    seed_feed(&app, 40).await;
    let user_id = uuid::Uuid::new_v4();
    let session = token(user_id, "new@example.com");

    let (status, body) = app.send_json(get("/api/okc-businesses", Some(&session))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["posts"].as_array().unwrap().len(), 5);
    assert_eq!(body["limit"], 5);

    // First authenticated look creates the member row.
    let member = app.store.get_member(user_id).await.unwrap().unwrap();
    assert_eq!(member.plan, Plan::Free);
}

#[tokio::test]
async fn members_see_the_whole_window() {
    let app = TestApp::new();
    seed_feed(&app, 12).await;
    // Outside the 30 day window.
    app.store.put_post(published_post("Old story", 24 * 45)).await;
    // Not published yet.
    app.store.put_post(pending_post("Draft", "OKC Business Wire")).await;
    let (_, session) = app.member("member@example.com", Plan::Member).await;

    let (status, body) = app.send_json(get("/api/okc-businesses", Some(&session))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["plan"], "member");
    assert_eq!(body["posts"].as_array().unwrap().len(), 12);
    assert_eq!(body["has_more"], false);
}

#[tokio::test]
async fn category_filter_narrows_feed() {
    let app = TestApp::new();
    seed_feed(&app, 3).await;
    let mut permit = published_post("Tower permit filed", 1);
    permit.category = Some("development".to_string());
    app.store.put_post(permit).await;

    let (status, body) = app
        .send_json(get("/api/okc-businesses?category=development", None))
        .await;
    assert_eq!(status, StatusCode::OK);
    let posts = body["posts"].as_array().unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["title"], "Tower permit filed");
}

#[tokio::test]
async fn feed_page_renders_with_upsell() {
    let app = TestApp::new();
    seed_feed(&app, 7).await;

    let (status, body) = app.send(get("/okc-pulse", None)).await;
    assert_eq!(status, StatusCode::OK);
    let html = String::from_utf8_lossy(&body);
    assert!(html.contains("Story 0"));
    assert!(!html.contains("Story 6"));
    assert!(html.contains("You are seeing 5 of 7 recent stories"));
}

#[tokio::test]
async fn marketing_pages_render() {
    let app = TestApp::new();
    for path in ["/", "/pricing", "/assessment"] {
        let (status, body) = app.send(get(path, None)).await;
        assert_eq!(status, StatusCode::OK, "{}", path);
        assert!(String::from_utf8_lossy(&body).contains("DealSprints"));
    }
}

#[tokio::test]
async fn revalidate_requires_secret() {
    let app = TestApp::new();
    seed_feed(&app, 1).await;

    let (status, _) = app.send(get("/api/revalidate", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.send(get("/api/revalidate?secret=guess", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Warm the cache, then add a story the cached page does not show.
    app.send(get("/okc-pulse", None)).await;
    app.store.put_post(published_post("Fresh story", 0)).await;
    let (_, cached) = app.send(get("/okc-pulse", None)).await;
    assert!(!String::from_utf8_lossy(&cached).contains("Fresh story"));

    let (status, body) = app
        .send_json(get(
            &format!("/api/revalidate?secret={}&path=/okc-pulse", REVALIDATE_SECRET),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revalidated"], true);
    assert!(body["now"].as_i64().unwrap() > 0);

    let (_, fresh) = app.send(get("/okc-pulse", None)).await;
    assert!(String::from_utf8_lossy(&fresh).contains("Fresh story"));
}
