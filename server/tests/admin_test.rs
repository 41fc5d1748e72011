mod common;

use axum::http::StatusCode;
use common::*;
use interfaces::{Plan, PostStatus, PostStore};
use serde_json::json;

#[tokio::test]
async fn moderation_requires_an_admin_session() {
    let app = TestApp::new();
    let (_, reader) = app.member("reader@example.com", Plan::Member).await;

    let (status, _) = app.send(get("/api/admin/posts", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.send(get("/api/admin/posts", Some("not-a-jwt"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.send(get("/api/admin/posts", Some(&reader))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = app.admin_token().await;
    let (status, body) = app.send_json(get("/api/admin/posts", Some(&admin))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn list_filters_by_status() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    app.store.put_post(pending_post("Taco shop opens", "OKC Business Wire")).await;
    app.store.put_post(published_post("Brewery expands", 2)).await;

    let (status, body) = app
        .send_json(get("/api/admin/posts?status=pending_photo", Some(&admin)))
        .await;
    assert_eq!(status, StatusCode::OK);
    let posts = body.as_array().unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["title"], "Taco shop opens");
    assert_eq!(posts[0]["status"], "pending_photo");
}

#[tokio::test]
async fn publish_rejects_post_without_photo() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let post = pending_post("Taco shop opens", "OKC Business Wire");
    let id = post.id;
    app.store.put_post(post).await;

    let (status, _) = app
        .send(post_json("/api/admin/publish-post", Some(&admin), json!({ "post_id": id })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let stored = app.store.get_post(id).await.unwrap().unwrap();
    assert_eq!(stored.status, PostStatus::PendingPhoto);
    assert_eq!(stored.published_at, None);
}

#[tokio::test]
async fn attach_publish_then_unpublish() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let post = pending_post("Taco shop opens", "OKC Business Wire");
    let id = post.id;
    app.store.put_post(post).await;

    let (status, _) = app
        .send(post_json(
            "/api/admin/attach-photo",
            Some(&admin),
            json!({ "post_id": id, "photo_url": "javascript:alert(1)" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .send_json(post_json(
            "/api/admin/attach-photo",
            Some(&admin),
            json!({ "post_id": id, "photo_url": "https://images.example.com/taco.jpg" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["post"]["photo_url"], "https://images.example.com/taco.jpg");

    let (status, body) = app
        .send_json(post_json("/api/admin/publish-post", Some(&admin), json!({ "post_id": id })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["post"]["status"], "published");
    assert!(body["post"]["published_at"].is_string());

    let (status, body) = app
        .send_json(post_json("/api/admin/unpublish-post", Some(&admin), json!({ "post_id": id })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["post"]["status"], "pending_photo");
    assert!(body["post"]["published_at"].is_null());

    let stored = app.store.get_post(id).await.unwrap().unwrap();
    assert_eq!(stored.status, PostStatus::PendingPhoto);
    assert_eq!(stored.published_at, None);
    assert!(stored.photo_url.is_some());
}

#[tokio::test]
async fn publishing_refreshes_cached_feed_page() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let mut post = pending_post("Food hall coming to Midtown", "OKC Business Wire");
    post.photo_url = Some("https://images.example.com/hall.jpg".to_string());
    let id = post.id;
    app.store.put_post(post).await;

    let (_, before) = app.send(get("/okc-pulse", None)).await;
    assert!(!String::from_utf8_lossy(&before).contains("Food hall coming to Midtown"));

    let (status, _) = app
        .send(post_json("/api/admin/publish-post", Some(&admin), json!({ "post_id": id })))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, after) = app.send(get("/okc-pulse", None)).await;
    assert!(String::from_utf8_lossy(&after).contains("Food hall coming to Midtown"));
}

#[tokio::test]
async fn reject_soft_deletes_and_delete_removes() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let rejected = pending_post("Rumor", "OKC Business Wire");
    let removed = pending_post("Duplicate", "OKC Business Wire");
    let (rejected_id, removed_id) = (rejected.id, removed.id);
    app.store.put_post(rejected).await;
    app.store.put_post(removed).await;

    let (status, _) = app
        .send(post_json("/api/admin/reject-post", Some(&admin), json!({ "post_id": rejected_id })))
        .await;
    assert_eq!(status, StatusCode::OK);
    let stored = app.store.get_post(rejected_id).await.unwrap().unwrap();
    assert_eq!(stored.status, PostStatus::Deleted);

    let (status, _) = app
        .send(post_json("/api/admin/delete-post", Some(&admin), json!({ "post_id": removed_id })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(app.store.get_post(removed_id).await.unwrap().is_none());

    let (status, _) = app
        .send(post_json("/api/admin/delete-post", Some(&admin), json!({ "post_id": removed_id })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cleanup_dry_run_matches_live_run() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    app.store.put_post(pending_post("Story A", "The Oklahoman")).await;
    app.store.put_post(pending_post("Story B", "The Oklahoman")).await;
    app.store.put_post(pending_post("Story C", "KFOR")).await;
    let kept = pending_post("Story D", "OKC Business Wire");
    let kept_id = kept.id;
    app.store.put_post(kept).await;
    // Only exact source names count.
    app.store.put_post(pending_post("Story E", "Oklahoman Fan Blog")).await;

    let (status, dry) = app
        .send_json(post_json(
            "/api/admin/cleanup-copyrighted",
            Some(&admin),
            json!({ "dry_run": true }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dry["dry_run"], true);
    assert_eq!(dry["total"], 3);
    assert_eq!(dry["deleted"], 0);
    assert_eq!(app.store.post_count().await, 5);

    let (status, live) = app
        .send_json(post_json(
            "/api/admin/cleanup-copyrighted",
            Some(&admin),
            json!({ "dry_run": false }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(live["sources"], dry["sources"]);
    assert_eq!(live["total"], dry["total"]);
    assert_eq!(live["deleted"], 3);

    assert_eq!(app.store.post_count().await, 2);
    assert!(app.store.get_post(kept_id).await.unwrap().is_some());
}

#[tokio::test]
async fn fix_category_dry_run_writes_nothing() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let mut post = pending_post("New brewery and taproom opens in Plaza District", "OKC Business Wire");
    post.category = Some("other".to_string());
    let id = post.id;
    app.store.put_post(post).await;

    let (status, dry) = app
        .send_json(post_json("/api/admin/fix-post-category", Some(&admin), json!({ "dry_run": true })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dry["examined"], 1);
    let unchanged = app.store.get_post(id).await.unwrap().unwrap();
    assert_eq!(unchanged.category.as_deref(), Some("other"));

    let (status, live) = app
        .send_json(post_json("/api/admin/fix-post-category", Some(&admin), json!({ "dry_run": false })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(live["changes"], dry["changes"]);
}

#[tokio::test]
async fn force_upgrade_sets_plan() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let (user_id, _) = app.member("owner@example.com", Plan::Free).await;

    let (status, body) = app
        .send_json(post_json(
            "/api/admin/force-upgrade",
            Some(&admin),
            json!({ "email": "Owner@Example.com", "plan": "realtor" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["plan"], "realtor");
    assert_eq!(body["user_id"], user_id.to_string());

    let (status, _) = app
        .send(post_json(
            "/api/admin/force-upgrade",
            Some(&admin),
            json!({ "email": "nobody@example.com", "plan": "member" }),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn scraper_trigger_checks_cron_secret() {
    let app = TestApp::new();
    let (_, reader) = app.member("reader@example.com", Plan::Member).await;

    let (status, _) = app.send(get("/api/admin/run-scraper", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.send(get("/api/admin/run-scraper", Some("wrong-secret"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.send(get("/api/admin/run-scraper", Some(&reader))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Authorized, but this app has no sources configured.
    let (status, _) = app.send(get("/api/admin/run-scraper", Some(CRON_SECRET))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
