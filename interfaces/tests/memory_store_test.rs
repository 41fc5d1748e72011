use chrono::{Duration, TimeZone, Utc};
use interfaces::store::window_start;
use interfaces::{
    AssessmentStatus, AssessmentStore, ContactStatus, DataType, LeadNote, LeadNoteStore,
    MemberStore, MemoryStore, NewAssessment, NewScrapedPost, Plan, PostQuery, PostStatus,
    PostStore, PostUpdate, RateLimitStore, ScrapedPost,
};
use uuid::Uuid;

fn new_post(title: &str, source_name: &str) -> NewScrapedPost {
    NewScrapedPost {
        title: title.to_string(),
        source_name: source_name.to_string(),
        source_url: format!("https://news.example.com/{}", Uuid::new_v4()),
        category: Some("retail".to_string()),
        ..Default::default()
    }
}

fn published(title: &str, hours_ago: i64) -> ScrapedPost {
    let now = Utc::now();
    let mut post = new_post(title, "OKC Business Wire").into_post(Uuid::new_v4(), now);
    post.status = PostStatus::Published;
    post.published_at = Some(now - Duration::hours(hours_ago));
    post
}

#[tokio::test]
async fn inserted_posts_wait_for_a_photo() {
    let store = MemoryStore::new();
    let post = store.insert_post(new_post("Bookstore opens", "OKC Business Wire")).await.unwrap();

    assert_eq!(post.status, PostStatus::PendingPhoto);
    assert_eq!(post.published_at, None);
    assert!(store.source_url_exists(&post.source_url).await.unwrap());
    assert!(!store.source_url_exists("https://elsewhere.example.com").await.unwrap());
}

#[tokio::test]
async fn feed_query_is_newest_first_and_limited() {
    let store = MemoryStore::new();
    for hours in [5, 1, 3, 24 * 40] {
        store.put_post(published(&format!("{}h", hours), hours)).await;
    }
    store.insert_post(new_post("Draft", "OKC Business Wire")).await.unwrap();

    let query = PostQuery::published_feed(Utc::now() - Duration::days(30), 2);
    let posts = store.list_posts(&query).await.unwrap();
    let titles: Vec<&str> = posts.iter().map(|p| p.title.as_str()).collect();
    assert_eq!(titles, vec!["1h", "3h"]);

    assert_eq!(store.count_posts(&query.without_limit()).await.unwrap(), 3);
}

#[tokio::test]
async fn public_record_filters() {
    let store = MemoryStore::new();
    let mut permit = new_post("Permit", "OKC permits records");
    permit.data_type = Some(DataType::Permit);
    let mut zoning = new_post("Zoning", "OKC zoning records");
    zoning.data_type = Some(DataType::Zoning);
    store.insert_post(permit).await.unwrap();
    store.insert_post(zoning).await.unwrap();
    store.insert_post(new_post("News", "OKC Business Wire")).await.unwrap();

    let records = PostQuery {
        only_public_records: true,
        ..Default::default()
    };
    assert_eq!(store.count_posts(&records).await.unwrap(), 2);

    let permits = PostQuery {
        data_types: vec![DataType::Permit],
        ..Default::default()
    };
    let found = store.list_posts(&permits).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].title, "Permit");
}

#[tokio::test]
async fn update_can_clear_nullable_columns() {
    let store = MemoryStore::new();
    let post = published("Live", 1);
    let id = post.id;
    store.put_post(post).await;

    let updated = store
        .update_post(
            id,
            PostUpdate {
                status: Some(PostStatus::PendingPhoto),
                published_at: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.status, PostStatus::PendingPhoto);
    assert_eq!(updated.published_at, None);
    assert_eq!(updated.category.as_deref(), Some("retail"));

    assert!(store.update_post(Uuid::new_v4(), PostUpdate::default()).await.unwrap().is_none());
}

#[tokio::test]
async fn source_cleanup_counts_and_deletes_exact_names() {
    let store = MemoryStore::new();
    store.insert_post(new_post("A", "KOCO")).await.unwrap();
    store.insert_post(new_post("B", "KOCO")).await.unwrap();
    store.insert_post(new_post("C", "NewsOK")).await.unwrap();
    store.insert_post(new_post("D", "KOCO Fan Page")).await.unwrap();

    let names = vec!["KOCO".to_string(), "NewsOK".to_string(), "KFOR".to_string()];
    let counts = store.count_posts_by_source(&names).await.unwrap();
    assert_eq!(counts, vec![("KOCO".to_string(), 2), ("NewsOK".to_string(), 1)]);

    assert_eq!(store.delete_posts_by_source(&names).await.unwrap(), 3);
    assert_eq!(store.post_count().await, 1);
    assert!(store.count_posts_by_source(&names).await.unwrap().is_empty());
}

#[tokio::test]
async fn members_are_created_once_and_keep_customer_id() {
    let store = MemoryStore::new();
    let user_id = Uuid::new_v4();

    let first = store.ensure_member(user_id, "owner@example.com").await.unwrap();
    assert_eq!(first.plan, Plan::Free);
    assert!(store.set_plan(user_id, Plan::Member, Some("cus_9")).await.unwrap());

    let again = store.ensure_member(user_id, "other@example.com").await.unwrap();
    assert_eq!(again.plan, Plan::Member);
    assert_eq!(again.email, "owner@example.com");

    assert!(store.set_plan(user_id, Plan::Free, None).await.unwrap());
    let member = store.get_member_by_customer("cus_9").await.unwrap().unwrap();
    assert_eq!(member.plan, Plan::Free);
    assert!(store.get_member_by_email("OWNER@example.com").await.unwrap().is_some());

    assert!(!store.set_plan(Uuid::new_v4(), Plan::Member, None).await.unwrap());
}

#[tokio::test]
async fn pending_plan_applies_once_to_the_matching_email() {
    let store = MemoryStore::new();
    store
        .record_pending_plan("Buyer@Example.com ", Plan::Member, Some("cus_42"))
        .await
        .unwrap();

    let stranger = store.ensure_member(Uuid::new_v4(), "someone@example.com").await.unwrap();
    assert_eq!(stranger.plan, Plan::Free);

    let buyer = store.ensure_member(Uuid::new_v4(), "buyer@example.com").await.unwrap();
    assert_eq!(buyer.plan, Plan::Member);
    assert_eq!(buyer.stripe_customer_id.as_deref(), Some("cus_42"));

    let second = store.ensure_member(Uuid::new_v4(), "buyer@example.com").await.unwrap();
    assert_eq!(second.plan, Plan::Free);
    assert!(!store.forget_pending_plan("cus_42").await.unwrap());
}

#[tokio::test]
async fn notes_are_per_user_and_replaced() {
    let store = MemoryStore::new();
    let (alice, bob, lead) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let note = |user_id, text: &str, contact_status| LeadNote {
        user_id,
        lead_id: lead,
        note: text.to_string(),
        contact_status,
        updated_at: Utc::now(),
    };

    store.upsert_note(note(alice, "first", ContactStatus::NotContacted)).await.unwrap();
    store.upsert_note(note(alice, "second", ContactStatus::Contacted)).await.unwrap();
    store.upsert_note(note(bob, "mine", ContactStatus::Closed)).await.unwrap();

    let notes = store.notes_for_user(alice).await.unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].note, "second");
    assert_eq!(notes[0].contact_status, ContactStatus::Contacted);
}

#[tokio::test]
async fn assessments_filter_by_status() {
    let store = MemoryStore::new();
    let a = store
        .insert_assessment(NewAssessment {
            contact_name: "Dana".to_string(),
            email: "dana@example.com".to_string(),
            business_name: "Paseo Print Shop".to_string(),
            industry: "printing".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(a.status, AssessmentStatus::New);

    store
        .update_assessment(a.id, Some(AssessmentStatus::Qualified), None)
        .await
        .unwrap()
        .unwrap();
    assert!(store.list_assessments(Some(AssessmentStatus::New)).await.unwrap().is_empty());
    assert_eq!(store.list_assessments(Some(AssessmentStatus::Qualified)).await.unwrap().len(), 1);
    assert_eq!(store.list_assessments(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn rate_limit_counts_reset_each_window() {
    let store = MemoryStore::new();
    let window = Duration::hours(1);
    let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 10, 0).unwrap();

    assert_eq!(store.hit("analyze:1.2.3.4", window, now).await.unwrap(), 1);
    assert_eq!(store.hit("analyze:1.2.3.4", window, now + Duration::minutes(5)).await.unwrap(), 2);
    assert_eq!(store.hit("analyze:5.6.7.8", window, now).await.unwrap(), 1);

    let next_window = window_start(now, window) + window;
    assert_eq!(store.hit("analyze:1.2.3.4", window, next_window).await.unwrap(), 1);
}
