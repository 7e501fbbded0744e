//! Sync Engine Integration Tests
//!
//! Idempotent reconciliation, preserved local fields, post de-duplication,
//! metric pivoting, failure isolation and profile cache freshness.

mod common;

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use common::{
    remote_media, remote_question, remote_review, sample_profile, FakeAdapter, HarnessBuilder,
};
use locsync::adapters::{MetricSeries, RemoteAnswer, RemotePost};
use locsync::core::{Job, SyncOutcome, SyncResource};
use locsync::domain::{
    ContentItem, ContentStatus, MediaKind, Platform, PlatformResult, ReplySource,
};
use locsync::error::IntegrationError;
use serde_json::json;

fn seed_upstream(h: &common::Harness) {
    *h.api.profile.lock().unwrap() = sample_profile("Corner Cafe");
    *h.api.reviews.lock().unwrap() = vec![
        remote_review("accounts/100/locations/1/reviews/r1", 5, None),
        remote_review("accounts/100/locations/1/reviews/r2", 3, Some("Thanks!")),
    ];
    *h.api.media.lock().unwrap() = vec![remote_media(
        "accounts/100/locations/1/media/m1",
        "https://lh3.example.com/m1.jpg",
        10,
    )];
    *h.api.questions.lock().unwrap() = vec![remote_question(
        "locations/1/questions/q1",
        "Do you have oat milk?",
        vec![RemoteAnswer {
            name: "locations/1/questions/q1/answers/a1".to_string(),
            text: "Yes!".to_string(),
            author: None,
            author_type: Some("MERCHANT".to_string()),
            created_at: None,
        }],
    )];
}

#[tokio::test]
async fn test_sync_twice_creates_no_duplicates() {
    let h = HarnessBuilder::new().build();
    h.connected(&[Platform::Google]);
    seed_upstream(&h);

    let first = h.orchestrator.sync().sync_all("loc-1").await.unwrap();
    assert!(first.values().all(|o| !o.is_failed()), "{:?}", first);
    assert_eq!(
        first[&SyncResource::Reviews],
        SyncOutcome::Synced {
            inserted: 2,
            updated: 0
        }
    );

    let second = h.orchestrator.sync().sync_all("loc-1").await.unwrap();
    assert_eq!(
        second[&SyncResource::Reviews],
        SyncOutcome::Synced {
            inserted: 0,
            updated: 2
        }
    );
    assert_eq!(
        second[&SyncResource::Questions],
        SyncOutcome::Synced {
            inserted: 0,
            updated: 2
        }
    );

    assert_eq!(h.store.reviews_for_location("loc-1").unwrap().len(), 2);
    assert_eq!(h.store.media_for_location("loc-1").unwrap().len(), 1);
    let questions = h.store.questions_for_location("loc-1").unwrap();
    assert_eq!(questions.len(), 1);
    assert_eq!(h.store.answers_for_question(&questions[0].id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_resync_preserves_local_fields() {
    let h = HarnessBuilder::new().build();
    h.connected(&[Platform::Google]);
    seed_upstream(&h);
    h.orchestrator.sync().sync_reviews("loc-1").await.unwrap();
    h.orchestrator.sync().sync_media("loc-1").await.unwrap();

    let review = h
        .store
        .get_review_by_external_id("accounts/100/locations/1/reviews/r1")
        .unwrap()
        .unwrap();
    h.store.set_review_note(&review.id, Some("regular customer")).unwrap();
    let asset = h.store.media_for_location("loc-1").unwrap().remove(0);
    h.store.set_media_label(&asset.id, Some("storefront")).unwrap();

    // Upstream changes the authoritative fields
    *h.api.reviews.lock().unwrap() = vec![remote_review(
        "accounts/100/locations/1/reviews/r1",
        4,
        Some("See you soon"),
    )];
    *h.api.media.lock().unwrap() = vec![remote_media(
        "accounts/100/locations/1/media/m1",
        "https://lh3.example.com/m1.jpg",
        42,
    )];
    h.orchestrator.sync().sync_reviews("loc-1").await.unwrap();
    h.orchestrator.sync().sync_media("loc-1").await.unwrap();

    let review = h.store.get_review(&review.id).unwrap().unwrap();
    assert_eq!(review.rating, 4);
    assert_eq!(review.reply_text.as_deref(), Some("See you soon"));
    assert_eq!(review.reply_source, Some(ReplySource::External));
    assert_eq!(review.internal_note.as_deref(), Some("regular customer"));

    let asset = h.store.get_media_asset(&asset.id).unwrap().unwrap();
    assert_eq!(asset.view_count, 42);
    assert_eq!(asset.local_label.as_deref(), Some("storefront"));
}

#[tokio::test]
async fn test_posts_match_by_result_then_body() {
    let h = HarnessBuilder::new().build();
    h.connected(&[Platform::Google]);

    // Published through this system: result id known
    let mut known = ContentItem::draft("loc-1", "Autumn menu is here", [Platform::Google]);
    known.status = ContentStatus::Published;
    known.results.insert(
        Platform::Google,
        PlatformResult::Published("accounts/100/locations/1/localPosts/p1".to_string()),
    );
    h.store.save_content_item(&known).unwrap();

    // Dispatch timed out locally but the post went up anyway
    let mut draft = ContentItem::draft("loc-1", "Closed Monday", [Platform::Google]);
    draft.status = ContentStatus::Failed;
    draft
        .results
        .insert(Platform::Google, PlatformResult::Error("timeout".to_string()));
    h.store.save_content_item(&draft).unwrap();

    *h.api.posts.lock().unwrap() = vec![
        RemotePost {
            name: "accounts/100/locations/1/localPosts/p1".to_string(),
            summary: Some("Autumn menu is here (edited)".to_string()),
            created_at: None,
            media_url: None,
        },
        RemotePost {
            name: "accounts/100/locations/1/localPosts/p2".to_string(),
            summary: Some("Closed Monday".to_string()),
            created_at: None,
            media_url: None,
        },
        RemotePost {
            name: "accounts/100/locations/1/localPosts/p3".to_string(),
            summary: Some("Live music Saturday".to_string()),
            created_at: Some(Utc::now() - Duration::days(3)),
            media_url: Some("https://lh3.example.com/band.jpg".to_string()),
        },
    ];

    let counts = h.orchestrator.sync().sync_posts("loc-1").await.unwrap();
    assert_eq!(counts.inserted, 1);
    assert_eq!(counts.updated, 2);

    let matched = h.store.get_content_item(&draft.id).unwrap().unwrap();
    assert_eq!(
        matched.external_id(Platform::Google),
        Some("accounts/100/locations/1/localPosts/p2")
    );

    let items = h.store.content_items_for_location("loc-1").unwrap();
    assert_eq!(items.len(), 3);
    let mirrored = items
        .iter()
        .find(|i| i.body == "Live music Saturday")
        .unwrap();
    assert_eq!(mirrored.status, ContentStatus::Published);

    // Second pass recognises everything by result id
    let again = h.orchestrator.sync().sync_posts("loc-1").await.unwrap();
    assert_eq!(again.inserted, 0);
    assert_eq!(h.store.content_items_for_location("loc-1").unwrap().len(), 3);
}

fn remote_post(name: &str, summary: &str) -> RemotePost {
    RemotePost {
        name: name.to_string(),
        summary: Some(summary.to_string()),
        created_at: None,
        media_url: None,
    }
}

#[tokio::test]
async fn test_pending_item_is_not_bound_to_matching_post() {
    let google = Arc::new(FakeAdapter::succeeding(Platform::Google, "g-new"));
    let facebook = Arc::new(FakeAdapter::succeeding(Platform::Facebook, "fb1"));
    let h = HarnessBuilder::new()
        .adapter(google.clone())
        .adapter(facebook.clone())
        .build();
    h.connected(&[Platform::Google, Platform::Facebook]);

    let scheduled = ContentItem::draft("loc-1", "Closed Monday", [Platform::Facebook])
        .scheduled_for(Utc::now() - Duration::seconds(1));
    h.store.save_content_item(&scheduled).unwrap();
    *h.api.posts.lock().unwrap() = vec![remote_post(
        "accounts/100/locations/1/localPosts/p2",
        "Closed Monday",
    )];

    let counts = h.orchestrator.sync().sync_posts("loc-1").await.unwrap();
    assert_eq!(counts.inserted, 1);

    let after_sync = h.store.get_content_item(&scheduled.id).unwrap().unwrap();
    assert_eq!(after_sync.targets, scheduled.targets);
    assert_eq!(after_sync.status, ContentStatus::Scheduled);
    assert!(after_sync.results.is_empty());

    h.orchestrator.run_job(Job::PublishDue).await.unwrap();
    assert_eq!(google.publish_count(), 0);
    assert_eq!(facebook.publish_count(), 1);
}

#[tokio::test]
async fn test_identical_posts_each_get_a_row() {
    let h = HarnessBuilder::new().build();
    h.connected(&[Platform::Google]);
    *h.api.posts.lock().unwrap() = vec![
        remote_post("accounts/100/locations/1/localPosts/a", "Same"),
        remote_post("accounts/100/locations/1/localPosts/b", "Same"),
    ];

    let first = h.orchestrator.sync().sync_posts("loc-1").await.unwrap();
    assert_eq!(first.inserted, 2);

    let again = h.orchestrator.sync().sync_posts("loc-1").await.unwrap();
    assert_eq!(again.inserted, 0);
    assert_eq!(again.updated, 2);

    let mut ids: Vec<String> = h
        .store
        .content_items_for_location("loc-1")
        .unwrap()
        .iter()
        .filter_map(|i| i.external_id(Platform::Google).map(str::to_string))
        .collect();
    ids.sort();
    assert_eq!(
        ids,
        vec![
            "accounts/100/locations/1/localPosts/a",
            "accounts/100/locations/1/localPosts/b"
        ]
    );
}

#[tokio::test]
async fn test_metrics_pivot_into_days() {
    let h = HarnessBuilder::new().build();
    h.connected(&[Platform::Google]);
    let day = NaiveDate::from_ymd_opt(2026, 10, 1).unwrap();
    let next = day.succ_opt().unwrap();
    *h.api.metrics.lock().unwrap() = vec![
        MetricSeries {
            metric: "BUSINESS_IMPRESSIONS_DESKTOP_MAPS".to_string(),
            points: vec![(day, 10), (next, 1)],
        },
        MetricSeries {
            metric: "BUSINESS_IMPRESSIONS_MOBILE_MAPS".to_string(),
            points: vec![(day, 15), (next, 2)],
        },
        MetricSeries {
            metric: "CALL_CLICKS".to_string(),
            points: vec![(day, 3)],
        },
    ];

    let counts = h.orchestrator.sync().sync_metrics("loc-1").await.unwrap();
    assert_eq!(counts.inserted, 2);

    let days = h.store.metric_days("loc-1").unwrap();
    assert_eq!(days.len(), 2);
    assert_eq!(days[0].date, day);
    assert_eq!(days[0].maps_impressions, 25);
    assert_eq!(days[0].call_clicks, 3);
    assert_eq!(days[1].maps_impressions, 3);

    // Same window again overwrites instead of adding
    let again = h.orchestrator.sync().sync_metrics("loc-1").await.unwrap();
    assert_eq!(again.updated, 2);
    assert_eq!(h.store.metric_days("loc-1").unwrap()[0].maps_impressions, 25);
}

#[tokio::test]
async fn test_account_lookup_failure_is_isolated() {
    let h = HarnessBuilder::new().build();
    h.connected(&[Platform::Google]);
    seed_upstream(&h);
    *h.api.fail_accounts.lock().unwrap() = true;

    let report = h.orchestrator.sync().sync_all("loc-1").await.unwrap();

    for resource in [
        SyncResource::Reviews,
        SyncResource::Posts,
        SyncResource::Media,
        SyncResource::Questions,
    ] {
        assert!(report[&resource].is_failed(), "{} should fail", resource);
    }
    assert!(!report[&SyncResource::Metrics].is_failed());
    assert!(!report[&SyncResource::Profile].is_failed());
    assert_eq!(h.api.calls.count("list_reviews"), 0);

    let location = h.store.get_location("loc-1").unwrap().unwrap();
    assert_eq!(location.display.display_name.as_deref(), Some("Corner Cafe"));
}

#[tokio::test]
async fn test_without_credential_every_class_fails() {
    let h = HarnessBuilder::new().build();
    h.seed_location();

    let report = h.orchestrator.sync().sync_all("loc-1").await.unwrap();

    assert_eq!(report.len(), SyncResource::ALL.len());
    for outcome in report.values() {
        assert_eq!(
            outcome,
            &SyncOutcome::Failed {
                error: "no usable account linked".to_string()
            }
        );
    }
    assert_eq!(h.api.calls.total(), 0);
}

#[tokio::test]
async fn test_account_resolved_on_every_call() {
    let h = HarnessBuilder::new().build();
    h.connected(&[Platform::Google]);

    h.orchestrator.sync().sync_reviews("loc-1").await.unwrap();
    h.orchestrator.sync().sync_reviews("loc-1").await.unwrap();

    assert_eq!(h.api.calls.count("list_accounts"), 2);
}

#[tokio::test]
async fn test_profile_cache_freshness() {
    let h = HarnessBuilder::new().build();
    h.connected(&[Platform::Google]);
    *h.api.profile.lock().unwrap() = sample_profile("Corner Cafe");

    // Nothing cached yet: one fetch
    let profile = h.orchestrator.sync().profile("loc-1", false).await.unwrap();
    assert_eq!(profile["title"], "Corner Cafe");
    assert_eq!(h.api.calls.count("get_location"), 1);
    let first_sync = h
        .store
        .get_location("loc-1")
        .unwrap()
        .unwrap()
        .profile_synced_at
        .unwrap();

    // Fresh: served from the cache
    h.orchestrator.sync().profile("loc-1", false).await.unwrap();
    assert_eq!(h.api.calls.count("get_location"), 1);

    // Forced: exactly one more fetch and a newer timestamp
    *h.api.profile.lock().unwrap() = sample_profile("Corner Cafe & Bakery");
    let profile = h.orchestrator.sync().profile("loc-1", true).await.unwrap();
    assert_eq!(profile["title"], "Corner Cafe & Bakery");
    assert_eq!(h.api.calls.count("get_location"), 2);

    let location = h.store.get_location("loc-1").unwrap().unwrap();
    assert!(location.profile_synced_at.unwrap() >= first_sync);
    assert_eq!(
        location.display.display_name.as_deref(),
        Some("Corner Cafe & Bakery")
    );
}

#[tokio::test]
async fn test_stale_cache_fetches_once() {
    let h = HarnessBuilder::new()
        .settings(|s| s.sync.profile_cache_ttl_seconds = 0)
        .build();
    h.connected(&[Platform::Google]);
    *h.api.profile.lock().unwrap() = sample_profile("Corner Cafe");

    h.orchestrator.sync().profile("loc-1", false).await.unwrap();
    h.orchestrator.sync().profile("loc-1", false).await.unwrap();

    assert_eq!(h.api.calls.count("get_location"), 2);
}

#[tokio::test]
async fn test_profile_replace_drops_missing_fields() {
    let h = HarnessBuilder::new().build();
    h.connected(&[Platform::Google]);
    *h.api.profile.lock().unwrap() = sample_profile("Corner Cafe");
    h.orchestrator.sync().sync_profile("loc-1").await.unwrap();

    *h.api.profile.lock().unwrap() = json!({ "title": "Corner Cafe" });
    h.orchestrator.sync().sync_profile("loc-1").await.unwrap();

    let location = h.store.get_location("loc-1").unwrap().unwrap();
    assert_eq!(location.display.website, None);
    assert_eq!(location.display.phone, None);
}

#[tokio::test]
async fn test_update_profile_replaces_cache() {
    let h = HarnessBuilder::new().build();
    h.connected(&[Platform::Google]);
    *h.api.profile.lock().unwrap() = sample_profile("Corner Cafe");

    let updated = h
        .orchestrator
        .sync()
        .update_profile(
            "loc-1",
            &json!({ "websiteUri": "https://cornercafe.example" }),
            "websiteUri",
        )
        .await
        .unwrap();
    assert_eq!(updated["websiteUri"], "https://cornercafe.example");

    let location = h.store.get_location("loc-1").unwrap().unwrap();
    assert_eq!(
        location.display.website.as_deref(),
        Some("https://cornercafe.example")
    );
}

#[tokio::test]
async fn test_manual_review_reply() {
    let h = HarnessBuilder::new().build();
    h.connected(&[Platform::Google]);
    seed_upstream(&h);
    h.orchestrator.sync().sync_reviews("loc-1").await.unwrap();
    let review = h
        .store
        .get_review_by_external_id("accounts/100/locations/1/reviews/r1")
        .unwrap()
        .unwrap();

    let replied = h
        .orchestrator
        .sync()
        .reply_to_review(&review.id, "Thank you, Dana!")
        .await
        .unwrap();

    assert_eq!(replied.reply_text.as_deref(), Some("Thank you, Dana!"));
    assert_eq!(replied.reply_source, Some(ReplySource::Manual));
    assert_eq!(
        h.api.replies.lock().unwrap()[0].0,
        "accounts/100/locations/1/reviews/r1"
    );
}

#[tokio::test]
async fn test_answer_question() {
    let h = HarnessBuilder::new().build();
    h.connected(&[Platform::Google]);
    seed_upstream(&h);
    h.orchestrator.sync().sync_questions("loc-1").await.unwrap();
    let question = h.store.questions_for_location("loc-1").unwrap().remove(0);

    let answer = h
        .orchestrator
        .sync()
        .answer_question(&question.id, "Oat and almond")
        .await
        .unwrap();

    assert_eq!(answer.question_id, question.id);
    assert_eq!(answer.author_type.as_deref(), Some("MERCHANT"));
    assert_eq!(h.store.answers_for_question(&question.id).unwrap().len(), 2);
}

#[tokio::test]
async fn test_upload_rejects_private_url() {
    let h = HarnessBuilder::new().build();
    h.connected(&[Platform::Google]);

    let err = h
        .orchestrator
        .sync()
        .upload_media("loc-1", "http://192.168.1.20/photo.jpg", MediaKind::Image, "ADDITIONAL")
        .await
        .unwrap_err();

    assert!(matches!(err, IntegrationError::Permanent(_)));
    assert_eq!(h.api.calls.total(), 0);
}

#[tokio::test]
async fn test_upload_and_delete_media() {
    let h = HarnessBuilder::new().build();
    h.connected(&[Platform::Google]);

    let asset = h
        .orchestrator
        .sync()
        .upload_media("loc-1", "https://cdn.example.com/front.jpg", MediaKind::Image, "EXTERIOR")
        .await
        .unwrap();
    assert_eq!(asset.category.as_deref(), Some("EXTERIOR"));
    assert_eq!(h.store.media_for_location("loc-1").unwrap().len(), 1);

    // Already removed upstream still counts as deleted
    *h.api.delete_status.lock().unwrap() = 404;
    h.orchestrator.sync().delete_media(&asset.id).await.unwrap();
    assert!(h.store.get_media_asset(&asset.id).unwrap().is_none());
}

#[tokio::test]
async fn test_media_delete_failure_keeps_row() {
    let h = HarnessBuilder::new().build();
    h.connected(&[Platform::Google]);
    let asset = h
        .orchestrator
        .sync()
        .upload_media("loc-1", "https://cdn.example.com/front.jpg", MediaKind::Image, "EXTERIOR")
        .await
        .unwrap();

    *h.api.delete_status.lock().unwrap() = 500;
    assert!(h.orchestrator.sync().delete_media(&asset.id).await.is_err());
    assert!(h.store.get_media_asset(&asset.id).unwrap().is_some());
}
