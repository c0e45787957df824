//! Bounded batch validator tests

mod helpers;

use helpers::{image_ref, FakeClassifier, Harness, Reply};
use pinscout_ai::db;
use pinscout_ai::models::{ItemStatus, PromptStatus, Stage, StageStatus};
use pinscout_ai::services::ValidationSummary;
use pinscout_ai::WorkflowError;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const CALL_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_counts_are_consistent_with_stored_items() {
    let classifier = FakeClassifier::new(Reply::score(0.9))
        .with_reply(&image_ref(1), Reply::score(0.1))
        .with_reply(&image_ref(3), Reply::Fail("connection reset".to_string()))
        .with_reply(&image_ref(4), Reply::Text("no idea".to_string()));
    let h = Harness::for_validation(Arc::new(classifier), CALL_TIMEOUT).await;
    let prompt = h.processing_prompt("mid-century living room").await;
    h.seed_items(prompt.id, 6).await;

    let summary = h
        .validator
        .validate_batch(prompt.id, Uuid::new_v4(), 3)
        .await
        .unwrap();

    assert_eq!(summary.total, 6);
    assert_eq!(summary.validated, 6);
    assert_eq!(summary.approved + summary.disqualified, summary.validated);
    // 0, 2, 5 score 0.9; 4 falls back to the default 0.5
    assert_eq!(summary.approved, 4);
    assert_eq!(summary.disqualified, 2);

    let counts = db::items::count_items_by_status(&h.pool, prompt.id).await.unwrap();
    assert_eq!(counts.pending, 0);
    assert_eq!(counts.approved, summary.approved);
    assert_eq!(counts.disqualified, summary.disqualified);

    for item in db::items::list_items(&h.pool, prompt.id).await.unwrap() {
        assert!((0.0..=1.0).contains(&item.score));
        assert_eq!(item.status, ItemStatus::from_score(item.score));
        assert!(!item.explanation.is_empty());
    }
}

#[tokio::test]
async fn test_score_overrides_disagreeing_label() {
    let reply = r#"{"match_score": 0.85, "explanation": "Strong match", "classification": "disqualified"}"#;
    let classifier = FakeClassifier::new(Reply::Text(reply.to_string()));
    let h = Harness::for_validation(Arc::new(classifier), CALL_TIMEOUT).await;
    let prompt = h.processing_prompt("cozy reading nook").await;
    let items = h.seed_items(prompt.id, 1).await;

    let summary = h
        .validator
        .validate_batch(prompt.id, Uuid::new_v4(), 1)
        .await
        .unwrap();
    assert_eq!(summary.approved, 1);

    let stored = db::items::list_items(&h.pool, prompt.id).await.unwrap();
    assert_eq!(stored[0].id, items[0].id);
    assert_eq!(stored[0].status, ItemStatus::Approved);
    assert_eq!(stored[0].score, 0.85);
    assert_eq!(stored[0].explanation, "Strong match");
}

#[tokio::test]
async fn test_failed_and_timed_out_calls_disqualify() {
    let classifier = FakeClassifier::new(Reply::score(0.7))
        .with_reply(&image_ref(0), Reply::Hang)
        .with_reply(&image_ref(1), Reply::Fail("502 Bad Gateway".to_string()));
    let h = Harness::for_validation(Arc::new(classifier), Duration::from_millis(100)).await;
    let prompt = h.processing_prompt("brutalist architecture").await;
    h.seed_items(prompt.id, 3).await;

    let summary = h
        .validator
        .validate_batch(prompt.id, Uuid::new_v4(), 3)
        .await
        .unwrap();
    assert_eq!(
        summary,
        ValidationSummary {
            total: 3,
            validated: 3,
            approved: 1,
            disqualified: 2,
        }
    );

    let items = db::items::list_items(&h.pool, prompt.id).await.unwrap();
    for failed in &items[..2] {
        assert_eq!(failed.status, ItemStatus::Disqualified);
        assert_eq!(failed.score, 0.0);
        assert!(failed.explanation.starts_with("AI validation failed: "));
    }
    assert!(items[0].explanation.contains("Timed out"));
    assert!(items[1].explanation.contains("502 Bad Gateway"));
}

#[tokio::test]
async fn test_missing_image_is_disqualified_without_call() {
    let classifier = Arc::new(FakeClassifier::new(Reply::score(0.9)));
    let h = Harness::for_validation(classifier.clone(), CALL_TIMEOUT).await;
    let prompt = h.processing_prompt("desert sunset").await;
    let mut items = h.seed_items(prompt.id, 0).await;
    let mut item = pinscout_ai::models::Item::from_candidate(prompt.id, helpers::candidate(0));
    item.image_ref = String::new();
    items.push(item);
    db::items::insert_items(&h.pool, &items).await.unwrap();

    let summary = h
        .validator
        .validate_batch(prompt.id, Uuid::new_v4(), 2)
        .await
        .unwrap();
    assert_eq!(summary.disqualified, 1);
    assert_eq!(classifier.calls(), 0);

    let stored = db::items::list_items(&h.pool, prompt.id).await.unwrap();
    assert_eq!(stored[0].explanation, "No image URL provided");
}

#[tokio::test]
async fn test_empty_batch_records_nothing() {
    let h = Harness::for_validation(Arc::new(FakeClassifier::new(Reply::score(0.9))), CALL_TIMEOUT)
        .await;
    let prompt = h.processing_prompt("nothing scraped").await;

    let summary = h
        .validator
        .validate_batch(prompt.id, Uuid::new_v4(), 5)
        .await
        .unwrap();
    assert_eq!(summary, ValidationSummary::default());

    let validation = db::stages::latest_stage_record(&h.pool, prompt.id, Stage::Validation)
        .await
        .unwrap();
    assert!(validation.is_none());

    let stored = db::prompts::load_prompt(&h.pool, prompt.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PromptStatus::Processing);
}

#[tokio::test]
async fn test_concurrency_never_exceeds_cap() {
    let classifier = Arc::new(
        FakeClassifier::new(Reply::score(0.6)).with_delay(Duration::from_millis(30)),
    );
    let h = Harness::for_validation(classifier.clone(), CALL_TIMEOUT).await;
    let prompt = h.processing_prompt("scandinavian kitchen").await;
    h.seed_items(prompt.id, 12).await;

    let summary = h
        .validator
        .validate_batch(prompt.id, Uuid::new_v4(), 3)
        .await
        .unwrap();

    assert_eq!(summary.validated, 12);
    assert_eq!(classifier.calls(), 12);
    assert_eq!(classifier.peak_in_flight(), 3);
}

#[tokio::test]
async fn test_zero_concurrency_is_treated_as_one() {
    let classifier = Arc::new(
        FakeClassifier::new(Reply::score(0.2)).with_delay(Duration::from_millis(5)),
    );
    let h = Harness::for_validation(classifier.clone(), CALL_TIMEOUT).await;
    let prompt = h.processing_prompt("rainy city street").await;
    h.seed_items(prompt.id, 4).await;

    let summary = h
        .validator
        .validate_batch(prompt.id, Uuid::new_v4(), 0)
        .await
        .unwrap();
    assert_eq!(summary.disqualified, 4);
    assert_eq!(classifier.peak_in_flight(), 1);
}

#[tokio::test]
async fn test_stage_log_and_prompt_completion() {
    let h = Harness::for_validation(Arc::new(FakeClassifier::new(Reply::score(0.8))), CALL_TIMEOUT)
        .await;
    let prompt = h.processing_prompt("art deco bathroom").await;
    h.seed_items(prompt.id, 2).await;
    let run_id = Uuid::new_v4();

    h.validator.validate_batch(prompt.id, run_id, 2).await.unwrap();

    let record = db::stages::latest_stage_record(&h.pool, prompt.id, Stage::Validation)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, StageStatus::Completed);
    assert_eq!(record.run_id, run_id);

    let messages: Vec<_> = record.log.iter().map(|e| e.message.as_str()).collect();
    assert_eq!(messages[0], "Starting AI validation of 2 pins");
    assert!(messages.contains(&"Validated item 1/2 - approved"));
    assert!(messages.contains(&"Validated item 2/2 - approved"));
    assert!(messages.contains(&"AI validation completed! Approved: 2, Disqualified: 0"));

    let stored = db::prompts::load_prompt(&h.pool, prompt.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PromptStatus::Completed);
}

#[tokio::test]
async fn test_unknown_prompt_is_not_found() {
    let h = Harness::for_validation(Arc::new(FakeClassifier::new(Reply::score(0.8))), CALL_TIMEOUT)
        .await;
    let result = h.validator.validate_batch(Uuid::new_v4(), Uuid::new_v4(), 2).await;
    assert!(matches!(result, Err(WorkflowError::NotFound(_))));
}

#[tokio::test]
async fn test_persistence_failure_fails_stage_and_errors_prompt() {
    let classifier = FakeClassifier::new(Reply::score(0.9)).with_delay(Duration::from_millis(20));
    let h = Harness::for_validation(Arc::new(classifier), CALL_TIMEOUT).await;
    let prompt = h.processing_prompt("industrial loft").await;
    h.seed_items(prompt.id, 2).await;

    // Any verdict write on this prompt's items now fails
    sqlx::query(
        r#"
        CREATE TRIGGER reject_verdicts BEFORE UPDATE ON items
        BEGIN
            SELECT RAISE(ABORT, 'verdict writes disabled');
        END
        "#,
    )
    .execute(&h.pool)
    .await
    .unwrap();

    let result = h.validator.validate_batch(prompt.id, Uuid::new_v4(), 2).await;
    match result {
        Err(WorkflowError::StageFailed { stage, detail }) => {
            assert_eq!(stage, Stage::Validation);
            assert!(detail.contains("Failed to persist 2 of 2 item results"));
        }
        other => panic!("expected StageFailed, got {:?}", other),
    }

    let record = db::stages::latest_stage_record(&h.pool, prompt.id, Stage::Validation)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, StageStatus::Failed);

    let stored = db::prompts::load_prompt(&h.pool, prompt.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PromptStatus::Error);
}
