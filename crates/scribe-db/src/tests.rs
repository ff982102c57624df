//! Database integration tests.
//!
//! These require a live, migrated PostgreSQL (see `test_fixtures`) and are
//! ignored by default: `cargo test -p scribe-db -- --ignored`.

use chrono::Utc;
use uuid::Uuid;

use scribe_core::{
    Error, JobStatus, PlanLimits, PlanResolver, PlanTier, SegmentDraft, TranscriptOutput,
    UploadSessionStatus,
};

use crate::test_fixtures::{test_user, upload_request};
use crate::uploads::CompletionStart;
use crate::{Database, NewJob};

const MB: i64 = 1024 * 1024;

fn free_limits() -> PlanLimits {
    PlanResolver.limits(PlanTier::Free)
}

fn engine_output(segments: usize) -> TranscriptOutput {
    TranscriptOutput {
        language: Some("en".to_string()),
        duration_seconds: 90.0,
        segments: (0..segments)
            .map(|i| SegmentDraft {
                sequence_index: i as i32,
                start_seconds: i as f64 * 10.0,
                end_seconds: (i + 1) as f64 * 10.0,
                text: format!("machine text {}", i),
            })
            .collect(),
    }
}

/// Force a specific queued job into `processing` (bypasses `claim_next`,
/// which would race with other tests' queued jobs).
async fn force_processing(db: &Database, job_id: Uuid) {
    sqlx::query(
        "UPDATE transcription_job SET status = 'processing'::job_status, started_at = $2
         WHERE id = $1 AND status = 'queued'::job_status",
    )
    .bind(job_id)
    .bind(Utc::now())
    .execute(&db.pool)
    .await
    .unwrap();
}

async fn create_completed_job(db: &Database, user: &str) -> Uuid {
    let job = db
        .jobs
        .create(
            NewJob {
                user_id: user.to_string(),
                media_object_key: format!("uploads/{}/{}/a.mp3", user, Uuid::new_v4()),
                file_size_bytes: 10 * MB,
                duration_seconds: 90.0,
                language: None,
            },
            &free_limits(),
        )
        .await
        .unwrap();
    force_processing(db, job.id).await;
    db.jobs.complete(job.id, &engine_output(3)).await.unwrap();
    job.id
}

// ============================================================================
// Upload sessions
// ============================================================================

#[tokio::test]
#[ignore]
async fn parts_in_any_order_complete_exactly_once() {
    let db = Database::connect_test().await.unwrap();
    let user = test_user();

    // 25 MB at 10 MB parts -> 3 parts
    let session = db
        .uploads
        .create(upload_request(&user, 25 * MB, 10 * MB))
        .await
        .unwrap();
    assert_eq!(session.total_parts, 3);

    for part in [2, 1, 3] {
        db.uploads
            .record_part(session.id, &user, part, &format!("etag-{}", part))
            .await
            .unwrap();
    }

    let started = db.uploads.begin_completion(session.id, &user).await.unwrap();
    let key = match started {
        CompletionStart::Started { session, parts } => {
            assert_eq!(parts.len(), 3);
            assert_eq!(
                parts.iter().map(|p| p.part_number).collect::<Vec<_>>(),
                vec![1, 2, 3]
            );
            db.uploads.finish_completion(session.id).await.unwrap();
            session.object_key
        }
        CompletionStart::AlreadyCompleted { .. } => panic!("first completion must run finalize"),
    };

    // Second completion returns the same key without a second finalize.
    match db.uploads.begin_completion(session.id, &user).await.unwrap() {
        CompletionStart::AlreadyCompleted { object_key } => assert_eq!(object_key, key),
        CompletionStart::Started { .. } => panic!("duplicate completion must not re-finalize"),
    }
}

#[tokio::test]
#[ignore]
async fn incomplete_upload_conflicts_and_stays_open() {
    let db = Database::connect_test().await.unwrap();
    let user = test_user();

    let session = db
        .uploads
        .create(upload_request(&user, 25 * MB, 10 * MB))
        .await
        .unwrap();
    db.uploads
        .record_part(session.id, &user, 1, "etag-1")
        .await
        .unwrap();

    let err = db
        .uploads
        .begin_completion(session.id, &user)
        .await
        .err()
        .expect("incomplete completion must fail");
    assert!(matches!(err, Error::Conflict(_)));

    let fetched = db.uploads.fetch_owned(session.id, &user).await.unwrap();
    assert_eq!(fetched.status, UploadSessionStatus::Open);
}

#[tokio::test]
#[ignore]
async fn rerecording_a_part_overwrites_tag() {
    let db = Database::connect_test().await.unwrap();
    let user = test_user();

    let session = db
        .uploads
        .create(upload_request(&user, 5 * MB, 10 * MB))
        .await
        .unwrap();
    db.uploads.record_part(session.id, &user, 1, "a").await.unwrap();
    db.uploads.record_part(session.id, &user, 1, "b").await.unwrap();

    let parts = db.uploads.parts(session.id).await.unwrap();
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].etag, "b");
}

#[tokio::test]
#[ignore]
async fn part_number_out_of_range_is_validation_error() {
    let db = Database::connect_test().await.unwrap();
    let user = test_user();

    let session = db
        .uploads
        .create(upload_request(&user, 25 * MB, 10 * MB))
        .await
        .unwrap();
    let err = db
        .uploads
        .record_part(session.id, &user, 4, "etag")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
#[ignore]
async fn session_invisible_to_other_users() {
    let db = Database::connect_test().await.unwrap();
    let owner = test_user();
    let stranger = test_user();

    let session = db
        .uploads
        .create(upload_request(&owner, 5 * MB, 10 * MB))
        .await
        .unwrap();
    let err = db.uploads.fetch_owned(session.id, &stranger).await.unwrap_err();
    assert!(matches!(err, Error::SessionNotFound(_)));
}

#[tokio::test]
#[ignore]
async fn sweep_expires_only_overdue_open_sessions() {
    let db = Database::connect_test().await.unwrap();
    let user = test_user();

    let mut overdue = upload_request(&user, 5 * MB, 10 * MB);
    overdue.ttl_secs = 0;
    let overdue = db.uploads.create(overdue).await.unwrap();

    let fresh = db
        .uploads
        .create(upload_request(&user, 5 * MB, 10 * MB))
        .await
        .unwrap();

    let swept = db.uploads.sweep_expired(100).await.unwrap();
    let swept_ids: Vec<Uuid> = swept.iter().map(|s| s.id).collect();
    assert!(swept_ids.contains(&overdue.id));
    assert!(!swept_ids.contains(&fresh.id));

    let overdue_now = db.uploads.fetch_owned(overdue.id, &user).await.unwrap();
    assert_eq!(overdue_now.status, UploadSessionStatus::Expired);
    let fresh_now = db.uploads.fetch_owned(fresh.id, &user).await.unwrap();
    assert_eq!(fresh_now.status, UploadSessionStatus::Open);
}

#[tokio::test]
#[ignore]
async fn abort_is_idempotent() {
    let db = Database::connect_test().await.unwrap();
    let user = test_user();

    let session = db
        .uploads
        .create(upload_request(&user, 5 * MB, 10 * MB))
        .await
        .unwrap();
    let aborted = db.uploads.abort(session.id, &user).await.unwrap();
    assert_eq!(aborted.status, UploadSessionStatus::Aborted);

    let again = db.uploads.abort(session.id, &user).await.unwrap();
    assert_eq!(again.status, UploadSessionStatus::Aborted);
}

// ============================================================================
// Quota
// ============================================================================

#[tokio::test]
#[ignore]
async fn no_overcommit_under_concurrent_reservations() {
    let db = Database::connect_test().await.unwrap();
    let user = test_user();
    let limits = PlanLimits {
        daily_transcription_limit: None,
        max_minutes_per_file: 300.0,
        max_file_size_bytes: 1024 * MB,
        max_concurrent_jobs: 2,
        priority: 0,
        allow_translation: true,
    };

    // 8 parallel attempts against 2 slots: exactly 2 must win.
    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..8 {
        let quota = crate::PgQuotaRepository::new(db.pool.clone());
        let user = user.clone();
        let limits = limits.clone();
        tasks.spawn(async move { quota.try_reserve(&user, &limits).await });
    }

    let mut granted = 0;
    let mut denied = 0;
    while let Some(result) = tasks.join_next().await {
        match result.unwrap() {
            Ok(reservation) => {
                assert!(reservation.active_jobs <= 2);
                granted += 1;
            }
            Err(Error::PlanLimitExceeded { .. }) => denied += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(granted, 2);
    assert_eq!(denied, 6);

    let stats = db.quota.snapshot(&user).await.unwrap();
    assert_eq!(stats.active_jobs, 2);
    // Denied attempts must not bump the daily count.
    assert_eq!(stats.jobs_created_today, 2);
}

#[tokio::test]
#[ignore]
async fn release_decrements_exactly_once() {
    let db = Database::connect_test().await.unwrap();
    let user = test_user();
    let limits = free_limits();

    let reservation = db.quota.try_reserve(&user, &limits).await.unwrap();
    assert_eq!(reservation.active_jobs, 1);

    db.quota.release(reservation).await.unwrap();
    // The handle is consumed by value; a second release cannot compile.

    let stats = db.quota.snapshot(&user).await.unwrap();
    assert_eq!(stats.active_jobs, 0);
    // Daily count is not refunded.
    assert_eq!(stats.jobs_created_today, 1);
}

#[tokio::test]
#[ignore]
async fn daily_limit_denies_after_quota_spent() {
    let db = Database::connect_test().await.unwrap();
    let user = test_user();
    let limits = PlanLimits {
        daily_transcription_limit: Some(1),
        max_minutes_per_file: 10.0,
        max_file_size_bytes: 100 * MB,
        max_concurrent_jobs: 5,
        priority: 0,
        allow_translation: false,
    };

    let reservation = db.quota.try_reserve(&user, &limits).await.unwrap();
    db.quota.release(reservation).await.unwrap();

    // Slot is free again, but the daily count stands.
    let err = db.quota.try_reserve(&user, &limits).await.unwrap_err();
    match err {
        Error::PlanLimitExceeded { limit, .. } => {
            assert_eq!(limit, scribe_core::LimitKind::DailyJobs)
        }
        other => panic!("expected daily denial, got {other}"),
    }
}

// ============================================================================
// Job lifecycle
// ============================================================================

#[tokio::test]
#[ignore]
async fn job_creation_at_daily_limit_is_denied() {
    let db = Database::connect_test().await.unwrap();
    let user = test_user();
    let limits = PlanLimits {
        daily_transcription_limit: Some(1),
        ..free_limits()
    };

    let first = db
        .jobs
        .create(
            NewJob {
                user_id: user.clone(),
                media_object_key: format!("uploads/{}/{}/a.mp3", user, Uuid::new_v4()),
                file_size_bytes: 25 * MB,
                duration_seconds: 120.0,
                language: None,
            },
            &limits,
        )
        .await
        .unwrap();
    assert_eq!(first.status, JobStatus::Queued);
    assert!(first.quota_reserved);

    let err = db
        .jobs
        .create(
            NewJob {
                user_id: user.clone(),
                media_object_key: format!("uploads/{}/{}/b.mp3", user, Uuid::new_v4()),
                file_size_bytes: 25 * MB,
                duration_seconds: 120.0,
                language: None,
            },
            &limits,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PlanLimitExceeded { .. }));
}

#[tokio::test]
#[ignore]
async fn completion_ingests_segments_and_releases_quota() {
    let db = Database::connect_test().await.unwrap();
    let user = test_user();

    let job = db
        .jobs
        .create(
            NewJob {
                user_id: user.clone(),
                media_object_key: format!("uploads/{}/{}/a.mp3", user, Uuid::new_v4()),
                file_size_bytes: 10 * MB,
                duration_seconds: 90.0,
                language: None,
            },
            &free_limits(),
        )
        .await
        .unwrap();
    force_processing(&db, job.id).await;

    let (completed, ingested) = db.jobs.complete(job.id, &engine_output(3)).await.unwrap();
    assert_eq!(completed.status, JobStatus::Completed);
    assert!(!completed.quota_reserved);
    assert_eq!(ingested, 3);

    let segments = db.segments.list(job.id).await.unwrap();
    assert_eq!(segments.len(), 3);
    for segment in &segments {
        assert_eq!(segment.current_text, segment.original_text);
        assert_eq!(segment.version, 1);
    }

    let stats = db.quota.snapshot(&user).await.unwrap();
    assert_eq!(stats.active_jobs, 0);
    assert!(stats.used_minutes_this_month > 0.0);
}

#[tokio::test]
#[ignore]
async fn cancel_after_completion_is_rejected_not_applied() {
    let db = Database::connect_test().await.unwrap();
    let user = test_user();
    let job_id = create_completed_job(&db, &user).await;

    let err = db.jobs.cancel(job_id, &user).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    // The terminal state stands and the quota was released exactly once.
    let job = db.jobs.get_owned(job_id, &user).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    let stats = db.quota.snapshot(&user).await.unwrap();
    assert_eq!(stats.active_jobs, 0);
}

#[tokio::test]
#[ignore]
async fn duplicate_cancel_is_noop() {
    let db = Database::connect_test().await.unwrap();
    let user = test_user();

    let job = db
        .jobs
        .create(
            NewJob {
                user_id: user.clone(),
                media_object_key: format!("uploads/{}/{}/a.mp3", user, Uuid::new_v4()),
                file_size_bytes: 10 * MB,
                duration_seconds: 60.0,
                language: None,
            },
            &free_limits(),
        )
        .await
        .unwrap();

    let cancelled = db.jobs.cancel(job.id, &user).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);

    let again = db.jobs.cancel(job.id, &user).await.unwrap();
    assert_eq!(again.status, JobStatus::Cancelled);

    let stats = db.quota.snapshot(&user).await.unwrap();
    assert_eq!(stats.active_jobs, 0);
}

#[tokio::test]
#[ignore]
async fn complete_after_cancel_is_invalid_transition() {
    let db = Database::connect_test().await.unwrap();
    let user = test_user();

    let job = db
        .jobs
        .create(
            NewJob {
                user_id: user.clone(),
                media_object_key: format!("uploads/{}/{}/a.mp3", user, Uuid::new_v4()),
                file_size_bytes: 10 * MB,
                duration_seconds: 60.0,
                language: None,
            },
            &free_limits(),
        )
        .await
        .unwrap();
    force_processing(&db, job.id).await;
    db.jobs.cancel(job.id, &user).await.unwrap();

    let err = db.jobs.complete(job.id, &engine_output(1)).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    let stats = db.quota.snapshot(&user).await.unwrap();
    assert_eq!(stats.active_jobs, 0);
}

// ============================================================================
// Edit ledger
// ============================================================================

#[tokio::test]
#[ignore]
async fn edit_then_revert_restores_original_for_any_edit_sequence() {
    let db = Database::connect_test().await.unwrap();
    let user = test_user();
    let job_id = create_completed_job(&db, &user).await;

    let segment = db.segments.list(job_id).await.unwrap().remove(0);
    let original = segment.original_text.clone();

    let mut version = segment.version;
    for text in ["first edit", "second edit", "third edit"] {
        let updated = db
            .segments
            .update(job_id, segment.id, &user, text, version)
            .await
            .unwrap();
        assert_eq!(updated.current_text, text);
        assert_eq!(updated.original_text, original);
        version = updated.version;
    }

    let reverted = db.segments.revert(job_id, segment.id, &user).await.unwrap();
    assert_eq!(reverted.current_text, original);
    assert_eq!(reverted.original_text, original);
    assert_eq!(reverted.version, version + 1);
}

#[tokio::test]
#[ignore]
async fn stale_version_conflicts_without_mutation() {
    let db = Database::connect_test().await.unwrap();
    let user = test_user();
    let job_id = create_completed_job(&db, &user).await;

    let segment = db.segments.list(job_id).await.unwrap().remove(0);
    db.segments
        .update(job_id, segment.id, &user, "edited", segment.version)
        .await
        .unwrap();

    // Replay with the stale version.
    let err = db
        .segments
        .update(job_id, segment.id, &user, "conflicting edit", segment.version)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    let current = db.segments.list(job_id).await.unwrap().remove(0);
    assert_eq!(current.current_text, "edited");
    assert_eq!(current.version, segment.version + 1);
}

#[tokio::test]
#[ignore]
async fn revert_bumps_version_when_already_original() {
    let db = Database::connect_test().await.unwrap();
    let user = test_user();
    let job_id = create_completed_job(&db, &user).await;

    let segment = db.segments.list(job_id).await.unwrap().remove(0);
    assert_eq!(segment.current_text, segment.original_text);

    // Recorded idempotent event: state unchanged, version still advances.
    let reverted = db.segments.revert(job_id, segment.id, &user).await.unwrap();
    assert_eq!(reverted.current_text, reverted.original_text);
    assert_eq!(reverted.version, segment.version + 1);
    assert_eq!(reverted.last_edited_by.as_deref(), Some(user.as_str()));
}

#[tokio::test]
#[ignore]
async fn segment_of_foreign_job_is_not_found() {
    let db = Database::connect_test().await.unwrap();
    let owner = test_user();
    let stranger = test_user();
    let job_id = create_completed_job(&db, &owner).await;

    let segment = db.segments.list(job_id).await.unwrap().remove(0);
    let err = db
        .segments
        .update(job_id, segment.id, &stranger, "hijack", segment.version)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::JobNotFound(_)));
}

#[tokio::test]
#[ignore]
async fn segment_must_belong_to_named_job() {
    let db = Database::connect_test().await.unwrap();
    let user = test_user();
    let job_a = create_completed_job(&db, &user).await;
    let job_b = create_completed_job(&db, &user).await;

    let segment_of_a = db.segments.list(job_a).await.unwrap().remove(0);
    let err = db
        .segments
        .update(job_b, segment_of_a.id, &user, "cross-job edit", 1)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}
