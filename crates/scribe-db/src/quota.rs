//! Quota repository: atomic reservation and release of plan capacity.
//!
//! The per-user counter row is the serialization point. Reservation upserts
//! the row (taking its lock), then performs a single guarded
//! check-and-increment — two concurrent reservations for the same user queue
//! on the row lock and the second re-evaluates the guard, so they can never
//! both succeed on the last slot.
//!
//! `active_jobs` is released exactly once per job via the `quota_reserved`
//! flag flip in [`release_for_job`]; the daily count is never refunded (it
//! tracks jobs created, not jobs concurrently active).

use chrono::{Datelike, NaiveDate, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::{error, warn};
use uuid::Uuid;

use scribe_core::{Error, LimitKind, PlanLimits, Reservation, Result, UsageStats};

/// Upsert the counter row for `(user, today)`, resetting the daily count on
/// day rollover. Holds the row lock for the rest of the transaction.
async fn upsert_counter(conn: &mut PgConnection, user_id: &str, today: NaiveDate) -> Result<()> {
    sqlx::query(
        "INSERT INTO usage_counter (user_id, day, jobs_created_today, active_jobs)
         VALUES ($1, $2, 0, 0)
         ON CONFLICT (user_id) DO UPDATE
         SET jobs_created_today = CASE
                 WHEN usage_counter.day = EXCLUDED.day THEN usage_counter.jobs_created_today
                 ELSE 0
             END,
             day = EXCLUDED.day",
    )
    .bind(user_id)
    .bind(today)
    .execute(&mut *conn)
    .await
    .map_err(Error::Database)?;
    Ok(())
}

/// Transaction-aware reservation: check-and-increment in one guarded UPDATE.
///
/// Returns the post-increment counters on success. On denial the counters are
/// untouched and the error names the first violated limit (concurrent before
/// daily, matching the check order of admission).
pub(crate) async fn try_reserve(
    conn: &mut PgConnection,
    user_id: &str,
    limits: &PlanLimits,
) -> Result<Reservation> {
    let today = Utc::now().date_naive();
    upsert_counter(conn, user_id, today).await?;

    let row: Option<(i32, i32)> = sqlx::query_as(
        "UPDATE usage_counter
         SET active_jobs = active_jobs + 1,
             jobs_created_today = jobs_created_today + 1
         WHERE user_id = $1
           AND active_jobs < $2
           AND ($3::int IS NULL OR jobs_created_today < $3)
         RETURNING jobs_created_today, active_jobs",
    )
    .bind(user_id)
    .bind(limits.max_concurrent_jobs)
    .bind(limits.daily_transcription_limit)
    .fetch_optional(&mut *conn)
    .await
    .map_err(Error::Database)?;

    match row {
        Some((jobs_created_today, active_jobs)) => Ok(Reservation {
            user_id: user_id.to_string(),
            jobs_created_today,
            active_jobs,
        }),
        None => {
            // Row is locked by the upsert above, so this read is consistent
            // with the failed guard.
            let (jobs_created_today, active_jobs): (i32, i32) = sqlx::query_as(
                "SELECT jobs_created_today, active_jobs FROM usage_counter WHERE user_id = $1",
            )
            .bind(user_id)
            .fetch_one(&mut *conn)
            .await
            .map_err(Error::Database)?;

            if active_jobs >= limits.max_concurrent_jobs {
                Err(Error::limit(
                    LimitKind::ConcurrentJobs,
                    format!(
                        "concurrent job limit of {} reached ({} active)",
                        limits.max_concurrent_jobs, active_jobs
                    ),
                ))
            } else {
                Err(Error::limit(
                    LimitKind::DailyJobs,
                    format!(
                        "daily transcription limit of {} files reached",
                        limits.daily_transcription_limit.unwrap_or(0)
                    ),
                ))
            }
        }
    }
}

/// Decrement `active_jobs` for a user. The guard keeps the counter at zero
/// even if an invariant violation elsewhere produced an extra call.
pub(crate) async fn release_slot(conn: &mut PgConnection, user_id: &str) -> Result<()> {
    let result = sqlx::query(
        "UPDATE usage_counter SET active_jobs = active_jobs - 1
         WHERE user_id = $1 AND active_jobs > 0",
    )
    .bind(user_id)
    .execute(&mut *conn)
    .await
    .map_err(Error::Database)?;

    if result.rows_affected() == 0 {
        // A release with no slot held is a programming error upstream.
        error!(
            subsystem = "db",
            component = "quota",
            user_id = %user_id,
            "Quota release with no active slot — invariant violation"
        );
    }
    Ok(())
}

/// Release the reservation held by a job, exactly once.
///
/// Flips the job's `quota_reserved` flag and decrements the owner's
/// `active_jobs` only when this call performed the flip. Safe to call from
/// every terminal-transition path; duplicates are no-ops.
pub(crate) async fn release_for_job(conn: &mut PgConnection, job_id: Uuid) -> Result<bool> {
    let owner: Option<(String,)> = sqlx::query_as(
        "UPDATE transcription_job SET quota_reserved = FALSE
         WHERE id = $1 AND quota_reserved = TRUE
         RETURNING user_id",
    )
    .bind(job_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(Error::Database)?;

    match owner {
        Some((user_id,)) => {
            release_slot(conn, &user_id).await?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Add completed audio minutes to the user's monthly usage.
pub(crate) async fn add_monthly_minutes(
    conn: &mut PgConnection,
    user_id: &str,
    minutes: f64,
) -> Result<()> {
    let month = current_month();
    sqlx::query(
        "INSERT INTO monthly_usage (user_id, month, used_minutes)
         VALUES ($1, $2, $3)
         ON CONFLICT (user_id, month) DO UPDATE
         SET used_minutes = monthly_usage.used_minutes + EXCLUDED.used_minutes",
    )
    .bind(user_id)
    .bind(month)
    .bind(minutes)
    .execute(&mut *conn)
    .await
    .map_err(Error::Database)?;
    Ok(())
}

fn current_month() -> NaiveDate {
    let now = Utc::now().date_naive();
    NaiveDate::from_ymd_opt(now.year(), now.month(), 1).unwrap_or(now)
}

/// PostgreSQL quota repository.
pub struct PgQuotaRepository {
    pool: PgPool,
}

impl PgQuotaRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Atomically reserve one job slot for the user against the given limits.
    ///
    /// The returned handle must be consumed exactly once — bound to a created
    /// job or passed back to [`release`](Self::release).
    pub async fn try_reserve(&self, user_id: &str, limits: &PlanLimits) -> Result<Reservation> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let reservation = try_reserve(&mut tx, user_id, limits).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(reservation)
    }

    /// Release a reservation that was never bound to a job.
    ///
    /// Consumes the handle, so it cannot be released twice.
    pub async fn release(&self, reservation: Reservation) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        release_slot(&mut tx, &reservation.user_id).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    /// Read-only usage snapshot for reporting. No side effects.
    pub async fn snapshot(&self, user_id: &str) -> Result<UsageStats> {
        let today = Utc::now().date_naive();

        let counter: Option<(NaiveDate, i32, i32)> = sqlx::query_as(
            "SELECT day, jobs_created_today, active_jobs FROM usage_counter WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        let (jobs_created_today, active_jobs) = match counter {
            // A stale day means nothing was created today yet.
            Some((day, created, active)) if day == today => (created, active),
            Some((_, _, active)) => (0, active),
            None => (0, 0),
        };

        let used_minutes: Option<(f64,)> = sqlx::query_as(
            "SELECT used_minutes FROM monthly_usage WHERE user_id = $1 AND month = $2",
        )
        .bind(user_id)
        .bind(current_month())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(UsageStats {
            used_minutes_this_month: used_minutes.map(|r| r.0).unwrap_or(0.0),
            jobs_created_today,
            active_jobs,
        })
    }

    /// Clamp-checked monthly accounting, standalone variant.
    pub async fn add_monthly_minutes(&self, user_id: &str, minutes: f64) -> Result<()> {
        if !minutes.is_finite() || minutes < 0.0 {
            warn!(
                subsystem = "db",
                component = "quota",
                user_id = %user_id,
                minutes,
                "Ignoring non-positive monthly minutes"
            );
            return Ok(());
        }
        let mut conn = self.pool.acquire().await.map_err(Error::Database)?;
        add_monthly_minutes(&mut conn, user_id, minutes).await
    }
}
