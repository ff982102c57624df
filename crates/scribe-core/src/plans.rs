//! Plan tiers, limits, and the pure admission checks.
//!
//! Limits are an immutable snapshot handed in from the billing boundary;
//! nothing in this module mutates usage. The counter increments live behind
//! the quota repository, which re-checks the concurrent/daily caps atomically
//! at the storage layer.

use serde::{Deserialize, Serialize};

use crate::error::{Error, LimitKind, Result};

/// Subscription tier as supplied by the billing collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Free,
    Pro,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Pro => "pro",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "pro" => PlanTier::Pro,
            _ => PlanTier::Free, // fallback
        }
    }
}

/// Immutable per-tier limit snapshot. Read-only to the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanLimits {
    /// Jobs a user may create per UTC day. `None` means unlimited.
    pub daily_transcription_limit: Option<i32>,
    pub max_minutes_per_file: f64,
    pub max_file_size_bytes: i64,
    pub max_concurrent_jobs: i32,
    /// Jobs from this tier are claimed before lower-priority ones.
    pub priority: i32,
    pub allow_translation: bool,
}

/// Maps a plan tier to its limit snapshot.
#[derive(Debug, Clone, Default)]
pub struct PlanResolver;

impl PlanResolver {
    pub fn limits(&self, tier: PlanTier) -> PlanLimits {
        match tier {
            PlanTier::Free => PlanLimits {
                daily_transcription_limit: Some(10),
                max_minutes_per_file: 10.0,
                max_file_size_bytes: 100 * 1024 * 1024,
                max_concurrent_jobs: 1,
                priority: 0,
                allow_translation: false,
            },
            PlanTier::Pro => PlanLimits {
                daily_transcription_limit: None,
                max_minutes_per_file: 300.0,
                max_file_size_bytes: 1024 * 1024 * 1024,
                max_concurrent_jobs: 5,
                priority: 10,
                allow_translation: true,
            },
        }
    }
}

/// Pure admission checks against a limit snapshot.
///
/// These are the deterministic, side-effect-free half of admission control.
/// The concurrent/daily checks here only give early, friendly denials — the
/// authoritative check-and-increment happens atomically in the quota
/// repository.
pub struct PlanGuard;

impl PlanGuard {
    pub fn ensure_file_size(limits: &PlanLimits, size_bytes: i64) -> Result<()> {
        if size_bytes > limits.max_file_size_bytes {
            return Err(Error::limit(
                LimitKind::FileSize,
                format!(
                    "file size ({} bytes) exceeds plan limit of {} bytes",
                    size_bytes, limits.max_file_size_bytes
                ),
            ));
        }
        Ok(())
    }

    pub fn ensure_duration(limits: &PlanLimits, duration_seconds: f64) -> Result<()> {
        let max_seconds = limits.max_minutes_per_file * 60.0;
        if duration_seconds > max_seconds {
            return Err(Error::limit(
                LimitKind::FileDuration,
                format!(
                    "audio duration ({:.1}s) exceeds plan limit of {} minutes",
                    duration_seconds, limits.max_minutes_per_file
                ),
            ));
        }
        Ok(())
    }

    pub fn ensure_concurrent_jobs(limits: &PlanLimits, active_jobs: i32) -> Result<()> {
        if active_jobs >= limits.max_concurrent_jobs {
            return Err(Error::limit(
                LimitKind::ConcurrentJobs,
                format!(
                    "concurrent job limit of {} reached, wait for a job to finish",
                    limits.max_concurrent_jobs
                ),
            ));
        }
        Ok(())
    }

    pub fn ensure_daily_limit(limits: &PlanLimits, jobs_created_today: i32) -> Result<()> {
        if let Some(daily) = limits.daily_transcription_limit {
            if jobs_created_today >= daily {
                return Err(Error::limit(
                    LimitKind::DailyJobs,
                    format!("daily transcription limit of {} files reached", daily),
                ));
            }
        }
        Ok(())
    }

    pub fn ensure_translation_allowed(limits: &PlanLimits) -> Result<()> {
        if !limits.allow_translation {
            return Err(Error::limit(
                LimitKind::Translation,
                "translation is not available on the current plan",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn free() -> PlanLimits {
        PlanResolver.limits(PlanTier::Free)
    }

    fn pro() -> PlanLimits {
        PlanResolver.limits(PlanTier::Pro)
    }

    #[test]
    fn test_tier_parse() {
        assert_eq!(PlanTier::parse("pro"), PlanTier::Pro);
        assert_eq!(PlanTier::parse("free"), PlanTier::Free);
        assert_eq!(PlanTier::parse("enterprise"), PlanTier::Free);
    }

    #[test]
    fn test_file_size_within_limit() {
        assert!(PlanGuard::ensure_file_size(&free(), 50 * 1024 * 1024).is_ok());
        assert!(PlanGuard::ensure_file_size(&free(), 100 * 1024 * 1024).is_ok());
    }

    #[test]
    fn test_file_size_over_limit() {
        let err = PlanGuard::ensure_file_size(&free(), 100 * 1024 * 1024 + 1).unwrap_err();
        match err {
            Error::PlanLimitExceeded { limit, .. } => assert_eq!(limit, LimitKind::FileSize),
            other => panic!("expected PlanLimitExceeded, got {other:?}"),
        }
    }

    #[test]
    fn test_duration_limits() {
        assert!(PlanGuard::ensure_duration(&free(), 10.0 * 60.0).is_ok());
        assert!(PlanGuard::ensure_duration(&free(), 10.0 * 60.0 + 0.5).is_err());
        // Pro allows five hours
        assert!(PlanGuard::ensure_duration(&pro(), 300.0 * 60.0).is_ok());
    }

    #[test]
    fn test_concurrent_jobs_boundary() {
        assert!(PlanGuard::ensure_concurrent_jobs(&free(), 0).is_ok());
        let err = PlanGuard::ensure_concurrent_jobs(&free(), 1).unwrap_err();
        match err {
            Error::PlanLimitExceeded { limit, .. } => {
                assert_eq!(limit, LimitKind::ConcurrentJobs)
            }
            other => panic!("expected PlanLimitExceeded, got {other:?}"),
        }
    }

    #[test]
    fn test_daily_limit_boundary() {
        assert!(PlanGuard::ensure_daily_limit(&free(), 9).is_ok());
        assert!(PlanGuard::ensure_daily_limit(&free(), 10).is_err());
    }

    #[test]
    fn test_daily_limit_unlimited_for_pro() {
        assert!(PlanGuard::ensure_daily_limit(&pro(), 100_000).is_ok());
    }

    #[test]
    fn test_translation_per_tier() {
        assert!(PlanGuard::ensure_translation_allowed(&pro()).is_ok());
        assert!(PlanGuard::ensure_translation_allowed(&free()).is_err());
    }

    #[test]
    fn test_pro_outranks_free_priority() {
        assert!(pro().priority > free().priority);
    }
}
