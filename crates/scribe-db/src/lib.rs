//! # scribe-db
//!
//! PostgreSQL persistence layer for the scribe transcription backend.
//!
//! This crate provides:
//! - Connection pool management
//! - Upload session repository with serialized multipart completion
//! - Quota repository with atomic per-user reservation
//! - Transcription job repository with guarded lifecycle transitions
//! - Transcript segment repository with optimistic-concurrency edits

pub mod jobs;
pub mod pool;
pub mod quota;
pub mod segments;
pub mod uploads;

#[cfg(test)]
mod tests;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use scribe_core::*;

// Re-export repository implementations
pub use jobs::{NewJob, PgTranscriptionJobRepository};
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use quota::PgQuotaRepository;
pub use segments::PgSegmentRepository;
pub use uploads::{CompletionStart, NewUploadSession, PgUploadSessionRepository};

/// Combined database context with all repositories.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Upload session repository.
    pub uploads: PgUploadSessionRepository,
    /// Quota/usage repository.
    pub quota: PgQuotaRepository,
    /// Transcription job repository.
    pub jobs: PgTranscriptionJobRepository,
    /// Transcript segment repository.
    pub segments: PgSegmentRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            uploads: PgUploadSessionRepository::new(pool.clone()),
            quota: PgQuotaRepository::new(pool.clone()),
            jobs: PgTranscriptionJobRepository::new(pool.clone()),
            segments: PgSegmentRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Connect to the test database (for integration tests).
    #[cfg(test)]
    pub async fn connect_test() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| crate::test_fixtures::DEFAULT_TEST_DATABASE_URL.to_string());
        Self::connect(&database_url).await
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}
