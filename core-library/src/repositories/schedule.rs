//! Persisted schedule records for recurring jobs.

use crate::error::Result;
use crate::models::ScheduleRecord;
use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};
use std::time::Duration;
use tracing::info;

#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// Create the record for `job_type` unless one exists.
    ///
    /// Returns the stored record (which keeps its original period when it
    /// already existed) and whether this call created it.
    async fn ensure(&self, job_type: &str, period: Duration, now: i64) -> Result<(ScheduleRecord, bool)>;

    async fn find(&self, job_type: &str) -> Result<Option<ScheduleRecord>>;

    /// Record that a pass finished at `at` (unix millis).
    async fn record_run(&self, job_type: &str, at: i64) -> Result<()>;
}

pub struct SqliteScheduleRepository {
    pool: SqlitePool,
}

impl SqliteScheduleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct ScheduleRow {
    job_type: String,
    period_ms: i64,
    created_at: i64,
    last_run_at: Option<i64>,
}

impl From<ScheduleRow> for ScheduleRecord {
    fn from(row: ScheduleRow) -> Self {
        ScheduleRecord {
            job_type: row.job_type,
            period: Duration::from_millis(row.period_ms.max(0) as u64),
            created_at: row.created_at,
            last_run_at: row.last_run_at,
        }
    }
}

#[async_trait]
impl ScheduleRepository for SqliteScheduleRepository {
    async fn ensure(&self, job_type: &str, period: Duration, now: i64) -> Result<(ScheduleRecord, bool)> {
        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO schedule_records (job_type, period_ms, created_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(job_type)
        .bind(period.as_millis() as i64)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let created = inserted.rows_affected() > 0;
        if created {
            info!(job_type, period_secs = period.as_secs(), "Schedule record created");
        }

        let row = sqlx::query_as::<_, ScheduleRow>(
            "SELECT job_type, period_ms, created_at, last_run_at FROM schedule_records WHERE job_type = ?",
        )
        .bind(job_type)
        .fetch_one(&self.pool)
        .await?;

        Ok((row.into(), created))
    }

    async fn find(&self, job_type: &str) -> Result<Option<ScheduleRecord>> {
        let row = sqlx::query_as::<_, ScheduleRow>(
            "SELECT job_type, period_ms, created_at, last_run_at FROM schedule_records WHERE job_type = ?",
        )
        .bind(job_type)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ScheduleRecord::from))
    }

    async fn record_run(&self, job_type: &str, at: i64) -> Result<()> {
        sqlx::query("UPDATE schedule_records SET last_run_at = ? WHERE job_type = ?")
            .bind(at)
            .bind(job_type)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
