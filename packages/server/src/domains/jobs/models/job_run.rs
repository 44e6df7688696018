use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::common::JobRunId;

/// Lifecycle of runs and items (shared state machine).
///
/// Status only moves forward: `pending → running → {completed, failed,
/// cancelled}`; the three right-hand states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            _ => Err(anyhow::anyhow!("Invalid job status: {}", s)),
        }
    }
}

/// One extraction campaign across a set of clients.
///
/// `total_clients` is fixed at creation; `completed_clients +
/// failed_clients` never exceeds it. Runs are mutated only by the
/// orchestrator and never deleted here.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct JobRun {
    pub id: JobRunId,
    pub status: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_clients: i32,
    pub completed_clients: i32,
    pub failed_clients: i32,
    pub created_at: DateTime<Utc>,
}

impl JobRun {
    pub async fn create(total_clients: i32, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO job_runs (id, status, total_clients, completed_clients, failed_clients)
            VALUES ($1, 'pending', $2, 0, 0)
            RETURNING *
            "#,
        )
        .bind(JobRunId::new())
        .bind(total_clients)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_by_id(id: JobRunId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM job_runs WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// Recent runs, newest first.
    pub async fn list_recent(limit: i64, offset: i64, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM job_runs ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn mark_running(id: JobRunId, pool: &PgPool) -> Result<()> {
        sqlx::query("UPDATE job_runs SET status = 'running', started_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Persist the running completed/failed tallies mid-flight.
    pub async fn update_counts(
        id: JobRunId,
        completed: i32,
        failed: i32,
        pool: &PgPool,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE job_runs SET completed_clients = $2, failed_clients = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(completed)
        .bind(failed)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Move the run to a terminal status with final counts.
    pub async fn finalize(
        id: JobRunId,
        status: JobStatus,
        completed: i32,
        failed: i32,
        pool: &PgPool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE job_runs SET
                status = $2,
                completed_clients = $3,
                failed_clients = $4,
                completed_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(completed)
        .bind(failed)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Dead-run cleanup: mark cancelled without touching counts.
    pub async fn mark_cancelled(id: JobRunId, pool: &PgPool) -> Result<()> {
        sqlx::query(
            "UPDATE job_runs SET status = 'cancelled', completed_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn status_display_parse_roundtrip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            let parsed: JobStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("paused".parse::<JobStatus>().is_err());
    }
}
