use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::common::{ClientId, CredentialId, JobItemId, JobRunId};

use super::job_run::JobStatus;

/// One client's extraction within a run.
///
/// Exactly one item exists per eligible client per run, created together
/// with the run before processing starts. A missing credential reference is
/// a terminal failure cause for the item, not for the run.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct JobItem {
    pub id: JobItemId,
    pub job_run_id: JobRunId,
    pub client_id: ClientId,
    pub credential_id: Option<CredentialId>,
    pub status: JobStatus,
    pub sign_in_count: i64,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobItem {
    pub async fn create(
        job_run_id: JobRunId,
        client_id: ClientId,
        credential_id: Option<CredentialId>,
        pool: &PgPool,
    ) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO job_items (id, job_run_id, client_id, credential_id, status, sign_in_count)
            VALUES ($1, $2, $3, $4, 'pending', 0)
            RETURNING *
            "#,
        )
        .bind(JobItemId::new())
        .bind(job_run_id)
        .bind(client_id)
        .bind(credential_id)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    /// Items of a run in creation order (v7 ids sort chronologically).
    pub async fn list_for_run(job_run_id: JobRunId, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM job_items WHERE job_run_id = $1 ORDER BY id")
            .bind(job_run_id)
            .fetch_all(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn mark_running(id: JobItemId, pool: &PgPool) -> Result<()> {
        sqlx::query("UPDATE job_items SET status = 'running', started_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn mark_completed(id: JobItemId, sign_in_count: i64, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE job_items SET
                status = 'completed',
                sign_in_count = $2,
                completed_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(sign_in_count)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn mark_failed(id: JobItemId, error_message: &str, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE job_items SET
                status = 'failed',
                error_message = $2,
                completed_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error_message)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn mark_cancelled(id: JobItemId, pool: &PgPool) -> Result<()> {
        sqlx::query(
            "UPDATE job_items SET status = 'cancelled', completed_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Cancel every still-pending item of a run. Returns how many moved.
    pub async fn cancel_pending_for_run(job_run_id: JobRunId, pool: &PgPool) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE job_items SET status = 'cancelled', completed_at = NOW()
            WHERE job_run_id = $1 AND status = 'pending'
            "#,
        )
        .bind(job_run_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
