use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

/// Outcome classification of one diagnostic check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "precheck_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PrecheckStatus {
    Pass,
    Fail,
    Warn,
    Skipped,
}

/// A persisted diagnostic result.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PrecheckResult {
    pub id: i32,
    pub check_name: String,
    pub status: PrecheckStatus,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub checked_at: DateTime<Utc>,
}

impl PrecheckResult {
    pub async fn insert(
        check_name: &str,
        status: PrecheckStatus,
        message: &str,
        details: Option<&serde_json::Value>,
        pool: &PgPool,
    ) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO precheck_results (check_name, status, message, details)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(check_name)
        .bind(status)
        .bind(message)
        .bind(details)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    /// The most recent result per check name.
    pub async fn list_latest(pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT DISTINCT ON (check_name) *
            FROM precheck_results
            ORDER BY check_name, checked_at DESC
            "#,
        )
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }
}
