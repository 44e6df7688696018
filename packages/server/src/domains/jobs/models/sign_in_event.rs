use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, QueryBuilder};

use crate::common::{ClientId, JobItemId, SignInEventId};

/// Rows per INSERT statement. Bounds payload size per call; the chunking is
/// not observable to callers and carries no partial-commit guarantee.
const INSERT_CHUNK_SIZE: usize = 100;

/// A persisted remote sign-in record.
///
/// The full remote payload is retained verbatim in `raw`; the remaining
/// columns denormalize the fields queried and exported most often. Rows are
/// owned by the item that produced them and never mutated after insert.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SignInEvent {
    pub id: SignInEventId,
    pub job_item_id: Option<JobItemId>,
    pub client_id: ClientId,
    pub remote_id: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
    pub user_display_name: Option<String>,
    pub user_principal_name: Option<String>,
    pub app_display_name: Option<String>,
    pub ip_address: Option<String>,
    pub client_app_used: Option<String>,
    pub is_interactive: Option<bool>,
    pub conditional_access_status: Option<String>,
    pub risk_state: Option<String>,
    pub status_error_code: Option<i32>,
    pub status_failure_reason: Option<String>,
    pub location: Option<serde_json::Value>,
    pub device_detail: Option<serde_json::Value>,
    pub raw: serde_json::Value,
    pub fetched_at: DateTime<Utc>,
}

/// An incoming record, extracted from one raw remote payload and ready for
/// insertion.
#[derive(Debug, Clone)]
pub struct NewSignInEvent {
    pub job_item_id: JobItemId,
    pub client_id: ClientId,
    pub remote_id: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
    pub user_display_name: Option<String>,
    pub user_principal_name: Option<String>,
    pub app_display_name: Option<String>,
    pub ip_address: Option<String>,
    pub client_app_used: Option<String>,
    pub is_interactive: Option<bool>,
    pub conditional_access_status: Option<String>,
    pub risk_state: Option<String>,
    pub status_error_code: Option<i32>,
    pub status_failure_reason: Option<String>,
    pub location: Option<serde_json::Value>,
    pub device_detail: Option<serde_json::Value>,
    pub raw: serde_json::Value,
}

fn str_field(value: &serde_json::Value, key: &str) -> Option<String> {
    value.get(key)?.as_str().map(Into::into)
}

impl NewSignInEvent {
    /// Denormalize a raw remote record. Absent or malformed fields become
    /// NULL columns; the raw payload is kept regardless.
    pub fn from_remote(
        record: &serde_json::Value,
        client_id: ClientId,
        job_item_id: JobItemId,
    ) -> Self {
        let status = record.get("status");
        Self {
            job_item_id,
            client_id,
            remote_id: str_field(record, "id"),
            occurred_at: str_field(record, "createdDateTime")
                .and_then(|s| s.parse::<DateTime<Utc>>().ok()),
            user_display_name: str_field(record, "userDisplayName"),
            user_principal_name: str_field(record, "userPrincipalName"),
            app_display_name: str_field(record, "appDisplayName"),
            ip_address: str_field(record, "ipAddress"),
            client_app_used: str_field(record, "clientAppUsed"),
            is_interactive: record.get("isInteractive").and_then(|v| v.as_bool()),
            conditional_access_status: str_field(record, "conditionalAccessStatus"),
            risk_state: str_field(record, "riskState"),
            status_error_code: status
                .and_then(|s| s.get("errorCode"))
                .and_then(|v| v.as_i64())
                .map(|c| c as i32),
            status_failure_reason: status
                .and_then(|s| str_field(s, "failureReason")),
            location: record.get("location").cloned(),
            device_detail: record.get("deviceDetail").cloned(),
            raw: record.clone(),
        }
    }
}

impl SignInEvent {
    /// Insert records in fixed-size chunks. Returns the number of rows
    /// written; a failed chunk propagates as-is.
    pub async fn insert_batch(events: &[NewSignInEvent], pool: &PgPool) -> Result<u64> {
        let mut inserted = 0u64;

        for chunk in events.chunks(INSERT_CHUNK_SIZE) {
            let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
                "INSERT INTO sign_in_events (id, job_item_id, client_id, remote_id, occurred_at, \
                 user_display_name, user_principal_name, app_display_name, ip_address, \
                 client_app_used, is_interactive, conditional_access_status, risk_state, \
                 status_error_code, status_failure_reason, location, device_detail, raw) ",
            );

            builder.push_values(chunk, |mut row, event| {
                row.push_bind(SignInEventId::new())
                    .push_bind(event.job_item_id)
                    .push_bind(event.client_id)
                    .push_bind(&event.remote_id)
                    .push_bind(event.occurred_at)
                    .push_bind(&event.user_display_name)
                    .push_bind(&event.user_principal_name)
                    .push_bind(&event.app_display_name)
                    .push_bind(&event.ip_address)
                    .push_bind(&event.client_app_used)
                    .push_bind(event.is_interactive)
                    .push_bind(&event.conditional_access_status)
                    .push_bind(&event.risk_state)
                    .push_bind(event.status_error_code)
                    .push_bind(&event.status_failure_reason)
                    .push_bind(&event.location)
                    .push_bind(&event.device_detail)
                    .push_bind(&event.raw);
            });

            let result = builder.build().execute(pool).await?;
            inserted += result.rows_affected();
        }

        Ok(inserted)
    }

    pub async fn list_for_item(job_item_id: JobItemId, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM sign_in_events WHERE job_item_id = $1 ORDER BY id",
        )
        .bind(job_item_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn count_for_item(job_item_id: JobItemId, pool: &PgPool) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM sign_in_events WHERE job_item_id = $1")
                .bind(job_item_id)
                .fetch_one(pool)
                .await?;
        Ok(count)
    }
}
