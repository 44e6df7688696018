use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use typed_builder::TypedBuilder;

use crate::common::ClientId;

/// A managed client tenant.
///
/// The abbreviation is the short label used everywhere a client is shown
/// (events, export filenames); it is unique across the roster.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: ClientId,
    pub abbreviation: String,
    pub name: Option<String>,
    pub group_name: Option<String>,
    pub is_active: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct CreateClient<'a> {
    pub abbreviation: &'a str,
    #[builder(default)]
    pub name: Option<&'a str>,
    #[builder(default)]
    pub group_name: Option<&'a str>,
}

impl Client {
    pub async fn list_all(pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM clients ORDER BY abbreviation")
            .fetch_all(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn list_active(pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM clients WHERE is_active = TRUE ORDER BY abbreviation",
        )
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_by_id(id: ClientId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM clients WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn create(params: &CreateClient<'_>, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO clients (id, abbreviation, name, group_name, is_active)
            VALUES ($1, $2, $3, $4, TRUE)
            RETURNING *
            "#,
        )
        .bind(ClientId::new())
        .bind(params.abbreviation)
        .bind(params.name)
        .bind(params.group_name)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    /// Upsert by abbreviation: inserts a new active client or refreshes the
    /// name/group of an existing one, stamping `last_synced_at`.
    pub async fn upsert_by_abbreviation(params: &CreateClient<'_>, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO clients (id, abbreviation, name, group_name, is_active, last_synced_at)
            VALUES ($1, $2, $3, $4, TRUE, NOW())
            ON CONFLICT (abbreviation) DO UPDATE SET
                name = EXCLUDED.name,
                group_name = EXCLUDED.group_name,
                last_synced_at = NOW()
            RETURNING *
            "#,
        )
        .bind(ClientId::new())
        .bind(params.abbreviation)
        .bind(params.name)
        .bind(params.group_name)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn set_active(id: ClientId, is_active: bool, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "UPDATE clients SET is_active = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(is_active)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }
}
