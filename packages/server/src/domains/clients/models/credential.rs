use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use typed_builder::TypedBuilder;

use crate::common::{ClientId, CredentialId};

/// A client's app registration for the remote sign-in API.
///
/// The secret never leaves the database through the HTTP API: list and read
/// endpoints serve [`RedactedCredential`] instead.
#[derive(Debug, Clone, Deserialize, sqlx::FromRow)]
pub struct Credential {
    pub id: CredentialId,
    pub client_id: Option<ClientId>,
    pub email: String,
    pub tenant_id: Option<String>,
    pub app_id: Option<String>,
    pub client_secret: Option<String>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The remote-API portion of a credential, present only when complete.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub tenant_id: String,
    pub app_id: String,
    pub client_secret: String,
}

/// Safe projection of a credential for API responses: configuration
/// presence is visible, the secret itself is not.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactedCredential {
    pub id: CredentialId,
    pub client_id: Option<ClientId>,
    pub email: String,
    pub tenant_id: Option<String>,
    pub app_id: Option<String>,
    pub has_client_secret: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct CreateCredential<'a> {
    pub client_id: ClientId,
    pub email: &'a str,
}

impl Credential {
    /// The complete remote-API configuration, or `None` if any piece is
    /// missing or blank. Eligibility for extraction hinges on this.
    pub fn api_config(&self) -> Option<ApiConfig> {
        let tenant_id = self.tenant_id.as_deref()?.trim();
        let app_id = self.app_id.as_deref()?.trim();
        let client_secret = self.client_secret.as_deref()?.trim();
        if tenant_id.is_empty() || app_id.is_empty() || client_secret.is_empty() {
            return None;
        }
        Some(ApiConfig {
            tenant_id: tenant_id.to_string(),
            app_id: app_id.to_string(),
            client_secret: client_secret.to_string(),
        })
    }

    pub fn redacted(&self) -> RedactedCredential {
        RedactedCredential {
            id: self.id,
            client_id: self.client_id,
            email: self.email.clone(),
            tenant_id: self.tenant_id.clone(),
            app_id: self.app_id.clone(),
            has_client_secret: self
                .client_secret
                .as_deref()
                .is_some_and(|s| !s.is_empty()),
            last_used_at: self.last_used_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub async fn list_all(pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM credentials ORDER BY created_at")
            .fetch_all(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn find_by_id(id: CredentialId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM credentials WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn find_by_client(client_id: ClientId, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM credentials WHERE client_id = $1 ORDER BY created_at",
        )
        .bind(client_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn create(params: &CreateCredential<'_>, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO credentials (id, client_id, email)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(CredentialId::new())
        .bind(params.client_id)
        .bind(params.email)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    /// Replace the remote-API configuration.
    pub async fn set_api_config(
        id: CredentialId,
        config: &ApiConfig,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE credentials SET
                tenant_id = $2,
                app_id = $3,
                client_secret = $4,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&config.tenant_id)
        .bind(&config.app_id)
        .bind(&config.client_secret)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn touch_last_used(id: CredentialId, pool: &PgPool) -> Result<()> {
        sqlx::query("UPDATE credentials SET last_used_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(tenant: Option<&str>, app: Option<&str>, secret: Option<&str>) -> Credential {
        Credential {
            id: CredentialId::new(),
            client_id: Some(ClientId::new()),
            email: "admin@example.com".into(),
            tenant_id: tenant.map(Into::into),
            app_id: app.map(Into::into),
            client_secret: secret.map(Into::into),
            last_used_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn complete_config_is_detected() {
        let cred = credential(Some("tenant"), Some("app"), Some("secret"));
        let config = cred.api_config().unwrap();
        assert_eq!(config.tenant_id, "tenant");
        assert_eq!(config.app_id, "app");
    }

    #[test]
    fn missing_or_blank_pieces_mean_no_config() {
        assert!(credential(None, Some("app"), Some("secret"))
            .api_config()
            .is_none());
        assert!(credential(Some("tenant"), Some("app"), None)
            .api_config()
            .is_none());
        assert!(credential(Some("tenant"), Some(""), Some("secret"))
            .api_config()
            .is_none());
        assert!(credential(Some("  "), Some("app"), Some("secret"))
            .api_config()
            .is_none());
    }

    #[test]
    fn redaction_never_serializes_the_secret() {
        let cred = credential(Some("tenant"), Some("app"), Some("super-secret"));
        let json = serde_json::to_string(&cred.redacted()).unwrap();
        assert!(!json.contains("super-secret"));
        assert!(json.contains(r#""hasClientSecret":true"#));
    }

    #[test]
    fn empty_secret_reports_absent() {
        let cred = credential(Some("tenant"), Some("app"), Some(""));
        assert!(!cred.redacted().has_client_secret);
    }
}
