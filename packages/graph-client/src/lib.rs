//! Microsoft Graph REST client for sign-in audit logs.
//!
//! A minimal client for the pieces of Graph this service needs: acquiring
//! app-only tokens via the client-credentials grant, paging through
//! `/auditLogs/signIns`, and probing connectivity. Rate limiting (429 with
//! `Retry-After`) and transient server errors are retried with exponential
//! backoff; every wait is abortable through a [`CancellationToken`].
//!
//! # Example
//!
//! ```rust,ignore
//! use graph_client::GraphClient;
//! use tokio_util::sync::CancellationToken;
//!
//! let graph = GraphClient::new();
//! let token = graph.acquire_token(tenant, app_id, secret).await?;
//!
//! let mut next = Some(graph.signins_url(from, to, 500));
//! while let Some(url) = next {
//!     let page = graph.fetch_signins_page(&url, &token, &CancellationToken::new()).await?;
//!     next = page.next_link;
//! }
//! ```

pub mod error;
pub mod types;

pub use error::{GraphError, Result};
pub use types::{ConnectionTest, Organization, OrganizationResponse, SignInsPage, TokenResponse};

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use url::Url;

pub const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
pub const AUTHORITY_BASE_URL: &str = "https://login.microsoftonline.com";
pub const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Total attempts per page fetch, including the first one.
const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Cached tokens are discarded this long before they actually expire, so a
/// token handed to a page loop does not die mid-extraction.
const TOKEN_EXPIRY_SLACK_SECS: i64 = 60;

struct CachedToken {
    bearer: String,
    expires_at: DateTime<Utc>,
}

pub struct GraphClient {
    http: reqwest::Client,
    base_url: String,
    authority_base: String,
    /// App-only tokens keyed by tenant id.
    tokens: RwLock<HashMap<String, CachedToken>>,
}

impl Default for GraphClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .expect("Failed to create HTTP client"),
            base_url: GRAPH_BASE_URL.to_string(),
            authority_base: AUTHORITY_BASE_URL.to_string(),
            tokens: RwLock::new(HashMap::new()),
        }
    }

    /// Point API calls at a different base URL (test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Point token acquisition at a different authority (test servers).
    pub fn with_authority_base(mut self, authority_base: impl Into<String>) -> Self {
        self.authority_base = authority_base.into();
        self
    }

    /// Acquire an app-only bearer token for a tenant, using the OAuth2
    /// client-credentials grant. Tokens are cached per tenant and reused
    /// until shortly before expiry.
    pub async fn acquire_token(
        &self,
        tenant_id: &str,
        app_id: &str,
        client_secret: &str,
    ) -> Result<String> {
        {
            let tokens = self.tokens.read().await;
            if let Some(cached) = tokens.get(tenant_id) {
                if cached.expires_at > Utc::now() {
                    return Ok(cached.bearer.clone());
                }
            }
        }

        let token_url = format!("{}/{}/oauth2/v2.0/token", self.authority_base, tenant_id);
        let form = [
            ("client_id", app_id),
            ("client_secret", client_secret),
            ("scope", GRAPH_SCOPE),
            ("grant_type", "client_credentials"),
        ];

        let resp = self.http.post(&token_url).form(&form).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GraphError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let token: TokenResponse = resp.json().await?;
        let bearer = token.access_token.ok_or(GraphError::EmptyToken)?;
        let lifetime = token.expires_in.unwrap_or(3600);

        tracing::info!(tenant_id, expires_in = lifetime, "acquired Graph token");

        let mut tokens = self.tokens.write().await;
        tokens.insert(
            tenant_id.to_string(),
            CachedToken {
                bearer: bearer.clone(),
                expires_at: Utc::now()
                    + chrono::Duration::seconds((lifetime - TOKEN_EXPIRY_SLACK_SECS).max(0)),
            },
        );

        Ok(bearer)
    }

    /// Drop the cached token for a tenant (e.g. after its credential
    /// changed), or all cached tokens when `tenant_id` is `None`.
    pub async fn clear_token_cache(&self, tenant_id: Option<&str>) {
        let mut tokens = self.tokens.write().await;
        match tenant_id {
            Some(tenant) => {
                tokens.remove(tenant);
            }
            None => tokens.clear(),
        }
    }

    /// Build the first-page URL for the sign-ins collection: filtered to the
    /// inclusive creation-time window, `page_size` records per page, newest
    /// first.
    pub fn signins_url(
        &self,
        date_from: DateTime<Utc>,
        date_to: DateTime<Utc>,
        page_size: u32,
    ) -> String {
        let filter = format!(
            "createdDateTime ge {} and createdDateTime le {}",
            date_from.to_rfc3339_opts(SecondsFormat::Secs, true),
            date_to.to_rfc3339_opts(SecondsFormat::Secs, true),
        );

        let mut url = Url::parse(&format!("{}/auditLogs/signIns", self.base_url))
            .expect("base URL is valid");
        url.query_pairs_mut()
            .append_pair("$filter", &filter)
            .append_pair("$top", &page_size.to_string())
            .append_pair("$orderby", "createdDateTime desc");
        url.into()
    }

    /// Fetch one page of sign-ins.
    ///
    /// Retries 429 (honoring a positive `Retry-After`) and 5xx responses
    /// with exponential backoff, up to [`MAX_ATTEMPTS`] attempts total.
    /// Other non-2xx statuses fail immediately. The cancellation token is
    /// observed before every attempt and during every backoff wait; a fired
    /// token yields [`GraphError::Aborted`].
    pub async fn fetch_signins_page(
        &self,
        url: &str,
        bearer: &str,
        cancel: &CancellationToken,
    ) -> Result<SignInsPage> {
        let mut last_status = 0u16;

        for attempt in 0..MAX_ATTEMPTS {
            if cancel.is_cancelled() {
                return Err(GraphError::Aborted);
            }

            let resp = self.http.get(url).bearer_auth(bearer).send().await?;
            let status = resp.status();
            last_status = status.as_u16();

            if status.is_success() {
                return Ok(resp.json().await?);
            }

            if status.as_u16() == 429 {
                let retry_after = resp
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok());
                let wait = backoff_delay(attempt, retry_after);
                tracing::warn!(
                    wait_ms = wait.as_millis() as u64,
                    attempt = attempt + 1,
                    max_attempts = MAX_ATTEMPTS,
                    "Graph API rate limited"
                );
                self.sleep_abortable(wait, cancel).await?;
                continue;
            }

            if status.is_server_error() {
                let wait = backoff_delay(attempt, None);
                tracing::warn!(
                    status = last_status,
                    wait_ms = wait.as_millis() as u64,
                    attempt = attempt + 1,
                    max_attempts = MAX_ATTEMPTS,
                    "Graph API server error, retrying"
                );
                self.sleep_abortable(wait, cancel).await?;
                continue;
            }

            // Client errors other than 429 are not retryable.
            let body = resp.text().await.unwrap_or_default();
            return Err(GraphError::Api {
                status: last_status,
                message: body,
            });
        }

        Err(GraphError::RetriesExhausted {
            attempts: MAX_ATTEMPTS,
            last_status,
        })
    }

    /// Test connectivity for a credential: acquire a token, then hit the
    /// lightweight `/organization` endpoint.
    pub async fn test_connection(
        &self,
        tenant_id: &str,
        app_id: &str,
        client_secret: &str,
    ) -> ConnectionTest {
        let token = match self.acquire_token(tenant_id, app_id, client_secret).await {
            Ok(token) => token,
            Err(e) => {
                tracing::error!(tenant_id, error = %e, "Graph connection test failed");
                return ConnectionTest {
                    success: false,
                    tenant_name: None,
                    error: Some(e.to_string()),
                };
            }
        };

        let url = format!("{}/organization", self.base_url);
        let resp = match self.http.get(&url).bearer_auth(&token).send().await {
            Ok(resp) => resp,
            Err(e) => {
                return ConnectionTest {
                    success: false,
                    tenant_name: None,
                    error: Some(e.to_string()),
                }
            }
        };

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return ConnectionTest {
                success: false,
                tenant_name: None,
                error: Some(format!("Graph API returned {}: {}", status.as_u16(), body)),
            };
        }

        let org: OrganizationResponse = match resp.json().await {
            Ok(org) => org,
            Err(e) => {
                return ConnectionTest {
                    success: false,
                    tenant_name: None,
                    error: Some(e.to_string()),
                }
            }
        };

        ConnectionTest {
            success: true,
            tenant_name: org.value.into_iter().next().and_then(|o| o.display_name),
            error: None,
        }
    }

    /// Sleep that resolves early (as `Aborted`) when the token fires.
    async fn sleep_abortable(&self, wait: Duration, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            _ = cancel.cancelled() => Err(GraphError::Aborted),
            _ = tokio::time::sleep(wait) => Ok(()),
        }
    }
}

/// Backoff before the next attempt: a positive `Retry-After` wins, otherwise
/// `1000ms × 2^attempt`.
fn backoff_delay(attempt: u32, retry_after_secs: Option<u64>) -> Duration {
    match retry_after_secs {
        Some(secs) if secs > 0 => Duration::from_secs(secs),
        _ => Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_prefers_retry_after() {
        assert_eq!(backoff_delay(0, Some(2)), Duration::from_secs(2));
        assert_eq!(backoff_delay(2, Some(7)), Duration::from_secs(7));
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(backoff_delay(0, None), Duration::from_millis(1000));
        assert_eq!(backoff_delay(1, None), Duration::from_millis(2000));
        assert_eq!(backoff_delay(2, None), Duration::from_millis(4000));
    }

    #[test]
    fn backoff_ignores_non_positive_retry_after() {
        assert_eq!(backoff_delay(1, Some(0)), Duration::from_millis(2000));
    }

    #[test]
    fn signins_url_carries_window_and_paging() {
        let graph = GraphClient::new();
        let from = "2026-07-01T00:00:00Z".parse().unwrap();
        let to = "2026-07-08T00:00:00Z".parse().unwrap();
        let url = graph.signins_url(from, to, 500);

        assert!(url.starts_with("https://graph.microsoft.com/v1.0/auditLogs/signIns?"));
        assert!(url.contains("createdDateTime+ge+2026-07-01T00%3A00%3A00Z"));
        assert!(url.contains("createdDateTime+le+2026-07-08T00%3A00%3A00Z"));
        assert!(url.contains("%24top=500"));
        assert!(url.contains("%24orderby=createdDateTime+desc"));
    }
}
