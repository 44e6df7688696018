//! Runtime settings resolution.
//!
//! Priority: database override → environment variable → compiled default.
//! A database read failure logs a warning and falls through, so a degraded
//! database never blocks reading a setting that has an env fallback.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domains::jobs::RunDefaults;

use super::model::Setting;

pub const DEFAULT_DATE_RANGE_DAYS: &str = "default_date_range_days";
pub const GRAPH_PAGE_SIZE: &str = "graph_page_size";
pub const EXPORT_OUTPUT_DIR: &str = "export_output_dir";

/// Every known key with its compiled default.
const DEFAULTS: &[(&str, &str)] = &[
    (DEFAULT_DATE_RANGE_DAYS, "7"),
    (GRAPH_PAGE_SIZE, "500"),
    (EXPORT_OUTPUT_DIR, "./exports"),
];

#[derive(Clone)]
pub struct SettingsService {
    pool: PgPool,
}

impl SettingsService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Resolve one key: DB → env (`SNAKE_CASE` upper) → default.
    pub async fn resolve(&self, key: &str) -> Option<String> {
        match Setting::find(key, &self.pool).await {
            Ok(Some(setting)) => return Some(setting.value.trim().to_string()),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(key, error = %e, "settings read failed, using fallback");
            }
        }

        if let Ok(value) = std::env::var(key.to_uppercase()) {
            return Some(value.trim().to_string());
        }

        DEFAULTS
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string())
    }

    /// Every known key with fallbacks applied.
    pub async fn resolve_all(&self) -> HashMap<String, String> {
        let mut resolved = HashMap::new();
        for (key, _) in DEFAULTS {
            if let Some(value) = self.resolve(key).await {
                resolved.insert(key.to_string(), value);
            }
        }
        resolved
    }

    pub async fn export_dir(&self) -> String {
        self.resolve(EXPORT_OUTPUT_DIR)
            .await
            .unwrap_or_else(|| "./exports".to_string())
    }
}

#[async_trait]
impl RunDefaults for SettingsService {
    async fn date_range_days(&self) -> i64 {
        self.resolve(DEFAULT_DATE_RANGE_DAYS)
            .await
            .and_then(|v| v.parse().ok())
            .unwrap_or(7)
    }

    async fn page_size(&self) -> u32 {
        self.resolve(GRAPH_PAGE_SIZE)
            .await
            .and_then(|v| v.parse().ok())
            .unwrap_or(500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    /// A pool that connects lazily and never succeeds, forcing the
    /// env/default fallback chain.
    fn unreachable_pool() -> PgPool {
        PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_millis(500))
            .connect_lazy("postgres://nobody@127.0.0.1:1/nothing")
            .unwrap()
    }

    #[tokio::test]
    async fn unknown_key_resolves_to_nothing() {
        let service = SettingsService::new(unreachable_pool());
        assert_eq!(service.resolve("no_such_key").await, None);
    }

    #[tokio::test]
    async fn compiled_defaults_apply_last() {
        let service = SettingsService::new(unreachable_pool());
        assert_eq!(
            service.resolve(DEFAULT_DATE_RANGE_DAYS).await.as_deref(),
            Some("7")
        );
        assert_eq!(service.resolve(GRAPH_PAGE_SIZE).await.as_deref(), Some("500"));
        assert_eq!(service.date_range_days().await, 7);
        assert_eq!(service.page_size().await, 500);
    }

    #[tokio::test]
    async fn environment_overrides_defaults() {
        // Env mutation: key is unique to this test to avoid interference.
        std::env::set_var("EXPORT_OUTPUT_DIR", "/tmp/exports-test");
        let service = SettingsService::new(unreachable_pool());
        assert_eq!(service.export_dir().await, "/tmp/exports-test");
        std::env::remove_var("EXPORT_OUTPUT_DIR");
    }

    #[tokio::test]
    async fn resolve_all_covers_every_known_key() {
        let service = SettingsService::new(unreachable_pool());
        let resolved = service.resolve_all().await;
        assert_eq!(resolved.len(), DEFAULTS.len());
        assert!(resolved.contains_key(GRAPH_PAGE_SIZE));
    }
}
