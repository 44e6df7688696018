//! On-demand diagnostics run before an extraction campaign.
//!
//! Each check produces a status plus a human-readable message, is persisted
//! to `precheck_results`, and is streamed over the event feed as it
//! finishes. Checks never abort the sweep: a broken dependency shows up as
//! a failed check, not an error.

use std::collections::BTreeSet;

use graph_client::GraphClient;
use serde::Serialize;
use sqlx::PgPool;

use crate::domains::clients::{Client, Credential};
use crate::domains::settings::{
    SettingsService, DEFAULT_DATE_RANGE_DAYS, GRAPH_PAGE_SIZE,
};
use crate::kernel::events::{AppEvent, EventPublisher};

use super::model::{PrecheckResult, PrecheckStatus};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrecheckOutcome {
    pub check_name: String,
    pub status: PrecheckStatus,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl PrecheckOutcome {
    fn new(check_name: &str, status: PrecheckStatus, message: impl Into<String>) -> Self {
        Self {
            check_name: check_name.to_string(),
            status,
            message: message.into(),
            details: None,
        }
    }

    fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Run every check, persist and stream each result as it finishes, and
/// return them in order.
pub async fn run_prechecks(
    pool: &PgPool,
    graph: &GraphClient,
    settings: &SettingsService,
    events: &dyn EventPublisher,
) -> Vec<PrecheckOutcome> {
    let clients = Client::list_active(pool).await.unwrap_or_default();
    let credentials = Credential::list_all(pool).await.unwrap_or_default();

    let distinct_tenants: BTreeSet<_> = credentials
        .iter()
        .filter_map(|c| c.api_config())
        .map(|c| c.tenant_id)
        .collect();
    let total_checks = 4 + distinct_tenants.len().max(1);
    events.publish(AppEvent::PrecheckStarted { total_checks });

    let mut outcomes = Vec::with_capacity(total_checks);
    let mut passed = 0;
    let mut failed = 0;

    let mut record = |outcome: PrecheckOutcome| {
        match outcome.status {
            PrecheckStatus::Fail => failed += 1,
            PrecheckStatus::Pass => passed += 1,
            _ => {}
        }
        events.publish(AppEvent::PrecheckResult {
            check_name: outcome.check_name.clone(),
            status: outcome.status,
            message: outcome.message.clone(),
        });
        outcomes.push(outcome);
    };

    record(check_database(pool).await);
    record(check_settings(settings).await);
    record(check_clients(&clients));
    record(credentials_summary(&clients, &credentials));
    for outcome in check_remote_connectivity(graph, &credentials).await {
        record(outcome);
    }
    drop(record);

    for outcome in &outcomes {
        if let Err(e) = PrecheckResult::insert(
            &outcome.check_name,
            outcome.status,
            &outcome.message,
            outcome.details.as_ref(),
            pool,
        )
        .await
        {
            tracing::warn!(check = %outcome.check_name, error = %e, "failed to persist precheck result");
        }
    }

    events.publish(AppEvent::PrecheckCompleted {
        total: outcomes.len(),
        passed,
        failed,
    });

    outcomes
}

async fn check_database(pool: &PgPool) -> PrecheckOutcome {
    match sqlx::query("SELECT 1").execute(pool).await {
        Ok(_) => PrecheckOutcome::new("database", PrecheckStatus::Pass, "Database is reachable."),
        Err(e) => PrecheckOutcome::new(
            "database",
            PrecheckStatus::Fail,
            format!("Database query failed: {}", e),
        ),
    }
}

async fn check_settings(settings: &SettingsService) -> PrecheckOutcome {
    let resolved = settings.resolve_all().await;
    let days_ok = resolved
        .get(DEFAULT_DATE_RANGE_DAYS)
        .and_then(|v| v.parse::<i64>().ok())
        .is_some_and(|d| d > 0);
    let page_ok = resolved
        .get(GRAPH_PAGE_SIZE)
        .and_then(|v| v.parse::<u32>().ok())
        .is_some_and(|p| (1..=1000).contains(&p));

    if days_ok && page_ok {
        PrecheckOutcome::new("settings", PrecheckStatus::Pass, "Settings are valid.")
            .with_details(serde_json::json!(resolved))
    } else {
        PrecheckOutcome::new(
            "settings",
            PrecheckStatus::Fail,
            "default_date_range_days must be a positive number and graph_page_size between 1 and 1000.",
        )
        .with_details(serde_json::json!(resolved))
    }
}

fn check_clients(clients: &[Client]) -> PrecheckOutcome {
    if clients.is_empty() {
        PrecheckOutcome::new(
            "clients",
            PrecheckStatus::Warn,
            "No active clients in the roster.",
        )
    } else {
        PrecheckOutcome::new(
            "clients",
            PrecheckStatus::Pass,
            format!("{} active client(s).", clients.len()),
        )
        .with_details(serde_json::json!({ "activeClients": clients.len() }))
    }
}

/// How many active clients carry a complete remote-API configuration.
fn credentials_summary(clients: &[Client], credentials: &[Credential]) -> PrecheckOutcome {
    let configured: BTreeSet<_> = credentials
        .iter()
        .filter(|c| c.api_config().is_some())
        .filter_map(|c| c.client_id)
        .collect();
    let covered = clients.iter().filter(|c| configured.contains(&c.id)).count();

    let details = serde_json::json!({
        "activeClients": clients.len(),
        "clientsWithCredentials": covered,
    });

    if clients.is_empty() || covered == clients.len() {
        PrecheckOutcome::new(
            "credentials",
            PrecheckStatus::Pass,
            "Every active client has remote API credentials.",
        )
        .with_details(details)
    } else if covered == 0 {
        PrecheckOutcome::new(
            "credentials",
            PrecheckStatus::Fail,
            "No active client has remote API credentials configured.",
        )
        .with_details(details)
    } else {
        PrecheckOutcome::new(
            "credentials",
            PrecheckStatus::Warn,
            format!(
                "{} of {} active clients have remote API credentials.",
                covered,
                clients.len()
            ),
        )
        .with_details(details)
    }
}

/// One connectivity probe per distinct tenant.
async fn check_remote_connectivity(
    graph: &GraphClient,
    credentials: &[Credential],
) -> Vec<PrecheckOutcome> {
    let mut seen = BTreeSet::new();
    let mut outcomes = Vec::new();

    for credential in credentials {
        let Some(config) = credential.api_config() else {
            continue;
        };
        if !seen.insert(config.tenant_id.clone()) {
            continue;
        }

        let check_name = format!("graph-connectivity:{}", config.tenant_id);
        let result = graph
            .test_connection(&config.tenant_id, &config.app_id, &config.client_secret)
            .await;

        outcomes.push(if result.success {
            PrecheckOutcome::new(
                &check_name,
                PrecheckStatus::Pass,
                format!(
                    "Connected to tenant {}.",
                    result.tenant_name.as_deref().unwrap_or("(unnamed)")
                ),
            )
        } else {
            PrecheckOutcome::new(
                &check_name,
                PrecheckStatus::Fail,
                result.error.unwrap_or_else(|| "Connection failed.".into()),
            )
        });
    }

    if outcomes.is_empty() {
        outcomes.push(PrecheckOutcome::new(
            "graph-connectivity",
            PrecheckStatus::Skipped,
            "No credentials with remote API configuration to test.",
        ));
    }

    outcomes
}
