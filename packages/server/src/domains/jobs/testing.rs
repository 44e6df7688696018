//! In-memory test doubles for the job domain.
//!
//! [`InMemoryJobStore`] implements the full persistence collaborator over
//! `RwLock`-guarded maps so orchestrator and session behavior can be tested
//! without a database. State is inspectable through the helper methods.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use crate::common::{ClientId, CredentialId, JobItemId, JobRunId};
use crate::domains::clients::{Client, Credential};

use super::models::job_item::JobItem;
use super::models::job_run::{JobRun, JobStatus};
use super::models::sign_in_event::NewSignInEvent;
use super::orchestrator::RunDefaults;
use super::store::JobStore;

#[derive(Default)]
pub struct InMemoryJobStore {
    clients: RwLock<Vec<Client>>,
    credentials: RwLock<Vec<Credential>>,
    runs: RwLock<HashMap<JobRunId, JobRun>>,
    items: RwLock<HashMap<JobItemId, JobItem>>,
    sign_ins: RwLock<Vec<NewSignInEvent>>,
    fail_inserts: AtomicBool,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a client; returns its id.
    pub fn add_client(&self, abbreviation: &str, is_active: bool) -> ClientId {
        let client = Client {
            id: ClientId::new(),
            abbreviation: abbreviation.to_string(),
            name: None,
            group_name: None,
            is_active,
            last_synced_at: None,
            created_at: Utc::now(),
        };
        let id = client.id;
        self.clients
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(client);
        id
    }

    /// Seed a credential. With `tenant_id = None` the credential has no
    /// remote-API configuration and its client is ineligible.
    pub fn add_credential(&self, client_id: ClientId, tenant_id: Option<&str>) -> CredentialId {
        let credential = Credential {
            id: CredentialId::new(),
            client_id: Some(client_id),
            email: "admin@example.com".to_string(),
            tenant_id: tenant_id.map(Into::into),
            app_id: tenant_id.map(|_| "app-id".to_string()),
            client_secret: tenant_id.map(|_| "secret".to_string()),
            last_used_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let id = credential.id;
        self.credentials
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(credential);
        id
    }

    /// Make sign-in inserts fail, to exercise storage-failure handling.
    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn run(&self, id: JobRunId) -> Option<JobRun> {
        self.runs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
    }

    /// Items of a run in creation order.
    pub fn items(&self, run_id: JobRunId) -> Vec<JobItem> {
        let mut items: Vec<JobItem> = self
            .items
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|i| i.job_run_id == run_id)
            .cloned()
            .collect();
        items.sort_by_key(|i| i.id);
        items
    }

    pub fn sign_in_count_for_item(&self, item_id: JobItemId) -> usize {
        self.sign_ins
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|s| s.job_item_id == item_id)
            .count()
    }

    fn update_item<F: FnOnce(&mut JobItem)>(&self, id: JobItemId, f: F) {
        let mut items = self.items.write().unwrap_or_else(|e| e.into_inner());
        if let Some(item) = items.get_mut(&id) {
            f(item);
        }
    }

    fn update_run<F: FnOnce(&mut JobRun)>(&self, id: JobRunId, f: F) {
        let mut runs = self.runs.write().unwrap_or_else(|e| e.into_inner());
        if let Some(run) = runs.get_mut(&id) {
            f(run);
        }
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn active_clients(&self) -> Result<Vec<Client>> {
        Ok(self
            .clients
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|c| c.is_active)
            .cloned()
            .collect())
    }

    async fn find_client(&self, id: ClientId) -> Result<Option<Client>> {
        Ok(self
            .clients
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn credentials(&self) -> Result<Vec<Credential>> {
        Ok(self
            .credentials
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }

    async fn find_credential(&self, id: CredentialId) -> Result<Option<Credential>> {
        Ok(self
            .credentials
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn create_run(&self, total_clients: i32) -> Result<JobRun> {
        let run = JobRun {
            id: JobRunId::new(),
            status: JobStatus::Pending,
            started_at: None,
            completed_at: None,
            total_clients,
            completed_clients: 0,
            failed_clients: 0,
            created_at: Utc::now(),
        };
        self.runs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(run.id, run.clone());
        Ok(run)
    }

    async fn create_item(
        &self,
        job_run_id: JobRunId,
        client_id: ClientId,
        credential_id: Option<CredentialId>,
    ) -> Result<JobItem> {
        let item = JobItem {
            id: JobItemId::new(),
            job_run_id,
            client_id,
            credential_id,
            status: JobStatus::Pending,
            sign_in_count: 0,
            error_message: None,
            started_at: None,
            completed_at: None,
        };
        self.items
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(item.id, item.clone());
        Ok(item)
    }

    async fn find_run(&self, id: JobRunId) -> Result<Option<JobRun>> {
        Ok(self.run(id))
    }

    async fn items_for_run(&self, id: JobRunId) -> Result<Vec<JobItem>> {
        Ok(self.items(id))
    }

    async fn mark_run_running(&self, id: JobRunId) -> Result<()> {
        self.update_run(id, |run| {
            run.status = JobStatus::Running;
            run.started_at = Some(Utc::now());
        });
        Ok(())
    }

    async fn update_run_counts(&self, id: JobRunId, completed: i32, failed: i32) -> Result<()> {
        self.update_run(id, |run| {
            run.completed_clients = completed;
            run.failed_clients = failed;
        });
        Ok(())
    }

    async fn finalize_run(
        &self,
        id: JobRunId,
        status: JobStatus,
        completed: i32,
        failed: i32,
    ) -> Result<()> {
        self.update_run(id, |run| {
            run.status = status;
            run.completed_clients = completed;
            run.failed_clients = failed;
            run.completed_at = Some(Utc::now());
        });
        Ok(())
    }

    async fn cancel_dead_run(&self, id: JobRunId) -> Result<()> {
        self.update_run(id, |run| {
            run.status = JobStatus::Cancelled;
            run.completed_at = Some(Utc::now());
        });
        Ok(())
    }

    async fn mark_item_running(&self, id: JobItemId) -> Result<()> {
        self.update_item(id, |item| {
            item.status = JobStatus::Running;
            item.started_at = Some(Utc::now());
        });
        Ok(())
    }

    async fn mark_item_completed(&self, id: JobItemId, sign_in_count: i64) -> Result<()> {
        self.update_item(id, |item| {
            item.status = JobStatus::Completed;
            item.sign_in_count = sign_in_count;
            item.completed_at = Some(Utc::now());
        });
        Ok(())
    }

    async fn mark_item_failed(&self, id: JobItemId, error: &str) -> Result<()> {
        self.update_item(id, |item| {
            item.status = JobStatus::Failed;
            item.error_message = Some(error.to_string());
            item.completed_at = Some(Utc::now());
        });
        Ok(())
    }

    async fn mark_item_cancelled(&self, id: JobItemId) -> Result<()> {
        self.update_item(id, |item| {
            item.status = JobStatus::Cancelled;
            item.completed_at = Some(Utc::now());
        });
        Ok(())
    }

    async fn cancel_pending_items(&self, job_run_id: JobRunId) -> Result<u64> {
        let mut items = self.items.write().unwrap_or_else(|e| e.into_inner());
        let mut moved = 0u64;
        for item in items.values_mut() {
            if item.job_run_id == job_run_id && item.status == JobStatus::Pending {
                item.status = JobStatus::Cancelled;
                item.completed_at = Some(Utc::now());
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn insert_sign_ins(&self, events: Vec<NewSignInEvent>) -> Result<u64> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            anyhow::bail!("simulated insert failure");
        }
        let count = events.len() as u64;
        self.sign_ins
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .extend(events);
        Ok(count)
    }
}

/// Fixed run defaults for tests.
pub struct FixedDefaults {
    pub days: i64,
    pub page_size: u32,
}

impl Default for FixedDefaults {
    fn default() -> Self {
        Self {
            days: 7,
            page_size: 500,
        }
    }
}

#[async_trait]
impl RunDefaults for FixedDefaults {
    async fn date_range_days(&self) -> i64 {
        self.days
    }

    async fn page_size(&self) -> u32 {
        self.page_size
    }
}
