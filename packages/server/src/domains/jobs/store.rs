//! Persistence collaborator for run processing.
//!
//! Everything the orchestrator and the extraction session need from storage
//! goes through [`JobStore`]: run/item lifecycle writes, sign-in batch
//! inserts, and roster reads. Production uses [`PostgresJobStore`]; tests
//! use the in-memory store from [`super::testing`].

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;

use crate::common::{ClientId, CredentialId, JobItemId, JobRunId};
use crate::domains::clients::{Client, Credential};

use super::models::job_item::JobItem;
use super::models::job_run::{JobRun, JobStatus};
use super::models::sign_in_event::{NewSignInEvent, SignInEvent};

#[async_trait]
pub trait JobStore: Send + Sync {
    // Roster reads
    async fn active_clients(&self) -> Result<Vec<Client>>;
    async fn find_client(&self, id: ClientId) -> Result<Option<Client>>;
    async fn credentials(&self) -> Result<Vec<Credential>>;
    async fn find_credential(&self, id: CredentialId) -> Result<Option<Credential>>;

    // Run / item lifecycle
    async fn create_run(&self, total_clients: i32) -> Result<JobRun>;
    async fn create_item(
        &self,
        job_run_id: JobRunId,
        client_id: ClientId,
        credential_id: Option<CredentialId>,
    ) -> Result<JobItem>;
    async fn find_run(&self, id: JobRunId) -> Result<Option<JobRun>>;
    async fn items_for_run(&self, id: JobRunId) -> Result<Vec<JobItem>>;

    async fn mark_run_running(&self, id: JobRunId) -> Result<()>;
    async fn update_run_counts(&self, id: JobRunId, completed: i32, failed: i32) -> Result<()>;
    async fn finalize_run(
        &self,
        id: JobRunId,
        status: JobStatus,
        completed: i32,
        failed: i32,
    ) -> Result<()>;
    async fn cancel_dead_run(&self, id: JobRunId) -> Result<()>;

    async fn mark_item_running(&self, id: JobItemId) -> Result<()>;
    async fn mark_item_completed(&self, id: JobItemId, sign_in_count: i64) -> Result<()>;
    async fn mark_item_failed(&self, id: JobItemId, error: &str) -> Result<()>;
    async fn mark_item_cancelled(&self, id: JobItemId) -> Result<()>;
    async fn cancel_pending_items(&self, job_run_id: JobRunId) -> Result<u64>;

    // Record ingestion
    async fn insert_sign_ins(&self, events: Vec<NewSignInEvent>) -> Result<u64>;
}

/// Production store backed by the Postgres pool; delegates to the models.
pub struct PostgresJobStore {
    pool: PgPool,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn active_clients(&self) -> Result<Vec<Client>> {
        Client::list_active(&self.pool).await
    }

    async fn find_client(&self, id: ClientId) -> Result<Option<Client>> {
        Client::find_by_id(id, &self.pool).await
    }

    async fn credentials(&self) -> Result<Vec<Credential>> {
        Credential::list_all(&self.pool).await
    }

    async fn find_credential(&self, id: CredentialId) -> Result<Option<Credential>> {
        Credential::find_by_id(id, &self.pool).await
    }

    async fn create_run(&self, total_clients: i32) -> Result<JobRun> {
        JobRun::create(total_clients, &self.pool).await
    }

    async fn create_item(
        &self,
        job_run_id: JobRunId,
        client_id: ClientId,
        credential_id: Option<CredentialId>,
    ) -> Result<JobItem> {
        JobItem::create(job_run_id, client_id, credential_id, &self.pool).await
    }

    async fn find_run(&self, id: JobRunId) -> Result<Option<JobRun>> {
        JobRun::find_by_id(id, &self.pool).await
    }

    async fn items_for_run(&self, id: JobRunId) -> Result<Vec<JobItem>> {
        JobItem::list_for_run(id, &self.pool).await
    }

    async fn mark_run_running(&self, id: JobRunId) -> Result<()> {
        JobRun::mark_running(id, &self.pool).await
    }

    async fn update_run_counts(&self, id: JobRunId, completed: i32, failed: i32) -> Result<()> {
        JobRun::update_counts(id, completed, failed, &self.pool).await
    }

    async fn finalize_run(
        &self,
        id: JobRunId,
        status: JobStatus,
        completed: i32,
        failed: i32,
    ) -> Result<()> {
        JobRun::finalize(id, status, completed, failed, &self.pool).await
    }

    async fn cancel_dead_run(&self, id: JobRunId) -> Result<()> {
        JobRun::mark_cancelled(id, &self.pool).await
    }

    async fn mark_item_running(&self, id: JobItemId) -> Result<()> {
        JobItem::mark_running(id, &self.pool).await
    }

    async fn mark_item_completed(&self, id: JobItemId, sign_in_count: i64) -> Result<()> {
        JobItem::mark_completed(id, sign_in_count, &self.pool).await
    }

    async fn mark_item_failed(&self, id: JobItemId, error: &str) -> Result<()> {
        JobItem::mark_failed(id, error, &self.pool).await
    }

    async fn mark_item_cancelled(&self, id: JobItemId) -> Result<()> {
        JobItem::mark_cancelled(id, &self.pool).await
    }

    async fn cancel_pending_items(&self, job_run_id: JobRunId) -> Result<u64> {
        JobItem::cancel_pending_for_run(job_run_id, &self.pool).await
    }

    async fn insert_sign_ins(&self, events: Vec<NewSignInEvent>) -> Result<u64> {
        SignInEvent::insert_batch(&events, &self.pool).await
    }
}
