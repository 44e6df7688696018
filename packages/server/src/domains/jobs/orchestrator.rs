//! Job run orchestrator: owns the single system-wide active run.
//!
//! `start_run` validates preconditions, creates the run and its items as one
//! logical unit, occupies the active-run slot, and hands the run to the
//! worker queue — it never blocks on extraction. The worker processes items
//! strictly sequentially; the slot and its cancellation token are released
//! when the run reaches a terminal status.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use graph_client::GraphClient;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::common::{ClientId, JobRunId};
use crate::kernel::events::{AppEvent, EventPublisher};

use super::extraction::{extract_sign_ins, ExtractionParams};
use super::models::job_run::JobStatus;
use super::store::JobStore;

/// Tunable defaults a run resolves when the request leaves them out.
#[async_trait]
pub trait RunDefaults: Send + Sync {
    /// Days of history when no `date_from` is given.
    async fn date_range_days(&self) -> i64;
    /// Records per page requested from the remote API.
    async fn page_size(&self) -> u32;
}

/// Inbound start-run request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRunRequest {
    /// Optional narrowing to a subset of active clients.
    pub client_ids: Option<Vec<ClientId>>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum StartRunError {
    #[error("a job is already running (id {0}); cancel it first or wait for completion")]
    AlreadyRunning(JobRunId),

    #[error("no active clients found to process")]
    NoActiveClients,

    #[error("no clients have remote API credentials configured; set up credentials first")]
    NoCredentialedClients,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum CancelRunError {
    #[error("job run not found")]
    NotFound,

    #[error("job run is already {0}")]
    AlreadyFinished(JobStatus),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Work handed from `start_run` to the worker.
#[derive(Debug)]
pub struct RunRequest {
    pub run_id: JobRunId,
    pub date_from: DateTime<Utc>,
    pub date_to: DateTime<Utc>,
}

/// The occupied active-run slot: the run id plus the one live cancellation
/// token. Destroyed when the run finalizes.
struct ActiveRun {
    run_id: JobRunId,
    cancel: CancellationToken,
}

pub struct JobOrchestrator {
    store: Arc<dyn JobStore>,
    graph: Arc<GraphClient>,
    events: Arc<dyn EventPublisher>,
    defaults: Arc<dyn RunDefaults>,
    active: Mutex<Option<ActiveRun>>,
    work_tx: mpsc::Sender<RunRequest>,
}

impl JobOrchestrator {
    /// Build the orchestrator plus its worker. The worker must be spawned
    /// (`tokio::spawn(worker.run(shutdown))`) for runs to make progress.
    pub fn new(
        store: Arc<dyn JobStore>,
        graph: Arc<GraphClient>,
        events: Arc<dyn EventPublisher>,
        defaults: Arc<dyn RunDefaults>,
    ) -> (Arc<Self>, JobWorker) {
        let (work_tx, work_rx) = mpsc::channel(4);
        let orchestrator = Arc::new(Self {
            store,
            graph,
            events,
            defaults,
            active: Mutex::new(None),
            work_tx,
        });
        let worker = JobWorker {
            orchestrator: orchestrator.clone(),
            work_rx,
        };
        (orchestrator, worker)
    }

    pub async fn is_running(&self) -> bool {
        self.active.lock().await.is_some()
    }

    pub async fn active_run_id(&self) -> Option<JobRunId> {
        self.active.lock().await.as_ref().map(|a| a.run_id)
    }

    /// Start a new run.
    ///
    /// Fails without side effects when another run is active or no client is
    /// eligible. On success the run and one item per eligible client exist
    /// (all `pending`), the slot is occupied, and processing continues on
    /// the worker; the run id is returned immediately.
    pub async fn start_run(&self, request: StartRunRequest) -> Result<JobRunId, StartRunError> {
        // The lock is held through run+item creation so the occupied check
        // and the slot hand-off are one atomic step.
        let mut active = self.active.lock().await;
        if let Some(run) = active.as_ref() {
            return Err(StartRunError::AlreadyRunning(run.run_id));
        }

        let date_to = request.date_to.unwrap_or_else(Utc::now);
        let date_from = match request.date_from {
            Some(from) => from,
            None => Utc::now() - Duration::days(self.defaults.date_range_days().await),
        };

        let mut clients = self.store.active_clients().await?;
        if let Some(ids) = &request.client_ids {
            clients.retain(|c| ids.contains(&c.id));
        }
        if clients.is_empty() {
            return Err(StartRunError::NoActiveClients);
        }

        // First credential with a complete remote-API configuration wins.
        let credentials = self.store.credentials().await?;
        let mut credential_by_client = HashMap::new();
        for credential in &credentials {
            if let Some(client_id) = credential.client_id {
                if credential.api_config().is_some() {
                    credential_by_client.entry(client_id).or_insert(credential.id);
                }
            }
        }

        let eligible: Vec<_> = clients
            .iter()
            .filter_map(|c| credential_by_client.get(&c.id).map(|cred| (c.id, *cred)))
            .collect();
        if eligible.is_empty() {
            return Err(StartRunError::NoCredentialedClients);
        }

        let run = self.store.create_run(eligible.len() as i32).await?;
        for (client_id, credential_id) in &eligible {
            self.store
                .create_item(run.id, *client_id, Some(*credential_id))
                .await?;
        }

        *active = Some(ActiveRun {
            run_id: run.id,
            cancel: CancellationToken::new(),
        });
        drop(active);

        tracing::info!(run_id = %run.id, clients = eligible.len(), "job run created");

        if self
            .work_tx
            .send(RunRequest {
                run_id: run.id,
                date_from,
                date_to,
            })
            .await
            .is_err()
        {
            // Worker is gone; release the slot so the system is not wedged.
            self.active.lock().await.take();
            return Err(StartRunError::Internal(anyhow::anyhow!(
                "job worker is not running"
            )));
        }

        Ok(run.id)
    }

    /// Cancel a run.
    ///
    /// For the active run this signals its token; the loop observes it at
    /// the next checkpoint (cancellation is cooperative, in-flight calls
    /// finish on their own). A non-active, non-terminal run is cleaned up
    /// directly — the "dead run" path.
    pub async fn cancel_run(&self, run_id: JobRunId) -> Result<(), CancelRunError> {
        {
            let active = self.active.lock().await;
            if let Some(run) = active.as_ref() {
                if run.run_id == run_id {
                    run.cancel.cancel();
                    tracing::info!(run_id = %run_id, "cancel requested for active job run");
                    return Ok(());
                }
            }
        }

        let run = self
            .store
            .find_run(run_id)
            .await?
            .ok_or(CancelRunError::NotFound)?;
        if run.status.is_terminal() {
            return Err(CancelRunError::AlreadyFinished(run.status));
        }

        self.store.cancel_dead_run(run_id).await?;
        self.store.cancel_pending_items(run_id).await?;
        self.events.publish(AppEvent::RunCancelled {
            job_run_id: run_id,
            total_clients: run.total_clients as usize,
            completed_clients: run.completed_clients as usize,
            failed_clients: run.failed_clients as usize,
            total_records: 0,
            duration_ms: 0,
        });
        tracing::info!(run_id = %run_id, "dead job run marked cancelled");
        Ok(())
    }

    /// Process one run to a terminal status. Called by the worker only.
    async fn process_run(&self, request: RunRequest) {
        let run_id = request.run_id;

        let cancel = {
            let active = self.active.lock().await;
            match active.as_ref() {
                Some(run) if run.run_id == run_id => run.cancel.clone(),
                _ => {
                    tracing::warn!(run_id = %run_id, "run is not the slot owner, skipping");
                    return;
                }
            }
        };

        let started = Instant::now();
        if let Err(e) = self.run_items(&request, &cancel, started).await {
            // A run is never left stuck in `running`: any escaping error
            // finalizes it as failed with whatever counts are persisted.
            tracing::error!(run_id = %run_id, error = %e, "job run processing failed unexpectedly");
            if let Err(e) = self.finalize_after_error(run_id).await {
                tracing::error!(run_id = %run_id, error = %e, "failed to finalize broken run");
            }
        }

        // Release the slot and discard the cancellation token.
        self.active.lock().await.take();
    }

    async fn finalize_after_error(&self, run_id: JobRunId) -> Result<()> {
        self.store.cancel_pending_items(run_id).await?;
        let (completed, failed) = match self.store.find_run(run_id).await? {
            Some(run) => (run.completed_clients, run.failed_clients),
            None => (0, 0),
        };
        self.store
            .finalize_run(run_id, JobStatus::Failed, completed, failed)
            .await
    }

    /// The sequential item loop.
    async fn run_items(
        &self,
        request: &RunRequest,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<()> {
        let run_id = request.run_id;
        let page_size = self.defaults.page_size().await;

        self.store.mark_run_running(run_id).await?;
        let items = self.store.items_for_run(run_id).await?;

        self.events.publish(AppEvent::RunStarted {
            job_run_id: run_id,
            total_items: items.len(),
        });

        let mut completed = 0i32;
        let mut failed = 0i32;
        let mut total_records = 0u64;

        for item in &items {
            if cancel.is_cancelled() {
                self.store.cancel_pending_items(run_id).await?;
                break;
            }

            let client = match self.store.find_client(item.client_id).await? {
                Some(client) => client,
                None => {
                    self.store.mark_item_failed(item.id, "Client not found").await?;
                    failed += 1;
                    self.store.update_run_counts(run_id, completed, failed).await?;
                    continue;
                }
            };

            let Some(credential_id) = item.credential_id else {
                let message = "No credential assigned";
                self.store.mark_item_failed(item.id, message).await?;
                failed += 1;
                self.events.publish(AppEvent::ItemFailed {
                    job_run_id: run_id,
                    job_item_id: item.id,
                    client_abbreviation: client.abbreviation.clone(),
                    error: message.to_string(),
                });
                self.store.update_run_counts(run_id, completed, failed).await?;
                continue;
            };

            let credential = self.store.find_credential(credential_id).await?;
            let Some(config) = credential.as_ref().and_then(|c| c.api_config()) else {
                let message = "Credential missing remote API configuration";
                self.store.mark_item_failed(item.id, message).await?;
                failed += 1;
                self.events.publish(AppEvent::ItemFailed {
                    job_run_id: run_id,
                    job_item_id: item.id,
                    client_abbreviation: client.abbreviation.clone(),
                    error: message.to_string(),
                });
                self.store.update_run_counts(run_id, completed, failed).await?;
                continue;
            };

            self.store.mark_item_running(item.id).await?;
            self.events.publish(AppEvent::ItemStarted {
                job_run_id: run_id,
                job_item_id: item.id,
                client_abbreviation: client.abbreviation.clone(),
            });

            let params = ExtractionParams::builder()
                .tenant_id(config.tenant_id.as_str())
                .app_id(config.app_id.as_str())
                .client_secret(config.client_secret.as_str())
                .client_id(item.client_id)
                .job_item_id(item.id)
                .date_from(request.date_from)
                .date_to(request.date_to)
                .page_size(page_size)
                .build();

            match extract_sign_ins(
                &params,
                &self.graph,
                self.store.as_ref(),
                self.events.as_ref(),
                cancel,
            )
            .await
            {
                Ok(outcome) => {
                    self.store
                        .mark_item_completed(item.id, outcome.total_records as i64)
                        .await?;
                    completed += 1;
                    total_records += outcome.total_records;
                    self.events.publish(AppEvent::ItemCompleted {
                        job_run_id: run_id,
                        job_item_id: item.id,
                        client_abbreviation: client.abbreviation.clone(),
                        sign_in_count: outcome.total_records,
                    });
                }
                Err(e) if e.is_aborted() => {
                    // Cancellation observed inside the in-flight extraction
                    // takes priority over further iteration.
                    self.store.mark_item_cancelled(item.id).await?;
                    self.store.update_run_counts(run_id, completed, failed).await?;
                    break;
                }
                Err(e) => {
                    let message = e.to_string();
                    self.store.mark_item_failed(item.id, &message).await?;
                    failed += 1;
                    self.events.publish(AppEvent::ItemFailed {
                        job_run_id: run_id,
                        job_item_id: item.id,
                        client_abbreviation: client.abbreviation.clone(),
                        error: message,
                    });
                }
            }

            self.store.update_run_counts(run_id, completed, failed).await?;
        }

        // A cancellation observed mid-item leaves later items pending; they
        // must still reach a terminal status.
        if cancel.is_cancelled() {
            self.store.cancel_pending_items(run_id).await?;
        }

        let final_status = if cancel.is_cancelled() {
            JobStatus::Cancelled
        } else if failed as usize == items.len() {
            JobStatus::Failed
        } else {
            JobStatus::Completed
        };

        self.store
            .finalize_run(run_id, final_status, completed, failed)
            .await?;

        let duration_ms = started.elapsed().as_millis() as u64;
        let event = if final_status == JobStatus::Cancelled {
            AppEvent::RunCancelled {
                job_run_id: run_id,
                total_clients: items.len(),
                completed_clients: completed as usize,
                failed_clients: failed as usize,
                total_records,
                duration_ms,
            }
        } else {
            AppEvent::RunCompleted {
                job_run_id: run_id,
                total_clients: items.len(),
                completed_clients: completed as usize,
                failed_clients: failed as usize,
                total_records,
                duration_ms,
            }
        };
        self.events.publish(event);

        tracing::info!(
            run_id = %run_id,
            status = %final_status,
            completed,
            failed,
            total_records,
            "job run finished"
        );

        Ok(())
    }
}

/// Single worker that owns the run-processing loop.
///
/// `start_run` enqueues; this loop drains. One worker exists per process,
/// which — together with the slot — keeps extraction strictly sequential.
pub struct JobWorker {
    orchestrator: Arc<JobOrchestrator>,
    work_rx: mpsc::Receiver<RunRequest>,
}

impl JobWorker {
    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::info!("job worker starting");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                request = self.work_rx.recv() => match request {
                    Some(request) => self.orchestrator.process_run(request).await,
                    None => break,
                },
            }
        }

        tracing::info!("job worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::jobs::testing::{FixedDefaults, InMemoryJobStore};
    use crate::kernel::events::RecordingPublisher;

    fn orchestrator_without_worker(
        store: Arc<InMemoryJobStore>,
    ) -> (Arc<JobOrchestrator>, JobWorker) {
        JobOrchestrator::new(
            store,
            Arc::new(GraphClient::new()),
            Arc::new(RecordingPublisher::new()),
            Arc::new(FixedDefaults::default()),
        )
    }

    #[tokio::test]
    async fn start_fails_when_no_active_clients() {
        let store = Arc::new(InMemoryJobStore::new());
        store.add_client("IDLE", false);
        let (orchestrator, _worker) = orchestrator_without_worker(store);

        let err = orchestrator
            .start_run(StartRunRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StartRunError::NoActiveClients));
        assert!(!orchestrator.is_running().await);
    }

    #[tokio::test]
    async fn start_distinguishes_missing_credentials() {
        let store = Arc::new(InMemoryJobStore::new());
        let client = store.add_client("ACME", true);
        store.add_credential(client, None); // present but incomplete
        let (orchestrator, _worker) = orchestrator_without_worker(store);

        let err = orchestrator
            .start_run(StartRunRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StartRunError::NoCredentialedClients));
    }

    #[tokio::test]
    async fn client_filter_narrows_the_run() {
        let store = Arc::new(InMemoryJobStore::new());
        let a = store.add_client("AAA", true);
        let b = store.add_client("BBB", true);
        store.add_credential(a, Some("tenant-a"));
        store.add_credential(b, Some("tenant-b"));
        let (orchestrator, _worker) = orchestrator_without_worker(store.clone());

        let run_id = orchestrator
            .start_run(StartRunRequest {
                client_ids: Some(vec![b]),
                ..Default::default()
            })
            .await
            .unwrap();

        let items = store.items(run_id);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].client_id, b);
        assert_eq!(store.run(run_id).unwrap().total_clients, 1);
    }

    #[tokio::test]
    async fn second_start_fails_while_slot_is_occupied() {
        let store = Arc::new(InMemoryJobStore::new());
        let client = store.add_client("ACME", true);
        store.add_credential(client, Some("tenant"));
        // Worker is never spawned, so the slot stays occupied.
        let (orchestrator, _worker) = orchestrator_without_worker(store.clone());

        let first = orchestrator
            .start_run(StartRunRequest::default())
            .await
            .unwrap();
        assert!(orchestrator.is_running().await);
        assert_eq!(orchestrator.active_run_id().await, Some(first));

        let err = orchestrator
            .start_run(StartRunRequest::default())
            .await
            .unwrap_err();
        match err {
            StartRunError::AlreadyRunning(id) => assert_eq!(id, first),
            other => panic!("expected AlreadyRunning, got {other:?}"),
        }

        // The failed attempt created nothing: only the first run's items exist.
        assert_eq!(store.items(first).len(), 1);
    }

    #[tokio::test]
    async fn dead_run_cancel_cleans_up_without_a_token() {
        let store = Arc::new(InMemoryJobStore::new());
        let run = store.create_run(2).await.unwrap();
        let client = store.add_client("ACME", true);
        store.create_item(run.id, client, None).await.unwrap();
        let (orchestrator, _worker) = orchestrator_without_worker(store.clone());

        orchestrator.cancel_run(run.id).await.unwrap();

        let run = store.run(run.id).unwrap();
        assert_eq!(run.status, JobStatus::Cancelled);
        assert!(run.completed_at.is_some());
        assert!(store
            .items(run.id)
            .iter()
            .all(|i| i.status == JobStatus::Cancelled));
    }

    #[tokio::test]
    async fn cancel_of_terminal_run_reports_its_status() {
        let store = Arc::new(InMemoryJobStore::new());
        let run = store.create_run(0).await.unwrap();
        store
            .finalize_run(run.id, JobStatus::Completed, 0, 0)
            .await
            .unwrap();
        let (orchestrator, _worker) = orchestrator_without_worker(store);

        let err = orchestrator.cancel_run(run.id).await.unwrap_err();
        assert!(matches!(
            err,
            CancelRunError::AlreadyFinished(JobStatus::Completed)
        ));
    }

    #[tokio::test]
    async fn cancel_of_unknown_run_is_not_found() {
        let store = Arc::new(InMemoryJobStore::new());
        let (orchestrator, _worker) = orchestrator_without_worker(store);

        let err = orchestrator.cancel_run(JobRunId::new()).await.unwrap_err();
        assert!(matches!(err, CancelRunError::NotFound));
    }
}
