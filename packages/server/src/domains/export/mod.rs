//! Export of a finished run's sign-in records as JSON files.
//!
//! One file per completed item, named after the client's abbreviation,
//! under `<export_output_dir>/job-run-<id>/`. Files contain the raw remote
//! payloads exactly as fetched.

use std::path::{Path, PathBuf};

use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;

use crate::common::{ClientId, JobRunId};
use crate::domains::clients::Client;
use crate::domains::jobs::{JobItem, JobRun, JobStatus, SignInEvent};
use crate::domains::settings::SettingsService;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedFile {
    pub file_path: String,
    pub record_count: usize,
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("job run not found")]
    NotFound,

    #[error("cannot export job run with status \"{0}\"; only completed or failed runs can be exported")]
    NotExportable(JobStatus),

    #[error("failed to write export file: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Only runs that stopped doing remote work can be exported.
fn ensure_exportable(status: JobStatus) -> Result<(), ExportError> {
    match status {
        JobStatus::Completed | JobStatus::Failed => Ok(()),
        other => Err(ExportError::NotExportable(other)),
    }
}

fn file_name_for(client: Option<&Client>, client_id: ClientId) -> String {
    match client {
        Some(client) => format!("{}-signins.json", client.abbreviation),
        None => format!("client-{}-signins.json", client_id),
    }
}

async fn write_json_file(path: &Path, records: &[serde_json::Value]) -> std::io::Result<()> {
    let body = serde_json::to_vec_pretty(records)?;
    tokio::fs::write(path, body).await
}

/// Export every completed item of a run. Items without records are skipped.
pub async fn export_job_run(
    run_id: JobRunId,
    pool: &PgPool,
    settings: &SettingsService,
) -> Result<Vec<ExportedFile>, ExportError> {
    let run = JobRun::find_by_id(run_id, pool)
        .await?
        .ok_or(ExportError::NotFound)?;
    ensure_exportable(run.status)?;

    let run_dir = PathBuf::from(settings.export_dir().await).join(format!("job-run-{}", run_id));
    tokio::fs::create_dir_all(&run_dir).await?;

    let items = JobItem::list_for_run(run_id, pool).await?;
    let mut results = Vec::new();

    for item in items
        .iter()
        .filter(|item| item.status == JobStatus::Completed)
    {
        let client = Client::find_by_id(item.client_id, pool).await?;
        let events = SignInEvent::list_for_item(item.id, pool).await?;
        if events.is_empty() {
            continue;
        }

        let records: Vec<serde_json::Value> = events.into_iter().map(|e| e.raw).collect();
        let file_path = run_dir.join(file_name_for(client.as_ref(), item.client_id));
        write_json_file(&file_path, &records).await?;

        tracing::info!(
            run_id = %run_id,
            path = %file_path.display(),
            records = records.len(),
            "exported sign-in records"
        );
        results.push(ExportedFile {
            file_path: file_path.display().to_string(),
            record_count: records.len(),
        });
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn only_completed_and_failed_runs_export() {
        assert!(ensure_exportable(JobStatus::Completed).is_ok());
        assert!(ensure_exportable(JobStatus::Failed).is_ok());
        for status in [JobStatus::Pending, JobStatus::Running, JobStatus::Cancelled] {
            let err = ensure_exportable(status).unwrap_err();
            assert!(err.to_string().contains(&status.to_string()));
        }
    }

    #[test]
    fn file_names_prefer_the_abbreviation() {
        let client = Client {
            id: ClientId::new(),
            abbreviation: "ACME".into(),
            name: None,
            group_name: None,
            is_active: true,
            last_synced_at: None,
            created_at: Utc::now(),
        };
        assert_eq!(file_name_for(Some(&client), client.id), "ACME-signins.json");

        let orphan = ClientId::new();
        assert_eq!(
            file_name_for(None, orphan),
            format!("client-{}-signins.json", orphan)
        );
    }

    #[tokio::test]
    async fn written_files_contain_the_raw_payloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ACME-signins.json");
        let records = vec![
            serde_json::json!({"id": "a", "ipAddress": "203.0.113.9"}),
            serde_json::json!({"id": "b"}),
        ];

        write_json_file(&path, &records).await.unwrap();

        let body = tokio::fs::read(&path).await.unwrap();
        let parsed: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed, records);
    }
}
