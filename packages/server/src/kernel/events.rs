use serde::Serialize;

use crate::common::{ClientId, JobItemId, JobRunId};
use crate::domains::prechecks::PrecheckStatus;

/// Application lifecycle events.
///
/// These are facts about what happened, not commands. Delivery is
/// fire-and-forget and at-most-once per subscriber: a missed event never
/// affects correctness, only UI freshness. Wire names and payload shapes are
/// what SSE consumers see.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all_fields = "camelCase")]
pub enum AppEvent {
    /// A run started processing, after its items were created.
    #[serde(rename = "job:started")]
    RunStarted {
        job_run_id: JobRunId,
        total_items: usize,
    },

    /// An item began extracting.
    #[serde(rename = "job:item:started")]
    ItemStarted {
        job_run_id: JobRunId,
        job_item_id: JobItemId,
        client_abbreviation: String,
    },

    /// Cumulative extraction progress, emitted once per fetched page.
    #[serde(rename = "job:item:progress")]
    ItemProgress {
        job_item_id: JobItemId,
        client_id: ClientId,
        records_fetched: u64,
        pages_processed: u32,
    },

    /// An item finished with its final record count.
    #[serde(rename = "job:item:completed")]
    ItemCompleted {
        job_run_id: JobRunId,
        job_item_id: JobItemId,
        client_abbreviation: String,
        sign_in_count: u64,
    },

    /// An item failed; the message is human-readable.
    #[serde(rename = "job:item:failed")]
    ItemFailed {
        job_run_id: JobRunId,
        job_item_id: JobItemId,
        client_abbreviation: String,
        error: String,
    },

    /// The run reached `completed` or `failed`.
    #[serde(rename = "job:completed")]
    RunCompleted {
        job_run_id: JobRunId,
        total_clients: usize,
        completed_clients: usize,
        failed_clients: usize,
        total_records: u64,
        duration_ms: u64,
    },

    /// The run was cancelled (by request, before or during processing).
    #[serde(rename = "job:cancelled")]
    RunCancelled {
        job_run_id: JobRunId,
        total_clients: usize,
        completed_clients: usize,
        failed_clients: usize,
        total_records: u64,
        duration_ms: u64,
    },

    /// A precheck sweep began.
    #[serde(rename = "precheck:started")]
    PrecheckStarted { total_checks: usize },

    /// One precheck finished.
    #[serde(rename = "precheck:result")]
    PrecheckResult {
        check_name: String,
        status: PrecheckStatus,
        message: String,
    },

    /// The precheck sweep finished.
    #[serde(rename = "precheck:completed")]
    PrecheckCompleted {
        total: usize,
        passed: usize,
        failed: usize,
    },
}

impl AppEvent {
    /// The wire name of this event, identical to the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            AppEvent::RunStarted { .. } => "job:started",
            AppEvent::ItemStarted { .. } => "job:item:started",
            AppEvent::ItemProgress { .. } => "job:item:progress",
            AppEvent::ItemCompleted { .. } => "job:item:completed",
            AppEvent::ItemFailed { .. } => "job:item:failed",
            AppEvent::RunCompleted { .. } => "job:completed",
            AppEvent::RunCancelled { .. } => "job:cancelled",
            AppEvent::PrecheckStarted { .. } => "precheck:started",
            AppEvent::PrecheckResult { .. } => "precheck:result",
            AppEvent::PrecheckCompleted { .. } => "precheck:completed",
        }
    }
}

/// Where lifecycle events go.
///
/// Injected into the orchestrator and the extraction session so the core
/// never talks to a transport directly; the SSE layer subscribes on the
/// other side of the hub.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: AppEvent);
}

/// Test publisher that records every event for inspection.
#[derive(Default)]
pub struct RecordingPublisher {
    events: std::sync::Mutex<Vec<AppEvent>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events published so far, in order.
    pub fn events(&self) -> Vec<AppEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// The wire names of all events published so far, in order.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.kind()).collect()
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish(&self, event: AppEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_tag_matches_kind() {
        let events = vec![
            AppEvent::RunStarted {
                job_run_id: JobRunId::new(),
                total_items: 3,
            },
            AppEvent::ItemProgress {
                job_item_id: JobItemId::new(),
                client_id: ClientId::new(),
                records_fetched: 12,
                pages_processed: 1,
            },
            AppEvent::RunCancelled {
                job_run_id: JobRunId::new(),
                total_clients: 3,
                completed_clients: 1,
                failed_clients: 0,
                total_records: 12,
                duration_ms: 99,
            },
            AppEvent::PrecheckResult {
                check_name: "database".into(),
                status: PrecheckStatus::Pass,
                message: "ok".into(),
            },
        ];

        for event in events {
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(value["type"], event.kind());
            assert!(value.get("payload").is_some());
        }
    }

    #[test]
    fn payload_fields_are_camel_case() {
        let event = AppEvent::ItemFailed {
            job_run_id: JobRunId::new(),
            job_item_id: JobItemId::new(),
            client_abbreviation: "ACME".into(),
            error: "boom".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        let payload = &value["payload"];
        assert_eq!(payload["clientAbbreviation"], "ACME");
        assert_eq!(payload["error"], "boom");
        assert!(payload.get("jobRunId").is_some());
    }

    #[test]
    fn recording_publisher_keeps_order() {
        let publisher = RecordingPublisher::new();
        publisher.publish(AppEvent::PrecheckStarted { total_checks: 2 });
        publisher.publish(AppEvent::PrecheckCompleted {
            total: 2,
            passed: 2,
            failed: 0,
        });
        assert_eq!(
            publisher.kinds(),
            vec!["precheck:started", "precheck:completed"]
        );
    }
}
