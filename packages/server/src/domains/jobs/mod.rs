//! Extraction campaign domain: runs, items, persisted sign-in records, the
//! orchestrator that owns the single active run, and the session that pages
//! through the remote API for one client.

pub mod extraction;
pub mod models;
pub mod orchestrator;
pub mod store;
pub mod testing;

pub use extraction::{extract_sign_ins, ExtractionError, ExtractionOutcome, ExtractionParams};
pub use models::job_item::JobItem;
pub use models::job_run::{JobRun, JobStatus};
pub use models::sign_in_event::{NewSignInEvent, SignInEvent};
pub use orchestrator::{
    CancelRunError, JobOrchestrator, JobWorker, RunDefaults, StartRunError, StartRunRequest,
};
pub use store::{JobStore, PostgresJobStore};
