//! Typed ID definitions for all domain entities.
//!
//! One alias per entity, so IDs from different tables never unify.

pub use super::id::Id;

// ============================================================================
// Entity marker types
// ============================================================================

/// Marker type for Client entities (managed tenants).
pub struct Client;

/// Marker type for Credential entities (remote-API app registrations).
pub struct Credential;

/// Marker type for JobRun entities (extraction campaigns).
pub struct JobRun;

/// Marker type for JobItem entities (one client within a run).
pub struct JobItem;

/// Marker type for SignInEvent entities (persisted remote records).
pub struct SignInEvent;

// ============================================================================
// Type aliases - the primary API
// ============================================================================

pub type ClientId = Id<Client>;
pub type CredentialId = Id<Credential>;
pub type JobRunId = Id<JobRun>;
pub type JobItemId = Id<JobItem>;
pub type SignInEventId = Id<SignInEvent>;
