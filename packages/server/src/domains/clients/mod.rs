pub mod models;

pub use models::client::{Client, CreateClient};
pub use models::credential::{ApiConfig, CreateCredential, Credential, RedactedCredential};
