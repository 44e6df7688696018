// Sigwatch - sign-in log collection API
//
// Backend service that manages a roster of client tenants and their app
// credentials, runs sequential extraction campaigns against the remote
// sign-in audit API, and streams progress to observers over SSE.
//
// Business logic lives in domains/, shared infrastructure in kernel/.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
