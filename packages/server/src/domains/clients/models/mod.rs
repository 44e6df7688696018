pub mod client;
pub mod credential;
