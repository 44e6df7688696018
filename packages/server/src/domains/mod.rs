// Domain modules: one directory per business area.

pub mod clients;
pub mod export;
pub mod jobs;
pub mod prechecks;
pub mod settings;
