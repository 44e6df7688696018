pub mod model;
pub mod service;

pub use model::Setting;
pub use service::{SettingsService, DEFAULT_DATE_RANGE_DAYS, EXPORT_OUTPUT_DIR, GRAPH_PAGE_SIZE};
