//! Shared infrastructure: the application event vocabulary and the
//! in-process hub that fans events out to SSE subscribers.

pub mod events;
pub mod stream_hub;

pub use events::{AppEvent, EventPublisher, RecordingPublisher};
pub use stream_hub::EventHub;
