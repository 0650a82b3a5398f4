pub mod events;
pub mod logging;

pub use events::{spawn_event_logger, EventSink, Outcome, Phase, ProgressEvent};
