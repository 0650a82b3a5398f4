pub mod credentials;
pub mod loaders;
pub mod report;
pub mod work_item;

pub use credentials::Credentials;
pub use loaders::{load_credentials, load_work_items, parse_work_items};
pub use report::{CategoryReport, RunReport};
pub use work_item::{ArtifactResult, ArtifactStatus, Batch, CorrelationRecord, WorkItem};
