//! 业务能力层
//!
//! 每个服务只描述一种能力，不持有浏览器，驱动由调用方传入

pub mod fetcher;
pub mod poller;
pub mod submission;

pub use fetcher::ArtifactFetcher;
pub use poller::{CompletionPoller, PollOutcome};
pub use submission::{extract_correlation_id, Submission, SubmissionResult, SubmitOutcome};
