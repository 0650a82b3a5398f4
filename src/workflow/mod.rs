pub mod batch_ctx;
pub mod batch_flow;
pub mod partition;

pub use batch_ctx::{date_parameter, BatchCtx};
pub use batch_flow::{BatchFlow, BatchOutcome, BatchState};
pub use partition::partition;
