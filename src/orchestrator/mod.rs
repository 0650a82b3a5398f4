//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责 worker 调度和资源管理，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `app` - 应用入口
//! - 管理应用生命周期（初始化、运行、后处理）
//! - 加载车型列表和账号（只读共享）
//! - 每个报表类别启动一个 worker
//! - 输出全局统计信息
//!
//! ### `report_worker` - 单个类别的 worker
//! - 持有浏览器会话和暂存目录，任何退出路径都会释放
//! - 分批调度 `BatchFlow`，批次之间串行
//!
//! ### `standard_report` - 单文件报表
//! - 不需要提交和轮询，直接下载
//!
//! ## 层次关系
//!
//! ```text
//! app (处理 Vec<ReportCategory>)
//!     ↓
//! report_worker (处理 Vec<Batch>)
//!     ↓
//! workflow::BatchFlow (处理单个 Batch)
//!     ↓
//! services (能力层：submission / poller / fetcher)
//!     ↓
//! infrastructure (基础设施：SessionDriver)
//! ```

pub mod app;
pub mod report_worker;
pub mod standard_report;

// 重新导出主要类型
pub use app::{prepare_directories, App};
pub use report_worker::{run_category, run_elaboration, run_worker, WorkerPlan};
pub use standard_report::run_standard;
