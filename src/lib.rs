//! # Elab Report Fetch
//!
//! 从 BOM 门户批量生成并下载报表的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page / 下载目录），只暴露能力
//! - `SessionDriver` - 会话驱动能力接口，真实浏览器和测试用实现都实现它
//! - `ChromeDriver` - 基于 `JsExecutor` 的 Chrome 实现
//! - `StagingDir` - worker 独占的下载暂存目录
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，不持有浏览器
//! - `Submission` - 提交车型并提取活动编号
//! - `CompletionPoller` - 轮询结果列表直到生成完成或超时
//! - `ArtifactFetcher` - 逐个重新定位并下载产物
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一批车型"的完整处理流程
//! - `BatchCtx` - 上下文封装（worker + 批次 + 目录）
//! - `BatchFlow` - 状态机（Submitting → Polling → Fetching → Done）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/app` - 应用入口，每个报表类别一个 worker
//! - `orchestrator/report_worker` - 单个类别的会话和批次调度
//!
//! 下载全部结束后由 `processing/` 合并报表并生成对比表。
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod logger;

pub mod models;
pub mod orchestrator;
pub mod processing;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult, DriverError, DriverResult};
pub use infrastructure::{ChromeDriver, SessionDriver};
pub use models::{ArtifactResult, ArtifactStatus, CategoryReport, RunReport, WorkItem};
pub use orchestrator::App;
pub use workflow::{BatchFlow, BatchOutcome, BatchState};
