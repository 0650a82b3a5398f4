//! 结构化进度事件
//!
//! 各 worker 只负责往通道里发送事件，由唯一的消费者统一输出，
//! 多个 worker 并发时日志不会互相穿插。

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::models::WorkItem;

/// 所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Session,
    Submitting,
    Polling,
    Fetching,
    Done,
    Merge,
    Compare,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Phase::Session => "session",
            Phase::Submitting => "submit",
            Phase::Polling => "poll",
            Phase::Fetching => "fetch",
            Phase::Done => "done",
            Phase::Merge => "merge",
            Phase::Compare => "compare",
        };
        f.write_str(text)
    }
}

/// 事件结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Started,
    Submitted { correlation_id: String },
    Skipped { reason: String },
    Progress { ready: usize, pending: usize },
    Ready,
    TimedOut,
    Downloaded { path: PathBuf },
    Failed { reason: String },
    BatchDone { succeeded: usize, total: usize },
    Written { path: PathBuf, rows: usize },
    Aborted { reason: String },
}

impl Outcome {
    pub fn is_problem(&self) -> bool {
        matches!(
            self,
            Outcome::Skipped { .. } | Outcome::TimedOut | Outcome::Failed { .. } | Outcome::Aborted { .. }
        )
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Started => write!(f, "开始"),
            Outcome::Submitted { correlation_id } => write!(f, "已提交，活动编号 {}", correlation_id),
            Outcome::Skipped { reason } => write!(f, "跳过: {}", reason),
            Outcome::Progress { ready, pending } => write!(f, "已生成 {}/{}", ready, pending),
            Outcome::Ready => write!(f, "已生成"),
            Outcome::TimedOut => write!(f, "等待超时"),
            Outcome::Downloaded { path } => write!(f, "💾 已保存: {}", path.display()),
            Outcome::Failed { reason } => write!(f, "❌ 失败: {}", reason),
            Outcome::BatchDone { succeeded, total } => write!(f, "✓ 本批完成: 成功 {}/{}", succeeded, total),
            Outcome::Written { path, rows } => write!(f, "📄 已写出 {} 行: {}", rows, path.display()),
            Outcome::Aborted { reason } => write!(f, "❌ 致命错误，worker 终止: {}", reason),
        }
    }
}

/// 单条进度事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub worker: String,
    pub phase: Phase,
    pub item: Option<String>,
    pub outcome: Outcome,
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.item {
            Some(item) => write!(f, "[{}] [{}] {} -> {}", self.worker, self.phase, item, self.outcome),
            None => write!(f, "[{}] [{}] {}", self.worker, self.phase, self.outcome),
        }
    }
}

/// 事件发送端，可以随意 clone
#[derive(Debug, Clone)]
pub struct EventSink {
    worker: String,
    tx: Option<UnboundedSender<ProgressEvent>>,
}

impl EventSink {
    /// 创建通道，返回发送端和接收端
    pub fn channel() -> (Self, UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                worker: "main".to_string(),
                tx: Some(tx),
            },
            rx,
        )
    }

    /// 丢弃所有事件
    pub fn disabled() -> Self {
        Self {
            worker: "main".to_string(),
            tx: None,
        }
    }

    /// 同一通道，换一个 worker 名称
    pub fn for_worker(&self, worker: impl Into<String>) -> Self {
        Self {
            worker: worker.into(),
            tx: self.tx.clone(),
        }
    }

    pub fn worker(&self) -> &str {
        &self.worker
    }

    pub fn emit(&self, phase: Phase, item: Option<&WorkItem>, outcome: Outcome) {
        let Some(tx) = &self.tx else {
            return;
        };
        let event = ProgressEvent {
            worker: self.worker.clone(),
            phase,
            item: item.map(|i| i.key.clone()),
            outcome,
        };
        // 接收端已关闭时静默丢弃
        let _ = tx.send(event);
    }
}

/// 启动唯一的事件消费者
///
/// 事件输出到 tracing，同时追加到日志文件。所有发送端释放后任务结束，
/// 返回处理过的事件数量。
pub fn spawn_event_logger(
    mut rx: UnboundedReceiver<ProgressEvent>,
    log_file: Option<PathBuf>,
) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut count = 0;
        while let Some(event) = rx.recv().await {
            count += 1;
            if event.outcome.is_problem() {
                warn!(
                    worker = %event.worker,
                    phase = %event.phase,
                    item = event.item.as_deref().unwrap_or("-"),
                    "{}",
                    event
                );
            } else {
                info!(
                    worker = %event.worker,
                    phase = %event.phase,
                    item = event.item.as_deref().unwrap_or("-"),
                    "{}",
                    event
                );
            }

            if let Some(path) = &log_file {
                if let Err(e) = append_line(path, &event) {
                    warn!("写入日志文件失败 {}: {}", path.display(), e);
                }
            }
        }
        count
    })
}

fn append_line(path: &PathBuf, event: &ProgressEvent) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(
        file,
        "{} {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        event
    )
}
