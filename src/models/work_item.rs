use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// 单个待处理车型
///
/// `key` 用作产物文件名，`label` 是门户下拉框里显示的文本
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItem {
    pub key: String,
    pub label: String,
}

impl WorkItem {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
        }
    }

    /// 合并表里的车型代码：下拉框文本的第一个词
    pub fn model_code(&self) -> &str {
        self.label.split_whitespace().next().unwrap_or(&self.label)
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)
    }
}

/// 一批车型，大小不超过 batch_size
pub type Batch = Vec<WorkItem>;

/// 提交成功后得到的关联记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationRecord {
    /// 从确认消息里提取出的活动编号
    pub correlation_id: String,
    pub item: WorkItem,
    pub submitted_at: DateTime<Local>,
}

impl CorrelationRecord {
    pub fn new(correlation_id: impl Into<String>, item: WorkItem) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            item,
            submitted_at: Local::now(),
        }
    }
}

/// 单个车型的处理状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ArtifactStatus {
    /// 已提交，等待生成
    Pending,
    /// 提交失败（找不到选项 / 没有确认 / 无法提取编号）
    SubmitFailed,
    /// 报表已生成
    Ready,
    /// 超过等待上限仍未生成
    TimedOut,
    /// 已下载到产物目录
    Downloaded,
    /// 下载失败
    DownloadFailed,
}

impl ArtifactStatus {
    /// 是否计入失败数
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            ArtifactStatus::SubmitFailed | ArtifactStatus::TimedOut | ArtifactStatus::DownloadFailed
        )
    }

    /// 是否已经成功提交过
    pub fn was_submitted(self) -> bool {
        !matches!(self, ArtifactStatus::SubmitFailed)
    }
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ArtifactStatus::Pending => "等待生成",
            ArtifactStatus::SubmitFailed => "提交失败",
            ArtifactStatus::Ready => "已生成",
            ArtifactStatus::TimedOut => "等待超时",
            ArtifactStatus::Downloaded => "已下载",
            ArtifactStatus::DownloadFailed => "下载失败",
        };
        f.write_str(text)
    }
}

/// 单个车型的最终结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactResult {
    pub item: WorkItem,
    pub status: ArtifactStatus,
    pub correlation_id: Option<String>,
    pub path: Option<PathBuf>,
}

impl ArtifactResult {
    pub fn pending(record: &CorrelationRecord) -> Self {
        Self {
            item: record.item.clone(),
            status: ArtifactStatus::Pending,
            correlation_id: Some(record.correlation_id.clone()),
            path: None,
        }
    }

    pub fn submit_failed(item: WorkItem) -> Self {
        Self {
            item,
            status: ArtifactStatus::SubmitFailed,
            correlation_id: None,
            path: None,
        }
    }

    pub fn mark(&mut self, status: ArtifactStatus) {
        self.status = status;
    }

    pub fn mark_downloaded(&mut self, path: PathBuf) {
        self.status = ArtifactStatus::Downloaded;
        self.path = Some(path);
    }
}
