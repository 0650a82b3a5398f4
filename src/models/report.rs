//! 运行结果汇总

use crate::models::work_item::{ArtifactResult, ArtifactStatus};

/// 单个报表类别的结果
#[derive(Debug, Clone, Default)]
pub struct CategoryReport {
    pub category: String,
    pub results: Vec<ArtifactResult>,
    /// worker 因致命错误提前结束时的原因
    pub aborted: Option<String>,
}

impl CategoryReport {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            ..Default::default()
        }
    }

    pub fn extend(&mut self, results: impl IntoIterator<Item = ArtifactResult>) {
        self.results.extend(results);
    }

    pub fn submitted(&self) -> usize {
        self.results.iter().filter(|r| r.status.was_submitted()).count()
    }

    pub fn downloaded(&self) -> usize {
        self.count(ArtifactStatus::Downloaded)
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.status.is_failure()).count()
    }

    pub fn count(&self, status: ArtifactStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }
}

/// 整次运行的结果
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub categories: Vec<CategoryReport>,
}

impl RunReport {
    pub fn submitted(&self) -> usize {
        self.categories.iter().map(CategoryReport::submitted).sum()
    }

    pub fn downloaded(&self) -> usize {
        self.categories.iter().map(CategoryReport::downloaded).sum()
    }

    pub fn failed(&self) -> usize {
        self.categories.iter().map(CategoryReport::failed).sum()
    }
}
