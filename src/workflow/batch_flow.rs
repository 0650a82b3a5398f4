//! 批次处理流程 - 流程层
//!
//! 核心职责：定义"一批车型"的完整处理流程
//!
//! 流程顺序：
//! 1. Submitting：逐个提交，拿到活动编号
//! 2. Polling：在结果页等待生成完成
//! 3. Fetching：逐个下载已完成的报表
//! 4. Done
//!
//! 没有任何车型提交成功时直接 Submitting → Done。

use std::collections::HashMap;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::{Config, PortalLayout};
use crate::error::{DriverError, DriverResult};
use crate::infrastructure::{Condition, Locator, SessionDriver};
use crate::models::{ArtifactResult, ArtifactStatus, WorkItem};
use crate::services::{ArtifactFetcher, CompletionPoller, PollOutcome, Submission};
use crate::utils::{Outcome, Phase};
use crate::workflow::batch_ctx::BatchCtx;

/// 批次状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Submitting,
    Polling,
    Fetching,
    Done,
}

/// 批次处理结果
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// 本批每个车型的结果，结束时都处于终态
    pub results: Vec<ArtifactResult>,
    /// 经过的状态
    pub transitions: Vec<BatchState>,
    pub poll: Option<PollOutcome>,
    /// 导致 worker 终止的错误
    pub fatal: Option<DriverError>,
}

impl BatchOutcome {
    pub fn downloaded(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == ArtifactStatus::Downloaded)
            .count()
    }

    fn enter(&mut self, state: BatchState) {
        self.transitions.push(state);
    }
}

/// 批次处理流程
///
/// - 不持有浏览器，驱动由编排层传入
/// - 单个车型的失败只影响它自己的结果
/// - 只有会话级错误才会中断本批
pub struct BatchFlow {
    submission: Submission,
    poller: CompletionPoller,
    fetcher: ArtifactFetcher,
    layout: PortalLayout,
    wait_timeout: Duration,
}

impl BatchFlow {
    pub fn new(config: &Config) -> Self {
        Self {
            submission: Submission::new(config),
            poller: CompletionPoller::new(config),
            fetcher: ArtifactFetcher::new(config),
            layout: config.layout.clone(),
            wait_timeout: config.wait_timeout,
        }
    }

    pub async fn run<D: SessionDriver + ?Sized>(
        &self,
        driver: &mut D,
        ctx: &BatchCtx<'_>,
        batch: &[WorkItem],
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        if let Err(e) = self.drive(driver, ctx, batch, &mut outcome).await {
            warn!("{} ❌ 会话错误，本批中断: {}", ctx, e);
            settle_after_fatal(&mut outcome, batch);
            outcome.fatal = Some(e);
        }

        outcome.enter(BatchState::Done);
        ctx.events.emit(
            Phase::Done,
            None,
            Outcome::BatchDone {
                succeeded: outcome.downloaded(),
                total: batch.len(),
            },
        );
        outcome
    }

    async fn drive<D: SessionDriver + ?Sized>(
        &self,
        driver: &mut D,
        ctx: &BatchCtx<'_>,
        batch: &[WorkItem],
        outcome: &mut BatchOutcome,
    ) -> DriverResult<()> {
        // ========== Submitting ==========
        outcome.enter(BatchState::Submitting);

        if let Err(e) = self
            .submission
            .prepare_form(driver, ctx.form_url, &ctx.date_param)
            .await
        {
            if e.is_fatal() {
                return Err(e);
            }
            // 第一批就打不开表单，基本是账号或权限问题，后面的批次不用再等
            if ctx.batch_index == 1 {
                return Err(DriverError::Unauthorized(format!("生成页面无法打开: {}", e)));
            }
            warn!("{} ⚠️ 生成页面无法打开，本批全部跳过: {}", ctx, e);
            for item in batch {
                ctx.events.emit(
                    Phase::Submitting,
                    Some(item),
                    Outcome::Skipped {
                        reason: e.to_string(),
                    },
                );
                outcome.results.push(ArtifactResult::submit_failed(item.clone()));
            }
            return Ok(());
        }

        let submitted = self.submission.submit_batch(driver, batch, ctx.events).await?;

        let by_key: HashMap<&str, _> = submitted
            .records
            .iter()
            .map(|r| (r.item.key.as_str(), r))
            .collect();
        for item in batch {
            match by_key.get(item.key.as_str()) {
                Some(record) => outcome.results.push(ArtifactResult::pending(record)),
                None => outcome.results.push(ArtifactResult::submit_failed(item.clone())),
            }
        }

        if submitted.is_empty() {
            warn!("{} ⚠️ 本批没有任何车型提交成功，跳过轮询和下载", ctx);
            return Ok(());
        }
        info!(
            "{} ✓ 提交完成: {}/{}",
            ctx,
            submitted.records.len(),
            batch.len()
        );

        // ========== Polling ==========
        outcome.enter(BatchState::Polling);

        if let Err(e) = self.open_listing(driver).await {
            if e.is_fatal() {
                return Err(e);
            }
            warn!("{} ⚠️ 无法打开结果列表: {}", ctx, e);
            for result in outcome
                .results
                .iter_mut()
                .filter(|r| r.status == ArtifactStatus::Pending)
            {
                result.mark(ArtifactStatus::DownloadFailed);
                ctx.events.emit(
                    Phase::Polling,
                    Some(&result.item),
                    Outcome::Failed {
                        reason: e.to_string(),
                    },
                );
            }
            return Ok(());
        }

        let poll = self
            .poller
            .wait_until_ready(driver, &submitted.records, ctx.events)
            .await?;

        // ========== Fetching ==========
        outcome.enter(BatchState::Fetching);
        let ready = poll.ready.clone();
        outcome.poll = Some(poll);

        self.fetcher
            .fetch_all(
                driver,
                &mut outcome.results,
                &ready,
                ctx.staging,
                ctx.artifact_dir,
                ctx.events,
            )
            .await
    }

    /// 点击确认消息里的链接进入结果列表
    async fn open_listing<D: SessionDriver + ?Sized>(&self, driver: &mut D) -> DriverResult<()> {
        driver
            .click_when_ready(&Locator::css(&self.layout.results_link), self.wait_timeout)
            .await?;
        driver
            .wait_for(
                &Condition::Present(Locator::id(&self.layout.listing_table)),
                self.wait_timeout,
            )
            .await?;
        Ok(())
    }
}

/// 致命错误后把本批所有车型收敛到终态
fn settle_after_fatal(outcome: &mut BatchOutcome, batch: &[WorkItem]) {
    for result in outcome.results.iter_mut() {
        if matches!(result.status, ArtifactStatus::Pending | ArtifactStatus::Ready) {
            result.mark(ArtifactStatus::DownloadFailed);
        }
    }
    for item in batch {
        if !outcome.results.iter().any(|r| r.item.key == item.key) {
            outcome.results.push(ArtifactResult::submit_failed(item.clone()));
        }
    }
}
