//! 完成状态轮询 - 业务能力层
//!
//! 门户没有推送通知，只能反复刷新结果列表，检查每个活动编号所在行的状态格。

use std::collections::HashSet;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::{Config, PortalLayout};
use crate::error::{DriverError, DriverResult};
use crate::infrastructure::{Element, Locator, SessionDriver};
use crate::models::CorrelationRecord;
use crate::utils::{EventSink, Outcome, Phase};

/// 轮询结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollOutcome {
    /// 已生成完成的活动编号
    pub ready: HashSet<String>,
    /// 检查次数
    pub cycles: usize,
    /// 是否因为超过等待上限而结束
    pub timed_out: bool,
}

/// 完成状态轮询器
pub struct CompletionPoller {
    layout: PortalLayout,
    max_wait: Duration,
    interval: Duration,
}

impl CompletionPoller {
    pub fn new(config: &Config) -> Self {
        Self {
            layout: config.layout.clone(),
            max_wait: config.poll_max_wait,
            interval: config.poll_interval,
        }
    }

    /// 等待所有编号生成完成，或者超过等待上限
    ///
    /// 超时不是错误：返回当时已经完成的那部分
    pub async fn wait_until_ready<D: SessionDriver + ?Sized>(
        &self,
        driver: &mut D,
        pending: &[CorrelationRecord],
        events: &EventSink,
    ) -> DriverResult<PollOutcome> {
        let started = Instant::now();
        let mut outcome = PollOutcome::default();

        info!(
            "[{}] 在结果页等待 {} 个报表生成...",
            events.worker(),
            pending.len()
        );

        loop {
            outcome.cycles += 1;
            outcome.ready = match self.observe(driver, pending).await {
                Ok(ready) => ready,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    debug!("[{}] 读取结果列表失败: {}", events.worker(), e);
                    HashSet::new()
                }
            };

            events.emit(
                Phase::Polling,
                None,
                Outcome::Progress {
                    ready: outcome.ready.len(),
                    pending: pending.len(),
                },
            );

            if outcome.ready.len() >= pending.len() {
                info!("[{}] ✅ 本批 {} 个报表全部生成完成", events.worker(), pending.len());
                return Ok(outcome);
            }

            if started.elapsed() >= self.max_wait {
                warn!(
                    "[{}] 等待超过 {:?}，只处理已完成的 {}/{} 个",
                    events.worker(),
                    self.max_wait,
                    outcome.ready.len(),
                    pending.len()
                );
                outcome.timed_out = true;
                return Ok(outcome);
            }

            self.refresh_listing(driver).await?;
            sleep(self.interval).await;
        }
    }

    /// 读取一次结果列表，返回已完成的编号
    async fn observe<D: SessionDriver + ?Sized>(
        &self,
        driver: &mut D,
        pending: &[CorrelationRecord],
    ) -> DriverResult<HashSet<String>> {
        let mut ready = HashSet::new();
        let rows = driver.find_all(&Locator::xpath(&self.layout.listing_rows)).await?;
        let status_cell = Locator::xpath(&self.layout.status_cell);
        let marker = self.layout.pending_marker.to_lowercase();

        for row in &rows {
            let Some(record) = pending
                .iter()
                .find(|r| !ready.contains(&r.correlation_id) && row.text().contains(&r.correlation_id))
            else {
                continue;
            };

            // 单行读取失败只跳过这一行，下一轮再看
            match Self::row_ready(driver, row, &status_cell, &marker).await {
                Ok(true) => {
                    ready.insert(record.correlation_id.clone());
                }
                Ok(false) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => debug!("活动 {} 的状态格读取失败，本轮跳过: {}", record.correlation_id, e),
            }
        }

        Ok(ready)
    }

    /// 状态格的样式里没有"进行中"标记即为完成
    async fn row_ready<D: SessionDriver + ?Sized>(
        driver: &mut D,
        row: &Element,
        status_cell: &Locator,
        marker: &str,
    ) -> DriverResult<bool> {
        let cell = driver.find_within(row, status_cell).await?;
        let style = driver
            .attribute(&cell, "style")
            .await?
            .unwrap_or_default()
            .to_lowercase();
        Ok(!style.contains(marker))
    }

    /// 优先点击"Apply Filter"刷新列表，不行就整页刷新
    ///
    /// 按钮只查一次，不存在时立即整页刷新，不等待
    async fn refresh_listing<D: SessionDriver + ?Sized>(&self, driver: &mut D) -> DriverResult<()> {
        let apply = Locator::xpath(&self.layout.apply_filter);
        let refreshed = match driver.find_all(&apply).await {
            Ok(found) if found.is_empty() => Err(DriverError::ElementNotFound(apply.to_string())),
            Ok(_) => driver.click(&apply).await,
            Err(e) => Err(e),
        };

        match refreshed {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                debug!("无法使用筛选按钮刷新 ({})，改为整页刷新", e);
                match driver.refresh().await {
                    Err(e) if e.is_fatal() => Err(e),
                    Err(e) => {
                        warn!("刷新结果页失败: {}", e);
                        Ok(())
                    }
                    Ok(()) => Ok(()),
                }
            }
        }
    }
}
