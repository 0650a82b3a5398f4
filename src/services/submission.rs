//! 提交服务 - 业务能力层
//!
//! 只负责"把一个车型提交给门户并拿到活动编号"，不关心轮询和下载

use std::collections::HashSet;
use std::time::Duration;

use regex::Regex;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::config::{Config, PortalLayout};
use crate::error::{DriverError, DriverResult};
use crate::infrastructure::{Condition, Locator, OptionChoice, SessionDriver};
use crate::models::{CorrelationRecord, WorkItem};
use crate::utils::{EventSink, Outcome, Phase};

/// 活动编号：至少 7 位连续数字
const CORRELATION_PATTERN: &str = r"[0-9]{7,}";

/// 确认消息还是上一次提交的内容时，重新检查的间隔
const RECHECK_INTERVAL: Duration = Duration::from_millis(500);

/// 从确认消息中提取活动编号
///
/// 取第一段不少于 7 位的数字；消息里如果还有日期、数量等长数字，
/// 可能取错，属于已知的局限。
pub fn extract_correlation_id(message: &str) -> Option<String> {
    let re = Regex::new(CORRELATION_PATTERN).ok()?;
    re.find(message).map(|m| m.as_str().to_string())
}

/// 单个车型的提交结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Submitted(CorrelationRecord),
    Skipped { reason: String },
}

/// 一批车型的提交结果
#[derive(Debug, Default)]
pub struct SubmissionResult {
    /// 按提交顺序排列
    pub records: Vec<CorrelationRecord>,
    pub skipped: Vec<WorkItem>,
}

impl SubmissionResult {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// 提交服务
pub struct Submission {
    layout: PortalLayout,
    wait_timeout: Duration,
    submit_pause: Duration,
}

impl Submission {
    pub fn new(config: &Config) -> Self {
        Self {
            layout: config.layout.clone(),
            wait_timeout: config.wait_timeout,
            submit_pause: config.submit_pause,
        }
    }

    /// 打开生成页面并填好日期参数（每批一次）
    pub async fn prepare_form<D: SessionDriver + ?Sized>(
        &self,
        driver: &mut D,
        form_url: &str,
        date_param: &str,
    ) -> DriverResult<()> {
        driver.navigate(form_url).await?;
        driver
            .wait_for(
                &Condition::Present(Locator::id(&self.layout.model_select)),
                self.wait_timeout,
            )
            .await?;
        let date_field = Locator::id(&self.layout.date_field);
        driver
            .wait_for(&Condition::Present(date_field.clone()), self.wait_timeout)
            .await?;
        driver.set_field(&date_field, date_param).await
    }

    /// 依次提交一批车型
    ///
    /// 单个车型失败只记录并跳过；只有会话级错误才返回 `Err`
    pub async fn submit_batch<D: SessionDriver + ?Sized>(
        &self,
        driver: &mut D,
        batch: &[WorkItem],
        events: &EventSink,
    ) -> DriverResult<SubmissionResult> {
        let mut result = SubmissionResult::default();
        let mut seen: HashSet<String> = HashSet::new();

        for item in batch {
            match self.submit_item(driver, item, &seen).await? {
                SubmitOutcome::Submitted(record) => {
                    events.emit(
                        Phase::Submitting,
                        Some(item),
                        Outcome::Submitted {
                            correlation_id: record.correlation_id.clone(),
                        },
                    );
                    seen.insert(record.correlation_id.clone());
                    result.records.push(record);
                }
                SubmitOutcome::Skipped { reason } => {
                    events.emit(Phase::Submitting, Some(item), Outcome::Skipped { reason });
                    result.skipped.push(item.clone());
                }
            }
        }

        Ok(result)
    }

    /// 提交单个车型
    ///
    /// `seen` 是本批已经拿到的编号，确认消息如果还停留在上一次的编号上就继续等
    pub async fn submit_item<D: SessionDriver + ?Sized>(
        &self,
        driver: &mut D,
        item: &WorkItem,
        seen: &HashSet<String>,
    ) -> DriverResult<SubmitOutcome> {
        let select = Locator::id(&self.layout.model_select);

        if let Err(e) = driver
            .wait_for(&Condition::Clickable(select.clone()), self.wait_timeout)
            .await
        {
            return skip_unless_fatal(e, "车型下拉框不可用");
        }
        if let Err(e) = driver
            .select_option(&select, &OptionChoice::Text(item.label.clone()))
            .await
        {
            return skip_unless_fatal(e, "找不到车型选项");
        }
        if let Err(e) = driver.click(&Locator::id(&self.layout.confirm_button)).await {
            return skip_unless_fatal(e, "无法点击确认按钮");
        }

        let correlation_id = match self.await_confirmation(driver, seen).await? {
            Ok(id) => id,
            Err(reason) => return Ok(SubmitOutcome::Skipped { reason }),
        };

        debug!("车型 {} 对应活动编号 {}", item.key, correlation_id);
        sleep(self.submit_pause).await;
        Ok(SubmitOutcome::Submitted(CorrelationRecord::new(
            correlation_id,
            item.clone(),
        )))
    }

    /// 等待确认消息并提取新的活动编号
    ///
    /// 外层 `Err` 为致命错误，内层 `Err` 为跳过原因
    async fn await_confirmation<D: SessionDriver + ?Sized>(
        &self,
        driver: &mut D,
        seen: &HashSet<String>,
    ) -> DriverResult<Result<String, String>> {
        let message = Locator::id(&self.layout.message_label);
        let condition = if self.layout.success_text.is_empty() {
            Condition::Present(message)
        } else {
            Condition::TextContains(message, self.layout.success_text.clone())
        };

        let deadline = Instant::now() + self.wait_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let element = match driver.wait_for(&condition, remaining).await {
                Ok(element) => element,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => return Ok(Err(format!("没有收到确认消息: {}", e))),
            };

            match extract_correlation_id(element.text()) {
                Some(id) if !seen.contains(&id) => return Ok(Ok(id)),
                Some(id) => {
                    // 页面还没刷新，消息仍是上一次的
                    if Instant::now() >= deadline {
                        return Ok(Err(format!("确认消息一直停留在编号 {}", id)));
                    }
                    sleep(RECHECK_INTERVAL).await;
                }
                None => {
                    return Ok(Err(format!(
                        "无法从确认消息中提取活动编号: {}",
                        crate::utils::logging::truncate_text(element.text(), 120)
                    )))
                }
            }
        }
    }
}

fn skip_unless_fatal(err: DriverError, reason: &str) -> DriverResult<SubmitOutcome> {
    if err.is_fatal() {
        Err(err)
    } else {
        Ok(SubmitOutcome::Skipped {
            reason: format!("{}: {}", reason, err),
        })
    }
}
