//! 单个报表类别的 worker - 编排层
//!
//! ## 职责
//!
//! 1. **资源管理**：创建暂存目录、启动浏览器，任何退出路径都关闭会话并删除临时目录
//! 2. **分批调度**：把车型分批，批次之间严格串行，复用同一个会话
//! 3. **结果汇总**：每批结果都写入 `CategoryReport`，致命错误之前的结果不会丢
//!
//! 流程部分对驱动是泛型的，测试时可以换成内存实现。

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::browser::{launch_session, portal_url, redact_url, LaunchOptions};
use crate::config::{Config, ReportCategory, ReportKind};
use crate::error::{ConfigError, DriverResult};
use crate::infrastructure::{SessionDriver, StagingDir};
use crate::models::{CategoryReport, Credentials, WorkItem};
use crate::orchestrator::standard_report::run_standard;
use crate::utils::logging::{log_batch_complete, log_batch_start};
use crate::utils::{EventSink, Outcome, Phase};
use crate::workflow::{date_parameter, partition, BatchCtx, BatchFlow};

/// 一个 worker 运行所需的全部参数
pub struct WorkerPlan<'a> {
    pub config: &'a Config,
    pub category: &'a ReportCategory,
    /// 带账号的页面地址
    pub portal_url: String,
    pub artifact_dir: PathBuf,
    pub events: EventSink,
}

impl<'a> WorkerPlan<'a> {
    pub fn new(
        config: &'a Config,
        category: &'a ReportCategory,
        credentials: &Credentials,
        events: &EventSink,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            config,
            category,
            portal_url: portal_url(&config.portal_host, &category.url_path, credentials)?,
            artifact_dir: config.artifact_dir(category),
            events: events.for_worker(category.worker_name()),
        })
    }

    pub fn worker(&self) -> &str {
        self.events.worker()
    }
}

/// 启动浏览器并处理一个报表类别
///
/// 永远返回报告；启动失败或会话中断记录在 `aborted` 里
pub async fn run_worker(
    config: Arc<Config>,
    category: ReportCategory,
    items: Arc<Vec<WorkItem>>,
    credentials: Arc<Credentials>,
    events: EventSink,
) -> CategoryReport {
    let worker = category.worker_name();
    let mut report = CategoryReport::new(&worker);

    let plan = match WorkerPlan::new(&config, &category, &credentials, &events) {
        Ok(plan) => plan,
        Err(e) => return abort(report, &events.for_worker(&worker), e.to_string()),
    };
    plan.events.emit(Phase::Session, None, Outcome::Started);

    // 守卫在函数结束时删除目录，包括出错的路径
    let staging = match StagingDir::create(config.staging_dir(&category)).await {
        Ok(dir) => dir,
        Err(e) => return abort(report, &plan.events, format!("无法创建暂存目录: {}", e)),
    };
    let profile = match StagingDir::create(config.profile_dir(&category)).await {
        Ok(dir) => dir,
        Err(e) => return abort(report, &plan.events, format!("无法创建浏览器目录: {}", e)),
    };

    let options = LaunchOptions {
        headless: config.headless,
        chrome_executable: config.chrome_executable.clone(),
        user_data_dir: profile.path().to_path_buf(),
        request_timeout: config.wait_timeout,
    };
    let mut driver = match launch_session(&worker, &options).await {
        Ok(driver) => driver,
        Err(e) => return abort(report, &plan.events, e.to_string()),
    };

    run_category(&mut driver, &plan, &items, &staging, &mut report).await;

    if let Err(e) = driver.close().await {
        warn!("[{}] 关闭浏览器失败: {}", worker, e);
    }
    info!("[{}] 🏁 worker 结束", worker);
    report
}

/// 用已有的会话处理一个报表类别
pub async fn run_category<D: SessionDriver + ?Sized>(
    driver: &mut D,
    plan: &WorkerPlan<'_>,
    items: &[WorkItem],
    staging: &StagingDir,
    report: &mut CategoryReport,
) {
    info!(
        "[{}] 🌐 目标页面: {}",
        plan.worker(),
        redact_url(&plan.portal_url)
    );

    let result = match plan.category.kind {
        ReportKind::Elaboration => run_elaboration(driver, plan, items, staging, report).await,
        ReportKind::Standard => run_standard(driver, plan, staging, report).await,
    };

    if let Err(e) = result {
        error!("[{}] ❌ 会话中断，worker 提前结束: {}", plan.worker(), e);
        plan.events.emit(
            Phase::Session,
            None,
            Outcome::Aborted {
                reason: e.to_string(),
            },
        );
        report.aborted = Some(e.to_string());
    }
}

/// 分批提交 → 轮询 → 下载
pub async fn run_elaboration<D: SessionDriver + ?Sized>(
    driver: &mut D,
    plan: &WorkerPlan<'_>,
    items: &[WorkItem],
    staging: &StagingDir,
    report: &mut CategoryReport,
) -> DriverResult<()> {
    let batches = partition(items, plan.config.batch_size);
    if batches.is_empty() {
        warn!("[{}] ⚠️ 没有车型需要处理", plan.worker());
        return Ok(());
    }

    let flow = BatchFlow::new(plan.config);
    let total_batches = batches.len();

    for (idx, batch) in batches.iter().enumerate() {
        let batch_num = idx + 1;
        log_batch_start(plan.worker(), batch_num, total_batches, batch.len());

        let ctx = BatchCtx {
            batch_index: batch_num,
            total_batches,
            form_url: &plan.portal_url,
            date_param: date_parameter(
                chrono::Local::now().date_naive(),
                plan.config.date_offset_months,
            ),
            staging,
            artifact_dir: &plan.artifact_dir,
            events: &plan.events,
        };

        let outcome = flow.run(driver, &ctx, batch).await;
        log_batch_complete(plan.worker(), batch_num, outcome.downloaded(), batch.len());
        report.extend(outcome.results);

        if let Some(fatal) = outcome.fatal {
            // 剩下的批次不再处理，但要出现在报告里
            for rest in &batches[batch_num..] {
                report.extend(rest.iter().cloned().map(crate::models::ArtifactResult::submit_failed));
            }
            return Err(fatal);
        }
    }

    Ok(())
}

fn abort(mut report: CategoryReport, events: &EventSink, reason: String) -> CategoryReport {
    error!("[{}] ❌ worker 无法启动: {}", events.worker(), reason);
    events.emit(
        Phase::Session,
        None,
        Outcome::Aborted {
            reason: reason.clone(),
        },
    );
    report.aborted = Some(reason);
    report
}
