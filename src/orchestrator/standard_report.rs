//! 单文件报表下载 - 编排层
//!
//! 不需要提交和轮询：打开活动列表，按编号选中报表，直接下载最新的文件

use std::path::PathBuf;

use tracing::info;

use crate::error::{DriverError, DriverResult};
use crate::infrastructure::{move_artifact, Condition, Locator, OptionChoice, SessionDriver, StagingDir};
use crate::models::{ArtifactResult, ArtifactStatus, CategoryReport, WorkItem};
use crate::orchestrator::report_worker::WorkerPlan;
use crate::utils::{Outcome, Phase};

pub async fn run_standard<D: SessionDriver + ?Sized>(
    driver: &mut D,
    plan: &WorkerPlan<'_>,
    staging: &StagingDir,
    report: &mut CategoryReport,
) -> DriverResult<()> {
    let item = WorkItem::new(&plan.category.name, &plan.category.name);
    let mut result = ArtifactResult {
        item: item.clone(),
        status: ArtifactStatus::Pending,
        correlation_id: None,
        path: None,
    };

    let fetched = fetch_standard(driver, plan, staging).await;
    match fetched {
        Ok(path) => {
            info!("[{}] ✅ 报表 {} 下载完成", plan.worker(), plan.category.id);
            plan.events.emit(
                Phase::Fetching,
                Some(&item),
                Outcome::Downloaded { path: path.clone() },
            );
            result.mark_downloaded(path);
            report.extend([result]);
            Ok(())
        }
        Err(e) => {
            result.mark(ArtifactStatus::DownloadFailed);
            report.extend([result]);
            if e.is_fatal() {
                return Err(e);
            }
            plan.events.emit(
                Phase::Fetching,
                Some(&item),
                Outcome::Failed {
                    reason: e.to_string(),
                },
            );
            Ok(())
        }
    }
}

async fn fetch_standard<D: SessionDriver + ?Sized>(
    driver: &mut D,
    plan: &WorkerPlan<'_>,
    staging: &StagingDir,
) -> DriverResult<PathBuf> {
    let layout = &plan.config.layout;
    let wait = plan.config.wait_timeout;

    driver.navigate(&plan.portal_url).await?;

    let procedures = Locator::id(&layout.procedure_select);
    driver
        .wait_for(&Condition::Present(procedures.clone()), wait)
        .await?;
    driver
        .select_option(&procedures, &OptionChoice::Value(plan.category.id.clone()))
        .await?;

    driver
        .click_when_ready(&Locator::id(&layout.first_activity_files), wait)
        .await?;

    let download = Locator::xpath(&layout.standard_download_link);
    driver
        .wait_for(&Condition::Clickable(download.clone()), wait)
        .await?;

    staging
        .clear()
        .await
        .map_err(|e| DriverError::io(staging.path(), e))?;
    let downloaded = driver
        .download(&download, staging.path(), plan.config.download_timeout)
        .await?
        .ok_or_else(|| {
            DriverError::timeout(
                format!("下载报表 {}", plan.category.id),
                plan.config.download_timeout,
            )
        })?;

    move_artifact(&downloaded, &plan.artifact_dir, &plan.category.name)
        .await
        .map_err(|e| DriverError::io(&downloaded, e))
}
