//! 产物下载 - 业务能力层
//!
//! 结果列表页每次返回后都会重新渲染，之前取得的行 / 链接句柄全部失效，
//! 所以每个编号都要从列表页重新定位。

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::{Config, PortalLayout};
use crate::error::{DriverError, DriverResult};
use crate::infrastructure::{move_artifact, Condition, Locator, SessionDriver, StagingDir};
use crate::models::{ArtifactResult, ArtifactStatus};
use crate::utils::{EventSink, Outcome, Phase};

/// 产物下载服务
pub struct ArtifactFetcher {
    layout: PortalLayout,
    wait_timeout: Duration,
    download_timeout: Duration,
}

impl ArtifactFetcher {
    pub fn new(config: &Config) -> Self {
        Self {
            layout: config.layout.clone(),
            wait_timeout: config.wait_timeout,
            download_timeout: config.download_timeout,
        }
    }

    /// 下载所有已生成的报表
    ///
    /// 只处理状态为 `Pending` 的结果：不在 `ready` 中的标记为超时，
    /// 其余逐个下载。单个失败不影响后面的编号。
    pub async fn fetch_all<D: SessionDriver + ?Sized>(
        &self,
        driver: &mut D,
        results: &mut [ArtifactResult],
        ready: &HashSet<String>,
        staging: &StagingDir,
        artifact_dir: &Path,
        events: &EventSink,
    ) -> DriverResult<()> {
        let listing_url = match driver.current_url().await {
            Ok(url) => Some(url),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                debug!("无法读取结果页地址，失败时改为刷新: {}", e);
                None
            }
        };

        for result in results.iter_mut() {
            if result.status != ArtifactStatus::Pending {
                continue;
            }
            let Some(correlation_id) = result.correlation_id.clone() else {
                continue;
            };

            if !ready.contains(&correlation_id) {
                result.mark(ArtifactStatus::TimedOut);
                events.emit(Phase::Fetching, Some(&result.item), Outcome::TimedOut);
                continue;
            }
            result.mark(ArtifactStatus::Ready);

            match self
                .fetch_one(driver, &correlation_id, &result.item.key, staging, artifact_dir)
                .await
            {
                Ok(path) => {
                    events.emit(
                        Phase::Fetching,
                        Some(&result.item),
                        Outcome::Downloaded { path: path.clone() },
                    );
                    result.mark_downloaded(path);
                    if let Err(e) = self.return_to_listing(driver).await {
                        if e.is_fatal() {
                            return Err(e);
                        }
                        debug!("返回结果页失败 ({})，重新加载", e);
                        self.recover(driver, listing_url.as_deref()).await?;
                    }
                }
                Err(e) if e.is_fatal() => {
                    result.mark(ArtifactStatus::DownloadFailed);
                    return Err(e);
                }
                Err(e) => {
                    result.mark(ArtifactStatus::DownloadFailed);
                    events.emit(
                        Phase::Fetching,
                        Some(&result.item),
                        Outcome::Failed {
                            reason: e.to_string(),
                        },
                    );
                    self.recover(driver, listing_url.as_deref()).await?;
                }
            }
        }

        Ok(())
    }

    /// 下载单个编号对应的文件，返回产物路径
    async fn fetch_one<D: SessionDriver + ?Sized>(
        &self,
        driver: &mut D,
        correlation_id: &str,
        key: &str,
        staging: &StagingDir,
        artifact_dir: &Path,
    ) -> DriverResult<PathBuf> {
        // 每次都重新定位行和链接
        let row_locator = Locator::row_containing(&self.layout.listing_table, correlation_id);
        let row = driver
            .wait_for(&Condition::Present(row_locator), self.wait_timeout)
            .await?;
        let files_link = driver
            .find_within(&row, &Locator::xpath(&self.layout.list_files_link))
            .await?;

        staging
            .clear()
            .await
            .map_err(|e| DriverError::io(staging.path(), e))?;

        driver.click_element(&files_link).await?;

        let download_link = Locator::id(&self.layout.download_link);
        driver
            .wait_for(&Condition::Clickable(download_link.clone()), self.wait_timeout)
            .await?;

        let downloaded = driver
            .download(&download_link, staging.path(), self.download_timeout)
            .await?
            .ok_or_else(|| DriverError::timeout(format!("下载 {}", key), self.download_timeout))?;

        move_artifact(&downloaded, artifact_dir, key)
            .await
            .map_err(|e| DriverError::io(&downloaded, e))
    }

    /// 成功后回到结果列表
    async fn return_to_listing<D: SessionDriver + ?Sized>(&self, driver: &mut D) -> DriverResult<()> {
        driver.go_back().await?;
        driver
            .wait_for(
                &Condition::Present(Locator::id(&self.layout.listing_table)),
                self.wait_timeout,
            )
            .await?;
        Ok(())
    }

    /// 失败后重新加载结果列表，恢复到已知状态
    ///
    /// 非致命错误只记录，下一个编号自己会再定位
    async fn recover<D: SessionDriver + ?Sized>(
        &self,
        driver: &mut D,
        listing_url: Option<&str>,
    ) -> DriverResult<()> {
        let reloaded = match listing_url {
            Some(url) => driver.navigate(url).await,
            None => driver.refresh().await,
        };
        let settled = match reloaded {
            Ok(()) => driver
                .wait_for(
                    &Condition::Present(Locator::id(&self.layout.listing_table)),
                    self.wait_timeout,
                )
                .await
                .map(|_| ()),
            Err(e) => Err(e),
        };

        match settled {
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!("重新加载结果页失败: {}", e);
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }
}
