use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::error::{DriverError, DriverResult};
use crate::infrastructure::{ChromeDriver, JsExecutor};

/// 浏览器启动参数
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub chrome_executable: Option<PathBuf>,
    /// 每个 worker 独立的用户数据目录，避免多个实例抢同一个 profile
    pub user_data_dir: PathBuf,
    pub request_timeout: Duration,
}

/// 启动浏览器并返回会话驱动
pub async fn launch_session(worker: &str, options: &LaunchOptions) -> DriverResult<ChromeDriver> {
    info!("[{}] 🚀 启动浏览器...", worker);
    debug!("[{}] 启动参数: {:?}", worker, options);

    let mut builder = BrowserConfig::builder();
    builder = if options.headless {
        builder.new_headless_mode()
    } else {
        builder.with_head()
    };
    if let Some(executable) = &options.chrome_executable {
        builder = builder.chrome_executable(executable);
    }

    let config = builder
        .user_data_dir(&options.user_data_dir)
        .request_timeout(options.request_timeout)
        .args(vec![
            "--disable-gpu",           // Windows 无头模式必须禁用 GPU
            "--no-sandbox",            // 禁用沙盒，防止权限问题导致的崩溃
            "--disable-dev-shm-usage", // 防止共享内存不足
            "--log-level=3",
        ])
        .build()
        .map_err(|e| {
            error!("[{}] 配置浏览器失败: {}", worker, e);
            DriverError::Launch(e)
        })?;

    let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
        error!("[{}] 启动浏览器失败: {}", worker, e);
        DriverError::Launch(e.to_string())
    })?;
    debug!("[{}] 浏览器启动成功", worker);

    // 在后台处理浏览器事件
    let handler_task: JoinHandle<()> = tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 添加短暂延迟以等待浏览器状态同步
    sleep(Duration::from_millis(300)).await;

    let page = browser.new_page("about:blank").await.map_err(|e| {
        error!("[{}] 创建页面失败: {}", worker, e);
        DriverError::Launch(e.to_string())
    })?;

    Ok(ChromeDriver::new(
        browser,
        JsExecutor::new(page),
        handler_task,
        options.request_timeout,
    ))
}
