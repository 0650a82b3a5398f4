//! 应用入口 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责资源准备和 worker 调度。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：日志文件、车型列表、账号、目录
//! 2. **并发调度**：每个报表类别一个 tokio 任务，错开启动
//! 3. **事件汇总**：所有 worker 共用一个事件通道，由唯一的消费者输出
//! 4. **后处理**：全部 worker 结束后合并与对比
//! 5. **全局统计**：汇总所有类别的结果
//!
//! ## 设计特点
//!
//! - **只读共享**：配置、车型列表、账号加载一次，以 `Arc` 分给各个 worker
//! - **会话独占**：每个 worker 自己启动、自己关闭浏览器
//! - **失败即数据**：worker 的失败记录在报告里，不影响其它 worker

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::fs;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::models::{load_credentials, load_work_items, CategoryReport, Credentials, RunReport, WorkItem};
use crate::orchestrator::report_worker::run_worker;
use crate::processing::run_post_processing;
use crate::utils::logging::{init_log_file, log_startup, print_final_stats};
use crate::utils::{spawn_event_logger, EventSink};

/// 应用主结构
pub struct App {
    config: Arc<Config>,
    items: Arc<Vec<WorkItem>>,
    credentials: Arc<Credentials>,
    events: EventSink,
    event_logger: JoinHandle<usize>,
}

impl App {
    /// 初始化应用
    ///
    /// 车型列表或账号无法加载时直接失败，不会启动任何 worker
    pub async fn initialize(config: Config) -> Result<Self> {
        // 初始化日志文件
        init_log_file(&config.output_log_file)?;

        let items = load_work_items(&config.models_file)
            .await
            .context("加载车型列表失败")?;
        let credentials = load_credentials(&config.credentials_file)
            .await
            .context("加载账号失败")?;

        prepare_directories(&config).await?;
        log_startup(&config, items.len());

        let (events, rx) = EventSink::channel();
        let event_logger = spawn_event_logger(rx, Some(PathBuf::from(&config.output_log_file)));

        Ok(Self {
            config: Arc::new(config),
            items: Arc::new(items),
            credentials: Arc::new(credentials),
            events,
            event_logger,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(self) -> Result<RunReport> {
        if self.items.is_empty() {
            warn!("⚠️ 车型列表为空，只处理单文件报表");
        }

        let report = self.run_workers().await;

        run_post_processing(&self.config, &self.items, &self.events).await;

        // 释放发送端，等待事件全部输出
        let Self {
            config,
            events,
            event_logger,
            ..
        } = self;
        drop(events);
        match event_logger.await {
            Ok(count) => debug!("共输出 {} 条进度事件", count),
            Err(e) => warn!("事件输出任务异常结束: {}", e),
        }

        print_final_stats(&report, &config.output_log_file);
        Ok(report)
    }

    /// 每个类别一个任务，错开启动，全部结束后返回
    async fn run_workers(&self) -> RunReport {
        let mut handles = Vec::new();

        for (idx, category) in self.config.reports.iter().enumerate() {
            if idx > 0 {
                sleep(self.config.worker_stagger).await;
            }
            info!("🚀 启动 worker: {}", category.worker_name());

            let handle = tokio::spawn(run_worker(
                self.config.clone(),
                category.clone(),
                self.items.clone(),
                self.credentials.clone(),
                self.events.clone(),
            ));
            handles.push((category.worker_name(), handle));
        }

        let mut report = RunReport::default();
        for (worker, handle) in handles {
            match handle.await {
                Ok(category_report) => report.categories.push(category_report),
                Err(e) => {
                    error!("[{}] 任务执行失败: {}", worker, e);
                    let mut failed = CategoryReport::new(&worker);
                    failed.aborted = Some(e.to_string());
                    report.categories.push(failed);
                }
            }
        }
        report
    }
}

/// 创建报表根目录和各类别的产物目录，已存在时不做任何事
pub async fn prepare_directories(config: &Config) -> Result<()> {
    fs::create_dir_all(&config.reports_dir)
        .await
        .with_context(|| format!("无法创建目录: {}", config.reports_dir.display()))?;
    for category in &config.reports {
        let dir = config.artifact_dir(category);
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("无法创建目录: {}", dir.display()))?;
    }
    Ok(())
}
