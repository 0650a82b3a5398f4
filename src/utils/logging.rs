//! 日志工具模块
//!
//! 提供日志格式化和输出的辅助函数
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::Config;
use crate::models::RunReport;

/// 初始化日志文件
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n报表下载日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)
        .with_context(|| format!("无法写入日志文件: {}", log_file_path))?;
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(config: &Config, item_count: usize) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 多报表并行下载模式");
    info!("📊 报表类别: {}", config.reports.len());
    info!("🚗 车型数量: {} (每批 {} 个)", item_count, config.batch_size);
    info!("📁 输出目录: {}", config.reports_dir.display());
    info!("{}", "=".repeat(60));
}

/// 记录批次开始信息
pub fn log_batch_start(worker: &str, batch_num: usize, total_batches: usize, size: usize) {
    info!("\n[{}] {}", worker, "=".repeat(40));
    info!("[{}] 📦 开始处理第 {}/{} 批 ({} 个车型)", worker, batch_num, total_batches, size);
}

/// 记录批次完成信息
pub fn log_batch_complete(worker: &str, batch_num: usize, downloaded: usize, total: usize) {
    info!("[{}] ✓ 第 {} 批完成: 下载 {}/{}", worker, batch_num, downloaded, total);
    info!("[{}] {}", worker, "─".repeat(40));
}

/// 打印最终统计信息
pub fn print_final_stats(report: &RunReport, log_file_path: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    for category in &report.categories {
        info!(
            "[{}] 提交 {} | ✅ 下载 {} | ❌ 失败 {}",
            category.category,
            category.submitted(),
            category.downloaded(),
            category.failed()
        );
        for failed in category.results.iter().filter(|r| r.status.is_failure()) {
            warn!("[{}]   - {}: {}", category.category, failed.item.key, failed.status);
        }
        if let Some(reason) = &category.aborted {
            warn!("[{}]   worker 提前终止: {}", category.category, reason);
        }
    }
    info!("{}", "=".repeat(60));
    info!(
        "合计: 提交 {} | 下载 {} | 失败 {}",
        report.submitted(),
        report.downloaded(),
        report.failed()
    );
    if Path::new(log_file_path).exists() {
        info!("\n日志已保存至: {}", log_file_path);
    }
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
