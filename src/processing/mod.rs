//! 后处理：所有 worker 结束后合并、修正、对比
//!
//! 这里的失败只告警，不影响已经下载好的产物

pub mod compare;
pub mod csv_io;
pub mod merge;
pub mod xlsx_io;

use std::path::PathBuf;

use tracing::{info, warn};

use crate::config::{Config, MergeProfile, ReportCategory};
use crate::models::WorkItem;
use crate::utils::{EventSink, Outcome, Phase};

pub use compare::{compare, CompareInputs, CompareSummary};
pub use csv_io::{read_table, write_table, Table};
pub use merge::{fix_element_nodes, merge_category, MergeSummary};
pub use xlsx_io::{load_table, load_table_at, save_table};

/// 后处理结果
#[derive(Debug, Default)]
pub struct PostProcessSummary {
    pub merged: Vec<MergeSummary>,
    /// 已修正零件号的单文件报表（Excel）
    pub fixed: Vec<PathBuf>,
    pub comparison: Option<CompareSummary>,
}

/// 合并后的文件：`Todos Modelos_{id}.xlsx`
pub fn merged_output(config: &Config, category: &ReportCategory) -> PathBuf {
    config
        .reports_dir
        .join(format!("Todos Modelos_{}.xlsx", category.id))
}

/// 单文件报表修正后的 Excel：`{name}.xlsx`
pub fn standard_output(config: &Config, category: &ReportCategory) -> PathBuf {
    config
        .reports_dir
        .join(format!("{}.xlsx", category.name))
}

/// 对比表
pub fn comparison_output(config: &Config) -> PathBuf {
    config.reports_dir.join("Todos Comparativos.xlsx")
}

/// 单文件报表下载后的路径
pub fn standard_artifact(config: &Config, category: &ReportCategory) -> PathBuf {
    config
        .artifact_dir(category)
        .join(format!("{}.csv", category.name))
}

pub async fn run_post_processing(
    config: &Config,
    items: &[WorkItem],
    events: &EventSink,
) -> PostProcessSummary {
    let events = events.for_worker("post");
    let mut summary = PostProcessSummary::default();

    info!("\n{}", "=".repeat(60));
    info!("🧩 开始合并报表");

    for category in &config.reports {
        match category.merge {
            MergeProfile::ElementNode => {
                let path = standard_artifact(config, category);
                if !path.exists() {
                    warn!("⚠️ 找不到 {}，跳过", path.display());
                    continue;
                }
                let output = standard_output(config, category);
                match fix_element_nodes(&path, &output).await {
                    Ok(rows) => {
                        events.emit(
                            Phase::Merge,
                            None,
                            Outcome::Written {
                                path: output.clone(),
                                rows,
                            },
                        );
                        summary.fixed.push(output);
                    }
                    Err(e) => events.emit(
                        Phase::Merge,
                        None,
                        Outcome::Failed {
                            reason: e.to_string(),
                        },
                    ),
                }
            }
            profile => {
                let output = merged_output(config, category);
                match merge_category(&config.artifact_dir(category), items, profile, &output).await {
                    Ok(Some(merged)) => {
                        events.emit(
                            Phase::Merge,
                            None,
                            Outcome::Written {
                                path: merged.output.clone(),
                                rows: merged.rows,
                            },
                        );
                        summary.merged.push(merged);
                    }
                    Ok(None) => {}
                    Err(e) => events.emit(
                        Phase::Merge,
                        None,
                        Outcome::Failed {
                            reason: format!("{}: {}", category.name, e),
                        },
                    ),
                }
            }
        }
    }

    let part_list = config
        .reports
        .iter()
        .find(|c| c.merge == MergeProfile::PartList);
    let standard = config
        .reports
        .iter()
        .find(|c| c.merge == MergeProfile::ElementNode);

    if let (Some(part_list), Some(standard)) = (part_list, standard) {
        let inputs = CompareInputs {
            reference: config.reference_file.clone(),
            reference_header_row: config.reference_header_row,
            merged: merged_output(config, part_list),
            standard: standard_output(config, standard),
            output: comparison_output(config),
        };
        match compare(&inputs).await {
            Ok(Some(result)) => {
                events.emit(
                    Phase::Compare,
                    None,
                    Outcome::Written {
                        path: inputs.output.clone(),
                        rows: result.phase_in.max(result.phase_out),
                    },
                );
                summary.comparison = Some(result);
            }
            Ok(None) => {}
            Err(e) => events.emit(
                Phase::Compare,
                None,
                Outcome::Failed {
                    reason: e.to_string(),
                },
            ),
        }
    }

    summary
}
