//! 合并各车型的报表

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{info, warn};

use crate::config::MergeProfile;
use crate::error::PipelineError;
use crate::models::WorkItem;
use crate::processing::csv_io::{cell, read_table, Table};
use crate::processing::xlsx_io::{load_table, save_table};

/// 车型不在列表中时使用的代码
pub const UNKNOWN_MODEL: &str = "UNKNOWN";

/// 零件清单只保留前 8 列
const PART_LIST_COLUMNS: usize = 8;

/// 合并结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSummary {
    pub output: PathBuf,
    /// 参与合并的文件数
    pub files: usize,
    /// 被跳过的文件数
    pub skipped: usize,
    pub rows: usize,
}

/// 合并一个类别目录下的所有 CSV
///
/// 输出格式由 `output` 的扩展名决定；没有可合并的数据时返回 `Ok(None)`
pub async fn merge_category(
    artifact_dir: &Path,
    items: &[WorkItem],
    profile: MergeProfile,
    output: &Path,
) -> Result<Option<MergeSummary>, PipelineError> {
    let files = list_csv_files(artifact_dir).await?;
    if files.is_empty() {
        info!("{} 中没有可合并的文件", artifact_dir.display());
        return Ok(None);
    }

    let models: HashMap<&str, &str> = items
        .iter()
        .map(|item| (item.key.as_str(), item.model_code()))
        .collect();

    let mut tables = Vec::new();
    let mut skipped = 0;

    for file in &files {
        let key = file
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let model = models.get(key.as_str()).copied().unwrap_or(UNKNOWN_MODEL);

        let table = match read_table(file).await {
            Ok(table) => table,
            Err(e) => {
                warn!("⚠️ 无法读取 {}: {}", file.display(), e);
                skipped += 1;
                continue;
            }
        };

        let mut table = match profile {
            MergeProfile::PartList => match filter_part_list(&table) {
                Ok(filtered) => filtered,
                Err(reason) => {
                    warn!("⚠️ 跳过 {}: {}", file.display(), reason);
                    skipped += 1;
                    continue;
                }
            },
            _ => table,
        };
        if profile == MergeProfile::PartList && table.is_empty() {
            continue;
        }

        table.push_column("Model", |_| model.to_string());
        tables.push(table);
    }

    if tables.is_empty() {
        warn!("⚠️ {} 没有可合并的数据", artifact_dir.display());
        return Ok(None);
    }

    let merged_files = tables.len();
    let mut merged = concat(tables);
    merged.source = output.to_path_buf();
    if profile == MergeProfile::PartList {
        enrich_part_numbers(&mut merged)?;
    }

    save_table(output, &merged).await?;
    info!(
        "✅ 已合并 {} 个文件 ({} 行) -> {}",
        merged_files,
        merged.len(),
        output.display()
    );

    Ok(Some(MergeSummary {
        output: output.to_path_buf(),
        files: merged_files,
        skipped,
        rows: merged.len(),
    }))
}

/// 目录下的 CSV 文件，按文件名排序
async fn list_csv_files(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let mut files = Vec::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
        Err(e) => return Err(PipelineError::io(dir, e)),
    };
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| PipelineError::io(dir, e))?
    {
        let path = entry.path();
        let is_csv = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if is_csv && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// 按列名对齐拼接，列顺序为首次出现的顺序
pub fn concat(tables: Vec<Table>) -> Table {
    let mut headers: Vec<String> = Vec::new();
    for table in &tables {
        for header in &table.headers {
            if !headers.contains(header) {
                headers.push(header.clone());
            }
        }
    }

    let mut merged = Table::new(headers);
    for table in tables {
        let mapping: Vec<Option<usize>> = merged
            .headers
            .iter()
            .map(|h| table.column(h))
            .collect();
        for row in &table.rows {
            merged.rows.push(
                mapping
                    .iter()
                    .map(|idx| idx.map(|i| cell(row, i).to_string()).unwrap_or_default())
                    .collect(),
            );
        }
    }
    merged
}

/// 零件清单过滤
///
/// 前 8 列加 `fQty`；第 6 列为 2、第 7 列为 1/2/3、第 8 列为 1/2；
/// 按第 5 列去重，保留第一次出现的行
pub fn filter_part_list(table: &Table) -> Result<Table, String> {
    let fqty = table.column("fQty").ok_or("缺少 fQty 列")?;
    if table.headers.len() < PART_LIST_COLUMNS {
        return Err(format!("只有 {} 列", table.headers.len()));
    }

    let mut headers: Vec<String> = table.headers[..PART_LIST_COLUMNS].to_vec();
    let extra_fqty = fqty >= PART_LIST_COLUMNS;
    if extra_fqty {
        headers.push("fQty".to_string());
    }

    let mut filtered = Table::new(headers);
    filtered.source = table.source.clone();
    let mut seen = HashSet::new();

    for row in &table.rows {
        let keep = number_is(cell(row, 5), &[2.0])
            && number_is(cell(row, 6), &[1.0, 2.0, 3.0])
            && number_is(cell(row, 7), &[1.0, 2.0]);
        if !keep || !seen.insert(cell(row, 4).to_string()) {
            continue;
        }
        let mut values: Vec<String> = (0..PART_LIST_COLUMNS)
            .map(|i| cell(row, i).to_string())
            .collect();
        if extra_fqty {
            values.push(cell(row, fqty).to_string());
        }
        filtered.rows.push(values);
    }

    Ok(filtered)
}

fn number_is(value: &str, accepted: &[f64]) -> bool {
    value
        .trim()
        .parse::<f64>()
        .map(|n| accepted.contains(&n))
        .unwrap_or(false)
}

/// `vcCode` → `PartNumber`，只保留整数零件号，追加 `chave = 零件号_车型`
pub fn enrich_part_numbers(table: &mut Table) -> Result<(), PipelineError> {
    table.rename("vcCode", "PartNumber");
    let part = table.require("PartNumber")?;
    let model = table.require("Model")?;

    table.rows.retain_mut(|row| match integer_part_number(cell(row, part)) {
        Some(n) => {
            row[part] = n.to_string();
            true
        }
        None => false,
    });
    table.push_column("chave", |row| {
        format!("{}_{}", cell(row, part), cell(row, model))
    });
    Ok(())
}

/// 整数零件号；"123.0" 这种导出格式也接受
pub fn integer_part_number(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(n) = value.parse::<i64>() {
        return Some(n);
    }
    let n = value.parse::<f64>().ok()?;
    if n.is_finite() && n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Some(n as i64)
    } else {
        None
    }
}

/// 单文件报表：`ElementNode` → `PartNumber`，去掉最后一个字符和前导零
///
/// 下载的原文件不改动，结果写到 `output`；返回行数
pub async fn fix_element_nodes(source: &Path, output: &Path) -> Result<usize, PipelineError> {
    let mut table = load_table(source).await?;
    if table.rename("ElementNode", "PartNumber") {
        let part = table.require("PartNumber")?;
        for row in &mut table.rows {
            row[part] = element_node_part_number(cell(row, part));
        }
    } else {
        // 已经是处理过的格式
        table.require("PartNumber")?;
        info!("{} 中没有 ElementNode 列，原样转换", source.display());
    }

    table.source = output.to_path_buf();
    save_table(output, &table).await?;
    info!("✅ 已修正零件号: {} -> {}", source.display(), output.display());
    Ok(table.len())
}

fn element_node_part_number(node: &str) -> String {
    let mut value = node.to_string();
    value.pop();
    value.trim_start_matches('0').to_string()
}
