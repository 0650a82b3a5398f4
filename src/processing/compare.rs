//! Phase-in / phase-out 对比
//!
//! 用合并后的零件清单和参考清单（PFEP）做集合差：
//! - phase-in：新清单里有、参考里没有
//! - phase-out：参考里有、新清单里没有

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use tracing::{info, warn};

use crate::error::PipelineError;
use crate::processing::csv_io::{cell, Table};
use crate::processing::xlsx_io::{load_table, load_table_at, save_table};

const PHASE_IN_COLUMNS: [&str; 7] = [
    "Model",
    "RTM # PFEP",
    "Descrição",
    "MATRICULA",
    "fQty",
    "Tipo",
    "Peso",
];
const PHASE_OUT_COLUMNS: [&str; 3] = ["Model", "PFEP # RTM", "Chave"];
const SPACER_COLUMNS: [&str; 2] = ["x", ""];

/// 对比所需的文件
#[derive(Debug, Clone)]
pub struct CompareInputs {
    /// 参考清单
    pub reference: PathBuf,
    /// 参考清单表头所在行（从 0 开始）
    pub reference_header_row: usize,
    /// 合并后的零件清单（含 `chave` 列）
    pub merged: PathBuf,
    /// 处理后的单文件报表（描述和重量）
    pub standard: PathBuf,
    pub output: PathBuf,
}

/// 对比结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompareSummary {
    pub phase_in: usize,
    pub phase_out: usize,
}

/// 生成对比表
///
/// 输入文件缺失时只告警并返回 `Ok(None)`
pub async fn compare(inputs: &CompareInputs) -> Result<Option<CompareSummary>, PipelineError> {
    for path in [&inputs.reference, &inputs.merged, &inputs.standard] {
        if !path.exists() {
            warn!("⚠️ 找不到 {}，跳过对比", path.display());
            return Ok(None);
        }
    }

    let reference = load_table_at(&inputs.reference, inputs.reference_header_row).await?;
    let merged = load_table(&inputs.merged).await?;
    let standard = load_table(&inputs.standard).await?;

    let (table, summary) = build_comparison(&reference, &merged, &standard)?;
    save_table(&inputs.output, &table).await?;
    info!(
        "✅ 对比表已生成: phase-in {} 行, phase-out {} 行 -> {}",
        summary.phase_in,
        summary.phase_out,
        inputs.output.display()
    );
    Ok(Some(summary))
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

fn optional_cell(row: &[String], idx: Option<usize>) -> String {
    idx.map(|i| cell(row, i).to_string()).unwrap_or_default()
}

/// 构造左右并排的对比表
pub fn build_comparison(
    reference: &Table,
    merged: &Table,
    standard: &Table,
) -> Result<(Table, CompareSummary), PipelineError> {
    let ref_part = reference.require("Part Number")?;
    let ref_model = reference.require("Modelo")?;
    let merged_key = merged.require("chave")?;
    let merged_part = merged.require("PartNumber")?;
    let std_part = standard.require("PartNumber")?;
    let std_desc = standard.require("DescriptionElementNode")?;
    let std_weight = standard.require("Weight")?;

    // 参考清单：(零件号, 车型, 键)
    let reference_rows: Vec<(String, String, String)> = reference
        .rows
        .iter()
        .map(|row| {
            let part = normalize(cell(row, ref_part));
            let model = normalize(cell(row, ref_model));
            let key = format!("{}_{}", part, model);
            (part, model, key)
        })
        .collect();
    let reference_keys: HashSet<&str> = reference_rows.iter().map(|(_, _, k)| k.as_str()).collect();

    let merged_keys: HashSet<String> = merged
        .rows
        .iter()
        .map(|row| normalize(cell(row, merged_key)))
        .collect();

    // 描述和重量，同一零件号取第一次出现的
    let mut details: HashMap<String, (&str, &str)> = HashMap::new();
    for row in &standard.rows {
        details
            .entry(normalize(cell(row, std_part)))
            .or_insert((cell(row, std_desc), cell(row, std_weight)));
    }

    let merged_model = merged.column("Model");
    let matricula = merged.column("vcCodeParent");
    let fqty = merged.column("fQty");
    let tipo = merged.column("nidElementTypeParent");

    let mut phase_in: Vec<Vec<String>> = Vec::new();
    for row in &merged.rows {
        if reference_keys.contains(normalize(cell(row, merged_key)).as_str()) {
            continue;
        }
        let Some((description, weight)) = details.get(&normalize(cell(row, merged_part))) else {
            continue;
        };
        if description.trim().is_empty() {
            continue;
        }
        phase_in.push(vec![
            optional_cell(row, merged_model),
            cell(row, merged_part).to_string(),
            description.to_string(),
            optional_cell(row, matricula),
            optional_cell(row, fqty),
            optional_cell(row, tipo),
            weight.to_string(),
        ]);
    }

    let phase_out: Vec<Vec<String>> = reference_rows
        .iter()
        .filter(|(_, _, key)| !merged_keys.contains(key))
        .map(|(part, model, key)| vec![model.clone(), part.clone(), key.clone()])
        .collect();

    let headers = PHASE_IN_COLUMNS
        .iter()
        .chain(SPACER_COLUMNS.iter())
        .chain(PHASE_OUT_COLUMNS.iter())
        .map(|h| h.to_string())
        .collect();
    let mut table = Table::new(headers);

    let height = phase_in.len().max(phase_out.len());
    for i in 0..height {
        let mut row = phase_in
            .get(i)
            .cloned()
            .unwrap_or_else(|| vec![String::new(); PHASE_IN_COLUMNS.len()]);
        row.extend(SPACER_COLUMNS.iter().map(|_| String::new()));
        row.extend(
            phase_out
                .get(i)
                .cloned()
                .unwrap_or_else(|| vec![String::new(); PHASE_OUT_COLUMNS.len()]),
        );
        table.rows.push(row);
    }

    let summary = CompareSummary {
        phase_in: phase_in.len(),
        phase_out: phase_out.len(),
    };
    Ok((table, summary))
}
