//! Excel 读写
//!
//! 最终产物和 PFEP 参考表都是 `.xlsx`；门户导出的中间文件仍是 CSV。
//! [`load_table_at`] / [`save_table`] 按扩展名选择格式。

use std::io::Cursor;
use std::path::Path;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use rust_xlsxwriter::{Format, Workbook};
use tokio::fs;

use crate::error::PipelineError;
use crate::processing::csv_io::{read_table_at, write_table, Table};

/// 是否按 Excel 处理
pub fn is_workbook(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            ext == "xlsx" || ext == "xlsm" || ext == "xls"
        })
        .unwrap_or(false)
}

/// 读取表格，表头在第 `header_row` 行（从 0 开始）
pub async fn load_table_at(path: &Path, header_row: usize) -> Result<Table, PipelineError> {
    if is_workbook(path) {
        read_xlsx_at(path, header_row).await
    } else {
        read_table_at(path, header_row).await
    }
}

pub async fn load_table(path: &Path) -> Result<Table, PipelineError> {
    load_table_at(path, 0).await
}

/// 写出表格，已存在时覆盖
pub async fn save_table(path: &Path, table: &Table) -> Result<(), PipelineError> {
    if is_workbook(path) {
        write_xlsx(path, table).await
    } else {
        write_table(path, table).await
    }
}

pub async fn read_xlsx_at(path: &Path, header_row: usize) -> Result<Table, PipelineError> {
    let bytes = fs::read(path).await.map_err(|e| PipelineError::io(path, e))?;
    parse_xlsx_at(bytes, header_row, path)
}

/// 解析第一个工作表
pub fn parse_xlsx_at(bytes: Vec<u8>, header_row: usize, path: &Path) -> Result<Table, PipelineError> {
    let mut workbook =
        open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(|e| PipelineError::xlsx(path, e))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| PipelineError::xlsx(path, "没有工作表"))?
        .map_err(|e| PipelineError::xlsx(path, e))?;

    let mut table = Table {
        source: path.to_path_buf(),
        ..Default::default()
    };

    // Range 从第一个非空单元格开始，表头行号按工作表的绝对行号算
    let (first_row, first_col) = range.start().unwrap_or((0, 0));
    let skip = header_row.saturating_sub(first_row as usize);
    let lead = vec![String::new(); first_col as usize];

    let mut rows = range.rows().skip(skip);
    let Some(header) = rows.next() else {
        return Ok(table);
    };
    table.headers = lead.iter().cloned().chain(header.iter().map(cell_text)).collect();
    for row in rows {
        let values: Vec<String> = lead.iter().cloned().chain(row.iter().map(cell_text)).collect();
        if values.iter().all(|v| v.is_empty()) {
            continue;
        }
        table.rows.push(values);
    }

    let width = table.headers.len();
    for row in &mut table.rows {
        row.resize(width.max(row.len()), String::new());
    }
    Ok(table)
}

fn cell_text(value: &Data) -> String {
    match value {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(n) => n.to_string(),
        Data::Float(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 => {
            format!("{}", *f as i64)
        }
        other => other.to_string(),
    }
}

/// 数字列写成数字，带前导零或其它文本的保持原样
fn numeric_value(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed != value || trimmed.starts_with('+') {
        return None;
    }
    let digits = trimmed.trim_start_matches('-');
    if digits.len() > 1 && digits.starts_with('0') && !digits.starts_with("0.") {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

pub fn render_xlsx(table: &Table, path: &Path) -> Result<Vec<u8>, PipelineError> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();
    let sheet = workbook.add_worksheet();

    for (col, header) in table.headers.iter().enumerate() {
        let col = column_index(col, path)?;
        sheet
            .write_string_with_format(0, col, header, &header_format)
            .map_err(|e| PipelineError::xlsx(path, e))?;
    }
    for (idx, row) in table.rows.iter().enumerate() {
        let row_num = u32::try_from(idx + 1)
            .map_err(|_| PipelineError::xlsx(path, "行数超过 Excel 上限"))?;
        for (col, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            let col = column_index(col, path)?;
            let written = match numeric_value(value) {
                Some(n) => sheet.write_number(row_num, col, n).map(|_| ()),
                None => sheet.write_string(row_num, col, value).map(|_| ()),
            };
            written.map_err(|e| PipelineError::xlsx(path, e))?;
        }
    }

    workbook
        .save_to_buffer()
        .map_err(|e| PipelineError::xlsx(path, e))
}

fn column_index(col: usize, path: &Path) -> Result<u16, PipelineError> {
    u16::try_from(col).map_err(|_| PipelineError::xlsx(path, "列数超过 Excel 上限"))
}

pub async fn write_xlsx(path: &Path, table: &Table) -> Result<(), PipelineError> {
    let bytes = render_xlsx(table, path)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| PipelineError::io(parent, e))?;
    }
    fs::write(path, bytes)
        .await
        .map_err(|e| PipelineError::io(path, e))
}
