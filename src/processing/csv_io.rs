//! 表格读写
//!
//! 门户导出的 CSV 是带 BOM 的 UTF-16，输出统一写成带 BOM 的 UTF-8，
//! 表格软件可以直接打开。

use std::path::{Path, PathBuf};

use encoding_rs::{Encoding, UTF_16LE, UTF_8};
use tokio::fs;

use crate::error::PipelineError;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// 内存中的表格，所有单元格都按文本处理
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// 来源文件，用于错误信息
    pub source: PathBuf,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// 必需的列，不存在时报错
    pub fn require(&self, name: &str) -> Result<usize, PipelineError> {
        self.column(name).ok_or_else(|| PipelineError::MissingColumn {
            path: self.source.clone(),
            column: name.to_string(),
        })
    }

    /// 重命名列，返回是否找到
    pub fn rename(&mut self, from: &str, to: &str) -> bool {
        match self.column(from) {
            Some(idx) => {
                self.headers[idx] = to.to_string();
                true
            }
            None => false,
        }
    }

    /// 在末尾追加一列，每行的值由闭包给出
    pub fn push_column(&mut self, name: &str, mut value: impl FnMut(&[String]) -> String) {
        self.headers.push(name.to_string());
        for row in &mut self.rows {
            let v = value(row);
            row.push(v);
        }
    }
}

/// 取单元格，越界时返回空串
pub fn cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map(String::as_str).unwrap_or("")
}

/// 按 BOM 识别编码并解码
///
/// 没有 BOM 时，第二个字节为 0 视为 UTF-16LE，否则按 UTF-8
pub fn decode(bytes: &[u8], path: &Path) -> Result<String, PipelineError> {
    let (encoding, bom_len): (&'static Encoding, usize) = match Encoding::for_bom(bytes) {
        Some(found) => found,
        None if bytes.len() >= 2 && bytes[1] == 0 => (UTF_16LE, 0),
        None => (UTF_8, 0),
    };
    encoding
        .decode_without_bom_handling_and_without_replacement(&bytes[bom_len..])
        .map(|text| text.into_owned())
        .ok_or_else(|| PipelineError::Encoding(path.to_path_buf()))
}

/// 解析 CSV 文本，表头在第 `header_row` 行（从 0 开始）
pub fn parse_table_at(text: &str, header_row: usize, path: &Path) -> Result<Table, PipelineError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut table = Table {
        source: path.to_path_buf(),
        ..Default::default()
    };
    let mut header_seen = false;

    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(|e| PipelineError::csv(path, e))?;
        if idx < header_row {
            continue;
        }
        let values: Vec<String> = record.iter().map(|v| v.to_string()).collect();
        if !header_seen {
            table.headers = values;
            header_seen = true;
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

pub fn parse_table(text: &str, path: &Path) -> Result<Table, PipelineError> {
    parse_table_at(text, 0, path)
}

/// 读取 CSV 文件
pub async fn read_table(path: &Path) -> Result<Table, PipelineError> {
    read_table_at(path, 0).await
}

pub async fn read_table_at(path: &Path, header_row: usize) -> Result<Table, PipelineError> {
    let bytes = fs::read(path).await.map_err(|e| PipelineError::io(path, e))?;
    let text = decode(&bytes, path)?;
    parse_table_at(&text, header_row, path)
}

/// 渲染为带 BOM 的 UTF-8 CSV
pub fn render_table(table: &Table, path: &Path) -> Result<Vec<u8>, PipelineError> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(UTF8_BOM.to_vec());
    writer
        .write_record(&table.headers)
        .map_err(|e| PipelineError::csv(path, e))?;
    for row in &table.rows {
        writer
            .write_record(row)
            .map_err(|e| PipelineError::csv(path, e))?;
    }
    writer
        .into_inner()
        .map_err(|e| PipelineError::io(path, e.into_error()))
}

/// 写出 CSV 文件，已存在时覆盖
pub async fn write_table(path: &Path, table: &Table) -> Result<(), PipelineError> {
    let bytes = render_table(table, path)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| PipelineError::io(parent, e))?;
    }
    fs::write(path, bytes)
        .await
        .map_err(|e| PipelineError::io(path, e))
}
