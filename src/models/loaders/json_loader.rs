use std::path::Path;

use serde_json::Value as JsonValue;
use tokio::fs;

use crate::error::ConfigError;
use crate::models::credentials::Credentials;
use crate::models::work_item::WorkItem;

/// 从 JSON 文件加载车型列表
///
/// 文件必须是 `{ "key": "下拉框文本", ... }` 形式的对象，
/// 顺序与文件中出现的顺序一致。
pub async fn load_work_items(path: &Path) -> Result<Vec<WorkItem>, ConfigError> {
    let content = read_file(path).await?;
    let items = parse_work_items(&content).map_err(|reason| ConfigError::MalformedModels {
        path: path.to_path_buf(),
        reason,
    })?;

    tracing::info!(
        "成功加载 {} 个车型: {}",
        items.len(),
        path.file_name().unwrap_or_default().to_string_lossy()
    );
    Ok(items)
}

/// 解析车型列表，错误时返回原因
pub fn parse_work_items(content: &str) -> Result<Vec<WorkItem>, String> {
    let value: JsonValue = serde_json::from_str(content).map_err(|e| e.to_string())?;
    let object = value
        .as_object()
        .ok_or_else(|| "顶层必须是 JSON 对象".to_string())?;

    object
        .iter()
        .map(|(key, label)| match label.as_str() {
            Some(label) => Ok(WorkItem::new(key.clone(), label)),
            None => Err(format!("车型 {} 的值不是字符串: {}", key, label)),
        })
        .collect()
}

/// 从 JSON 文件加载账号
pub async fn load_credentials(path: &Path) -> Result<Credentials, ConfigError> {
    let content = read_file(path).await?;
    serde_json::from_str(&content).map_err(|e| ConfigError::MalformedCredentials {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

async fn read_file(path: &Path) -> Result<String, ConfigError> {
    if !fs::try_exists(path).await.unwrap_or(false) {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })
}
