//! JS 执行器 - 基础设施层
//!
//! 持有唯一的 page，定位元素、读取状态都通过页面脚本完成

use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::{DriverError, DriverResult};
use crate::utils::logging::truncate_text;

/// 页面脚本执行器，不认识车型和报表
pub struct JsExecutor {
    page: Page,
}

impl JsExecutor {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 导航 / 刷新 / 读地址等非脚本操作直接用 page
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 执行脚本，返回 JSON；脚本没有返回值时为 `Null`
    pub async fn eval(&self, script: impl Into<String>) -> DriverResult<JsonValue> {
        let script = script.into();
        let result = self.page.evaluate(script.as_str()).await.map_err(|e| {
            debug!("脚本执行失败: {}", truncate_text(&script, 200));
            DriverError::from(e)
        })?;
        Ok(result.value().cloned().unwrap_or(JsonValue::Null))
    }

    /// 执行脚本并按约定的结构解析返回值
    pub async fn eval_as<T: DeserializeOwned>(&self, script: impl Into<String>) -> DriverResult<T> {
        let value = self.eval(script).await?;
        serde_json::from_value(value.clone()).map_err(|e| {
            DriverError::Script(format!(
                "返回值无法解析 ({}): {}",
                e,
                truncate_text(&value.to_string(), 120)
            ))
        })
    }
}
