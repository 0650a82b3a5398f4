//! 会话驱动能力接口 - 基础设施层
//!
//! 上层流程只通过 [`SessionDriver`] 操作门户页面，
//! 真实浏览器与测试用的内存实现都实现这个 trait。

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::DriverResult;

/// 元素定位方式
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    Id(String),
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn id(value: impl Into<String>) -> Self {
        Locator::Id(value.into())
    }

    pub fn css(value: impl Into<String>) -> Self {
        Locator::Css(value.into())
    }

    pub fn xpath(value: impl Into<String>) -> Self {
        Locator::XPath(value.into())
    }

    /// 结果列表中包含指定文本的行
    pub fn row_containing(table_id: &str, text: &str) -> Self {
        Locator::XPath(format!(
            "//table[@id='{}']//tr[contains(., '{}')]",
            table_id, text
        ))
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Id(v) => write!(f, "#{}", v),
            Locator::Css(v) => write!(f, "css={}", v),
            Locator::XPath(v) => write!(f, "xpath={}", v),
        }
    }
}

/// 等待条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// 元素存在
    Present(Locator),
    /// 元素可见且可点击
    Clickable(Locator),
    /// 元素文本包含指定内容
    TextContains(Locator, String),
}

impl Condition {
    pub fn locator(&self) -> &Locator {
        match self {
            Condition::Present(l) | Condition::Clickable(l) | Condition::TextContains(l, _) => l,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Present(l) => write!(f, "存在 {}", l),
            Condition::Clickable(l) => write!(f, "可点击 {}", l),
            Condition::TextContains(l, text) => write!(f, "{} 包含 '{}'", l, text),
        }
    }
}

/// 下拉框选项的选择方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionChoice {
    /// 按显示文本
    Text(String),
    /// 按 value 属性
    Value(String),
}

/// 元素句柄
///
/// 只在取得它的那个页面上有效，任何导航之后再使用都会得到
/// [`DriverError::StaleElement`](crate::error::DriverError::StaleElement)。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    handle: String,
    text: String,
}

impl Element {
    pub fn new(handle: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            text: text.into(),
        }
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// 取得句柄时元素的文本
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// 浏览器会话能力
///
/// 所有等待类操作超时都返回 `DriverError::Timeout`，驱动本身不做重试。
/// `download` 超时返回 `Ok(None)`，和会话出错区分开。
#[async_trait]
pub trait SessionDriver: Send {
    async fn navigate(&mut self, url: &str) -> DriverResult<()>;

    async fn current_url(&mut self) -> DriverResult<String>;

    async fn set_field(&mut self, locator: &Locator, value: &str) -> DriverResult<()>;

    async fn select_option(&mut self, locator: &Locator, choice: &OptionChoice) -> DriverResult<()>;

    async fn click(&mut self, locator: &Locator) -> DriverResult<()>;

    async fn wait_for(&mut self, condition: &Condition, timeout: Duration) -> DriverResult<Element>;

    /// 当前页面上所有匹配的元素（可能为空）
    async fn find_all(&mut self, locator: &Locator) -> DriverResult<Vec<Element>>;

    /// 在某个元素内部查找（相对 XPath / CSS）
    async fn find_within(&mut self, parent: &Element, locator: &Locator) -> DriverResult<Element>;

    async fn attribute(&mut self, element: &Element, name: &str) -> DriverResult<Option<String>>;

    async fn click_element(&mut self, element: &Element) -> DriverResult<()>;

    async fn current_text(&mut self, locator: &Locator) -> DriverResult<String>;

    async fn go_back(&mut self) -> DriverResult<()>;

    async fn refresh(&mut self) -> DriverResult<()>;

    /// 点击触发下载，等待文件落到 `destination`
    async fn download(
        &mut self,
        trigger: &Locator,
        destination: &Path,
        timeout: Duration,
    ) -> DriverResult<Option<PathBuf>>;

    async fn close(&mut self) -> DriverResult<()>;

    /// 等待元素可点击后点击
    async fn click_when_ready(&mut self, locator: &Locator, timeout: Duration) -> DriverResult<()> {
        self.wait_for(&Condition::Clickable(locator.clone()), timeout)
            .await?;
        self.click(locator).await
    }
}
