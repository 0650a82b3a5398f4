//! 基于 chromiumoxide 的会话驱动
//!
//! 元素定位全部在页面里用 JS 完成。取得的元素会被打上
//! `data-elab-handle` 标记，句柄里带有"页面代数"，
//! 每次导航 / 点击 / 刷新后代数加一，旧句柄随即失效。

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::Browser;
use serde::Deserialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::browser::redact_url;
use crate::error::{DriverError, DriverResult};
use crate::infrastructure::driver::{Condition, Element, Locator, OptionChoice, SessionDriver};
use crate::infrastructure::js_executor::JsExecutor;
use crate::infrastructure::staging;

/// 条件检查的间隔
const LOOKUP_INTERVAL: Duration = Duration::from_millis(250);

/// 每段脚本都带上的辅助函数
const PRELUDE: &str = r#"
const __resolve = (loc, ctx) => {
    const root = ctx || document;
    if (loc.kind === 'id') {
        const el = document.getElementById(loc.value);
        return el && (!ctx || ctx.contains(el)) ? [el] : [];
    }
    if (loc.kind === 'css') {
        return Array.from(root.querySelectorAll(loc.value));
    }
    const snap = document.evaluate(loc.value, root, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
    const out = [];
    for (let i = 0; i < snap.snapshotLength; i++) out.push(snap.snapshotItem(i));
    return out;
};
const __byHandle = (h) => document.querySelector('[data-elab-handle="' + h + '"]');
const __clickable = (el) => !!el && !el.disabled && el.getClientRects().length > 0;
const __text = (el) => ((el.innerText !== undefined ? el.innerText : el.textContent) || '').trim();
"#;

/// 脚本返回值
#[derive(Debug, Default, Deserialize)]
struct Lookup {
    #[serde(default)]
    found: bool,
    #[serde(default)]
    stale: bool,
    text: Option<String>,
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FoundElement {
    handle: String,
    text: String,
}

/// Chrome 会话驱动
pub struct ChromeDriver {
    browser: Browser,
    executor: JsExecutor,
    handler: JoinHandle<()>,
    navigation_timeout: Duration,
    generation: u64,
    next_handle: u64,
    closed: bool,
}

impl ChromeDriver {
    pub fn new(
        browser: Browser,
        executor: JsExecutor,
        handler: JoinHandle<()>,
        navigation_timeout: Duration,
    ) -> Self {
        Self {
            browser,
            executor,
            handler,
            navigation_timeout,
            generation: 0,
            next_handle: 0,
            closed: false,
        }
    }

    fn allocate_handle(&mut self) -> String {
        self.next_handle += 1;
        format!("g{}-{}", self.generation, self.next_handle)
    }

    /// 页面发生变化，之前的句柄全部作废
    fn invalidate_handles(&mut self) {
        self.generation += 1;
    }

    fn ensure_current(&self, element: &Element) -> DriverResult<()> {
        let current = format!("g{}-", self.generation);
        if element.handle().starts_with(&current) {
            Ok(())
        } else {
            Err(DriverError::StaleElement(element.handle().to_string()))
        }
    }

    fn script(body: &str) -> String {
        format!("(() => {{ {} {} }})()", PRELUDE, body)
    }

    fn locator_json(locator: &Locator) -> String {
        let value = match locator {
            Locator::Id(v) => json!({ "kind": "id", "value": v }),
            Locator::Css(v) => json!({ "kind": "css", "value": v }),
            Locator::XPath(v) => json!({ "kind": "xpath", "value": v }),
        };
        value.to_string()
    }

    async fn lookup(&self, body: String) -> DriverResult<Lookup> {
        self.executor.eval_as::<Lookup>(Self::script(&body)).await
    }

    /// 当前文档的 HTTP 状态码；浏览器不提供时为 `None`
    async fn response_status(&self) -> Option<u16> {
        let script = "(() => { const nav = performance.getEntriesByType('navigation')[0]; \
                      return nav && nav.responseStatus ? nav.responseStatus : null; })()";
        match self.executor.eval_as::<Option<u16>>(script).await {
            Ok(status) => status,
            Err(e) => {
                debug!("读取 HTTP 状态失败: {}", e);
                None
            }
        }
    }

    async fn await_navigation(&self, what: &str) -> DriverResult<()> {
        match timeout(self.navigation_timeout, self.executor.page().wait_for_navigation()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(DriverError::timeout(what, self.navigation_timeout)),
        }
    }

    fn lookup_body(condition: &Condition, handle: &str) -> String {
        let (mode, expected) = match condition {
            Condition::Present(_) => ("present", String::new()),
            Condition::Clickable(_) => ("clickable", String::new()),
            Condition::TextContains(_, text) => ("text", text.clone()),
        };
        format!(
            r#"
            const el = __resolve({loc}, null)[0];
            if (!el) return {{ found: false }};
            if ({mode} === 'clickable' && !__clickable(el)) return {{ found: false }};
            const text = __text(el);
            if ({mode} === 'text' && !text.includes({expected})) return {{ found: false }};
            el.setAttribute('data-elab-handle', {handle});
            return {{ found: true, text }};
            "#,
            loc = Self::locator_json(condition.locator()),
            mode = json!(mode),
            expected = json!(expected),
            handle = json!(handle),
        )
    }
}

#[async_trait]
impl SessionDriver for ChromeDriver {
    async fn navigate(&mut self, url: &str) -> DriverResult<()> {
        debug!("导航到: {}", redact_url(url));
        self.invalidate_handles();
        self.executor.page().goto(url).await.map_err(|e| {
            let err = DriverError::from(e);
            if err.is_fatal() {
                err
            } else {
                DriverError::Navigation {
                    url: redact_url(url),
                    reason: err.to_string(),
                }
            }
        })?;
        match self.response_status().await {
            Some(status @ (401 | 403)) => {
                warn!("⛔ 门户返回 HTTP {}: {}", status, redact_url(url));
                Err(DriverError::Unauthorized(format!("HTTP {}", status)))
            }
            _ => Ok(()),
        }
    }

    async fn current_url(&mut self) -> DriverResult<String> {
        Ok(self.executor.page().url().await?.unwrap_or_default())
    }

    async fn set_field(&mut self, locator: &Locator, value: &str) -> DriverResult<()> {
        let body = format!(
            r#"
            const el = __resolve({loc}, null)[0];
            if (!el) return {{ found: false }};
            el.value = {value};
            return {{ found: true }};
            "#,
            loc = Self::locator_json(locator),
            value = json!(value),
        );
        match self.lookup(body).await? {
            p if p.found => Ok(()),
            _ => Err(DriverError::ElementNotFound(locator.to_string())),
        }
    }

    async fn select_option(&mut self, locator: &Locator, choice: &OptionChoice) -> DriverResult<()> {
        let (by_text, wanted) = match choice {
            OptionChoice::Text(t) => (true, t.as_str()),
            OptionChoice::Value(v) => (false, v.as_str()),
        };
        let body = format!(
            r#"
            const sel = __resolve({loc}, null)[0];
            if (!sel) return {{ found: false }};
            const opt = Array.from(sel.options || []).find(o =>
                {by_text} ? o.text.trim() === {wanted} : o.value === {wanted});
            if (!opt) return {{ found: false, value: 'option' }};
            sel.value = opt.value;
            sel.dispatchEvent(new Event('change', {{ bubbles: true }}));
            return {{ found: true }};
            "#,
            loc = Self::locator_json(locator),
            by_text = by_text,
            wanted = json!(wanted),
        );
        let lookup = self.lookup(body).await?;
        if lookup.found {
            return Ok(());
        }
        if lookup.value.as_deref() == Some("option") {
            Err(DriverError::ElementNotFound(format!("{} 中的选项 '{}'", locator, wanted)))
        } else {
            Err(DriverError::ElementNotFound(locator.to_string()))
        }
    }

    async fn click(&mut self, locator: &Locator) -> DriverResult<()> {
        let body = format!(
            r#"
            const el = __resolve({loc}, null)[0];
            if (!el) return {{ found: false }};
            el.scrollIntoView({{ block: 'center' }});
            el.click();
            return {{ found: true }};
            "#,
            loc = Self::locator_json(locator),
        );
        let lookup = self.lookup(body).await?;
        self.invalidate_handles();
        if lookup.found {
            Ok(())
        } else {
            Err(DriverError::ElementNotFound(locator.to_string()))
        }
    }

    async fn wait_for(&mut self, condition: &Condition, wait: Duration) -> DriverResult<Element> {
        let deadline = Instant::now() + wait;
        loop {
            let handle = self.allocate_handle();
            match self.lookup(Self::lookup_body(condition, &handle)).await {
                Ok(p) if p.found => return Ok(Element::new(handle, p.text.unwrap_or_default())),
                Ok(_) => {}
                Err(e) if e.is_fatal() => return Err(e),
                // 页面跳转过程中执行上下文会被销毁，继续等
                Err(e) => debug!("检查条件 {} 时出错: {}", condition, e),
            }
            if Instant::now() >= deadline {
                return Err(DriverError::timeout(condition.to_string(), wait));
            }
            sleep(LOOKUP_INTERVAL).await;
        }
    }

    async fn find_all(&mut self, locator: &Locator) -> DriverResult<Vec<Element>> {
        let prefix = self.allocate_handle();
        let script = Self::script(&format!(
            r#"
            return __resolve({loc}, null).map((el, i) => {{
                const handle = {prefix} + '.' + i;
                el.setAttribute('data-elab-handle', handle);
                return {{ handle, text: __text(el) }};
            }});
            "#,
            loc = Self::locator_json(locator),
            prefix = json!(prefix),
        ));
        let found: Vec<FoundElement> = self.executor.eval_as(script).await?;
        Ok(found
            .into_iter()
            .map(|f| Element::new(f.handle, f.text))
            .collect())
    }

    async fn find_within(&mut self, parent: &Element, locator: &Locator) -> DriverResult<Element> {
        self.ensure_current(parent)?;
        let handle = self.allocate_handle();
        let body = format!(
            r#"
            const parent = __byHandle({parent});
            if (!parent) return {{ stale: true }};
            const el = __resolve({loc}, parent)[0];
            if (!el) return {{ found: false }};
            el.setAttribute('data-elab-handle', {handle});
            return {{ found: true, text: __text(el) }};
            "#,
            parent = json!(parent.handle()),
            loc = Self::locator_json(locator),
            handle = json!(handle),
        );
        let lookup = self.lookup(body).await?;
        if lookup.stale {
            return Err(DriverError::StaleElement(parent.handle().to_string()));
        }
        if !lookup.found {
            return Err(DriverError::ElementNotFound(locator.to_string()));
        }
        Ok(Element::new(handle, lookup.text.unwrap_or_default()))
    }

    async fn attribute(&mut self, element: &Element, name: &str) -> DriverResult<Option<String>> {
        self.ensure_current(element)?;
        let body = format!(
            r#"
            const el = __byHandle({handle});
            if (!el) return {{ stale: true }};
            return {{ found: true, value: el.getAttribute({name}) }};
            "#,
            handle = json!(element.handle()),
            name = json!(name),
        );
        let lookup = self.lookup(body).await?;
        if lookup.stale {
            return Err(DriverError::StaleElement(element.handle().to_string()));
        }
        Ok(lookup.value)
    }

    async fn click_element(&mut self, element: &Element) -> DriverResult<()> {
        self.ensure_current(element)?;
        let body = format!(
            r#"
            const el = __byHandle({handle});
            if (!el) return {{ stale: true }};
            el.scrollIntoView({{ block: 'center' }});
            el.click();
            return {{ found: true }};
            "#,
            handle = json!(element.handle()),
        );
        let lookup = self.lookup(body).await?;
        self.invalidate_handles();
        if lookup.stale {
            Err(DriverError::StaleElement(element.handle().to_string()))
        } else {
            Ok(())
        }
    }

    async fn current_text(&mut self, locator: &Locator) -> DriverResult<String> {
        let body = format!(
            r#"
            const el = __resolve({loc}, null)[0];
            if (!el) return {{ found: false }};
            return {{ found: true, text: __text(el) }};
            "#,
            loc = Self::locator_json(locator),
        );
        match self.lookup(body).await? {
            p if p.found => Ok(p.text.unwrap_or_default()),
            _ => Err(DriverError::ElementNotFound(locator.to_string())),
        }
    }

    async fn go_back(&mut self) -> DriverResult<()> {
        self.invalidate_handles();
        self.executor
            .eval("(() => { history.back(); return true; })()")
            .await?;
        self.await_navigation("后退").await
    }

    async fn refresh(&mut self) -> DriverResult<()> {
        self.invalidate_handles();
        self.executor.page().reload().await?;
        Ok(())
    }

    async fn download(
        &mut self,
        trigger: &Locator,
        destination: &Path,
        wait: Duration,
    ) -> DriverResult<Option<PathBuf>> {
        let absolute = tokio::fs::canonicalize(destination)
            .await
            .map_err(|e| DriverError::io(destination, e))?;
        let params = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(absolute.to_string_lossy().to_string())
            .build()
            .map_err(DriverError::Script)?;
        self.browser.execute(params).await?;

        self.click(trigger).await?;
        staging::wait_for_completed_file(destination, wait)
            .await
            .map_err(|e| DriverError::io(destination, e))
    }

    async fn close(&mut self) -> DriverResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        info!("正在关闭浏览器...");
        let result = self.browser.close().await;
        if let Err(e) = self.browser.wait().await {
            warn!("等待浏览器进程退出失败: {}", e);
        }
        self.handler.abort();
        result.map(|_| ()).map_err(DriverError::from)
    }
}
