//! 测试用的内存门户
//!
//! 模拟生成页面、结果列表、文件列表和活动列表。任何导航、回退、刷新
//! 之后，之前返回的元素句柄全部失效，再使用会得到 `StaleElement`。
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, Instant};

use elab_report_fetch::config::{Config, PortalLayout};
use elab_report_fetch::error::{DriverError, DriverResult};
use elab_report_fetch::infrastructure::{Condition, Element, Locator, OptionChoice, SessionDriver};
use elab_report_fetch::models::WorkItem;

pub const LISTING_URL: &str = "https://portal.test/bom/Elab/ElaborationRequests.aspx?listing=1";
const FORM_URL: &str = "https://portal.test/bom/Elab/elab.aspx";
const ACTIVITIES_URL: &str = "https://portal.test/bom/Functions/AllactivitiesList.aspx";
const WAIT_STEP: Duration = Duration::from_millis(100);
const FIRST_ID: u64 = 412_000_001;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Page {
    Blank,
    Form,
    Listing,
    Files(String),
    Activities,
    ActivityFiles,
}

#[derive(Debug, Clone)]
enum Target {
    Static,
    Message,
    Row(String),
    StatusCell(String),
    FilesLink(String),
}

#[derive(Debug, Clone)]
pub struct Submitted {
    pub id: String,
    pub label: String,
    pub at: Instant,
}

pub struct FakeDriver {
    layout: PortalLayout,
    page: Page,
    history: Vec<Page>,
    generation: u64,
    next_handle: u64,
    handles: HashMap<String, Target>,
    selected: Option<String>,
    procedure: Option<String>,
    message: Option<String>,
    next_id: u64,

    pub submissions: Vec<Submitted>,
    /// 下拉框中存在的选项，为空时任何文本都接受
    pub options: Vec<String>,
    pub confirm_failures: HashSet<String>,
    pub never_ready: HashSet<String>,
    pub ready_after: Duration,
    /// 标签 → 剩余的下载失败次数
    pub download_failures: HashMap<String, usize>,
    pub session_lost_after: Option<usize>,
    pub apply_filter_available: bool,
    /// 表单页打开了但控件一直不出现（登录失效时门户返回的错误页）
    pub form_missing: bool,
    /// 打开表单时门户返回 401
    pub unauthorized: bool,
    /// 这些标签所在行的状态格读取失败
    pub broken_status_cells: HashSet<String>,

    pub form_navigations: usize,
    pub stale_uses: usize,
    pub go_backs: usize,
    pub listing_scans: usize,
    pub apply_filter_clicks: usize,
    pub refreshes: usize,
    pub downloads: usize,
    pub date_param: Option<String>,
    pub closed: bool,
}

impl FakeDriver {
    pub fn new(layout: PortalLayout) -> Self {
        Self {
            layout,
            page: Page::Blank,
            history: Vec::new(),
            generation: 0,
            next_handle: 0,
            handles: HashMap::new(),
            selected: None,
            procedure: None,
            message: None,
            next_id: FIRST_ID,
            submissions: Vec::new(),
            options: Vec::new(),
            confirm_failures: HashSet::new(),
            never_ready: HashSet::new(),
            ready_after: Duration::ZERO,
            download_failures: HashMap::new(),
            session_lost_after: None,
            apply_filter_available: true,
            form_missing: false,
            unauthorized: false,
            broken_status_cells: HashSet::new(),
            form_navigations: 0,
            stale_uses: 0,
            go_backs: 0,
            listing_scans: 0,
            apply_filter_clicks: 0,
            refreshes: 0,
            downloads: 0,
            date_param: None,
            closed: false,
        }
    }

    pub fn fail_confirmation(mut self, label: &str) -> Self {
        self.confirm_failures.insert(label.to_string());
        self
    }

    pub fn never_ready(mut self, label: &str) -> Self {
        self.never_ready.insert(label.to_string());
        self
    }

    pub fn fail_download(mut self, label: &str, times: usize) -> Self {
        self.download_failures.insert(label.to_string(), times);
        self
    }

    pub fn lose_session_after(mut self, submissions: usize) -> Self {
        self.session_lost_after = Some(submissions);
        self
    }

    pub fn break_status_cell(mut self, label: &str) -> Self {
        self.broken_status_cells.insert(label.to_string());
        self
    }

    /// 直接停在结果列表页
    pub fn on_listing(mut self) -> Self {
        self.page = Page::Listing;
        self
    }

    /// 不经过表单，直接登记一个已提交的请求，返回编号
    pub fn seed_submission(&mut self, label: &str) -> String {
        let id = self.allocate_id();
        self.submissions.push(Submitted {
            id: id.clone(),
            label: label.to_string(),
            at: Instant::now(),
        });
        id
    }

    pub fn correlation_ids(&self) -> Vec<String> {
        self.submissions.iter().map(|s| s.id.clone()).collect()
    }

    fn allocate_id(&mut self) -> String {
        let id = self.next_id.to_string();
        self.next_id += 1;
        id
    }

    fn check_session(&self) -> DriverResult<()> {
        match self.session_lost_after {
            Some(n) if self.submissions.len() >= n => {
                Err(DriverError::SessionLost("fake browser closed".to_string()))
            }
            _ => Ok(()),
        }
    }

    fn invalidate(&mut self) {
        self.generation += 1;
        self.handles.clear();
    }

    fn go_to(&mut self, page: Page) {
        let previous = std::mem::replace(&mut self.page, page);
        self.history.push(previous);
        self.invalidate();
    }

    fn element(&mut self, target: Target, text: impl Into<String>) -> Element {
        let handle = format!("g{}-{}", self.generation, self.next_handle);
        self.next_handle += 1;
        self.handles.insert(handle.clone(), target);
        Element::new(handle, text)
    }

    fn target(&mut self, element: &Element) -> DriverResult<Target> {
        match self.handles.get(element.handle()) {
            Some(target) => Ok(target.clone()),
            None => {
                self.stale_uses += 1;
                Err(DriverError::StaleElement(element.handle().to_string()))
            }
        }
    }

    fn submission(&self, id: &str) -> Option<&Submitted> {
        self.submissions.iter().find(|s| s.id == id)
    }

    fn is_ready(&self, id: &str) -> bool {
        self.submission(id)
            .map(|s| !self.never_ready.contains(&s.label) && s.at.elapsed() >= self.ready_after)
            .unwrap_or(false)
    }

    fn row_text(&self, s: &Submitted) -> String {
        let status = if self.is_ready(&s.id) { "Done" } else { "Running" };
        format!("{} {} {}", s.id, s.label, status)
    }

    fn row_id(&self, locator: &Locator) -> Option<String> {
        let Locator::XPath(xpath) = locator else {
            return None;
        };
        let prefix = format!("//table[@id='{}']//tr[contains(., '", self.layout.listing_table);
        xpath
            .strip_prefix(&prefix)?
            .strip_suffix("')]")
            .map(str::to_string)
    }

    fn resolve(&mut self, locator: &Locator) -> Option<Element> {
        let layout = self.layout.clone();
        match self.page.clone() {
            Page::Form if self.form_missing => None,
            Page::Form => {
                if *locator == Locator::id(&layout.model_select)
                    || *locator == Locator::id(&layout.date_field)
                    || *locator == Locator::id(&layout.confirm_button)
                {
                    return Some(self.element(Target::Static, ""));
                }
                if *locator == Locator::id(&layout.message_label) {
                    let message = self.message.clone()?;
                    return Some(self.element(Target::Message, message));
                }
                if *locator == Locator::css(&layout.results_link) && self.message.is_some() {
                    return Some(self.element(Target::Static, "Show results"));
                }
                None
            }
            Page::Listing => {
                if *locator == Locator::id(&layout.listing_table) {
                    return Some(self.element(Target::Static, ""));
                }
                if *locator == Locator::xpath(&layout.apply_filter) && self.apply_filter_available {
                    return Some(self.element(Target::Static, "Apply Filter"));
                }
                let id = self.row_id(locator)?;
                let submission = self.submission(&id)?.clone();
                let text = self.row_text(&submission);
                Some(self.element(Target::Row(id), text))
            }
            Page::Files(_) => {
                if *locator == Locator::id(&layout.download_link) {
                    return Some(self.element(Target::Static, "export.csv"));
                }
                None
            }
            Page::Activities => {
                if *locator == Locator::id(&layout.procedure_select) {
                    return Some(self.element(Target::Static, ""));
                }
                if *locator == Locator::id(&layout.first_activity_files) && self.procedure.is_some() {
                    return Some(self.element(Target::Static, "List files"));
                }
                None
            }
            Page::ActivityFiles => {
                if *locator == Locator::xpath(&layout.standard_download_link) {
                    return Some(self.element(Target::Static, "Download"));
                }
                None
            }
            Page::Blank => None,
        }
    }

    fn confirm(&mut self) {
        let Some(label) = self.selected.clone() else {
            return;
        };
        if self.confirm_failures.contains(&label) {
            // 页面不刷新，消息还是上一次的
            return;
        }
        let id = self.seed_submission(&label);
        self.message = Some(format!(
            "{} - Activity {} created. Show results",
            self.layout.success_text, id
        ));
    }

    fn label_for_download(&self) -> Option<String> {
        match &self.page {
            Page::Files(id) => self.submission(id).map(|s| s.label.clone()),
            Page::ActivityFiles => Some(format!("procedure-{}", self.procedure.clone().unwrap_or_default())),
            _ => None,
        }
    }
}

#[async_trait]
impl SessionDriver for FakeDriver {
    async fn navigate(&mut self, url: &str) -> DriverResult<()> {
        self.check_session()?;
        let page = if url.contains("Allactivities") {
            self.procedure = None;
            Page::Activities
        } else if url.contains("listing") {
            Page::Listing
        } else {
            self.form_navigations += 1;
            if self.unauthorized {
                return Err(DriverError::Unauthorized("HTTP 401".to_string()));
            }
            self.message = None;
            self.selected = None;
            Page::Form
        };
        self.go_to(page);
        Ok(())
    }

    async fn current_url(&mut self) -> DriverResult<String> {
        self.check_session()?;
        let url = match self.page {
            Page::Listing => LISTING_URL,
            Page::Activities | Page::ActivityFiles => ACTIVITIES_URL,
            _ => FORM_URL,
        };
        Ok(url.to_string())
    }

    async fn set_field(&mut self, locator: &Locator, value: &str) -> DriverResult<()> {
        self.check_session()?;
        if self.page == Page::Form && *locator == Locator::id(&self.layout.date_field) {
            self.date_param = Some(value.to_string());
            return Ok(());
        }
        Err(DriverError::ElementNotFound(locator.to_string()))
    }

    async fn select_option(&mut self, locator: &Locator, choice: &OptionChoice) -> DriverResult<()> {
        self.check_session()?;
        match (&self.page, choice) {
            (Page::Form, OptionChoice::Text(label))
                if *locator == Locator::id(&self.layout.model_select) =>
            {
                if !self.options.is_empty() && !self.options.contains(label) {
                    return Err(DriverError::ElementNotFound(format!("option '{}'", label)));
                }
                self.selected = Some(label.clone());
                Ok(())
            }
            (Page::Activities, OptionChoice::Value(value))
                if *locator == Locator::id(&self.layout.procedure_select) =>
            {
                self.procedure = Some(value.clone());
                self.invalidate();
                Ok(())
            }
            _ => Err(DriverError::ElementNotFound(locator.to_string())),
        }
    }

    async fn click(&mut self, locator: &Locator) -> DriverResult<()> {
        self.check_session()?;
        let layout = self.layout.clone();
        match self.page {
            Page::Form if *locator == Locator::id(&layout.confirm_button) => {
                self.confirm();
                self.invalidate();
                Ok(())
            }
            Page::Form
                if *locator == Locator::css(&layout.results_link) && self.message.is_some() =>
            {
                self.go_to(Page::Listing);
                Ok(())
            }
            Page::Listing
                if *locator == Locator::xpath(&layout.apply_filter) && self.apply_filter_available =>
            {
                self.apply_filter_clicks += 1;
                self.invalidate();
                Ok(())
            }
            Page::Activities
                if *locator == Locator::id(&layout.first_activity_files) && self.procedure.is_some() =>
            {
                self.go_to(Page::ActivityFiles);
                Ok(())
            }
            _ => Err(DriverError::ElementNotFound(locator.to_string())),
        }
    }

    async fn wait_for(&mut self, condition: &Condition, timeout: Duration) -> DriverResult<Element> {
        let deadline = Instant::now() + timeout;
        loop {
            self.check_session()?;
            let found = match condition {
                Condition::Present(l) | Condition::Clickable(l) => self.resolve(l),
                Condition::TextContains(l, text) => {
                    self.resolve(l).filter(|e| e.text().contains(text.as_str()))
                }
            };
            if let Some(element) = found {
                return Ok(element);
            }
            if Instant::now() >= deadline {
                return Err(DriverError::timeout(condition.to_string(), timeout));
            }
            sleep(WAIT_STEP).await;
        }
    }

    async fn find_all(&mut self, locator: &Locator) -> DriverResult<Vec<Element>> {
        self.check_session()?;
        if self.page != Page::Listing || *locator != Locator::xpath(&self.layout.listing_rows) {
            return Ok(self.resolve(locator).into_iter().collect());
        }
        self.listing_scans += 1;
        // 门户按时间倒序显示
        let rows: Vec<(String, String)> = self
            .submissions
            .iter()
            .rev()
            .map(|s| (s.id.clone(), self.row_text(s)))
            .collect();
        Ok(rows
            .into_iter()
            .map(|(id, text)| self.element(Target::Row(id), text))
            .collect())
    }

    async fn find_within(&mut self, parent: &Element, locator: &Locator) -> DriverResult<Element> {
        self.check_session()?;
        let layout = self.layout.clone();
        match self.target(parent)? {
            Target::Row(id) if *locator == Locator::xpath(&layout.status_cell) => {
                let broken = self
                    .submission(&id)
                    .map(|s| self.broken_status_cells.contains(&s.label))
                    .unwrap_or(false);
                if broken {
                    return Err(DriverError::ElementNotFound(locator.to_string()));
                }
                Ok(self.element(Target::StatusCell(id), ""))
            }
            Target::Row(id) if *locator == Locator::xpath(&layout.list_files_link) => {
                Ok(self.element(Target::FilesLink(id), "List files"))
            }
            _ => Err(DriverError::ElementNotFound(locator.to_string())),
        }
    }

    async fn attribute(&mut self, element: &Element, name: &str) -> DriverResult<Option<String>> {
        self.check_session()?;
        match self.target(element)? {
            Target::StatusCell(id) if name == "style" => {
                let style = if self.is_ready(&id) {
                    "background-color: LightGreen;"
                } else {
                    "background-color: Gold;"
                };
                Ok(Some(style.to_string()))
            }
            _ => Ok(None),
        }
    }

    async fn click_element(&mut self, element: &Element) -> DriverResult<()> {
        self.check_session()?;
        match self.target(element)? {
            Target::FilesLink(id) => {
                self.go_to(Page::Files(id));
                Ok(())
            }
            _ => Err(DriverError::ElementNotFound(element.handle().to_string())),
        }
    }

    async fn current_text(&mut self, locator: &Locator) -> DriverResult<String> {
        self.check_session()?;
        self.resolve(locator)
            .map(|e| e.text().to_string())
            .ok_or_else(|| DriverError::ElementNotFound(locator.to_string()))
    }

    async fn go_back(&mut self) -> DriverResult<()> {
        self.check_session()?;
        self.go_backs += 1;
        self.page = self.history.pop().unwrap_or(Page::Blank);
        self.invalidate();
        Ok(())
    }

    async fn refresh(&mut self) -> DriverResult<()> {
        self.check_session()?;
        self.refreshes += 1;
        self.invalidate();
        Ok(())
    }

    async fn download(
        &mut self,
        trigger: &Locator,
        destination: &Path,
        timeout: Duration,
    ) -> DriverResult<Option<PathBuf>> {
        self.check_session()?;
        if self.resolve(trigger).is_none() {
            return Err(DriverError::ElementNotFound(trigger.to_string()));
        }
        let label = self.label_for_download().unwrap_or_default();

        if let Some(remaining) = self.download_failures.get_mut(&label) {
            if *remaining > 0 {
                *remaining -= 1;
                sleep(timeout).await;
                return Ok(None);
            }
        }

        self.downloads += 1;
        let path = destination.join("export.csv");
        tokio::fs::write(&path, utf16_csv(&format!("Part,Qty,Label\nP-{},1,{}\n", self.downloads, label)))
            .await
            .map_err(|e| DriverError::io(&path, e))?;
        Ok(Some(path))
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.closed = true;
        Ok(())
    }
}

/// 门户导出格式：带 BOM 的 UTF-16LE
pub fn utf16_csv(text: &str) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xFE];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    bytes
}

/// 测试用配置：目录放在临时目录下，等待时间缩短
pub fn test_config(root: &Path) -> Config {
    Config {
        reports_dir: root.join("Reports"),
        wait_timeout: Duration::from_secs(10),
        poll_max_wait: Duration::from_secs(60),
        poll_interval: Duration::from_secs(5),
        download_timeout: Duration::from_secs(30),
        submit_pause: Duration::from_millis(100),
        ..Config::default()
    }
}

pub fn work_items(n: usize) -> Vec<WorkItem> {
    (1..=n)
        .map(|i| WorkItem::new(format!("model_{}", i), format!("{}{} MODEL {}", 300, i, i)))
        .collect()
}
