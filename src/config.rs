//! 程序配置
//!
//! 优先级：环境变量 > TOML 配置文件 > 默认值。
//! 配置在启动时构建一次，之后以引用的形式传给各个 worker。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// 报表种类
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    /// 按车型分批生成、轮询、下载（61 / 29）
    Elaboration,
    /// 直接从活动列表下载单个文件（32）
    Standard,
}

/// 合并阶段的处理方式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeProfile {
    /// 只拼接并加上来源车型列
    Plain,
    /// 过滤 + PartNumber / chave 列（61）
    PartList,
    /// 单文件报表，修正 PartNumber 列（32）
    ElementNode,
}

/// 单个报表类别
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ReportCategory {
    /// 门户中的报表编号
    pub id: String,
    /// 显示名称，同时作为单文件报表的文件名
    pub name: String,
    pub kind: ReportKind,
    /// 门户上的页面路径（不含协议和账号）
    pub url_path: String,
    /// 产物子目录（相对 reports_dir）
    pub artifact_subdir: String,
    pub merge: MergeProfile,
}

impl ReportCategory {
    /// worker 名称，用于日志
    pub fn worker_name(&self) -> String {
        format!("Report-{}", self.id)
    }
}

/// 门户页面结构
///
/// 元素 id / XPath 都集中在这里，代码里不写死页面结构
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PortalLayout {
    pub model_select: String,
    pub date_field: String,
    pub confirm_button: String,
    pub message_label: String,
    pub success_text: String,
    pub results_link: String,
    pub listing_table: String,
    pub listing_rows: String,
    pub status_cell: String,
    pub pending_marker: String,
    pub apply_filter: String,
    pub list_files_link: String,
    pub download_link: String,
    pub procedure_select: String,
    pub first_activity_files: String,
    pub standard_download_link: String,
}

impl Default for PortalLayout {
    fn default() -> Self {
        Self {
            model_select: "MainContent_ddlModel".to_string(),
            date_field: "MainContent_txtDateFilter2_txtDate".to_string(),
            confirm_button: "MainContent_cmdConfirm".to_string(),
            message_label: "MainContent_lblMessage".to_string(),
            success_text: "Elaboration correctly executed".to_string(),
            results_link: "#MainContent_lblMessage > a.actlink".to_string(),
            listing_table: "dgElaborationRequests".to_string(),
            listing_rows: "//table[@id='dgElaborationRequests']//tr[.//a[starts-with(@id, 'dgElaborationRequests_cmdListFiles_')]]".to_string(),
            status_cell: "./td[4]".to_string(),
            pending_marker: "gold".to_string(),
            apply_filter: "//input[@value='Apply Filter']".to_string(),
            list_files_link: ".//a[starts-with(@id, 'dgElaborationRequests_cmdListFiles_')]".to_string(),
            download_link: "dgFiles_hlkDownloadFile_0".to_string(),
            procedure_select: "ddlProcedures".to_string(),
            first_activity_files: "dgActivities_cmdListFiles_0".to_string(),
            standard_download_link: "//a[normalize-space(.)='Download']".to_string(),
        }
    }
}

/// 程序配置文件
#[derive(Clone, Debug)]
pub struct Config {
    /// 门户主机名
    pub portal_host: String,
    /// 报表根目录
    pub reports_dir: PathBuf,
    /// 车型列表文件（key → 下拉框文本）
    pub models_file: PathBuf,
    /// 账号文件
    pub credentials_file: PathBuf,
    /// 对比用的 PFEP 基准表
    pub reference_file: PathBuf,
    /// 基准表的表头所在行（从 0 开始）
    pub reference_header_row: usize,
    /// 每批提交的车型数量
    pub batch_size: usize,
    /// 日期参数 = 今天 + N 个月
    pub date_offset_months: u32,
    /// 单次等待元素的超时
    pub wait_timeout: Duration,
    /// 单批等待报表生成完成的上限
    pub poll_max_wait: Duration,
    /// 轮询间隔
    pub poll_interval: Duration,
    /// 单个文件下载超时
    pub download_timeout: Duration,
    /// 每次提交成功后的停顿
    pub submit_pause: Duration,
    /// worker 错开启动的间隔
    pub worker_stagger: Duration,
    /// 是否无头模式
    pub headless: bool,
    /// 浏览器可执行文件（为空时由 chromiumoxide 自动查找）
    pub chrome_executable: Option<PathBuf>,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
    pub layout: PortalLayout,
    pub reports: Vec<ReportCategory>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            portal_host: "rtmcarroceria.fiat.com.br".to_string(),
            reports_dir: PathBuf::from("Reports"),
            models_file: PathBuf::from("Modelos.json"),
            credentials_file: PathBuf::from("Usuario.json"),
            reference_file: PathBuf::from("Reports/PFEP - Dados.xlsx"),
            reference_header_row: 9,
            batch_size: 5,
            date_offset_months: 6,
            wait_timeout: Duration::from_secs(60),
            poll_max_wait: Duration::from_secs(15 * 60),
            poll_interval: Duration::from_secs(5),
            download_timeout: Duration::from_secs(120),
            submit_pause: Duration::from_secs(1),
            worker_stagger: Duration::from_secs(2),
            headless: true,
            chrome_executable: None,
            verbose_logging: false,
            output_log_file: "output.txt".to_string(),
            layout: PortalLayout::default(),
            reports: default_reports(),
        }
    }
}

fn default_reports() -> Vec<ReportCategory> {
    vec![
        ReportCategory {
            id: "32".to_string(),
            name: "Relatorio 32".to_string(),
            kind: ReportKind::Standard,
            url_path: "/bom/Functions/AllactivitiesList.aspx?idPlant=19".to_string(),
            artifact_subdir: "Outros_relatorios".to_string(),
            merge: MergeProfile::ElementNode,
        },
        ReportCategory {
            id: "29".to_string(),
            name: "Relatorio 29".to_string(),
            kind: ReportKind::Elaboration,
            url_path: "/bom/Elab/elab29.aspx?idPlant=19&idElaborationType=29".to_string(),
            artifact_subdir: "Modelos_29".to_string(),
            merge: MergeProfile::Plain,
        },
        ReportCategory {
            id: "61".to_string(),
            name: "Relatorio 61".to_string(),
            kind: ReportKind::Elaboration,
            url_path: "/bom/Elab/elab61.aspx?idPlant=19&idElaborationType=61".to_string(),
            artifact_subdir: "Modelos_61".to_string(),
            merge: MergeProfile::PartList,
        },
    ]
}

/// TOML 配置文件结构，所有字段可选
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    portal_host: Option<String>,
    reports_dir: Option<PathBuf>,
    models_file: Option<PathBuf>,
    credentials_file: Option<PathBuf>,
    reference_file: Option<PathBuf>,
    reference_header_row: Option<usize>,
    batch_size: Option<usize>,
    date_offset_months: Option<u32>,
    wait_timeout_secs: Option<u64>,
    poll_max_wait_secs: Option<u64>,
    poll_interval_secs: Option<u64>,
    download_timeout_secs: Option<u64>,
    submit_pause_ms: Option<u64>,
    worker_stagger_ms: Option<u64>,
    headless: Option<bool>,
    chrome_executable: Option<PathBuf>,
    verbose_logging: Option<bool>,
    output_log_file: Option<String>,
    layout: Option<PortalLayout>,
    reports: Option<Vec<ReportCategory>>,
}

impl Config {
    /// 默认值 + 可选 TOML 文件 + 环境变量
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("ELAB_CONFIG").unwrap_or_else(|_| "elab.toml".to_string());
        let path = Path::new(&path);
        let base = if path.exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        let config = base.with_env();
        config.validate()?;
        Ok(config)
    }

    /// 只使用默认值和环境变量
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// 从 TOML 文件读取，未出现的字段使用默认值
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content, path)
    }

    fn from_toml_str(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        let default = Self::default();
        Ok(Self {
            portal_host: file.portal_host.unwrap_or(default.portal_host),
            reports_dir: file.reports_dir.unwrap_or(default.reports_dir),
            models_file: file.models_file.unwrap_or(default.models_file),
            credentials_file: file.credentials_file.unwrap_or(default.credentials_file),
            reference_file: file.reference_file.unwrap_or(default.reference_file),
            reference_header_row: file.reference_header_row.unwrap_or(default.reference_header_row),
            batch_size: file.batch_size.unwrap_or(default.batch_size),
            date_offset_months: file.date_offset_months.unwrap_or(default.date_offset_months),
            wait_timeout: file.wait_timeout_secs.map(Duration::from_secs).unwrap_or(default.wait_timeout),
            poll_max_wait: file.poll_max_wait_secs.map(Duration::from_secs).unwrap_or(default.poll_max_wait),
            poll_interval: file.poll_interval_secs.map(Duration::from_secs).unwrap_or(default.poll_interval),
            download_timeout: file.download_timeout_secs.map(Duration::from_secs).unwrap_or(default.download_timeout),
            submit_pause: file.submit_pause_ms.map(Duration::from_millis).unwrap_or(default.submit_pause),
            worker_stagger: file.worker_stagger_ms.map(Duration::from_millis).unwrap_or(default.worker_stagger),
            headless: file.headless.unwrap_or(default.headless),
            chrome_executable: file.chrome_executable.or(default.chrome_executable),
            verbose_logging: file.verbose_logging.unwrap_or(default.verbose_logging),
            output_log_file: file.output_log_file.unwrap_or(default.output_log_file),
            layout: file.layout.unwrap_or(default.layout),
            reports: file.reports.unwrap_or(default.reports),
        })
    }

    fn with_env(self) -> Self {
        Self {
            portal_host: std::env::var("PORTAL_HOST").unwrap_or(self.portal_host),
            reports_dir: std::env::var("REPORTS_DIR").map(PathBuf::from).unwrap_or(self.reports_dir),
            models_file: std::env::var("MODELS_FILE").map(PathBuf::from).unwrap_or(self.models_file),
            credentials_file: std::env::var("CREDENTIALS_FILE").map(PathBuf::from).unwrap_or(self.credentials_file),
            reference_file: std::env::var("REFERENCE_FILE").map(PathBuf::from).unwrap_or(self.reference_file),
            batch_size: env_parse("BATCH_SIZE").unwrap_or(self.batch_size),
            date_offset_months: env_parse("DATE_OFFSET_MONTHS").unwrap_or(self.date_offset_months),
            wait_timeout: env_parse("WAIT_TIMEOUT_SECS").map(Duration::from_secs).unwrap_or(self.wait_timeout),
            poll_max_wait: env_parse("POLL_MAX_WAIT_SECS").map(Duration::from_secs).unwrap_or(self.poll_max_wait),
            poll_interval: env_parse("POLL_INTERVAL_SECS").map(Duration::from_secs).unwrap_or(self.poll_interval),
            download_timeout: env_parse("DOWNLOAD_TIMEOUT_SECS").map(Duration::from_secs).unwrap_or(self.download_timeout),
            headless: env_parse("HEADLESS").unwrap_or(self.headless),
            chrome_executable: std::env::var("CHROME_EXECUTABLE").ok().map(PathBuf::from).or(self.chrome_executable),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(self.verbose_logging),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(self.output_log_file),
            ..self
        }
    }

    /// 检查配置值
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                name: "batch_size".to_string(),
                reason: "必须大于 0".to_string(),
            });
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "poll_interval".to_string(),
                reason: "必须大于 0".to_string(),
            });
        }
        Ok(())
    }

    /// 某个类别的产物目录
    pub fn artifact_dir(&self, category: &ReportCategory) -> PathBuf {
        self.reports_dir.join(&category.artifact_subdir)
    }

    /// 某个 worker 独占的临时下载目录
    pub fn staging_dir(&self, category: &ReportCategory) -> PathBuf {
        self.reports_dir
            .join(format!("temp_{}_{}", category.worker_name(), std::process::id()))
    }

    /// 某个 worker 独占的浏览器用户数据目录
    pub fn profile_dir(&self, category: &ReportCategory) -> PathBuf {
        std::env::temp_dir().join(format!(
            "elab_profile_{}_{}",
            category.worker_name(),
            std::process::id()
        ))
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_reports() {
        let config = Config::default();
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.reports.len(), 3);
        assert!(config
            .reports
            .iter()
            .any(|r| r.id == "61" && r.kind == ReportKind::Elaboration && r.merge == MergeProfile::PartList));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_overrides() {
        let content = r#"
            batch_size = 3
            poll_interval_secs = 10
            reports_dir = "out"

            [layout]
            pending_marker = "yellow"

            [[reports]]
            id = "61"
            name = "Relatorio 61"
            kind = "elaboration"
            url_path = "/bom/Elab/elab61.aspx"
            artifact_subdir = "Modelos_61"
            merge = "part_list"
        "#;
        let config = Config::from_toml_str(content, Path::new("elab.toml")).unwrap();
        assert_eq!(config.batch_size, 3);
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.reports_dir, PathBuf::from("out"));
        assert_eq!(config.layout.pending_marker, "yellow");
        // 未设置的字段保持默认
        assert_eq!(config.layout.model_select, "MainContent_ddlModel");
        assert_eq!(config.download_timeout, Duration::from_secs(120));
        assert_eq!(config.reports.len(), 1);
    }

    #[test]
    fn test_invalid_batch_size() {
        let config = Config {
            batch_size: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_staging_dir_is_per_worker() {
        let config = Config::default();
        let a = config.staging_dir(&config.reports[1]);
        let b = config.staging_dir(&config.reports[2]);
        assert_ne!(a, b);
        assert!(a.starts_with(&config.reports_dir));
    }
}
