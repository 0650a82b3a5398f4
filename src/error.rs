use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 浏览器会话相关错误
    #[error("浏览器错误: {0}")]
    Driver(#[from] DriverError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 合并 / 对比阶段错误
    #[error("数据处理错误: {0}")]
    Pipeline(#[from] PipelineError),
}

/// 会话驱动错误
///
/// 只有 [`DriverError::is_fatal`] 为真的错误会终止整个 worker，
/// 其余错误都由调用方在单个条目范围内消化。
#[derive(Debug, Error)]
pub enum DriverError {
    /// 等待条件超时
    #[error("等待超时 ({timeout:?}): {what}")]
    Timeout { what: String, timeout: Duration },
    /// 找不到元素
    #[error("找不到元素: {0}")]
    ElementNotFound(String),
    /// 元素句柄在导航后已失效
    #[error("元素句柄已失效: {0}")]
    StaleElement(String),
    /// 执行脚本失败
    #[error("执行脚本失败: {0}")]
    Script(String),
    /// 导航失败
    #[error("导航到 {url} 失败: {reason}")]
    Navigation { url: String, reason: String },
    /// 浏览器连接已断开
    #[error("浏览器会话已断开: {0}")]
    SessionLost(String),
    /// 浏览器启动失败
    #[error("启动浏览器失败: {0}")]
    Launch(String),
    /// 门户拒绝了账号（401/403，或首个表单打不开）
    #[error("门户认证失败: {0}")]
    Unauthorized(String),
    /// 下载目录读写失败
    #[error("文件操作失败 ({path}): {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DriverError {
    /// 是否为会话级致命错误
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DriverError::SessionLost(_) | DriverError::Launch(_) | DriverError::Unauthorized(_)
        )
    }

    pub fn timeout(what: impl Into<String>, timeout: Duration) -> Self {
        DriverError::Timeout {
            what: what.into(),
            timeout,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DriverError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<chromiumoxide::error::CdpError> for DriverError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        use chromiumoxide::error::CdpError;
        match err {
            CdpError::Ws(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse => {
                DriverError::SessionLost(err.to_string())
            }
            CdpError::Timeout => DriverError::timeout("CDP 请求", Duration::ZERO),
            other => DriverError::Script(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for DriverError {
    fn from(err: serde_json::Error) -> Self {
        DriverError::Script(format!("脚本返回值解析失败: {}", err))
    }
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 文件不存在
    #[error("配置文件不存在: {0}")]
    NotFound(PathBuf),
    /// 读取文件失败
    #[error("读取配置文件失败 ({path}): {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// 车型列表不是 字符串 → 字符串 的对象
    #[error("车型列表格式错误 ({path}): {reason}")]
    MalformedModels { path: PathBuf, reason: String },
    /// 账号文件格式错误
    #[error("账号文件格式错误 ({path}): {reason}")]
    MalformedCredentials { path: PathBuf, reason: String },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    /// 配置值非法
    #[error("配置项 {name} 非法: {reason}")]
    InvalidValue { name: String, reason: String },
}

/// 合并 / 对比阶段错误
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("文件操作失败 ({path}): {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV 处理失败 ({path}): {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("文件编码无法识别: {0}")]
    Encoding(PathBuf),
    #[error("Excel 处理失败 ({path}): {reason}")]
    Xlsx { path: PathBuf, reason: String },
    #[error("{path} 缺少列 {column}")]
    MissingColumn { path: PathBuf, column: String },
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn xlsx(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        PipelineError::Xlsx {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        PipelineError::Csv {
            path: path.into(),
            source,
        }
    }
}

/// 驱动层结果类型
pub type DriverResult<T> = Result<T, DriverError>;

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
