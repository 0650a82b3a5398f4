//! 基础设施层
//!
//! 持有稀缺资源（浏览器 / Page / 下载目录），只向上暴露能力

pub mod chrome_driver;
pub mod driver;
pub mod js_executor;
pub mod staging;

pub use chrome_driver::ChromeDriver;
pub use driver::{Condition, Element, Locator, OptionChoice, SessionDriver};
pub use js_executor::JsExecutor;
pub use staging::{move_artifact, wait_for_completed_file, StagingDir};
