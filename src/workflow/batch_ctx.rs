//! 批次处理上下文
//!
//! 封装"哪个 worker 正在处理第几批、下载到哪里"这一信息

use std::fmt::Display;
use std::path::Path;

use chrono::{Datelike, Months, NaiveDate};

use crate::infrastructure::StagingDir;
use crate::utils::EventSink;

/// 门户日期参数：今天往后推若干个月，格式 `M/D/YYYY`（不补零）
///
/// 目标月份没有这一天时取月末
pub fn date_parameter(today: NaiveDate, offset_months: u32) -> String {
    let target = today
        .checked_add_months(Months::new(offset_months))
        .unwrap_or(today);
    format!("{}/{}/{}", target.month(), target.day(), target.year())
}

/// 批次处理上下文
pub struct BatchCtx<'a> {
    /// 第几批（从 1 开始）
    pub batch_index: usize,

    pub total_batches: usize,

    /// 生成页面地址（含账号）
    pub form_url: &'a str,

    /// 本批使用的日期参数
    pub date_param: String,

    pub staging: &'a StagingDir,

    pub artifact_dir: &'a Path,

    pub events: &'a EventSink,
}

impl Display for BatchCtx<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{} 批次 {}/{}]",
            self.events.worker(),
            self.batch_index,
            self.total_batches
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_parameter_has_no_padding() {
        let today = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        assert_eq!(date_parameter(today, 6), "7/5/2026");
    }

    #[test]
    fn test_date_parameter_rolls_year_and_clamps() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 31).unwrap();
        assert_eq!(date_parameter(today, 6), "2/28/2027");
    }
}
