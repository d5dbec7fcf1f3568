//! 形态谓词库。
//!
//! 每个谓词都是作用于降序日线窗口 (下标 0 为最近交易日) 的纯函数，
//! 返回 `Ok(None)` 表示未命中，`Ok(Some(evidence))` 表示命中并附带指标，
//! 窗口短于最小长度时返回 `PatternError::InsufficientData`。

pub mod high_tight_flag;
pub mod keep_increasing;
pub mod long_lower_shadow;
pub mod low_nine;

#[cfg(test)]
pub(crate) mod fixture {
    use chrono::{Days, NaiveDate};
    use kline_core::bar::entity::DailyBar;

    /// 窗口中最近一根的交易日
    pub fn latest() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 28).unwrap()
    }

    /// 以 `offset` 推算日期的平盘日线 (开高低收相同)
    pub fn flat(offset: usize, close: f64) -> DailyBar {
        DailyBar {
            instrument_code: "000001".to_string(),
            trade_date: latest() - Days::new(offset as u64),
            open: Some(close),
            high: close,
            low: close,
            close: Some(close),
            volume: 1000.0,
            amount: 1000.0 * close,
            change_percent: None,
            turnover_rate: None,
        }
    }

    /// 由降序收盘价序列生成窗口
    pub fn from_closes(closes: &[f64]) -> Vec<DailyBar> {
        closes
            .iter()
            .enumerate()
            .map(|(offset, c)| flat(offset, *c))
            .collect()
    }
}
