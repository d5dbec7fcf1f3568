use chrono::NaiveDate;
use kline_core::bar::period::PeriodRule;
use kline_core::store::error::StoreError;
use thiserror::Error;

/// # Summary
/// 周期聚合域错误。
///
/// # Invariants
/// - `UnknownPeriodRule` 属于调用方配置错误，立即上抛。
/// - 其余变体只影响单个标的，批处理驱动将其计入失败并继续。
#[derive(Error, Debug)]
pub enum PeriodError {
    #[error("Unknown period rule: {0}")]
    UnknownPeriodRule(String),
    #[error("Malformed daily bar for {code} on {date}: {reason}")]
    Malformed {
        code: String,
        date: NaiveDate,
        reason: &'static str,
    },
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Aggregation timed out for {0}")]
    Timeout(String),
}

/// # Summary
/// 解析周期规则名称，未知名称转换为 `PeriodError::UnknownPeriodRule`。
pub fn parse_rule(name: &str) -> Result<PeriodRule, PeriodError> {
    name.parse::<PeriodRule>()
        .map_err(|_| PeriodError::UnknownPeriodRule(name.to_string()))
}
