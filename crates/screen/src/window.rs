//! 降序日线窗口 (下标 0 为最近交易日) 上的取值工具。

use crate::error::PatternError;
use kline_core::bar::entity::DailyBar;
use tracing::trace;

/// 校验窗口长度不少于 `need`
pub fn require(window: &[DailyBar], need: usize) -> Result<(), PatternError> {
    if window.len() < need {
        return Err(PatternError::InsufficientData {
            need,
            got: window.len(),
        });
    }
    Ok(())
}

fn positive(value: Option<f64>, offset: usize, reason: &'static str) -> Result<f64, PatternError> {
    match value {
        Some(v) if v.is_finite() && v > 0.0 => Ok(v),
        _ => Err(PatternError::InvalidValue { offset, reason }),
    }
}

/// 第 `offset` 根日线的收盘价，缺失或非正时返回 `InvalidValue`
pub fn close_at(window: &[DailyBar], offset: usize) -> Result<f64, PatternError> {
    positive(
        window.get(offset).and_then(|b| b.close),
        offset,
        "close is missing or non-positive",
    )
}

/// 第 `offset` 根日线的开盘价，缺失或非正时返回 `InvalidValue`
pub fn open_at(window: &[DailyBar], offset: usize) -> Result<f64, PatternError> {
    positive(
        window.get(offset).and_then(|b| b.open),
        offset,
        "open is missing or non-positive",
    )
}

/// 第 `offset` 根日线的最低价，非正时返回 `InvalidValue`
pub fn low_at(window: &[DailyBar], offset: usize) -> Result<f64, PatternError> {
    positive(
        window.get(offset).map(|b| b.low),
        offset,
        "low is non-positive",
    )
}

/// # Summary
/// 第 `offset` 根日线的涨跌幅 (%)。
///
/// # Logic
/// 1. 优先使用存储的 `change_percent`。
/// 2. 缺失时用更早一根 (`offset + 1`) 的收盘价推算。
/// 3. 两者皆不可得时返回 `None`。
pub fn change_percent_at(window: &[DailyBar], offset: usize) -> Option<f64> {
    let bar = window.get(offset)?;
    if let Some(pct) = bar.change_percent {
        return Some(pct);
    }
    let close = close_at(window, offset).ok()?;
    let prev = close_at(window, offset + 1).ok()?;
    Some((close - prev) / prev * 100.0)
}

/// # Summary
/// 以第 `offset` 根为最新一根的 `period` 日收盘均线。
///
/// # Logic
/// 1. 窗口内不足 `period` 根时返回 0，等同于均线尚未形成。
/// 2. 任一收盘缺失或非正时返回 `InvalidValue`。
pub fn moving_average(
    window: &[DailyBar],
    offset: usize,
    period: usize,
) -> Result<f64, PatternError> {
    if period == 0 || window.len() < offset + period {
        return Ok(0.0);
    }
    let divisor = u32::try_from(period).map_err(|_| PatternError::InvalidValue {
        offset,
        reason: "moving average period is too large",
    })?;
    let sum = (offset..offset + period)
        .map(|i| close_at(window, i))
        .sum::<Result<f64, _>>()?;
    Ok(sum / f64::from(divisor))
}

/// # Summary
/// 将谓词内部的 `InvalidValue` 折算为 "未命中"，其余结果原样返回。
pub fn settle<T>(name: &str, result: Result<Option<T>, PatternError>) -> Result<Option<T>, PatternError> {
    match result {
        Err(e @ PatternError::InvalidValue { .. }) => {
            trace!("{} rejected window: {}", name, e);
            Ok(None)
        }
        other => other,
    }
}
