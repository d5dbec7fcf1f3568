use crate::error::PatternError;
use crate::pattern::Evidence;
use crate::window::{change_percent_at, close_at, low_at, require, settle};
use kline_core::bar::entity::DailyBar;
use std::ops::Range;

pub const MIN_WINDOW: usize = 60;

// 旗杆所在的区间 (降序下标，左闭右开)
const FLAG_RANGE: Range<usize> = 10..23;
const MIN_PRICE_RATIO: f64 = 1.9;
const SURGE_CHANGE_PERCENT: f64 = 9.5;

/// # Summary
/// 高而窄的旗形：旗杆期内连续两日大涨，随后价格维持在高位。
///
/// # Logic
/// 1. 60 根窗口内任一收盘或最低价缺失/非正，判定未命中。
/// 2. `close[0] / min(low[10..23]) >= 1.9`。
/// 3. `[10..23]` 内存在相邻两根涨幅均不低于 9.5%，取最近的一对。
///
/// # Returns
/// * `price_ratio` 为主排序指标。
pub fn check(window: &[DailyBar]) -> Result<Option<Evidence>, PatternError> {
    require(window, MIN_WINDOW)?;
    settle("high_tight_flag", evaluate(window))
}

fn evaluate(window: &[DailyBar]) -> Result<Option<Evidence>, PatternError> {
    for offset in 0..MIN_WINDOW {
        close_at(window, offset)?;
        low_at(window, offset)?;
    }

    let latest = close_at(window, 0)?;
    let mut min_low = f64::INFINITY;
    for offset in FLAG_RANGE {
        min_low = min_low.min(low_at(window, offset)?);
    }
    let price_ratio = latest / min_low;
    if price_ratio < MIN_PRICE_RATIO {
        return Ok(None);
    }

    let surge = |offset: usize| {
        change_percent_at(window, offset).filter(|pct| *pct >= SURGE_CHANGE_PERCENT)
    };
    let hit = (FLAG_RANGE.start..FLAG_RANGE.end - 1)
        .find_map(|offset| Some((offset, surge(offset)?, surge(offset + 1)?)));
    let Some((offset, newer_pct, older_pct)) = hit else {
        return Ok(None);
    };

    let date = |o: usize| window.get(o).map(|b| b.trade_date);
    let (Some(older_date), Some(newer_date)) = (date(offset + 1), date(offset)) else {
        return Ok(None);
    };

    Ok(Some(Evidence::HighTightFlag {
        price_ratio,
        min_low,
        surge_dates: [older_date, newer_date],
        surge_change_percents: [older_pct, newer_pct],
    }))
}
