use crate::error::PatternError;
use crate::pattern::Evidence;
use crate::window::{close_at, low_at, open_at, require, settle};
use kline_core::bar::entity::DailyBar;

pub const MIN_WINDOW: usize = 60;

const PATTERN_BARS: usize = 7;
const MIN_SHADOW_RATIO: f64 = 2.0;

/// # Summary
/// 下跌趋势末端的长下影阳线。
///
/// # Logic
/// 1. 下跌趋势：`close[0] < close[59]`。
/// 2. 从最近一根向前扫描 7 根，找到第一根阳线 (`close > open`)，
///    其下影线 `min(open, close) - low` 不小于实体 `|close - open|` 的 2 倍。
/// 3. 首个命中即返回，不再继续扫描。
///
/// # Returns
/// * `decline_ratio = (close[59] - close[0]) / close[59]` 为主排序指标。
pub fn check(window: &[DailyBar]) -> Result<Option<Evidence>, PatternError> {
    require(window, MIN_WINDOW)?;
    settle("long_lower_shadow", evaluate(window))
}

fn evaluate(window: &[DailyBar]) -> Result<Option<Evidence>, PatternError> {
    let latest = close_at(window, 0)?;
    let anchor = close_at(window, MIN_WINDOW - 1)?;
    if latest >= anchor {
        return Ok(None);
    }

    for offset in 0..PATTERN_BARS {
        let open = open_at(window, offset)?;
        let close = close_at(window, offset)?;
        let low = low_at(window, offset)?;
        if close <= open {
            continue;
        }

        let body = close - open;
        let shadow = open.min(close) - low;
        if shadow >= MIN_SHADOW_RATIO * body {
            let Some(hit) = window.get(offset) else {
                return Ok(None);
            };
            return Ok(Some(Evidence::LongLowerShadow {
                decline_ratio: (anchor - latest) / anchor,
                shadow_ratio: shadow / body,
                hit_date: hit.trade_date,
                hit_offset: offset,
            }));
        }
    }
    Ok(None)
}
