use crate::error::PatternError;
use crate::pattern::Evidence;
use crate::window::{close_at, require, settle};
use kline_core::bar::entity::DailyBar;

pub const MIN_WINDOW: usize = 13;

const RUN_LENGTH: usize = 9;
const COMPARE_GAP: usize = 4;

/// # Summary
/// 神奇九转低九：最近 9 根收盘均严格低于各自 4 个交易日前的收盘。
///
/// # Logic
/// 1. 对 `i in 0..9` 要求 `close[i] < close[i + 4]`，任一天不满足即未命中。
/// 2. 命中时统计 13 根窗口内的最高与最低收盘。
pub fn check(window: &[DailyBar]) -> Result<Option<Evidence>, PatternError> {
    require(window, MIN_WINDOW)?;
    settle("low_nine", evaluate(window))
}

fn evaluate(window: &[DailyBar]) -> Result<Option<Evidence>, PatternError> {
    for offset in 0..RUN_LENGTH {
        if close_at(window, offset)? >= close_at(window, offset + COMPARE_GAP)? {
            return Ok(None);
        }
    }

    let mut max_close = f64::MIN;
    let mut min_close = f64::MAX;
    for offset in 0..MIN_WINDOW {
        let close = close_at(window, offset)?;
        max_close = max_close.max(close);
        min_close = min_close.min(close);
    }
    let latest = close_at(window, 0)?;

    Ok(Some(Evidence::LowNine {
        decline_ratio: (max_close - latest) / max_close,
        window_max_close: max_close,
        window_min_close: min_close,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicates::fixture::from_closes;

    fn falling() -> Vec<f64> {
        let mut close = 9.0;
        (0..MIN_WINDOW)
            .map(|_| {
                close += 1.0;
                close
            })
            .collect()
    }

    #[test]
    fn test_steady_decline_matches() {
        let evidence = check(&from_closes(&falling())).unwrap();
        assert_eq!(
            evidence,
            Some(Evidence::LowNine {
                decline_ratio: (22.0 - 10.0) / 22.0,
                window_max_close: 22.0,
                window_min_close: 10.0,
            })
        );
    }

    #[test]
    fn test_equal_close_breaks_the_run() {
        let mut closes = falling();
        closes[4] = closes[0];
        assert_eq!(check(&from_closes(&closes)).unwrap(), None);
    }

    #[test]
    fn test_violation_on_ninth_day_breaks_the_run() {
        let mut closes = falling();
        // close[8] 与 close[12] 比较
        closes[8] = 30.0;
        assert_eq!(check(&from_closes(&closes)).unwrap(), None);
    }

    #[test]
    fn test_missing_close_is_no_match() {
        let mut window = from_closes(&falling());
        window[12].close = None;
        assert_eq!(check(&window).unwrap(), None);
    }

    #[test]
    fn test_short_window_is_insufficient() {
        let closes = falling();
        assert_eq!(
            check(&from_closes(&closes[..12])),
            Err(PatternError::InsufficientData { need: 13, got: 12 })
        );
    }
}
