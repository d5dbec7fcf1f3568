use crate::error::PatternError;
use crate::pattern::Evidence;
use crate::window::{moving_average, require, settle};
use kline_core::bar::entity::DailyBar;

pub const MIN_WINDOW: usize = 30;
// 最老采样点的均线还需向前 29 根
pub const HISTORY_BARS: usize = 59;

const MA_PERIOD: usize = 30;
// 30 根窗口内最老、1/3、2/3、最新四个采样点 (升序偏移 0, 10, 20, 29) 对应的降序下标
const SAMPLE_OFFSETS: [usize; 4] = [29, 19, 9, 0];
const MIN_INCREASE_RATIO: f64 = 1.2;

/// # Summary
/// 均线持续上行：30 日收盘均线在四个采样点严格递增，且累计涨幅超过 20%。
///
/// # Logic
/// 1. 在 `SAMPLE_OFFSETS` 处计算 MA30，历史不足的采样点记为 0。
/// 2. 任一采样值不为正，判定未命中。
/// 3. 采样值由老到新严格递增，且 `MA(newest) / MA(oldest) > 1.2`。
pub fn check(window: &[DailyBar]) -> Result<Option<Evidence>, PatternError> {
    require(window, MIN_WINDOW)?;
    settle("keep_increasing", evaluate(window))
}

fn evaluate(window: &[DailyBar]) -> Result<Option<Evidence>, PatternError> {
    let mut samples = [0.0; 4];
    for (slot, offset) in samples.iter_mut().zip(SAMPLE_OFFSETS) {
        *slot = moving_average(window, offset, MA_PERIOD)?;
    }

    if samples.iter().any(|ma| *ma <= 0.0) {
        return Ok(None);
    }
    if !samples.windows(2).all(|pair| pair[0] < pair[1]) {
        return Ok(None);
    }

    let ma30_increase_ratio = samples[3] / samples[0];
    if ma30_increase_ratio <= MIN_INCREASE_RATIO {
        return Ok(None);
    }

    Ok(Some(Evidence::KeepIncreasing {
        ma30_increase_ratio,
        ma_samples: samples,
    }))
}
