use crate::error::{PatternError, ScreenError};
use crate::predicates::{high_tight_flag, keep_increasing, long_lower_shadow, low_nine};
use chrono::NaiveDate;
use kline_core::bar::entity::DailyBar;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// # Summary
/// 可扫描的形态种类。
///
/// # Invariants
/// - `history_bars() >= min_window()`，扫描器按 `history_bars` 换算读取区间。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    HighTightFlag,
    KeepIncreasing,
    LongLowerShadow,
    LowNine,
}

impl PatternKind {
    pub const ALL: [PatternKind; 4] = [
        PatternKind::HighTightFlag,
        PatternKind::KeepIncreasing,
        PatternKind::LongLowerShadow,
        PatternKind::LowNine,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PatternKind::HighTightFlag => "high_tight_flag",
            PatternKind::KeepIncreasing => "keep_increasing",
            PatternKind::LongLowerShadow => "long_lower_shadow",
            PatternKind::LowNine => "low_nine",
        }
    }

    /// 判定所需的最少日线根数，不足时跳过该标的
    pub fn min_window(&self) -> usize {
        match self {
            PatternKind::HighTightFlag => high_tight_flag::MIN_WINDOW,
            PatternKind::KeepIncreasing => keep_increasing::MIN_WINDOW,
            PatternKind::LongLowerShadow => long_lower_shadow::MIN_WINDOW,
            PatternKind::LowNine => low_nine::MIN_WINDOW,
        }
    }

    /// 判定实际会读取的日线根数 (含均线等指标的历史)
    pub fn history_bars(&self) -> usize {
        match self {
            PatternKind::KeepIncreasing => keep_increasing::HISTORY_BARS,
            other => other.min_window(),
        }
    }

    /// # Summary
    /// 在降序日线窗口上执行对应谓词。
    pub fn evaluate(&self, window: &[DailyBar]) -> Result<Option<Evidence>, PatternError> {
        match self {
            PatternKind::HighTightFlag => high_tight_flag::check(window),
            PatternKind::KeepIncreasing => keep_increasing::check(window),
            PatternKind::LongLowerShadow => long_lower_shadow::check(window),
            PatternKind::LowNine => low_nine::check(window),
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PatternKind {
    type Err = ScreenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        PatternKind::ALL
            .into_iter()
            .find(|kind| kind.name() == normalized)
            .ok_or_else(|| ScreenError::UnknownPredicate(s.to_string()))
    }
}

/// # Summary
/// 形态命中时的量化依据，每种形态一个变体。
///
/// # Invariants
/// - 每个变体的第一个字段为主排序指标，见 `primary_metric`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "pattern", rename_all = "snake_case")]
pub enum Evidence {
    HighTightFlag {
        // close[0] / 旗杆期最低价
        price_ratio: f64,
        min_low: f64,
        // 两个连续大涨日，由老到新
        surge_dates: [NaiveDate; 2],
        surge_change_percents: [f64; 2],
    },
    KeepIncreasing {
        ma30_increase_ratio: f64,
        // 四个采样点的 MA30，由老到新
        ma_samples: [f64; 4],
    },
    LongLowerShadow {
        decline_ratio: f64,
        shadow_ratio: f64,
        hit_date: NaiveDate,
        // 命中日线在降序窗口中的下标
        hit_offset: usize,
    },
    LowNine {
        decline_ratio: f64,
        window_max_close: f64,
        window_min_close: f64,
    },
}

impl Evidence {
    pub fn primary_metric(&self) -> f64 {
        match self {
            Evidence::HighTightFlag { price_ratio, .. } => *price_ratio,
            Evidence::KeepIncreasing {
                ma30_increase_ratio,
                ..
            } => *ma30_increase_ratio,
            Evidence::LongLowerShadow { decline_ratio, .. } => *decline_ratio,
            Evidence::LowNine { decline_ratio, .. } => *decline_ratio,
        }
    }
}

/// 一次扫描中的单个命中结果，不落库
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMatch {
    pub instrument_code: String,
    pub instrument_name: String,
    // 窗口最近一根的交易日与收盘价
    pub as_of_date: NaiveDate,
    pub as_of_price: f64,
    pub as_of_change_percent: Option<f64>,
    pub evidence: Evidence,
}
