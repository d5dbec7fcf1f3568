use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// # Summary
/// 周期划分规则，决定日线归属哪一根周期 K 线。
///
/// # Invariants
/// - 每条规则把日历切分为连续、互不重叠的区间。
/// - 同一区间内所有日期的 `period_end` 相同。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PeriodRule {
    // ISO 周 (周一至周日)，以周五作为周期结束日
    Weekly,
    // 自然月
    Monthly,
    // 自然季度
    Quarterly,
    // 上/下半年
    Semiannual,
    // 自然年
    Annual,
}

impl PeriodRule {
    /// 所有规则，按周期从短到长排列。
    pub const ALL: [PeriodRule; 5] = [
        PeriodRule::Weekly,
        PeriodRule::Monthly,
        PeriodRule::Quarterly,
        PeriodRule::Semiannual,
        PeriodRule::Annual,
    ];

    /// # Summary
    /// 日历月跨度；周线返回 `None`。
    fn span_months(self) -> Option<u32> {
        match self {
            PeriodRule::Weekly => None,
            PeriodRule::Monthly => Some(1),
            PeriodRule::Quarterly => Some(3),
            PeriodRule::Semiannual => Some(6),
            PeriodRule::Annual => Some(12),
        }
    }

    /// # Summary
    /// 计算日期所在周期的起始日。
    ///
    /// # Logic
    /// 1. 周线：回退到所在 ISO 周的周一。
    /// 2. 其他：回退到当月 1 日，再按跨度回退到区间首月。
    ///
    /// # Arguments
    /// * `date`: 任意日历日。
    ///
    /// # Returns
    /// 周期起始日。
    pub fn period_start(self, date: NaiveDate) -> NaiveDate {
        match self.span_months() {
            None => date - Days::new(u64::from(date.weekday().num_days_from_monday())),
            Some(span) => {
                let month_start = date - Days::new(u64::from(date.day0()));
                month_start - Months::new(date.month0() % span)
            }
        }
    }

    /// # Summary
    /// 计算日期所在周期的结束日 (即周期 K 线的 `period_end_date`)。
    ///
    /// # Logic
    /// 1. 周线：周一 + 4 天，即该 ISO 周的周五，即便最后一个交易日早于周五。
    /// 2. 其他：区间起始日 + 跨度月数 - 1 天，即区间最后一个日历日。
    ///
    /// # Arguments
    /// * `date`: 任意日历日。
    ///
    /// # Returns
    /// 周期结束日。
    pub fn period_end(self, date: NaiveDate) -> NaiveDate {
        let start = self.period_start(date);
        match self.span_months() {
            None => start + Days::new(4),
            Some(span) => start + Months::new(span) - Days::new(1),
        }
    }

    /// # Summary
    /// 计算日期所在周期的上一个周期的起始日。
    pub fn previous_period_start(self, date: NaiveDate) -> NaiveDate {
        let current = self.period_start(date);
        self.period_start(current - Days::new(1))
    }

    /// # Summary
    /// 周期 K 线的持久化表名。
    pub fn table_name(self) -> &'static str {
        match self {
            PeriodRule::Weekly => "bars_weekly",
            PeriodRule::Monthly => "bars_monthly",
            PeriodRule::Quarterly => "bars_quarterly",
            PeriodRule::Semiannual => "bars_semiannual",
            PeriodRule::Annual => "bars_annual",
        }
    }

    /// # Summary
    /// 增量聚合时默认回看的日历天数。
    ///
    /// # Logic
    /// 经验值：覆盖当前周期以及上一周期的收盘，并留出非交易日余量。
    pub fn default_lookback_days(self) -> u64 {
        match self {
            PeriodRule::Weekly => 40,
            PeriodRule::Monthly => 60,
            PeriodRule::Quarterly => 120,
            PeriodRule::Semiannual => 200,
            PeriodRule::Annual => 400,
        }
    }
}

impl FromStr for PeriodRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "w" | "week" | "weekly" => Ok(PeriodRule::Weekly),
            "m" | "month" | "monthly" => Ok(PeriodRule::Monthly),
            "q" | "quarter" | "quarterly" => Ok(PeriodRule::Quarterly),
            "h" | "half" | "semiannual" => Ok(PeriodRule::Semiannual),
            "y" | "year" | "annual" => Ok(PeriodRule::Annual),
            _ => Err(format!("Unknown PeriodRule: {}", s)),
        }
    }
}

impl std::fmt::Display for PeriodRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeriodRule::Weekly => write!(f, "weekly"),
            PeriodRule::Monthly => write!(f, "monthly"),
            PeriodRule::Quarterly => write!(f, "quarterly"),
            PeriodRule::Semiannual => write!(f, "semiannual"),
            PeriodRule::Annual => write!(f, "annual"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_weekly_ends_on_friday() {
        // 2024-01-03 是周三
        assert_eq!(PeriodRule::Weekly.period_start(d(2024, 1, 3)), d(2024, 1, 1));
        assert_eq!(PeriodRule::Weekly.period_end(d(2024, 1, 3)), d(2024, 1, 5));
        // 周日仍归属同一 ISO 周
        assert_eq!(PeriodRule::Weekly.period_end(d(2024, 1, 7)), d(2024, 1, 5));
        // 跨年周
        assert_eq!(PeriodRule::Weekly.period_end(d(2024, 12, 31)), d(2025, 1, 3));
    }

    #[test]
    fn test_calendar_period_ends() {
        assert_eq!(PeriodRule::Monthly.period_end(d(2024, 2, 10)), d(2024, 2, 29));
        assert_eq!(PeriodRule::Monthly.period_end(d(2023, 2, 10)), d(2023, 2, 28));
        assert_eq!(PeriodRule::Quarterly.period_end(d(2024, 5, 1)), d(2024, 6, 30));
        assert_eq!(PeriodRule::Quarterly.period_end(d(2024, 11, 30)), d(2024, 12, 31));
        assert_eq!(PeriodRule::Semiannual.period_end(d(2024, 6, 30)), d(2024, 6, 30));
        assert_eq!(PeriodRule::Semiannual.period_end(d(2024, 7, 1)), d(2024, 12, 31));
        assert_eq!(PeriodRule::Annual.period_end(d(2024, 3, 15)), d(2024, 12, 31));
    }

    #[test]
    fn test_previous_period_start() {
        assert_eq!(PeriodRule::Weekly.previous_period_start(d(2024, 1, 3)), d(2023, 12, 25));
        assert_eq!(PeriodRule::Monthly.previous_period_start(d(2024, 3, 31)), d(2024, 2, 1));
        assert_eq!(PeriodRule::Quarterly.previous_period_start(d(2024, 1, 15)), d(2023, 10, 1));
        assert_eq!(PeriodRule::Semiannual.previous_period_start(d(2024, 8, 1)), d(2024, 1, 1));
        assert_eq!(PeriodRule::Annual.previous_period_start(d(2024, 8, 1)), d(2023, 1, 1));
    }

    #[test]
    fn test_parse_and_display() {
        for rule in PeriodRule::ALL {
            assert_eq!(rule.to_string().parse::<PeriodRule>(), Ok(rule));
        }
        assert_eq!("W".parse::<PeriodRule>(), Ok(PeriodRule::Weekly));
        assert!("daily".parse::<PeriodRule>().is_err());
    }
}
