use crate::error::PeriodError;
use chrono::{DateTime, NaiveDate, Utc};
use kline_core::bar::entity::{DailyBar, PeriodicBar};
use kline_core::bar::period::PeriodRule;
use kline_core::common::Instrument;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

/// 由日线汇总生成的周期 K 线的来源标记
pub const SOURCE_TAG: &str = "daily_rollup";

/// # Summary
/// 单个周期桶的累加状态。
struct Bucket {
    period_end: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    amount: f64,
    turnover_rate: Option<f64>,
}

impl Bucket {
    fn start(period_end: NaiveDate, bar: &DailyBar, open: f64, close: f64) -> Self {
        Self {
            period_end,
            open,
            high: bar.high,
            low: bar.low,
            close,
            volume: bar.volume,
            amount: bar.amount,
            turnover_rate: bar.turnover_rate,
        }
    }

    fn push(&mut self, bar: &DailyBar, close: f64) {
        self.high = self.high.max(bar.high);
        self.low = self.low.min(bar.low);
        self.close = close;
        self.volume += bar.volume;
        self.amount += bar.amount;
        self.turnover_rate = match (self.turnover_rate, bar.turnover_rate) {
            (Some(acc), Some(t)) => Some(acc + t),
            (acc, t) => acc.or(t),
        };
    }
}

/// # Summary
/// 四舍五入到两位小数 (远离零)，经由 `Decimal` 避免二进制浮点的 .5 误差。
pub fn round2(value: f64) -> f64 {
    Decimal::from_f64(value)
        .map(|d| d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|d| d.to_f64())
        .unwrap_or(value)
}

/// # Summary
/// 校验单个标的的日线序列。
///
/// # Logic
/// 1. 所有日线必须属于同一标的。
/// 2. 交易日严格递增。
/// 3. 可参与聚合的日线 (开收盘齐全) 的开高低收与量额必须有限，且 `high >= low`。
fn validate(instrument: &Instrument, bars: &[DailyBar]) -> Result<(), PeriodError> {
    let malformed = |bar: &DailyBar, reason: &'static str| PeriodError::Malformed {
        code: instrument.code.clone(),
        date: bar.trade_date,
        reason,
    };

    let mut last: Option<NaiveDate> = None;
    for bar in bars {
        if bar.instrument_code != instrument.code {
            return Err(malformed(bar, "bar belongs to another instrument"));
        }
        if last.is_some_and(|prev| bar.trade_date <= prev) {
            return Err(malformed(bar, "trade dates are not strictly ascending"));
        }
        last = Some(bar.trade_date);

        if let (Some(open), Some(close)) = (bar.open, bar.close) {
            if !bar.high.is_finite() || !bar.low.is_finite() {
                return Err(malformed(bar, "high/low is not finite"));
            }
            if !open.is_finite() || !close.is_finite() {
                return Err(malformed(bar, "open/close is not finite"));
            }
            if !bar.volume.is_finite() || !bar.amount.is_finite() {
                return Err(malformed(bar, "volume/amount is not finite"));
            }
            if bar.high < bar.low {
                return Err(malformed(bar, "high is below low"));
            }
        }
    }
    Ok(())
}

/// # Summary
/// 将单个标的的升序日线聚合为周期 K 线。
///
/// # Logic
/// 1. 校验输入序列，发现异常行立即返回 `PeriodError::Malformed`。
/// 2. 丢弃开盘或收盘缺失的日线，剩余日线按 `rule.period_end` 切分为连续的桶。
/// 3. 每个桶：开 = 首日开盘，高 = 最高，低 = 最低，收 = 末日收盘，量额求和。
/// 4. 涨跌额/涨跌幅/振幅相对上一根已产出的周期 K 线收盘价计算；
///    作用域内无上一根 (或其收盘价非正) 时三者为空。
/// 5. 百分比、涨跌额、成交额、换手率保留两位小数。
///
/// # Arguments
/// * `rule`: 周期规则。
/// * `instrument`: 标的身份 (名称与市场写入结果行)。
/// * `bars`: 按交易日升序的日线。
/// * `generated_at`: 本次生成时间。
///
/// # Returns
/// 按 `period_end_date` 升序的周期 K 线；没有有效日线的桶不会出现。
pub fn aggregate(
    rule: PeriodRule,
    instrument: &Instrument,
    bars: &[DailyBar],
    generated_at: DateTime<Utc>,
) -> Result<Vec<PeriodicBar>, PeriodError> {
    validate(instrument, bars)?;

    let mut buckets: Vec<Bucket> = Vec::new();
    for bar in bars {
        let (Some(open), Some(close)) = (bar.open, bar.close) else {
            continue;
        };
        let period_end = rule.period_end(bar.trade_date);
        match buckets.last_mut() {
            Some(bucket) if bucket.period_end == period_end => bucket.push(bar, close),
            _ => buckets.push(Bucket::start(period_end, bar, open, close)),
        }
    }

    let mut rows = Vec::with_capacity(buckets.len());
    let mut prev_close: Option<f64> = None;
    for bucket in buckets {
        let base = prev_close.filter(|c| *c > 0.0);
        let change = base.map(|p| bucket.close - p);
        let change_percent = base.map(|p| (bucket.close - p) / p * 100.0);
        let amplitude = base.map(|p| (bucket.high - bucket.low) / p * 100.0);

        rows.push(PeriodicBar {
            instrument_code: instrument.code.clone(),
            instrument_name: instrument.name.clone(),
            market: instrument.venue().to_string(),
            period_end_date: bucket.period_end,
            open: bucket.open,
            high: bucket.high,
            low: bucket.low,
            close: bucket.close,
            volume: bucket.volume,
            amount: round2(bucket.amount),
            change_percent: change_percent.map(round2),
            change: change.map(round2),
            amplitude: amplitude.map(round2),
            turnover_rate: bucket.turnover_rate.map(round2),
            source_tag: SOURCE_TAG.to_string(),
            generated_at,
        });
        prev_close = Some(bucket.close);
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Days, TimeZone};
    use proptest::prelude::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn inst() -> Instrument {
        Instrument::new("600519", "贵州茅台", "SH")
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    fn bar(date: NaiveDate, open: f64, high: f64, low: f64, close: f64) -> DailyBar {
        DailyBar {
            instrument_code: "600519".to_string(),
            trade_date: date,
            open: Some(open),
            high,
            low,
            close: Some(close),
            volume: 100.0,
            amount: 1000.0,
            change_percent: None,
            turnover_rate: Some(0.25),
        }
    }

    #[test]
    fn test_weekly_buckets_and_derived_fields() {
        // 2024-01-01 (周一) 至 2024-01-10 (周三)，跨两个 ISO 周
        let bars = vec![
            bar(d(2024, 1, 2), 10.0, 10.5, 9.8, 10.2),
            bar(d(2024, 1, 3), 10.2, 10.9, 10.1, 10.8),
            bar(d(2024, 1, 5), 10.8, 11.0, 10.4, 10.5),
            bar(d(2024, 1, 8), 10.5, 11.6, 10.5, 11.5),
            bar(d(2024, 1, 10), 11.5, 11.8, 11.0, 11.55),
        ];
        let rows = aggregate(PeriodRule::Weekly, &inst(), &bars, now()).unwrap();
        assert_eq!(rows.len(), 2);

        let w1 = &rows[0];
        assert_eq!(w1.period_end_date, d(2024, 1, 5));
        assert_eq!(w1.open, 10.0);
        assert_eq!(w1.high, 11.0);
        assert_eq!(w1.low, 9.8);
        assert_eq!(w1.close, 10.5);
        assert_eq!(w1.volume, 300.0);
        assert_eq!(w1.amount, 3000.0);
        assert_eq!(w1.turnover_rate, Some(0.75));
        assert_eq!(w1.change, None);
        assert_eq!(w1.change_percent, None);
        assert_eq!(w1.amplitude, None);
        assert_eq!(w1.instrument_name, "贵州茅台");
        assert_eq!(w1.source_tag, SOURCE_TAG);

        let w2 = &rows[1];
        // 第二周截至周三，周期结束日仍为周五
        assert_eq!(w2.period_end_date, d(2024, 1, 12));
        assert_eq!(w2.change, Some(1.05));
        assert_eq!(w2.change_percent, Some(10.0));
        // (11.8 - 10.5) / 10.5 * 100 = 12.38095...
        assert_eq!(w2.amplitude, Some(12.38));
    }

    #[test]
    fn test_bars_without_open_close_are_dropped() {
        let mut suspended = bar(d(2024, 1, 9), 0.0, 0.0, 0.0, 0.0);
        suspended.open = None;
        suspended.close = None;
        let bars = vec![
            bar(d(2024, 1, 2), 10.0, 10.5, 9.8, 10.2),
            suspended,
            bar(d(2024, 1, 16), 10.3, 10.6, 10.1, 10.4),
        ];
        let rows = aggregate(PeriodRule::Weekly, &inst(), &bars, now()).unwrap();
        // 第二周只有停牌日，整桶丢弃
        let ends: Vec<_> = rows.iter().map(|r| r.period_end_date).collect();
        assert_eq!(ends, vec![d(2024, 1, 5), d(2024, 1, 19)]);
        // 涨跌相对上一根已产出的周期 K 线
        assert_eq!(rows[1].change, Some(0.2));
    }

    #[test]
    fn test_monthly_and_annual_rollup() {
        let bars = vec![
            bar(d(2023, 12, 29), 9.0, 9.5, 8.8, 9.2),
            bar(d(2024, 1, 31), 9.2, 10.0, 9.1, 10.0),
            bar(d(2024, 2, 1), 10.0, 10.4, 9.9, 10.3),
        ];
        let monthly = aggregate(PeriodRule::Monthly, &inst(), &bars, now()).unwrap();
        assert_eq!(monthly.len(), 3);
        assert_eq!(monthly[1].period_end_date, d(2024, 1, 31));
        assert_eq!(monthly[2].period_end_date, d(2024, 2, 29));

        let annual = aggregate(PeriodRule::Annual, &inst(), &bars, now()).unwrap();
        assert_eq!(annual.len(), 2);
        assert_eq!(annual[1].open, 9.2);
        assert_eq!(annual[1].close, 10.3);
        assert_eq!(annual[1].high, 10.4);
        assert_eq!(annual[1].low, 9.1);
    }

    #[test]
    fn test_malformed_rows_are_rejected() {
        let unordered = vec![
            bar(d(2024, 1, 3), 10.0, 10.5, 9.8, 10.2),
            bar(d(2024, 1, 2), 10.0, 10.5, 9.8, 10.2),
        ];
        assert!(matches!(
            aggregate(PeriodRule::Weekly, &inst(), &unordered, now()),
            Err(PeriodError::Malformed { .. })
        ));

        let inverted = vec![bar(d(2024, 1, 2), 10.0, 9.0, 10.0, 10.2)];
        assert!(matches!(
            aggregate(PeriodRule::Weekly, &inst(), &inverted, now()),
            Err(PeriodError::Malformed { reason: "high is below low", .. })
        ));

        let mut foreign = bar(d(2024, 1, 2), 10.0, 10.5, 9.8, 10.2);
        foreign.instrument_code = "000001".to_string();
        assert!(aggregate(PeriodRule::Weekly, &inst(), &[foreign], now()).is_err());
    }

    #[test]
    fn test_non_finite_values_are_rejected() {
        let base = bar(d(2024, 1, 2), 10.0, 10.5, 9.8, 10.2);

        let mut nan_volume = base.clone();
        nan_volume.volume = f64::NAN;
        assert!(matches!(
            aggregate(PeriodRule::Weekly, &inst(), &[nan_volume], now()),
            Err(PeriodError::Malformed { reason: "volume/amount is not finite", .. })
        ));

        let mut inf_amount = base.clone();
        inf_amount.amount = f64::INFINITY;
        assert!(matches!(
            aggregate(PeriodRule::Weekly, &inst(), &[inf_amount], now()),
            Err(PeriodError::Malformed { reason: "volume/amount is not finite", .. })
        ));

        let mut nan_open = base.clone();
        nan_open.open = Some(f64::NAN);
        assert!(matches!(
            aggregate(PeriodRule::Weekly, &inst(), &[nan_open], now()),
            Err(PeriodError::Malformed { reason: "open/close is not finite", .. })
        ));

        let mut inf_close = base.clone();
        inf_close.close = Some(f64::NEG_INFINITY);
        assert!(matches!(
            aggregate(PeriodRule::Weekly, &inst(), &[inf_close], now()),
            Err(PeriodError::Malformed { reason: "open/close is not finite", .. })
        ));

        // 停牌日本身会被丢弃，其量额不参与校验
        let mut suspended = bar(d(2024, 1, 3), 0.0, 0.0, 0.0, 0.0);
        suspended.open = None;
        suspended.close = None;
        suspended.volume = f64::NAN;
        let rows = aggregate(PeriodRule::Weekly, &inst(), &[base, suspended], now()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].volume, 100.0);
    }

    #[test]
    fn test_empty_input_yields_no_rows() {
        let rows = aggregate(PeriodRule::Quarterly, &inst(), &[], now()).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(12.380952), 12.38);
        assert_eq!(round2(0.125), 0.13);
        assert_eq!(round2(-2.3456), -2.35);
        assert_eq!(round2(3.0), 3.0);
    }

    proptest! {
        #[test]
        fn prop_weekly_open_close_from_first_and_last_bar(
            closes in proptest::collection::vec(1.0f64..1000.0, 1..=5),
            opens in proptest::collection::vec(1.0f64..1000.0, 5),
        ) {
            // 2024-01-08 为周一，至多 5 个交易日落在同一 ISO 周
            let monday = d(2024, 1, 8);
            let bars: Vec<DailyBar> = closes
                .iter()
                .zip(opens.iter())
                .enumerate()
                .map(|(i, (c, o))| {
                    let date = monday + Days::new(i as u64);
                    bar(date, *o, o.max(*c) + 1.0, o.min(*c) - 0.5, *c)
                })
                .collect();

            let rows = aggregate(PeriodRule::Weekly, &inst(), &bars, now()).unwrap();
            prop_assert_eq!(rows.len(), 1);
            prop_assert_eq!(rows[0].open, opens[0]);
            prop_assert_eq!(rows[0].close, *closes.last().unwrap());
            prop_assert_eq!(rows[0].period_end_date, d(2024, 1, 12));
        }
    }
}
