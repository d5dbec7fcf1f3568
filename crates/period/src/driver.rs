use crate::aggregator::aggregate;
use crate::error::{PeriodError, parse_rule};
use crate::tally::{AggregateSummary, BatchTally};
use chrono::{Days, NaiveDate};
use futures::StreamExt;
use kline_core::bar::period::PeriodRule;
use kline_core::common::Instrument;
use kline_core::common::time::TimeProvider;
use kline_core::config::AggregateConfig;
use kline_core::store::error::StoreError;
use kline_core::store::port::BarStore;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// # Summary
/// 计算增量聚合需要重新查询的日线区间。
///
/// # Logic
/// 1. 截止日为 `today`。
/// 2. 起始日取 `today - lookback_days` 与上一周期起始日中较早者，
///    保证上一周期的收盘价在作用域内，即便回看天数配置过小。
///
/// # Arguments
/// * `rule`: 周期规则。
/// * `today`: 当前日期。
/// * `lookback_days`: 回看的日历天数。
///
/// # Returns
/// 闭区间 `(start, end)`。
pub fn current_period_window(
    rule: PeriodRule,
    today: NaiveDate,
    lookback_days: u64,
) -> (NaiveDate, NaiveDate) {
    let by_lookback = today
        .checked_sub_days(Days::new(lookback_days))
        .unwrap_or(NaiveDate::MIN);
    let start = by_lookback.min(rule.previous_period_start(today));
    (start, today)
}

/// # Summary
/// 计算区间聚合实际读取的日线区间。
///
/// # Logic
/// 1. 起始日回退到 `start` 所在周期的上一周期起始日，首个周期既完整又能计算涨跌。
/// 2. 截止日延伸到 `end` 所在周期的结束日，但不超过 `today`；
///    区间端点落在周期中间时不会用残缺数据覆盖已有的完整行。
///
/// # Returns
/// 闭区间 `(start, end)`，且总是覆盖调用方给出的区间。
pub fn range_read_window(
    rule: PeriodRule,
    start: NaiveDate,
    end: NaiveDate,
    today: NaiveDate,
) -> (NaiveDate, NaiveDate) {
    let read_start = rule.previous_period_start(start).min(start);
    let read_end = end.max(rule.period_end(end).min(today));
    (read_start, read_end)
}

/// 单个标的的聚合作用域
#[derive(Debug, Clone, Copy)]
enum Scope {
    // 指定区间，产出与区间相交的所有周期
    Range { start: NaiveDate, end: NaiveDate },
    // 仅重算 `today` 所在的未收盘周期
    Current { today: NaiveDate },
}

/// # Summary
/// 周期聚合批处理驱动：遍历股票池，逐标的读取日线、聚合并回写。
///
/// # Invariants
/// - 单标的失败 (读写错误、异常行、超时) 只计入失败，不中断整批。
/// - 每个标的的回写在一个事务中完成，失败时只回滚该标的。
/// - 取消信号只在标的开始处理前检查，进行中的标的会完整结束。
pub struct PeriodDriver {
    store: Arc<dyn BarStore>,
    clock: Arc<dyn TimeProvider>,
    config: AggregateConfig,
    cancel: CancellationToken,
}

impl PeriodDriver {
    /// # Summary
    /// 创建驱动实例。
    ///
    /// # Arguments
    /// * `store` - K 线存储接口的具体实现。
    /// * `clock` - 时间供给器，决定增量聚合的 "今天"。
    /// * `config` - 并发、进度与回看配置。
    pub fn new(
        store: Arc<dyn BarStore>,
        clock: Arc<dyn TimeProvider>,
        config: AggregateConfig,
    ) -> Self {
        Self {
            store,
            clock,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// 获取取消令牌，调用 `cancel()` 后尚未开始的标的将被跳过
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// # Summary
    /// 对指定区间执行批量聚合。
    ///
    /// # Logic
    /// 1. 解析参与的标的 (全股票池或指定代码)。
    /// 2. 按 `range_read_window` 把区间扩展到完整周期后读取日线。
    /// 3. 只回写 `period_end_date >= rule.period_end(start)` 的行。
    /// 4. 并发处理每个标的，汇总成功、失败与写入行数。
    ///
    /// # Arguments
    /// * `rule` - 周期规则。
    /// * `start` / `end` - 日线区间 (闭区间)，可落在周期中间。
    /// * `codes` - 可选的标的代码列表，为空时处理全部股票池。
    ///
    /// # Returns
    /// * 仅在股票池读取失败时返回错误。
    pub async fn aggregate(
        &self,
        rule: PeriodRule,
        start: NaiveDate,
        end: NaiveDate,
        codes: Option<&[String]>,
    ) -> Result<AggregateSummary, PeriodError> {
        let (instruments, missing) = self.resolve_instruments(codes).await?;
        Ok(self
            .run_batch(rule, instruments, missing, Scope::Range { start, end })
            .await)
    }

    /// # Summary
    /// 按名称解析周期规则后执行批量聚合；未知名称立即返回错误。
    pub async fn aggregate_by_name(
        &self,
        rule_name: &str,
        start: NaiveDate,
        end: NaiveDate,
        codes: Option<&[String]>,
    ) -> Result<AggregateSummary, PeriodError> {
        let rule = parse_rule(rule_name)?;
        self.aggregate(rule, start, end, codes).await
    }

    /// # Summary
    /// 对所有周期规则重算当前未收盘的周期。
    ///
    /// # Logic
    /// 1. 通过时间供给器确定今天。
    /// 2. 对每条规则按 `current_period_window` 计算读取区间。
    /// 3. 只回写 `period_end_date >= rule.period_end(today)` 的行，上一周期仅用于计算涨跌。
    ///
    /// # Returns
    /// 每条规则一份汇总，按周期从短到长排列。
    pub async fn aggregate_current_period(
        &self,
        codes: Option<&[String]>,
    ) -> Result<Vec<AggregateSummary>, PeriodError> {
        let today = self.clock.today();
        let (instruments, missing) = self.resolve_instruments(codes).await?;

        let mut summaries = Vec::with_capacity(PeriodRule::ALL.len());
        for rule in PeriodRule::ALL {
            let summary = self
                .run_batch(
                    rule,
                    instruments.clone(),
                    missing.clone(),
                    Scope::Current { today },
                )
                .await;
            summaries.push(summary);
        }
        Ok(summaries)
    }

    /// # Summary
    /// 聚合单个标的并回写，直接向调用方暴露具体错误。
    ///
    /// # Returns
    /// 成功返回写入行数。
    pub async fn aggregate_instrument(
        &self,
        rule: PeriodRule,
        instrument: &Instrument,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<usize, PeriodError> {
        self.process_one(rule, instrument, Scope::Range { start, end })
            .await
    }

    /// # Summary
    /// 解析参与本次批处理的标的。
    ///
    /// # Logic
    /// 1. 读取完整股票池 (不剔除风险警示标的)。
    /// 2. 若指定了代码，按代码筛选；不在股票池中的代码单独返回，由批处理记为失败。
    async fn resolve_instruments(
        &self,
        codes: Option<&[String]>,
    ) -> Result<(Vec<Instrument>, Vec<String>), PeriodError> {
        let universe = self.store.read_universe(false).await?;
        let Some(codes) = codes else {
            return Ok((universe, Vec::new()));
        };

        let mut selected = Vec::with_capacity(codes.len());
        let mut missing = Vec::new();
        for code in codes {
            match universe.iter().find(|i| &i.code == code) {
                Some(inst) => selected.push(inst.clone()),
                None => missing.push(code.clone()),
            }
        }
        Ok((selected, missing))
    }

    /// # Summary
    /// 处理单个标的：读取 → 聚合 → 筛选 → 回写。
    async fn process_one(
        &self,
        rule: PeriodRule,
        instrument: &Instrument,
        scope: Scope,
    ) -> Result<usize, PeriodError> {
        let (start, end, emit_from) = match scope {
            Scope::Range { start, end } => {
                let (read_start, read_end) = range_read_window(rule, start, end, self.clock.today());
                (read_start, read_end, rule.period_end(start))
            }
            Scope::Current { today } => {
                let lookback = self.config.lookback.for_rule(rule);
                let (start, end) = current_period_window(rule, today, lookback);
                (start, end, rule.period_end(today))
            }
        };

        let bars = self.store.read_daily(&instrument.code, start, end).await?;
        let mut rows = aggregate(rule, instrument, &bars, self.clock.now())?;
        rows.retain(|r| r.period_end_date >= emit_from);

        Ok(self.store.upsert_periodic(rule, &rows).await?)
    }

    /// # Summary
    /// 以有界并发处理一批标的，并定期输出进度。
    ///
    /// # Logic
    /// 1. 不在股票池中的代码直接记为失败。
    /// 2. 每个标的开始前检查取消信号。
    /// 3. 单标的处理受 `instrument_timeout_secs` 约束，超时记为失败。
    /// 4. 每完成 `progress_every` 个标的输出一次进度日志。
    async fn run_batch(
        &self,
        rule: PeriodRule,
        instruments: Vec<Instrument>,
        missing: Vec<String>,
        scope: Scope,
    ) -> AggregateSummary {
        let tally = BatchTally::new(rule, instruments.len() + missing.len());
        info!(
            "[{}] aggregation started for {} instruments ({:?})",
            rule,
            tally.total(),
            scope
        );

        for code in &missing {
            warn!("[{}] {} skipped: {}", rule, code, StoreError::NotFound(code.clone()));
            tally.record_failure(code);
        }

        let timeout = Duration::from_secs(self.config.instrument_timeout_secs.max(1));
        let progress_every = self.config.progress_every.max(1);
        let tally_ref = &tally;

        futures::stream::iter(instruments)
            .map(|inst| async move {
                let done = if self.cancel.is_cancelled() {
                    tally_ref.record_cancelled()
                } else {
                    match tokio::time::timeout(timeout, self.process_one(rule, &inst, scope)).await
                    {
                        Ok(Ok(rows)) => tally_ref.record_success(rows),
                        Ok(Err(e)) => {
                            warn!("[{}] {} failed: {}", rule, inst.code, e);
                            tally_ref.record_failure(&inst.code)
                        }
                        Err(_) => {
                            let e = PeriodError::Timeout(inst.code.clone());
                            warn!("[{}] {}", rule, e);
                            tally_ref.record_failure(&inst.code)
                        }
                    }
                };

                if done % progress_every == 0 {
                    info!(
                        "[{}] progress {}/{}: success={}, failed={}, rows={}",
                        rule,
                        done,
                        tally_ref.total(),
                        tally_ref.success(),
                        tally_ref.failed(),
                        tally_ref.rows()
                    );
                }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .for_each(|()| futures::future::ready(()))
            .await;

        let summary = tally.into_summary();
        info!(
            "[{}] aggregation finished: total={}, success={}, failed={}, cancelled={}, rows={}",
            rule,
            summary.total,
            summary.success,
            summary.failed,
            summary.cancelled,
            summary.generated_rows
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_window_uses_lookback_when_wide_enough() {
        let today = d(2024, 3, 20);
        let (start, end) = current_period_window(PeriodRule::Weekly, today, 40);
        assert_eq!(start, d(2024, 2, 9));
        assert_eq!(end, today);
    }

    #[test]
    fn test_range_window_covers_whole_periods() {
        // 月中起止：回退到 2 月 1 日，延伸到今天 (3 月 20 日) 为止
        let (start, end) =
            range_read_window(PeriodRule::Monthly, d(2024, 3, 15), d(2024, 3, 18), d(2024, 3, 20));
        assert_eq!(start, d(2024, 2, 1));
        assert_eq!(end, d(2024, 3, 20));

        // 周期已收盘时延伸到周期结束日
        let (start, end) =
            range_read_window(PeriodRule::Weekly, d(2024, 3, 6), d(2024, 3, 12), d(2024, 6, 1));
        assert_eq!(start, d(2024, 2, 26));
        assert_eq!(end, d(2024, 3, 15));

        // 周六截止不会被截短到周五
        let (_, end) =
            range_read_window(PeriodRule::Weekly, d(2024, 3, 4), d(2024, 3, 16), d(2024, 6, 1));
        assert_eq!(end, d(2024, 3, 16));
    }

    #[test]
    fn test_window_never_cuts_previous_period() {
        // 2024-03-31 回看 20 天只到 3 月 11 日，必须扩展到 2 月 1 日
        let (start, _) = current_period_window(PeriodRule::Monthly, d(2024, 3, 31), 20);
        assert_eq!(start, d(2024, 2, 1));

        let (start, _) = current_period_window(PeriodRule::Annual, d(2024, 12, 31), 400);
        assert_eq!(start, d(2023, 1, 1));
    }
}
