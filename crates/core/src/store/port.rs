use super::error::StoreError;
use crate::bar::entity::{DailyBar, PeriodicBar};
use crate::bar::period::PeriodRule;
use crate::common::Instrument;
use async_trait::async_trait;
use chrono::NaiveDate;

/// # Summary
/// K 线存储接口 (Port)，负责日线读取、股票池查询以及周期 K 线的落库。
///
/// # Invariants
/// - `read_daily` 返回的日线按交易日升序排列。
/// - `upsert_periodic` 以 `(instrument_code, period_end_date)` 为键覆盖写入，
///   同一次调用中的所有行在一个事务内提交或回滚。
/// - 实现者必须线程安全 (`Send` + `Sync`)，允许多个工作协程并发调用。
#[async_trait]
pub trait BarStore: Send + Sync {
    /// # Summary
    /// 读取单个标的在日期区间内的日线。
    ///
    /// # Logic
    /// 1. 按 `instrument_code` 与闭区间 `[start, end]` 过滤。
    /// 2. 按 `trade_date` 升序返回。
    ///
    /// # Arguments
    /// * `code`: 股票代码。
    /// * `start`: 起始交易日 (包含)。
    /// * `end`: 截止交易日 (包含)。
    ///
    /// # Returns
    /// 成功返回升序日线列表，可能为空。
    async fn read_daily(
        &self,
        code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, StoreError>;

    /// # Summary
    /// 读取股票池。
    ///
    /// # Logic
    /// 1. 列出全部标的，按代码升序。
    /// 2. 若 `exclude_flagged` 为真，剔除 `Instrument::is_flagged` 命中的标的。
    ///
    /// # Arguments
    /// * `exclude_flagged`: 是否剔除风险警示标的。
    ///
    /// # Returns
    /// 标的列表。
    async fn read_universe(&self, exclude_flagged: bool) -> Result<Vec<Instrument>, StoreError>;

    /// # Summary
    /// 批量覆盖写入周期 K 线。
    ///
    /// # Logic
    /// 1. 开启事务。
    /// 2. 对每一行按 `(instrument_code, period_end_date)` 执行 upsert：
    ///    冲突时覆盖行情与衍生字段、刷新 `generated_at`，保留首次创建时间。
    /// 3. 提交事务；任一行失败则整体回滚。
    ///
    /// # Arguments
    /// * `rule`: 周期规则，决定目标表。
    /// * `rows`: 待写入的周期 K 线。
    ///
    /// # Returns
    /// 成功返回写入行数。
    async fn upsert_periodic(
        &self,
        rule: PeriodRule,
        rows: &[PeriodicBar],
    ) -> Result<usize, StoreError>;

    /// # Summary
    /// 读取单个标的在区间内的周期 K 线 (按 `period_end_date` 升序)。
    async fn read_periodic(
        &self,
        rule: PeriodRule,
        code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PeriodicBar>, StoreError>;

    /// # Summary
    /// 保存或更新股票池中的标的 (采集层写入入口)。
    async fn save_instruments(&self, instruments: &[Instrument]) -> Result<(), StoreError>;

    /// # Summary
    /// 保存日线 (采集层写入入口)，以 `(instrument_code, trade_date)` 去重覆盖。
    async fn save_daily_bars(&self, bars: &[DailyBar]) -> Result<(), StoreError>;
}
