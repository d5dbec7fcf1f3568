use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// # Summary
/// 单个交易日的日 K 线实体，由外部采集层写入，核心只读。
///
/// # Invariants
/// - 同一标的的日线按 `trade_date` 严格递增排列。
/// - `open` / `close` 可能缺失 (停牌等)，缺失的日线不参与周期聚合。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    // 股票代码
    pub instrument_code: String,
    // 交易日
    pub trade_date: NaiveDate,
    // 开盘价
    pub open: Option<f64>,
    // 最高价
    pub high: f64,
    // 最低价
    pub low: f64,
    // 收盘价
    pub close: Option<f64>,
    // 成交量 (股)
    pub volume: f64,
    // 成交额 (元)
    pub amount: f64,
    // 涨跌幅 (%)，相对前一交易日收盘
    pub change_percent: Option<f64>,
    // 换手率 (%)
    pub turnover_rate: Option<f64>,
}

/// # Summary
/// 由日线聚合而成的周期 K 线 (周/月/季/半年/年)。
///
/// # Invariants
/// - `(instrument_code, period_end_date)` 在同一周期表内唯一。
/// - `change` / `change_percent` / `amplitude` 相对上一根周期 K 线的收盘价计算，
///   作用域内不存在上一根时为 `None`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodicBar {
    pub instrument_code: String,
    pub instrument_name: String,
    pub market: String,
    // 周期结束日 (周五/月末/季末/半年末/年末)
    pub period_end_date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub amount: f64,
    // 涨跌幅 (%)
    pub change_percent: Option<f64>,
    // 涨跌额
    pub change: Option<f64>,
    // 振幅 (%)
    pub amplitude: Option<f64>,
    // 换手率 (%)，周期内日换手率之和
    pub turnover_rate: Option<f64>,
    // 数据来源标记
    pub source_tag: String,
    // 本次生成时间
    pub generated_at: DateTime<Utc>,
}
