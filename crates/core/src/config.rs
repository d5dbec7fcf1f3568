use crate::bar::period::PeriodRule;
use serde::{Deserialize, Serialize};

/// 全局应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub market: MarketConfig,
    pub aggregate: AggregateConfig,
    pub scan: ScanConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub data_dir: String,
}

/// # Summary
/// 目标市场的时区配置，决定 "今天" 按哪个本地日历日计算。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    // 相对 UTC 的小时偏移，A 股为 +8
    pub utc_offset_hours: i32,
}

/// # Summary
/// 周期聚合批处理配置。
///
/// # Invariants
/// - `concurrency` 至少为 1。
/// - 回看天数为经验值，应结合目标市场的交易日密度校准。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateConfig {
    // 并发处理的标的数
    pub concurrency: usize,
    // 每处理多少个标的输出一次进度
    pub progress_every: usize,
    // 单标的超时 (秒)
    pub instrument_timeout_secs: u64,
    // 增量聚合回看的日历天数
    pub lookback: LookbackDays,
}

/// 各周期增量聚合回看的日历天数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LookbackDays {
    pub weekly: u64,
    pub monthly: u64,
    pub quarterly: u64,
    pub semiannual: u64,
    pub annual: u64,
}

impl LookbackDays {
    pub fn for_rule(&self, rule: PeriodRule) -> u64 {
        match rule {
            PeriodRule::Weekly => self.weekly,
            PeriodRule::Monthly => self.monthly,
            PeriodRule::Quarterly => self.quarterly,
            PeriodRule::Semiannual => self.semiannual,
            PeriodRule::Annual => self.annual,
        }
    }
}

/// # Summary
/// 形态扫描配置。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub concurrency: usize,
    // 在形态所需交易日换算出的日历天数之外额外多取的天数，用于吸收节假日
    pub margin_days: u64,
    pub instrument_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogConfig {
    // 日志文件目录，未设置时仅输出到标准输出
    pub dir: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
        }
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: 8,
        }
    }
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            progress_every: 100,
            instrument_timeout_secs: 30,
            lookback: LookbackDays::default(),
        }
    }
}

impl Default for LookbackDays {
    fn default() -> Self {
        Self {
            weekly: PeriodRule::Weekly.default_lookback_days(),
            monthly: PeriodRule::Monthly.default_lookback_days(),
            quarterly: PeriodRule::Quarterly.default_lookback_days(),
            semiannual: PeriodRule::Semiannual.default_lookback_days(),
            annual: PeriodRule::Annual.default_lookback_days(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            margin_days: 40,
            instrument_timeout_secs: 30,
        }
    }
}
