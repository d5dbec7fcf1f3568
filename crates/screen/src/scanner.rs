use crate::error::{PatternError, ScreenError};
use crate::pattern::{PatternKind, PatternMatch};
use crate::window::change_percent_at;
use chrono::{Days, NaiveDate};
use futures::StreamExt;
use kline_core::common::Instrument;
use kline_core::common::time::TimeProvider;
use kline_core::config::ScanConfig;
use kline_core::store::port::BarStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 扫描范围过滤条件
#[derive(Debug, Clone, Default)]
pub struct UniverseFilter {
    // 剔除名称带风险警示标记的标的
    pub exclude_flagged: bool,
    // 仅扫描指定代码，为空时扫描全部股票池
    pub codes: Option<Vec<String>>,
}

/// # Summary
/// 一次全市场扫描的结果。
///
/// # Invariants
/// - `matched + skipped + failed + 未命中数 == scanned`。
/// - `matches` 按主指标降序排列，长度不超过调用方给定的上限。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanReport {
    pub pattern: PatternKind,
    pub as_of: NaiveDate,
    pub scanned: usize,
    // 截断前的命中数
    pub matched: usize,
    // 日线不足最小窗口而跳过的标的数
    pub skipped: usize,
    pub failed: usize,
    pub matches: Vec<PatternMatch>,
}

enum Outcome {
    Matched(PatternMatch),
    NoMatch,
    Skipped,
    Failed,
}

/// # Summary
/// 全市场形态扫描器：遍历股票池，读取每个标的的近期日线并执行形态谓词。
///
/// # Invariants
/// - 只读，不产生任何写入。
/// - 单标的读取失败或超时只计入失败，扫描继续。
pub struct Scanner {
    store: Arc<dyn BarStore>,
    clock: Arc<dyn TimeProvider>,
    config: ScanConfig,
}

impl Scanner {
    pub fn new(store: Arc<dyn BarStore>, clock: Arc<dyn TimeProvider>, config: ScanConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// # Summary
    /// 形态所需交易日换算成的日历回看天数。
    ///
    /// # Logic
    /// 每 5 个交易日折算 7 个日历日，再加上 `margin_days` 吸收节假日。
    pub fn lookback_days(&self, kind: PatternKind) -> u64 {
        let bars = u64::try_from(kind.history_bars()).unwrap_or(u64::MAX);
        (bars.saturating_mul(7) / 5).saturating_add(self.config.margin_days)
    }

    /// # Summary
    /// 按名称解析形态后执行扫描；未知名称立即返回错误。
    pub async fn scan_by_name(
        &self,
        name: &str,
        filter: &UniverseFilter,
        limit: Option<usize>,
    ) -> Result<ScanReport, ScreenError> {
        let kind: PatternKind = name.parse()?;
        self.scan(kind, filter, limit).await
    }

    /// # Summary
    /// 对股票池执行一次形态扫描。
    ///
    /// # Logic
    /// 1. 按过滤条件读取股票池。
    /// 2. 以有界并发逐标的读取日线并判定，单标的受超时约束。
    /// 3. 命中结果按主指标降序排列后截断到 `limit`。
    ///
    /// # Returns
    /// * 仅在股票池读取失败时返回错误。
    pub async fn scan(
        &self,
        kind: PatternKind,
        filter: &UniverseFilter,
        limit: Option<usize>,
    ) -> Result<ScanReport, ScreenError> {
        let mut universe = self.store.read_universe(filter.exclude_flagged).await?;
        if let Some(codes) = &filter.codes {
            universe.retain(|inst| codes.contains(&inst.code));
        }

        let as_of = self.clock.today();
        info!(
            "[{}] scan started over {} instruments, lookback {} days",
            kind,
            universe.len(),
            self.lookback_days(kind)
        );

        let timeout = Duration::from_secs(self.config.instrument_timeout_secs.max(1));
        let scanned = universe.len();
        let outcomes: Vec<Outcome> = futures::stream::iter(universe)
            .map(|inst| async move {
                match tokio::time::timeout(timeout, self.evaluate_instrument(kind, &inst)).await {
                    Ok(Ok(Some(found))) => Outcome::Matched(found),
                    Ok(Ok(None)) => Outcome::NoMatch,
                    Ok(Err(ScreenError::DataInsufficient { code, need, got })) => {
                        debug!("[{}] {} skipped: {} of {} bars", kind, code, got, need);
                        Outcome::Skipped
                    }
                    Ok(Err(e)) => {
                        warn!("[{}] {} failed: {}", kind, inst.code, e);
                        Outcome::Failed
                    }
                    Err(_) => {
                        warn!("[{}] {}", kind, ScreenError::Timeout(inst.code.clone()));
                        Outcome::Failed
                    }
                }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut matches = Vec::new();
        let (mut skipped, mut failed) = (0, 0);
        for outcome in outcomes {
            match outcome {
                Outcome::Matched(found) => matches.push(found),
                Outcome::NoMatch => {}
                Outcome::Skipped => skipped += 1,
                Outcome::Failed => failed += 1,
            }
        }

        matches.sort_by(|a, b| {
            b.evidence
                .primary_metric()
                .total_cmp(&a.evidence.primary_metric())
                .then_with(|| a.instrument_code.cmp(&b.instrument_code))
        });
        let matched = matches.len();
        if let Some(limit) = limit {
            matches.truncate(limit);
        }

        info!(
            "[{}] scan finished: scanned={}, matched={}, skipped={}, failed={}",
            kind, scanned, matched, skipped, failed
        );
        Ok(ScanReport {
            pattern: kind,
            as_of,
            scanned,
            matched,
            skipped,
            failed,
            matches,
        })
    }

    /// # Summary
    /// 对单个标的执行形态判定。
    ///
    /// # Logic
    /// 1. 读取 `[today - lookback, today]` 的升序日线并反转为降序窗口。
    /// 2. 窗口不足 `min_window` 时返回 `DataInsufficient`。
    /// 3. 命中时以窗口最近一根作为结果的基准日与基准价。
    ///
    /// # Returns
    /// * `Ok(None)` 表示未命中；存储错误原样上抛。
    pub async fn evaluate_instrument(
        &self,
        kind: PatternKind,
        instrument: &Instrument,
    ) -> Result<Option<PatternMatch>, ScreenError> {
        let today = self.clock.today();
        let start = today
            .checked_sub_days(Days::new(self.lookback_days(kind)))
            .unwrap_or(NaiveDate::MIN);

        let mut window = self.store.read_daily(&instrument.code, start, today).await?;
        window.reverse();

        let insufficient = |got: usize| ScreenError::DataInsufficient {
            code: instrument.code.clone(),
            need: kind.min_window(),
            got,
        };
        if window.len() < kind.min_window() {
            return Err(insufficient(window.len()));
        }

        let evidence = match kind.evaluate(&window) {
            Ok(Some(evidence)) => evidence,
            Ok(None) | Err(PatternError::InvalidValue { .. }) => return Ok(None),
            Err(PatternError::InsufficientData { got, .. }) => return Err(insufficient(got)),
        };

        let Some((latest, as_of_price)) = window
            .first()
            .and_then(|bar| bar.close.map(|close| (bar, close)))
        else {
            return Ok(None);
        };

        Ok(Some(PatternMatch {
            instrument_code: instrument.code.clone(),
            instrument_name: instrument.name.clone(),
            as_of_date: latest.trade_date,
            as_of_price,
            as_of_change_percent: change_percent_at(&window, 0),
            evidence,
        }))
    }
}
