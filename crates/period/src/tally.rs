use kline_core::bar::period::PeriodRule;
use serde::Serialize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// # Summary
/// 一次批量聚合的结果汇总。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateSummary {
    pub rule: PeriodRule,
    // 参与本批次的标的数
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    // 因取消信号而未开始处理的标的数
    pub cancelled: usize,
    // 写入的周期 K 线行数
    pub generated_rows: usize,
    // 失败标的代码，按代码排序
    pub failed_codes: Vec<String>,
}

/// # Summary
/// 线程安全的批处理计数器，供并发工作协程共享。
///
/// # Invariants
/// - `success + failed + cancelled` 等于已处理的标的数。
/// - 失败代码列表只在失败路径上加锁。
pub struct BatchTally {
    rule: PeriodRule,
    total: usize,
    processed: AtomicUsize,
    success: AtomicUsize,
    failed: AtomicUsize,
    cancelled: AtomicUsize,
    rows: AtomicUsize,
    failed_codes: Mutex<Vec<String>>,
}

impl BatchTally {
    pub fn new(rule: PeriodRule, total: usize) -> Self {
        Self {
            rule,
            total,
            processed: AtomicUsize::new(0),
            success: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
            rows: AtomicUsize::new(0),
            failed_codes: Mutex::new(Vec::new()),
        }
    }

    /// 记录一个成功的标的，返回累计已处理数
    pub fn record_success(&self, rows: usize) -> usize {
        self.success.fetch_add(1, Ordering::Relaxed);
        self.rows.fetch_add(rows, Ordering::Relaxed);
        self.processed.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// 记录一个失败的标的，返回累计已处理数
    pub fn record_failure(&self, code: &str) -> usize {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.failed_codes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(code.to_string());
        self.processed.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// 记录一个被取消的标的，返回累计已处理数
    pub fn record_cancelled(&self) -> usize {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
        self.processed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn success(&self) -> usize {
        self.success.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn rows(&self) -> usize {
        self.rows.load(Ordering::Relaxed)
    }

    /// # Summary
    /// 结束计数并生成汇总。
    pub fn into_summary(self) -> AggregateSummary {
        let mut failed_codes = self.failed_codes.into_inner().unwrap_or_else(|e| e.into_inner());
        failed_codes.sort();
        AggregateSummary {
            rule: self.rule,
            total: self.total,
            success: self.success.into_inner(),
            failed: self.failed.into_inner(),
            cancelled: self.cancelled.into_inner(),
            generated_rows: self.rows.into_inner(),
            failed_codes,
        }
    }
}
