use super::error::StoreError;
use super::port::BarStore;
use crate::bar::entity::{DailyBar, PeriodicBar};
use crate::bar::period::PeriodRule;
use crate::common::Instrument;
use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::{DashMap, DashSet};
use std::collections::BTreeMap;

/// # Summary
/// 基于 DashMap 的内存 K 线存储，供驱动与扫描器的测试注入使用。
///
/// # Invariants
/// - 日线与周期 K 线均以日期为键保存在 `BTreeMap` 中，天然有序且去重。
/// - 被 `fail_on` 标记的代码在读写时返回 `StoreError::Database`，用于模拟单标的故障。
#[derive(Default)]
pub struct MemBarStore {
    instruments: DashMap<String, Instrument>,
    daily: DashMap<String, BTreeMap<NaiveDate, DailyBar>>,
    periodic: DashMap<(PeriodRule, String), BTreeMap<NaiveDate, PeriodicBar>>,
    failing: DashSet<String>,
}

impl MemBarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 令指定代码的所有读写操作失败
    pub fn fail_on(&self, code: &str) {
        self.failing.insert(code.to_string());
    }

    fn check(&self, code: &str) -> Result<(), StoreError> {
        if self.failing.contains(code) {
            return Err(StoreError::Database(format!("injected failure for {}", code)));
        }
        Ok(())
    }
}

#[async_trait]
impl BarStore for MemBarStore {
    async fn read_daily(
        &self,
        code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, StoreError> {
        self.check(code)?;
        Ok(self
            .daily
            .get(code)
            .map(|bars| bars.range(start..=end).map(|(_, b)| b.clone()).collect())
            .unwrap_or_default())
    }

    async fn read_universe(&self, exclude_flagged: bool) -> Result<Vec<Instrument>, StoreError> {
        let mut list: Vec<Instrument> = self
            .instruments
            .iter()
            .map(|e| e.value().clone())
            .filter(|i| !(exclude_flagged && i.is_flagged()))
            .collect();
        list.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(list)
    }

    async fn upsert_periodic(
        &self,
        rule: PeriodRule,
        rows: &[PeriodicBar],
    ) -> Result<usize, StoreError> {
        // 先整体校验，任一标的失败则不写入任何行
        for row in rows {
            self.check(&row.instrument_code)?;
        }
        for row in rows {
            self.periodic
                .entry((rule, row.instrument_code.clone()))
                .or_default()
                .insert(row.period_end_date, row.clone());
        }
        Ok(rows.len())
    }

    async fn read_periodic(
        &self,
        rule: PeriodRule,
        code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PeriodicBar>, StoreError> {
        self.check(code)?;
        Ok(self
            .periodic
            .get(&(rule, code.to_string()))
            .map(|rows| rows.range(start..=end).map(|(_, r)| r.clone()).collect())
            .unwrap_or_default())
    }

    async fn save_instruments(&self, instruments: &[Instrument]) -> Result<(), StoreError> {
        for inst in instruments {
            self.instruments.insert(inst.code.clone(), inst.clone());
        }
        Ok(())
    }

    async fn save_daily_bars(&self, bars: &[DailyBar]) -> Result<(), StoreError> {
        for bar in bars {
            self.daily
                .entry(bar.instrument_code.clone())
                .or_default()
                .insert(bar.trade_date, bar.clone());
        }
        Ok(())
    }
}
