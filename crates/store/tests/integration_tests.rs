use chrono::{Duration, NaiveDate, TimeZone, Utc};
use kline_core::bar::entity::{DailyBar, PeriodicBar};
use kline_core::bar::period::PeriodRule;
use kline_core::common::Instrument;
use kline_core::store::error::StoreError;
use kline_core::store::port::BarStore;
use kline_store::bars::SqliteBarStore;
use kline_store::config::{DB_FILE, set_root_dir};
use tempfile::tempdir;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn daily(code: &str, date: NaiveDate, close: f64) -> DailyBar {
    DailyBar {
        instrument_code: code.to_string(),
        trade_date: date,
        open: Some(close - 0.1),
        high: close + 0.2,
        low: close - 0.3,
        close: Some(close),
        volume: 1000.0,
        amount: 10000.0,
        change_percent: None,
        turnover_rate: Some(0.5),
    }
}

fn weekly_row(code: &str, end: NaiveDate, close: f64) -> PeriodicBar {
    PeriodicBar {
        instrument_code: code.to_string(),
        instrument_name: "平安银行".to_string(),
        market: "SZ".to_string(),
        period_end_date: end,
        open: 10.0,
        high: 11.0,
        low: 9.5,
        close,
        volume: 5000.0,
        amount: 52000.0,
        change_percent: None,
        change: None,
        amplitude: None,
        turnover_rate: Some(2.5),
        source_tag: "daily_rollup".to_string(),
        generated_at: Utc.with_ymd_and_hms(2024, 1, 5, 16, 0, 0).unwrap(),
    }
}

#[tokio::test]
async fn test_store_full_integration() {
    // 1. 初始化临时测试环境
    let tmp_dir = tempdir().expect("Failed to create temp dir");
    let root_path = tmp_dir.path().to_path_buf();
    assert!(set_root_dir(root_path.clone()));

    let store = SqliteBarStore::new().await.expect("Failed to create store");
    assert!(root_path.join(DB_FILE).exists());

    // 2. 股票池
    store
        .save_instruments(&[
            Instrument::new("000001", "平安银行", "SZ"),
            Instrument::new("600001", "*ST 某某", "SH"),
        ])
        .await
        .unwrap();
    assert_eq!(store.read_universe(false).await.unwrap().len(), 2);
    let clean = store.read_universe(true).await.unwrap();
    assert_eq!(clean.len(), 1);
    assert_eq!(clean[0].code, "000001");

    // 3. 日线乱序写入，升序读出，区间闭合
    let bars = vec![
        daily("000001", d(2024, 1, 3), 10.3),
        daily("000001", d(2024, 1, 2), 10.2),
        daily("000001", d(2024, 1, 4), 10.4),
    ];
    store.save_daily_bars(&bars).await.unwrap();
    let loaded = store
        .read_daily("000001", d(2024, 1, 2), d(2024, 1, 3))
        .await
        .unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0].trade_date, d(2024, 1, 2));
    assert_eq!(loaded[1].close, Some(10.3));
    assert_eq!(loaded[1].turnover_rate, Some(0.5));

    // 无数据的标的返回空列表而非错误
    let empty = store
        .read_daily("600001", d(2024, 1, 1), d(2024, 1, 31))
        .await
        .unwrap();
    assert!(empty.is_empty());
}

#[tokio::test]
async fn test_upsert_periodic_keeps_created_at() {
    let tmp_dir = tempdir().unwrap();
    let store = SqliteBarStore::open(&tmp_dir.path().join("upsert.db"))
        .await
        .unwrap();

    let first = weekly_row("000001", d(2024, 1, 5), 10.8);
    assert_eq!(
        store.upsert_periodic(PeriodRule::Weekly, &[first.clone()]).await.unwrap(),
        1
    );
    let created = store
        .periodic_created_at(PeriodRule::Weekly, "000001", d(2024, 1, 5))
        .await
        .unwrap()
        .expect("row should exist");

    // 重新生成：覆盖收盘价与生成时间，主键不变
    let mut second = first.clone();
    second.close = 10.9;
    second.change_percent = Some(1.23);
    second.generated_at = first.generated_at + Duration::hours(2);
    store.upsert_periodic(PeriodRule::Weekly, &[second.clone()]).await.unwrap();

    let rows = store
        .read_periodic(PeriodRule::Weekly, "000001", d(2024, 1, 1), d(2024, 12, 31))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0], second);

    let created_again = store
        .periodic_created_at(PeriodRule::Weekly, "000001", d(2024, 1, 5))
        .await
        .unwrap();
    assert_eq!(created_again, Some(created));

    // 不同周期表互不影响
    let monthly = store
        .read_periodic(PeriodRule::Monthly, "000001", d(2024, 1, 1), d(2024, 12, 31))
        .await
        .unwrap();
    assert!(monthly.is_empty());
}

#[tokio::test]
async fn test_upsert_periodic_is_idempotent() {
    let tmp_dir = tempdir().unwrap();
    let store = SqliteBarStore::open(&tmp_dir.path().join("idem.db"))
        .await
        .unwrap();

    let rows = vec![
        weekly_row("000001", d(2024, 1, 5), 10.8),
        weekly_row("000001", d(2024, 1, 12), 11.2),
    ];
    store.upsert_periodic(PeriodRule::Weekly, &rows).await.unwrap();
    store.upsert_periodic(PeriodRule::Weekly, &rows).await.unwrap();

    let loaded = store
        .read_periodic(PeriodRule::Weekly, "000001", d(2024, 1, 1), d(2024, 1, 31))
        .await
        .unwrap();
    assert_eq!(loaded, rows);
    assert_eq!(store.upsert_periodic(PeriodRule::Weekly, &[]).await.unwrap(), 0);
}

#[tokio::test]
async fn test_failed_upsert_rolls_back_whole_call() {
    let tmp_dir = tempdir().unwrap();
    let store = SqliteBarStore::open(&tmp_dir.path().join("rollback.db"))
        .await
        .unwrap();

    let other = vec![
        weekly_row("000002", d(2024, 1, 5), 20.1),
        weekly_row("000002", d(2024, 1, 12), 20.4),
    ];
    store.upsert_periodic(PeriodRule::Weekly, &other).await.unwrap();
    let existing = weekly_row("000001", d(2024, 1, 5), 10.8);
    store.upsert_periodic(PeriodRule::Weekly, &[existing.clone()]).await.unwrap();

    // 第三行的 NaN 成交量以 NULL 绑定，触发 NOT NULL 约束
    let mut updated = existing.clone();
    updated.close = 99.0;
    let mut broken = weekly_row("000001", d(2024, 1, 19), 11.5);
    broken.volume = f64::NAN;
    let batch = vec![updated, weekly_row("000001", d(2024, 1, 12), 11.2), broken];

    let err = store
        .upsert_periodic(PeriodRule::Weekly, &batch)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Database(msg) if msg.contains("NOT NULL")));

    // 本次调用的所有写入都被回滚，已有行保持原值
    let own = store
        .read_periodic(PeriodRule::Weekly, "000001", d(2024, 1, 1), d(2024, 12, 31))
        .await
        .unwrap();
    assert_eq!(own, vec![existing]);

    // 其他标的不受影响
    let untouched = store
        .read_periodic(PeriodRule::Weekly, "000002", d(2024, 1, 1), d(2024, 12, 31))
        .await
        .unwrap();
    assert_eq!(untouched, other);
}
