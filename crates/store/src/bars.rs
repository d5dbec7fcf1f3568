use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use kline_core::bar::entity::{DailyBar, PeriodicBar};
use kline_core::bar::period::PeriodRule;
use kline_core::common::Instrument;
use kline_core::store::error::StoreError;
use kline_core::store::port::BarStore;
use sqlx::{
    FromRow, SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// 写锁等待上限，多个工作协程并发提交事务时避免立即返回 SQLITE_BUSY
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

#[derive(FromRow)]
struct InstrumentRow {
    code: String,
    name: String,
    market: String,
}

#[derive(FromRow)]
struct DailyRow {
    code: String,
    trade_date: NaiveDate,
    open: Option<f64>,
    high: f64,
    low: f64,
    close: Option<f64>,
    volume: f64,
    amount: f64,
    change_percent: Option<f64>,
    turnover_rate: Option<f64>,
}

impl From<DailyRow> for DailyBar {
    fn from(r: DailyRow) -> Self {
        DailyBar {
            instrument_code: r.code,
            trade_date: r.trade_date,
            open: r.open,
            high: r.high,
            low: r.low,
            close: r.close,
            volume: r.volume,
            amount: r.amount,
            change_percent: r.change_percent,
            turnover_rate: r.turnover_rate,
        }
    }
}

#[derive(FromRow)]
struct PeriodicRow {
    code: String,
    name: String,
    market: String,
    period_end_date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    amount: f64,
    change_percent: Option<f64>,
    change: Option<f64>,
    amplitude: Option<f64>,
    turnover_rate: Option<f64>,
    source_tag: String,
    generated_at: DateTime<Utc>,
}

impl From<PeriodicRow> for PeriodicBar {
    fn from(r: PeriodicRow) -> Self {
        PeriodicBar {
            instrument_code: r.code,
            instrument_name: r.name,
            market: r.market,
            period_end_date: r.period_end_date,
            open: r.open,
            high: r.high,
            low: r.low,
            close: r.close,
            volume: r.volume,
            amount: r.amount,
            change_percent: r.change_percent,
            change: r.change,
            amplitude: r.amplitude,
            turnover_rate: r.turnover_rate,
            source_tag: r.source_tag,
            generated_at: r.generated_at,
        }
    }
}

/// BarStore 的 SQLite 实现。
///
/// # Summary
/// 在单个 SQLite 数据库 (`kline.db`) 中保存股票池、日线与五张周期 K 线表。
///
/// # Invariants
/// * 数据库结构在存储实例创建时初始化。
/// * 周期表以 `(code, period_end_date)` 为主键，`created_at` 只在首次插入时写入。
/// * 所有操作均通过共享的 `SqlitePool` 执行，每次 upsert 独占一个事务。
pub struct SqliteBarStore {
    pool: SqlitePool,
}

impl SqliteBarStore {
    /// 在配置的数据根目录下创建或打开 `kline.db`。
    ///
    /// # Logic
    /// 1. 获取配置的数据根目录并确保其存在。
    /// 2. 打开数据库并初始化表结构。
    ///
    /// # Returns
    /// * `Result<Self, StoreError>` - 存储实例或初始化错误。
    pub async fn new() -> Result<Self, StoreError> {
        let root = crate::config::get_root_dir();
        std::fs::create_dir_all(&root).map_err(|e| StoreError::InitError(e.to_string()))?;
        Self::open(&root.join(crate::config::DB_FILE)).await
    }

    /// 打开指定路径的数据库文件。
    ///
    /// # Logic
    /// 1. 配置 SQLite 连接选项，开启 `create_if_missing`、WAL 日志与忙等待。
    /// 2. 建立连接池。
    /// 3. 执行 DDL 初始化股票池、日线以及各周期表。
    ///
    /// # Arguments
    /// * `path` - 数据库文件路径。
    ///
    /// # Returns
    /// * `Result<Self, StoreError>`
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|e| StoreError::InitError(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS instruments (
                code TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                market TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS daily_bars (
                code TEXT NOT NULL,
                trade_date DATE NOT NULL,
                open REAL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL,
                volume REAL NOT NULL,
                amount REAL NOT NULL,
                change_percent REAL,
                turnover_rate REAL,
                PRIMARY KEY (code, trade_date)
            );
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| StoreError::InitError(e.to_string()))?;

        for rule in PeriodRule::ALL {
            let ddl = format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    code TEXT NOT NULL,
                    name TEXT NOT NULL,
                    market TEXT NOT NULL,
                    period_end_date DATE NOT NULL,
                    open REAL NOT NULL,
                    high REAL NOT NULL,
                    low REAL NOT NULL,
                    close REAL NOT NULL,
                    volume REAL NOT NULL,
                    amount REAL NOT NULL,
                    change_percent REAL,
                    change REAL,
                    amplitude REAL,
                    turnover_rate REAL,
                    source_tag TEXT NOT NULL,
                    generated_at DATETIME NOT NULL,
                    created_at DATETIME NOT NULL,
                    PRIMARY KEY (code, period_end_date)
                );
                "#,
                table = rule.table_name()
            );
            sqlx::query(&ddl)
                .execute(&pool)
                .await
                .map_err(|e| StoreError::InitError(e.to_string()))?;
        }

        Ok(Self { pool })
    }

    /// 读取周期表中某行的首次创建时间，供运维核对 upsert 行为。
    pub async fn periodic_created_at(
        &self,
        rule: PeriodRule,
        code: &str,
        period_end_date: NaiveDate,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let sql = format!(
            "SELECT created_at FROM {} WHERE code = ? AND period_end_date = ?",
            rule.table_name()
        );
        sqlx::query_scalar::<_, DateTime<Utc>>(&sql)
            .bind(code)
            .bind(period_end_date)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
    }
}

#[async_trait]
impl BarStore for SqliteBarStore {
    /// # Summary
    /// 按日期区间读取日线。
    ///
    /// # Logic
    /// 查询 `daily_bars` 表并按 `trade_date` 升序返回。
    async fn read_daily(
        &self,
        code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, StoreError> {
        let rows = sqlx::query_as::<_, DailyRow>(
            r#"
            SELECT code, trade_date, open, high, low, close, volume, amount, change_percent, turnover_rate
            FROM daily_bars
            WHERE code = ? AND trade_date >= ? AND trade_date <= ?
            ORDER BY trade_date ASC
            "#,
        )
        .bind(code)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(DailyBar::from).collect())
    }

    /// # Summary
    /// 读取股票池。
    ///
    /// # Logic
    /// 查询 `instruments` 表；风险警示的判断依赖名称规则，在内存中过滤。
    async fn read_universe(&self, exclude_flagged: bool) -> Result<Vec<Instrument>, StoreError> {
        let rows = sqlx::query_as::<_, InstrumentRow>(
            "SELECT code, name, market FROM instruments ORDER BY code ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|r| Instrument {
                code: r.code,
                name: r.name,
                market: r.market,
            })
            .filter(|i| !(exclude_flagged && i.is_flagged()))
            .collect())
    }

    /// # Summary
    /// 在单个事务中 upsert 周期 K 线。
    ///
    /// # Logic
    /// 1. 开启事务。
    /// 2. 逐行执行 `INSERT .. ON CONFLICT DO UPDATE`，冲突时保留 `created_at`。
    /// 3. 提交；中途失败时事务随 `Transaction` 析构自动回滚。
    async fn upsert_periodic(
        &self,
        rule: PeriodRule,
        rows: &[PeriodicBar],
    ) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            r#"
            INSERT INTO {} (
                code, name, market, period_end_date, open, high, low, close, volume, amount,
                change_percent, change, amplitude, turnover_rate, source_tag, generated_at, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (code, period_end_date) DO UPDATE SET
                name = excluded.name,
                market = excluded.market,
                open = excluded.open,
                high = excluded.high,
                low = excluded.low,
                close = excluded.close,
                volume = excluded.volume,
                amount = excluded.amount,
                change_percent = excluded.change_percent,
                change = excluded.change,
                amplitude = excluded.amplitude,
                turnover_rate = excluded.turnover_rate,
                source_tag = excluded.source_tag,
                generated_at = excluded.generated_at
            "#,
            rule.table_name()
        );

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for row in rows {
            sqlx::query(&sql)
                .bind(&row.instrument_code)
                .bind(&row.instrument_name)
                .bind(&row.market)
                .bind(row.period_end_date)
                .bind(row.open)
                .bind(row.high)
                .bind(row.low)
                .bind(row.close)
                .bind(row.volume)
                .bind(row.amount)
                .bind(row.change_percent)
                .bind(row.change)
                .bind(row.amplitude)
                .bind(row.turnover_rate)
                .bind(&row.source_tag)
                .bind(row.generated_at)
                .bind(row.generated_at)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;

        debug!("Upserted {} rows into {}", rows.len(), rule.table_name());
        Ok(rows.len())
    }

    async fn read_periodic(
        &self,
        rule: PeriodRule,
        code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PeriodicBar>, StoreError> {
        let sql = format!(
            r#"
            SELECT code, name, market, period_end_date, open, high, low, close, volume, amount,
                   change_percent, change, amplitude, turnover_rate, source_tag, generated_at
            FROM {}
            WHERE code = ? AND period_end_date >= ? AND period_end_date <= ?
            ORDER BY period_end_date ASC
            "#,
            rule.table_name()
        );
        let rows = sqlx::query_as::<_, PeriodicRow>(&sql)
            .bind(code)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(rows.into_iter().map(PeriodicBar::from).collect())
    }

    /// # Summary
    /// 保存股票池。
    ///
    /// # Logic
    /// 在 `instruments` 表上执行 `INSERT OR REPLACE`。
    async fn save_instruments(&self, instruments: &[Instrument]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for inst in instruments {
            sqlx::query("INSERT OR REPLACE INTO instruments (code, name, market) VALUES (?, ?, ?)")
                .bind(&inst.code)
                .bind(&inst.name)
                .bind(&inst.market)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)
    }

    /// # Summary
    /// 保存日线。
    ///
    /// # Logic
    /// 在 `daily_bars` 表上执行 `INSERT OR REPLACE`，同一交易日重复写入以最后一次为准。
    async fn save_daily_bars(&self, bars: &[DailyBar]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for bar in bars {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO daily_bars
                    (code, trade_date, open, high, low, close, volume, amount, change_percent, turnover_rate)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&bar.instrument_code)
            .bind(bar.trade_date)
            .bind(bar.open)
            .bind(bar.high)
            .bind(bar.low)
            .bind(bar.close)
            .bind(bar.volume)
            .bind(bar.amount)
            .bind(bar.change_percent)
            .bind(bar.turnover_rate)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)
    }
}
