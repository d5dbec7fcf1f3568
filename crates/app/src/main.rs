use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use kline_core::common::time::{RealTimeProvider, TimeProvider, offset_from_hours};
use kline_core::store::port::BarStore;
use kline_period::driver::PeriodDriver;
use kline_screen::scanner::{Scanner, UniverseFilter};
use kline_store::bars::SqliteBarStore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod logging;
mod settings;

#[derive(Parser)]
#[command(name = "kline")]
#[command(about = "Daily bar period aggregation and pattern screening", long_about = None)]
#[command(version)]
struct Cli {
    /// 配置文件路径，未指定时读取当前目录下可选的 kline.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 将指定区间的日线聚合为周期 K 线并回写
    Aggregate {
        /// 周期规则 (weekly, monthly, quarterly, semiannual, annual)
        #[arg(short, long)]
        rule: String,

        /// 起始日期 (YYYY-MM-DD)
        #[arg(short = 'f', long)]
        from: NaiveDate,

        /// 截止日期 (YYYY-MM-DD)，默认今天
        #[arg(short, long)]
        to: Option<NaiveDate>,

        /// 仅处理这些代码，逗号分隔
        #[arg(long, value_delimiter = ',')]
        codes: Vec<String>,
    },

    /// 对全部周期规则重算当前未收盘的周期
    Current {
        /// 仅处理这些代码，逗号分隔
        #[arg(long, value_delimiter = ',')]
        codes: Vec<String>,
    },

    /// 按形态扫描股票池并输出命中结果
    Scan {
        /// 形态名称 (high_tight_flag, keep_increasing, long_lower_shadow, low_nine)
        #[arg(short, long)]
        pattern: String,

        /// 最多输出的命中数
        #[arg(short, long)]
        limit: Option<usize>,

        /// 剔除风险警示标的
        #[arg(long, default_value = "false")]
        exclude_flagged: bool,

        /// 仅扫描这些代码，逗号分隔
        #[arg(long, value_delimiter = ',')]
        codes: Vec<String>,
    },
}

/// 收到 Ctrl-C 后取消尚未开始的标的，进行中的标的会完整结束
fn watch_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Shutdown signal received, finishing in-flight instruments...");
            token.cancel();
        }
    });
}

fn non_empty(codes: Vec<String>) -> Option<Vec<String>> {
    if codes.is_empty() { None } else { Some(codes) }
}

/// # Summary
/// 应用启动入口，同时也是 DI 容器。
///
/// # Logic
/// 1. 加载分层配置并初始化日志。
/// 2. 实例化基础设施层 (SQLite 存储、按市场时区计算日期的系统时钟)。
/// 3. 按子命令构造聚合驱动或扫描器并执行。
/// 4. 结果以 JSON 输出到标准输出。
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 1. 配置与日志
    let config = settings::load(cli.config.as_deref())?;
    let _log_guard = logging::init(&config.log)?;
    info!("kline starting, data dir: {}", config.database.data_dir);

    // 2. 基础设施层
    if !kline_store::config::set_root_dir(PathBuf::from(&config.database.data_dir)) {
        warn!("Store root dir was already set, ignoring {}", config.database.data_dir);
    }
    let store: Arc<dyn BarStore> = Arc::new(SqliteBarStore::new().await?);
    let offset = offset_from_hours(config.market.utc_offset_hours).ok_or_else(|| {
        anyhow::anyhow!("invalid market.utc_offset_hours: {}", config.market.utc_offset_hours)
    })?;
    let clock: Arc<dyn TimeProvider> = Arc::new(RealTimeProvider::new(offset));

    // 3. 执行子命令
    match cli.command {
        Commands::Aggregate {
            rule,
            from,
            to,
            codes,
        } => {
            let driver = PeriodDriver::new(store, clock.clone(), config.aggregate);
            watch_ctrl_c(driver.cancel_token());
            let codes = non_empty(codes);
            let summary = driver
                .aggregate_by_name(&rule, from, to.unwrap_or_else(|| clock.today()), codes.as_deref())
                .await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Current { codes } => {
            let driver = PeriodDriver::new(store, clock, config.aggregate);
            watch_ctrl_c(driver.cancel_token());
            let codes = non_empty(codes);
            let summaries = driver.aggregate_current_period(codes.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&summaries)?);
        }
        Commands::Scan {
            pattern,
            limit,
            exclude_flagged,
            codes,
        } => {
            let scanner = Scanner::new(store, clock, config.scan);
            let filter = UniverseFilter {
                exclude_flagged,
                codes: non_empty(codes),
            };
            let report = scanner.scan_by_name(&pattern, &filter, limit).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    info!("kline finished");
    Ok(())
}
