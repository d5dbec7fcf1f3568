use config::{Config, ConfigError, Environment, File};
use kline_core::config::AppConfig;
use std::path::Path;

/// 未显式指定配置文件时查找的文件名 (不含扩展名)
const DEFAULT_CONFIG_NAME: &str = "kline";
const ENV_PREFIX: &str = "KLINE";

/// # Summary
/// 按层级加载应用配置。
///
/// # Logic
/// 1. 以 `AppConfig` 的默认值为底。
/// 2. 叠加配置文件：指定了 `path` 时必须存在，否则尝试可选的 `kline.toml`。
/// 3. 叠加 `KLINE__` 前缀的环境变量 (例如 `KLINE__SCAN__CONCURRENCY=8`)。
///
/// # Arguments
/// * `path` - 命令行指定的配置文件路径。
pub fn load(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let file = match path {
        Some(p) => File::from(p).required(true),
        None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
    };

    Config::builder()
        .add_source(file)
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()
}
