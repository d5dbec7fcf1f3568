use kline_core::store::error::StoreError;
use thiserror::Error;

/// # Summary
/// 形态判定错误，由纯函数谓词返回。
///
/// # Invariants
/// - `InvalidValue` 不会穿出谓词边界：谓词将其折算为 "未命中"。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PatternError {
    #[error("Insufficient data: need {need} bars, got {got}")]
    InsufficientData { need: usize, got: usize },

    #[error("Invalid value at offset {offset}: {reason}")]
    InvalidValue { offset: usize, reason: &'static str },
}

/// # Summary
/// 选股扫描域错误。
///
/// # Invariants
/// - `UnknownPredicate` 属于调用方配置错误，立即上抛。
/// - 其余变体只影响单个标的，批量扫描将其跳过并继续。
#[derive(Error, Debug)]
pub enum ScreenError {
    #[error("Unknown predicate: {0}")]
    UnknownPredicate(String),
    #[error("Insufficient data for {code}: need {need} bars, got {got}")]
    DataInsufficient {
        code: String,
        need: usize,
        got: usize,
    },
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Scan timed out for {0}")]
    Timeout(String),
}
