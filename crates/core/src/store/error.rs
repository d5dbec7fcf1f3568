use thiserror::Error;

/// # Summary
/// K 线存储层错误，覆盖连接、读写与事务。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
/// - 批处理驱动把任意 `StoreError` 视为单标的失败，不中断整批。
#[derive(Error, Debug)]
pub enum StoreError {
    /// 数据库操作失败 (连接、SQL 执行、事务提交)
    #[error("Database error: {0}")]
    Database(String),
    /// 标的不存在于股票池
    #[error("Instrument not found: {0}")]
    NotFound(String),
    /// 初始化存储失败 (目录、建表)
    #[error("Initialization error: {0}")]
    InitError(String),
}
