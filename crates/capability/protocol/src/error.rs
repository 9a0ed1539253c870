//! 链路错误类型定义

/// 链路通信错误
///
/// 均为可恢复错误：调用方记录后按重连间隔重试。
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// 连接错误
    #[error("connection error: {0}")]
    Connection(String),

    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 超时错误
    #[error("timeout: {0}")]
    Timeout(String),

    /// 未连接
    #[error("not connected")]
    NotConnected,
}
