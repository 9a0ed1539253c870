//! 发现能力错误类型定义

use scale_protocol::LinkError;

/// 单帧解析错误
///
/// 只计入解析失败统计，不会中断验证。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("data too short for field {field}: needs {start}+{length}, frame has {frame_len}")]
    FrameTooShort {
        field: String,
        start: usize,
        length: usize,
        frame_len: usize,
    },

    #[error("non-numeric data in field {field}: '{raw}'")]
    NonNumericField { field: String, raw: String },
}

/// 模板验证错误
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// 采样窗口内没有任何帧，置信度按 0 处理
    #[error("no data captured during sample window")]
    NoDataCaptured,

    #[error(transparent)]
    Link(#[from] LinkError),
}

/// 发现会话错误
///
/// 会话内的失败（无数据、取消、持久化失败）都以 `SessionOutcome` 返回；
/// 只有无法开始采集时才返回错误。
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("failed to start data capture: {0}")]
    Link(#[from] LinkError),
}
