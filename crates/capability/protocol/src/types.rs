//! 链路相关类型定义

use chrono::{DateTime, Utc};
use serde::Serialize;

/// TCP 链路生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    /// 最近一次连接尝试失败；不阻止后续重连
    Faulted,
}

/// 仪表文本编码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    /// ASCII，非 ASCII 字节回退为 Latin-1
    #[default]
    Ascii,
    /// UTF-8，非法序列回退为 Latin-1
    Utf8,
    /// 单字节编码，总能解码
    Latin1,
}

impl TextEncoding {
    /// 解析编码名称（大小写不敏感）
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "ascii" | "us-ascii" => Some(Self::Ascii),
            "utf-8" | "utf8" => Some(Self::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" => Some(Self::Latin1),
            _ => None,
        }
    }
}

/// 链路健康快照（供外部监控）
#[derive(Debug, Clone, Serialize)]
pub struct LinkHealth {
    pub connected: bool,
    pub state: LinkState,
    pub consecutive_failures: u32,
    pub last_successful_read: Option<DateTime<Utc>>,
    pub seconds_since_last_read: Option<f64>,
    pub buffer_size: usize,
}
