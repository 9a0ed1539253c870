use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 仪表输出的一行完整文本帧。
///
/// 由链路层组帧后产生，之后不再修改。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub text: String,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    /// 以当前时间作为捕获时间。
    pub fn new(text: impl Into<String>) -> Self {
        Self::at(text, Utc::now())
    }

    pub fn at(text: impl Into<String>, captured_at: DateTime<Utc>) -> Self {
        Self {
            text: text.into(),
            captured_at,
        }
    }

    /// 帧长度（按字符计）。
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// 称重读数。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightReading {
    pub device_id: String,
    pub weight: Option<f64>,
    pub unit: Option<String>,
    pub stable: Option<bool>,
    pub timestamp: DateTime<Utc>,
    pub raw_data: String,
}
