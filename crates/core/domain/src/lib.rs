//! 称重仪表协议发现的共享领域模型。

pub mod data;
pub mod discovery;
pub mod template;

pub use data::{Frame, WeightReading};
pub use discovery::{DiscoveryStep, StepAction};
pub use template::{
    DiscoveryMethod, FieldKind, ManufacturerInfo, ProtocolField, ProtocolTemplate,
    DEFAULT_DELIMITER, DEFAULT_ENCODING, UNKNOWN_BRAND,
};

use chrono::{DateTime, Utc};

/// 当前 UTC 时间。
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}
