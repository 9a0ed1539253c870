use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 交互式发现中的操作类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    Baseline,
    AddWeight,
    RemoveWeight,
}

/// 交互式发现的一步：一次采样窗口内捕获的帧。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryStep {
    pub step_number: u32,
    pub action: StepAction,
    pub expected_weight: Option<f64>,
    pub frames: Vec<String>,
    pub captured_at: DateTime<Utc>,
}
