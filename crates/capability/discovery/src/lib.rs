//! # 协议发现能力模块
//!
//! - **模板验证**（`validator`）：用实时采样检验模板，输出置信度
//! - **发现流程**（`orchestrator`）：阶段一模板匹配，阶段二交互式称重发现
//! - **操作员边界**（`operator`）：进度显示与就绪/取消信号
//!
//! 帧只通过 `scale_protocol::FrameSource` 读取，模板通过
//! `scale_storage::TemplateStore` 持久化，测试中两者都可替换。

mod error;
mod operator;
mod orchestrator;
mod validator;

pub use error::{DiscoveryError, ParseError, ValidationError};
pub use operator::{Operator, OperatorSignal};
pub use orchestrator::{
    DISCOVERED_TEMPLATE_NAME, DiscoveryConfig, DiscoveryOrchestrator, Phase, RunningConfidence,
    SessionOutcome, TemplateMatch, accepted_copy, running_confidence, synthesize_template,
};
pub use validator::{
    ConfidenceResult, FieldValue, MAX_ERROR_SAMPLES, ParsedFrame, Rating, TemplateValidator,
    display_value, parse_with_template, score_frames,
};
