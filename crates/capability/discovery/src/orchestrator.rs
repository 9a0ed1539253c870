//! 两阶段协议发现
//!
//! ```text
//! Idle → MatchingTemplates ─┬─ best ≥ threshold ─────────────────────────→ Accepted(阶段一)
//!                           └─ InteractiveBaseline → InteractiveWeightSteps
//!                                → Synthesizing ─────────────────────────→ Accepted(阶段二)
//! 任一等待点取消 → Cancelled；基线无数据 → NoData
//! ```
//!
//! 阶段一按目录顺序逐个验证模板，得分 ≥ 95 立即停止；最佳得分达到阈值即接受。
//! 阶段二引导操作员依次放置砝码，每步后计算运行置信度：
//! 含 CR/LF 的帧比例与含数字的帧比例的平均值，超过阈值提前结束；
//! 最后以首个步骤的帧合成单字段模板。

use crate::error::{DiscoveryError, ValidationError};
use crate::operator::{Operator, OperatorSignal};
use crate::validator::{ConfidenceResult, TemplateValidator};
use chrono::{DateTime, Utc};
use domain::{
    DEFAULT_DELIMITER, DEFAULT_ENCODING, DiscoveryMethod, DiscoveryStep, ProtocolField,
    ProtocolTemplate, StepAction,
};
use regex::Regex;
use scale_catalog::TemplateCatalog;
use scale_protocol::FrameSource;
use scale_storage::TemplateStore;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{Instrument, info, info_span, warn};

/// 合成模板的默认名称
pub const DISCOVERED_TEMPLATE_NAME: &str = "Auto-Discovered Scale Protocol";
/// 没有任何帧可参考时合成字段的长度
const FALLBACK_FIELD_LENGTH: usize = 10;
/// 阶段一汇总展示的条数
const SUMMARY_LIMIT: usize = 5;

/// 发现流程参数
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// 接受阈值（0..=100）
    pub confidence_threshold: f64,
    /// 阶段一达到该分数即停止继续测试
    pub early_accept_score: f64,
    pub template_sample: Duration,
    pub baseline_sample: Duration,
    pub step_sample: Duration,
    /// 建议的测试砝码（kg）
    pub test_weights: Vec<f64>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 85.0,
            early_accept_score: 95.0,
            template_sample: Duration::from_secs(5),
            baseline_sample: Duration::from_secs(5),
            step_sample: Duration::from_secs(3),
            test_weights: vec![1.0, 5.0, 10.0, 2.5],
        }
    }
}

/// 模板的产生阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    TemplateMatching,
    Interactive,
}

/// 会话结果
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Accepted {
        template: ProtocolTemplate,
        phase: Phase,
        /// 保存成功的存储后端
        persisted: Vec<&'static str>,
    },
    Cancelled,
    /// 基线采样没有收到任何帧
    NoData,
    NoTemplate,
}

/// 阶段一中单个模板的测试记录
#[derive(Debug, Clone)]
pub struct TemplateMatch {
    pub template_id: String,
    pub template_name: String,
    pub brand: String,
    pub confidence: f64,
    /// 无数据或链路失败时为空
    pub result: Option<ConfidenceResult>,
}

/// 阶段二的运行置信度
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunningConfidence {
    pub format: f64,
    pub numeric: f64,
    pub overall: f64,
}

fn numeric_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d+\.?\d*").expect("numeric pattern is valid"))
}

/// 汇总全部步骤的帧计算运行置信度；少于 2 个步骤时不计算
pub fn running_confidence(steps: &[DiscoveryStep]) -> Option<RunningConfidence> {
    if steps.len() < 2 {
        return None;
    }
    let frames: Vec<&str> = steps
        .iter()
        .flat_map(|step| step.frames.iter().map(String::as_str))
        .collect();
    if frames.is_empty() {
        return None;
    }
    let total = frames.len() as f64;
    let with_line_break = frames
        .iter()
        .filter(|frame| frame.contains(['\r', '\n']))
        .count();
    let with_number = frames
        .iter()
        .filter(|frame| numeric_pattern().is_match(frame))
        .count();
    let format = with_line_break as f64 / total * 100.0;
    let numeric = with_number as f64 / total * 100.0;
    Some(RunningConfidence {
        format,
        numeric,
        overall: (format + numeric) / 2.0,
    })
}

/// 由首个步骤的帧合成单字段模板；没有步骤时返回 `None`
pub fn synthesize_template(
    steps: &[DiscoveryStep],
    confidence: f64,
    now: DateTime<Utc>,
) -> Option<ProtocolTemplate> {
    let first = steps.first()?;
    let length = first
        .frames
        .first()
        .map(|frame| frame.chars().count())
        .filter(|&len| len > 0)
        .unwrap_or(FALLBACK_FIELD_LENGTH);

    Some(ProtocolTemplate {
        template_id: format!("discovered_{}", now.timestamp()),
        name: DISCOVERED_TEMPLATE_NAME.to_string(),
        description: format!("Discovered on {}", now.to_rfc3339()),
        delimiter: DEFAULT_DELIMITER.to_string(),
        encoding: DEFAULT_ENCODING.to_string(),
        fields: vec![ProtocolField {
            decimal_places: Some(2),
            ..ProtocolField::numeric("weight", 0, length)
        }],
        confidence_score: confidence,
        discovery_date: Some(now),
        discovery_method: Some(DiscoveryMethod::Interactive),
        original_template: None,
        manufacturer_info: None,
    })
}

/// 阶段一接受的模板另存为一份带发现信息的副本
pub fn accepted_copy(original: &ProtocolTemplate, confidence: f64, now: DateTime<Utc>) -> ProtocolTemplate {
    ProtocolTemplate {
        template_id: format!("matched_{}_{}", original.template_id, now.timestamp()),
        confidence_score: confidence,
        discovery_date: Some(now),
        discovery_method: Some(DiscoveryMethod::TemplateMatching),
        original_template: Some(original.template_id.clone()),
        ..original.clone()
    }
}

fn status_marker(confidence: f64, threshold: f64) -> &'static str {
    if confidence >= threshold {
        "✅"
    } else if confidence >= 50.0 {
        "⚠️"
    } else {
        "❌"
    }
}

/// 发现流程编排器
pub struct DiscoveryOrchestrator {
    source: Arc<dyn FrameSource>,
    validator: TemplateValidator,
    catalog: TemplateCatalog,
    sinks: Vec<Arc<dyn TemplateStore>>,
    config: DiscoveryConfig,
}

impl DiscoveryOrchestrator {
    pub fn new(source: Arc<dyn FrameSource>, catalog: TemplateCatalog, config: DiscoveryConfig) -> Self {
        Self {
            validator: TemplateValidator::new(Arc::clone(&source)),
            source,
            catalog,
            sinks: Vec::new(),
            config,
        }
    }

    /// 追加一个模板持久化目标
    pub fn with_sink(mut self, sink: Arc<dyn TemplateStore>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// 运行一次完整的发现会话
    pub async fn run(&mut self, operator: &dyn Operator) -> Result<SessionOutcome, DiscoveryError> {
        let session_id = scale_telemetry::new_session_id();
        let span = info_span!("discovery_session", session_id = %session_id);
        self.run_session(operator).instrument(span).await
    }

    async fn run_session(&mut self, operator: &dyn Operator) -> Result<SessionOutcome, DiscoveryError> {
        info!("starting protocol discovery session");
        self.source.ensure_capturing().await?;

        operator.notify("Phase 1: testing known manufacturer templates");
        let results = self.match_templates(operator).await;
        self.show_summary(operator, &results);

        let mut best: Option<&TemplateMatch> = None;
        for m in results.iter().filter(|m| m.result.is_some()) {
            if m.confidence > best.map_or(0.0, |b| b.confidence) {
                best = Some(m);
            }
        }
        let best_score = best.map(|m| m.confidence).unwrap_or(0.0);

        if let Some(best) = best.filter(|m| m.confidence >= self.config.confidence_threshold) {
            let original = self.catalog.by_id(&best.template_id).cloned();
            if let Some(original) = original {
                info!(
                    template_id = %best.template_id,
                    confidence = best.confidence,
                    "accepted known template"
                );
                operator.notify(&format!(
                    "Found matching template: {} ({:.1}%)",
                    best.template_name, best.confidence
                ));
                let template = accepted_copy(&original, best.confidence, domain::now_utc());
                let persisted = self.persist(&template).await;
                return Ok(SessionOutcome::Accepted {
                    template,
                    phase: Phase::TemplateMatching,
                    persisted,
                });
            }
        }

        info!(best = best_score, "no suitable template found, starting interactive discovery");
        operator.notify(&format!("No suitable template found (best: {best_score:.1}%)"));
        operator.notify("Phase 2: interactive protocol discovery");
        self.interactive(operator).await
    }

    /// 阶段一：按目录顺序测试模板，返回测试记录（测试顺序）
    pub async fn match_templates(&self, operator: &dyn Operator) -> Vec<TemplateMatch> {
        let mut results = Vec::new();
        if self.catalog.is_empty() {
            warn!("no templates available for testing");
            operator.notify("No templates available for testing");
            return results;
        }
        operator.notify(&format!("Testing {} known templates...", self.catalog.len()));

        for template in self.catalog.all() {
            let brand = template.brand().to_string();
            operator.notify(&format!("Testing {brand}: {}", template.name));
            let outcome = self
                .validator
                .test_template(template, self.config.template_sample)
                .await;
            let (confidence, result) = match outcome {
                Ok(result) => (result.confidence, Some(result)),
                Err(ValidationError::NoDataCaptured) => {
                    operator.notify("  no data received");
                    (0.0, None)
                }
                Err(err) => {
                    warn!(template_id = %template.template_id, error = %err, "template test failed");
                    operator.notify(&format!("  test failed: {err}"));
                    (0.0, None)
                }
            };
            operator.notify(&format!("  confidence: {confidence:.1}%"));
            results.push(TemplateMatch {
                template_id: template.template_id.clone(),
                template_name: template.name.clone(),
                brand,
                confidence,
                result,
            });

            if confidence >= self.config.early_accept_score {
                info!(template_id = %template.template_id, confidence, "excellent match, stopping template tests");
                operator.notify("  excellent match found, stopping tests");
                break;
            }
        }
        results
    }

    fn show_summary(&self, operator: &dyn Operator, results: &[TemplateMatch]) {
        if results.is_empty() {
            return;
        }
        let mut sorted: Vec<&TemplateMatch> = results.iter().collect();
        sorted.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        operator.notify("Template test results:");
        for m in sorted.iter().take(SUMMARY_LIMIT) {
            operator.notify(&format!(
                "{} {:5.1}% - {:15} - {}",
                status_marker(m.confidence, self.config.confidence_threshold),
                m.confidence,
                m.brand,
                m.template_name
            ));
        }
        if sorted.len() > SUMMARY_LIMIT {
            operator.notify(&format!(
                "    ... and {} more templates tested",
                sorted.len() - SUMMARY_LIMIT
            ));
        }
    }

    /// 阶段二：基线 + 砝码步骤 + 合成
    async fn interactive(&mut self, operator: &dyn Operator) -> Result<SessionOutcome, DiscoveryError> {
        let mut steps: Vec<DiscoveryStep> = Vec::new();

        operator.notify("Step 1: baseline reading (empty scale)");
        if operator
            .wait_ready("Please ensure the scale is empty and stable, then press Enter")
            .await
            == OperatorSignal::Cancel
        {
            info!("discovery cancelled before baseline");
            return Ok(SessionOutcome::Cancelled);
        }

        let baseline = self.capture(self.config.baseline_sample).await;
        if baseline.is_empty() {
            warn!("no data received during baseline capture");
            operator.notify("No data received from scale. Check connection.");
            return Ok(SessionOutcome::NoData);
        }
        operator.notify(&format!("Captured {} baseline data points", baseline.len()));
        show_samples(operator, &baseline, 3);
        steps.push(DiscoveryStep {
            step_number: 1,
            action: StepAction::Baseline,
            expected_weight: Some(0.0),
            frames: baseline,
            captured_at: domain::now_utc(),
        });

        let mut confidence = 0.0;
        let weights = self.config.test_weights.clone();
        for (index, weight) in weights.into_iter().enumerate() {
            let step_number = index as u32 + 2;
            operator.notify(&format!("Step {step_number}: weight test - {weight} kg"));
            if operator
                .wait_ready(&format!(
                    "Please place a {weight} kg weight on the scale, press Enter when stable"
                ))
                .await
                == OperatorSignal::Cancel
            {
                info!(step = step_number, "discovery cancelled during weight steps");
                return Ok(SessionOutcome::Cancelled);
            }

            let frames = self.capture(self.config.step_sample).await;
            if frames.is_empty() {
                warn!(step = step_number, "no data captured for weight step");
                operator.notify("No data captured for this step");
                continue;
            }
            operator.notify(&format!("Captured {} data points", frames.len()));
            show_samples(operator, &frames, 2);
            steps.push(DiscoveryStep {
                step_number,
                action: StepAction::AddWeight,
                expected_weight: Some(weight),
                frames,
                captured_at: domain::now_utc(),
            });

            if let Some(running) = running_confidence(&steps) {
                confidence = running.overall;
                info!(
                    step = step_number,
                    format = running.format,
                    numeric = running.numeric,
                    overall = running.overall,
                    "running confidence"
                );
                operator.notify(&format!(
                    "Confidence: format={:.1}%, numeric={:.1}%, overall={:.1}%",
                    running.format, running.numeric, running.overall
                ));
                if running.overall > self.config.confidence_threshold {
                    operator.notify(&format!("High confidence achieved ({:.1}%)", running.overall));
                    break;
                }
            }
        }

        let Some(template) = synthesize_template(&steps, confidence, domain::now_utc()) else {
            warn!("failed to create protocol template");
            return Ok(SessionOutcome::NoTemplate);
        };
        info!(
            template_id = %template.template_id,
            steps = steps.len(),
            confidence,
            "synthesized protocol template"
        );
        operator.notify(&format!("Protocol template created: {}", template.template_id));
        let persisted = self.persist(&template).await;
        Ok(SessionOutcome::Accepted {
            template,
            phase: Phase::Interactive,
            persisted,
        })
    }

    /// 清空缓冲、等待采样窗口，返回窗口内的帧文本
    async fn capture(&self, window: Duration) -> Vec<String> {
        self.source.clear_buffer();
        tokio::time::sleep(window).await;
        self.source
            .recent_frames(window.saturating_add(Duration::from_secs(1)))
            .into_iter()
            .map(|frame| frame.text)
            .collect()
    }

    /// 保存到所有目标并加入内存目录；返回成功的后端
    async fn persist(&mut self, template: &ProtocolTemplate) -> Vec<&'static str> {
        let mut persisted = Vec::new();
        for sink in &self.sinks {
            match sink.save_template(template).await {
                Ok(()) => {
                    info!(backend = sink.backend(), template_id = %template.template_id, "template saved");
                    persisted.push(sink.backend());
                }
                Err(err) => {
                    warn!(backend = sink.backend(), error = %err, "failed to save template");
                }
            }
        }
        self.catalog.insert(template.clone());
        persisted
    }
}

fn show_samples(operator: &dyn Operator, frames: &[String], count: usize) {
    for frame in frames.iter().take(count) {
        operator.notify(&format!("   {frame:?}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(number: u32, frames: &[&str]) -> DiscoveryStep {
        DiscoveryStep {
            step_number: number,
            action: if number == 1 {
                StepAction::Baseline
            } else {
                StepAction::AddWeight
            },
            expected_weight: Some(0.0),
            frames: frames.iter().map(|f| f.to_string()).collect(),
            captured_at: domain::now_utc(),
        }
    }

    #[test]
    fn running_confidence_needs_two_steps() {
        assert!(running_confidence(&[step(1, &["1.0"])]).is_none());
        let rc = running_confidence(&[step(1, &["ST 1.0", "ST"]), step(2, &["ST 2.0\r", "OL"])])
            .expect("two steps");
        assert_eq!(rc.format, 25.0);
        assert_eq!(rc.numeric, 50.0);
        assert_eq!(rc.overall, 37.5);
    }

    #[test]
    fn synthesizes_from_first_frame_length() {
        let now = domain::now_utc();
        let t = synthesize_template(&[step(1, &["ST,GS,  1.25kg", "x"])], 50.0, now).expect("template");
        assert_eq!(t.template_id, format!("discovered_{}", now.timestamp()));
        assert_eq!(t.name, DISCOVERED_TEMPLATE_NAME);
        assert_eq!(t.fields.len(), 1);
        assert_eq!(t.fields[0].length, 14);
        assert_eq!(t.fields[0].decimal_places, Some(2));
        assert_eq!(t.delimiter, "\r\n");
        assert_eq!(t.confidence_score, 50.0);
        assert_eq!(t.discovery_method, Some(DiscoveryMethod::Interactive));

        let t = synthesize_template(&[step(1, &[])], 0.0, now).expect("template");
        assert_eq!(t.fields[0].length, 10);
        assert!(synthesize_template(&[], 0.0, now).is_none());
    }

    #[test]
    fn accepted_copy_keeps_layout() {
        let now = domain::now_utc();
        let original = synthesize_template(&[step(1, &["12.345"])], 0.0, now).expect("template");
        let original = ProtocolTemplate {
            template_id: "generic".to_string(),
            ..original
        };
        let copy = accepted_copy(&original, 91.5, now);
        assert_eq!(copy.template_id, format!("matched_generic_{}", now.timestamp()));
        assert_eq!(copy.original_template.as_deref(), Some("generic"));
        assert_eq!(copy.discovery_method, Some(DiscoveryMethod::TemplateMatching));
        assert_eq!(copy.fields, original.fields);
        assert_eq!(copy.confidence_score, 91.5);
    }

    #[test]
    fn summary_markers() {
        assert_eq!(status_marker(90.0, 85.0), "✅");
        assert_eq!(status_marker(60.0, 85.0), "⚠️");
        assert_eq!(status_marker(10.0, 85.0), "❌");
    }
}
