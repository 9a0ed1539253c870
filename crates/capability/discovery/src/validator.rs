//! 模板验证器
//!
//! 用实时采样的帧检验一个模板，给出 0..=100 的置信度：
//!
//! ```text
//! overall = parse_success_rate × 0.6 + data_consistency × 0.2 + format_match × 0.2
//! ```
//!
//! - `parse_success_rate`：整帧解析成功的比例 × 100
//! - `data_consistency`：帧长度（字符数）方差 < 2 → 90，< 10 → 70，否则 30；
//!   少于 2 帧时为 50
//! - `format_match`：包含分隔符或去空白后非空的帧比例 × 100

use crate::error::{ParseError, ValidationError};
use domain::{FieldKind, ProtocolField, ProtocolTemplate};
use scale_protocol::FrameSource;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// 结果中保留的解析错误样本上限
pub const MAX_ERROR_SAMPLES: usize = 5;

const PARSE_WEIGHT: f64 = 0.6;
const CONSISTENCY_WEIGHT: f64 = 0.2;
const FORMAT_WEIGHT: f64 = 0.2;

/// 单个字段的解析值
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Number(f64),
    /// 查表命中
    Lookup(String),
    /// 查表未命中，保留原始代码
    Unknown(String),
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(value) => write!(f, "{value}"),
            FieldValue::Lookup(value) | FieldValue::Text(value) => f.write_str(value),
            FieldValue::Unknown(raw) => write!(f, "unknown_{raw}"),
        }
    }
}

/// 整帧解析结果，按字段声明顺序
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedFrame {
    pub values: Vec<(String, FieldValue)>,
}

impl ParsedFrame {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }
}

/// 按字段的小数位数格式化显示（不参与验证）
pub fn display_value(field: &ProtocolField, value: &FieldValue) -> String {
    match (value, field.decimal_places) {
        (FieldValue::Number(number), Some(places)) => {
            format!("{number:.prec$}", prec = places as usize)
        }
        _ => value.to_string(),
    }
}

/// 用模板解析一帧。任一字段失败则整帧失败。
pub fn parse_with_template(frame: &str, fields: &[ProtocolField]) -> Result<ParsedFrame, ParseError> {
    let chars: Vec<char> = frame.chars().collect();
    let mut parsed = ParsedFrame::default();

    for field in fields {
        let end = field.end();
        if end > chars.len() {
            return Err(ParseError::FrameTooShort {
                field: field.name.clone(),
                start: field.start,
                length: field.length,
                frame_len: chars.len(),
            });
        }
        let raw: String = chars[field.start..end].iter().collect();

        let value = match field.kind {
            FieldKind::Numeric => match raw.trim().parse::<f64>() {
                Ok(number) => FieldValue::Number(number),
                Err(_) => {
                    return Err(ParseError::NonNumericField {
                        field: field.name.clone(),
                        raw,
                    });
                }
            },
            FieldKind::Lookup => match field.values.as_ref().and_then(|table| table.get(&raw)) {
                Some(mapped) => FieldValue::Lookup(mapped.clone()),
                None => FieldValue::Unknown(raw),
            },
            FieldKind::Text => FieldValue::Text(raw),
        };
        parsed.values.push((field.name.clone(), value));
    }

    Ok(parsed)
}

/// 置信度等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Rating {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl Rating {
    pub fn from_score(score: f64) -> Self {
        if score >= 85.0 {
            Rating::Excellent
        } else if score >= 70.0 {
            Rating::Good
        } else if score >= 50.0 {
            Rating::Fair
        } else {
            Rating::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rating::Excellent => "EXCELLENT",
            Rating::Good => "GOOD",
            Rating::Fair => "FAIR",
            Rating::Poor => "POOR",
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次模板验证的结果
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceResult {
    pub template_id: String,
    pub template_name: String,
    pub confidence: f64,
    pub parse_success_rate: f64,
    pub data_consistency: f64,
    pub format_match: f64,
    pub successful_parses: usize,
    pub total_attempts: usize,
    /// 前若干条解析错误（仅用于诊断）
    pub parsing_errors: Vec<String>,
}

impl ConfidenceResult {
    pub fn rating(&self) -> Rating {
        Rating::from_score(self.confidence)
    }
}

/// 对一组帧评分（纯函数）
pub fn score_frames<S: AsRef<str>>(template: &ProtocolTemplate, frames: &[S]) -> ConfidenceResult {
    let total_attempts = frames.len();
    let mut successful_parses = 0;
    let mut parsing_errors = Vec::new();

    for frame in frames {
        match parse_with_template(frame.as_ref(), &template.fields) {
            Ok(_) => successful_parses += 1,
            Err(err) => {
                if parsing_errors.len() < MAX_ERROR_SAMPLES {
                    parsing_errors.push(err.to_string());
                }
            }
        }
    }

    let (parse_success_rate, data_consistency, format_match, confidence) = if total_attempts == 0
    {
        (0.0, 0.0, 0.0, 0.0)
    } else {
        let parse_success_rate = successful_parses as f64 / total_attempts as f64 * 100.0;
        let data_consistency = data_consistency(frames);
        let format_match = format_match(frames, &template.delimiter);
        let confidence = parse_success_rate * PARSE_WEIGHT
            + data_consistency * CONSISTENCY_WEIGHT
            + format_match * FORMAT_WEIGHT;
        (
            parse_success_rate,
            data_consistency,
            format_match,
            confidence.clamp(0.0, 100.0),
        )
    };

    ConfidenceResult {
        template_id: template.template_id.clone(),
        template_name: template.name.clone(),
        confidence,
        parse_success_rate,
        data_consistency,
        format_match,
        successful_parses,
        total_attempts,
        parsing_errors,
    }
}

fn data_consistency<S: AsRef<str>>(frames: &[S]) -> f64 {
    if frames.len() < 2 {
        return 50.0;
    }
    let lengths: Vec<f64> = frames
        .iter()
        .map(|frame| frame.as_ref().chars().count() as f64)
        .collect();
    let count = lengths.len() as f64;
    let mean = lengths.iter().sum::<f64>() / count;
    let variance = lengths.iter().map(|len| (len - mean).powi(2)).sum::<f64>() / count;

    if variance < 2.0 {
        90.0
    } else if variance < 10.0 {
        70.0
    } else {
        30.0
    }
}

fn format_match<S: AsRef<str>>(frames: &[S], delimiter: &str) -> f64 {
    if frames.is_empty() {
        return 0.0;
    }
    let matches = frames
        .iter()
        .map(AsRef::as_ref)
        .filter(|frame| {
            (!delimiter.is_empty() && frame.contains(delimiter)) || !frame.trim().is_empty()
        })
        .count();
    matches as f64 / frames.len() as f64 * 100.0
}

/// 针对实时链路的模板验证器
#[derive(Clone)]
pub struct TemplateValidator {
    source: Arc<dyn FrameSource>,
}

impl TemplateValidator {
    pub fn new(source: Arc<dyn FrameSource>) -> Self {
        Self { source }
    }

    /// 清空缓冲、采样 `sample` 时长后评分
    pub async fn test_template(
        &self,
        template: &ProtocolTemplate,
        sample: Duration,
    ) -> Result<ConfidenceResult, ValidationError> {
        self.source.ensure_capturing().await?;
        self.source.clear_buffer();
        debug!(
            template_id = %template.template_id,
            sample_ms = sample.as_millis() as u64,
            "sampling frames for template"
        );
        tokio::time::sleep(sample).await;

        let frames = self
            .source
            .recent_frames(sample.saturating_add(Duration::from_secs(1)));
        scale_telemetry::record_template_tested();
        if frames.is_empty() {
            info!(template_id = %template.template_id, "no data captured for template test");
            return Err(ValidationError::NoDataCaptured);
        }

        let texts: Vec<&str> = frames.iter().map(|frame| frame.text.as_str()).collect();
        let result = score_frames(template, &texts);
        scale_telemetry::record_frame_parse(
            result.successful_parses as u64,
            (result.total_attempts - result.successful_parses) as u64,
        );
        info!(
            template_id = %template.template_id,
            confidence = result.confidence,
            parsed = result.successful_parses,
            attempts = result.total_attempts,
            "template test finished"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn template(fields: Vec<ProtocolField>) -> ProtocolTemplate {
        ProtocolTemplate {
            template_id: "t1".to_string(),
            name: "Test".to_string(),
            description: String::new(),
            delimiter: "\r\n".to_string(),
            encoding: "ASCII".to_string(),
            fields,
            confidence_score: 0.0,
            discovery_date: None,
            discovery_method: None,
            original_template: None,
            manufacturer_info: None,
        }
    }

    #[test]
    fn test_scores_fixed_width_numeric_frames() {
        let t = template(vec![ProtocolField::numeric("weight", 0, 6)]);
        let result = score_frames(&t, &["12.345\r\n", "12.346\r\n", "12.344\r\n"]);
        assert_eq!(result.successful_parses, 3);
        assert_eq!(result.total_attempts, 3);
        assert_eq!(result.parse_success_rate, 100.0);
        assert_eq!(result.data_consistency, 90.0);
        assert_eq!(result.format_match, 100.0);
        assert!((result.confidence - 98.0).abs() < 1e-9);
        assert_eq!(result.rating(), Rating::Excellent);
    }

    #[test]
    fn test_frame_too_short() {
        let fields = vec![ProtocolField::text("code", 5, 10)];
        let err = parse_with_template("12345678", &fields).unwrap_err();
        assert_eq!(
            err,
            ParseError::FrameTooShort {
                field: "code".to_string(),
                start: 5,
                length: 10,
                frame_len: 8,
            }
        );

        let result = score_frames(&template(fields), &["12345678"]);
        assert_eq!(result.successful_parses, 0);
        assert_eq!(result.total_attempts, 1);
        assert_eq!(result.parsing_errors.len(), 1);
    }

    #[test]
    fn test_unknown_lookup_code_is_tagged() {
        let table = BTreeMap::from([("ST".to_string(), "stable".to_string())]);
        let fields = vec![
            ProtocolField::lookup("status", 0, 2, table),
            ProtocolField::numeric("weight", 3, 7),
        ];
        let parsed = parse_with_template("ST,  12.50", &fields).unwrap();
        assert_eq!(parsed.get("status"), Some(&FieldValue::Lookup("stable".to_string())));
        assert_eq!(parsed.get("weight"), Some(&FieldValue::Number(12.5)));

        let parsed = parse_with_template("OL,  12.50", &fields).unwrap();
        let status = parsed.get("status").unwrap();
        assert_eq!(status, &FieldValue::Unknown("OL".to_string()));
        assert_eq!(status.to_string(), "unknown_OL");
    }

    #[test]
    fn test_non_numeric_fails_whole_frame() {
        let fields = vec![ProtocolField::text("head", 0, 2), ProtocolField::numeric("weight", 3, 5)];
        let err = parse_with_template("ST,abcde", &fields).unwrap_err();
        assert!(matches!(err, ParseError::NonNumericField { ref raw, .. } if raw == "abcde"));
    }

    #[test]
    fn test_parse_is_deterministic() {
        let fields = vec![ProtocolField::numeric("weight", 0, 6)];
        let a = parse_with_template(" 1.250kg", &fields);
        let b = parse_with_template(" 1.250kg", &fields);
        assert_eq!(a, b);
    }

    #[test]
    fn test_error_samples_are_bounded() {
        let t = template(vec![ProtocolField::numeric("weight", 0, 4)]);
        let frames: Vec<String> = (0..20).map(|i| format!("x{i:03}")).collect();
        let result = score_frames(&t, &frames);
        assert_eq!(result.parsing_errors.len(), MAX_ERROR_SAMPLES);
        assert_eq!(result.successful_parses, 0);
        // 0×0.6 + 90×0.2 + 100×0.2
        assert!((result.confidence - 38.0).abs() < 1e-9);
    }

    #[test]
    fn test_consistency_bands() {
        assert_eq!(data_consistency(&["abc"]), 50.0);
        assert_eq!(data_consistency(&["abc", "abcd"]), 90.0);
        assert_eq!(data_consistency(&["a", "abcdef"]), 70.0);
        assert_eq!(data_consistency(&["a", "abcdefghijkl"]), 30.0);
    }

    #[test]
    fn test_confidence_grows_with_parse_rate() {
        let t = template(vec![ProtocolField::numeric("weight", 0, 4)]);
        let mut previous = -1.0;
        for good in 0..=4 {
            let frames: Vec<&str> = (0..4).map(|i| if i < good { "1234" } else { "abcd" }).collect();
            let score = score_frames(&t, &frames).confidence;
            assert!(score >= previous);
            assert!((0.0..=100.0).contains(&score));
            previous = score;
        }
    }

    #[test]
    fn test_display_respects_decimal_places() {
        let field = ProtocolField {
            decimal_places: Some(2),
            ..ProtocolField::numeric("weight", 0, 6)
        };
        assert_eq!(display_value(&field, &FieldValue::Number(1.5)), "1.50");
        assert_eq!(Rating::from_score(70.0), Rating::Good);
        assert_eq!(Rating::from_score(69.9), Rating::Fair);
        assert_eq!(Rating::from_score(10.0).to_string(), "POOR");
    }
}
