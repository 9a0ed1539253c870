//! 帧 → 称重读数的标准化。
//!
//! 有模板时按模板字段取值；没有模板时用启发式规则：
//! 第一个带符号小数为重量，词尾的 `kg|lb|oz|g` 为单位（缺省 kg），含 `ST` 视为稳定。
//! 单位要求词尾边界，`GS` 这类状态码中的 `g` 不会被当成单位。

use domain::{Frame, ProtocolTemplate, WeightReading};
use regex::Regex;
use scale_discovery::{FieldValue, ParseError, ParsedFrame, parse_with_template};
use std::sync::OnceLock;

/// 缺省重量单位。
pub const DEFAULT_UNIT: &str = "kg";

/// 规范化错误。
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("frame does not match template {template_id}: {source}")]
    TemplateMismatch {
        template_id: String,
        #[source]
        source: ParseError,
    },
}

fn weight_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[+-]?\d+\.?\d*").expect("weight pattern is valid"))
}

fn unit_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?:kg|lb|oz|g)\b").expect("unit pattern is valid"))
}

/// 文本帧 → 称重读数。
#[derive(Debug, Clone)]
pub struct ReadingExtractor {
    device_id: String,
    template: Option<ProtocolTemplate>,
}

impl ReadingExtractor {
    /// 启发式提取。
    pub fn heuristic(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            template: None,
        }
    }

    /// 按模板提取。
    pub fn with_template(device_id: impl Into<String>, template: ProtocolTemplate) -> Self {
        Self {
            device_id: device_id.into(),
            template: Some(template),
        }
    }

    pub fn template(&self) -> Option<&ProtocolTemplate> {
        self.template.as_ref()
    }

    pub fn extract(&self, frame: &Frame) -> Result<WeightReading, NormalizeError> {
        match &self.template {
            Some(template) => {
                let parsed = parse_with_template(&frame.text, &template.fields).map_err(|source| {
                    NormalizeError::TemplateMismatch {
                        template_id: template.template_id.clone(),
                        source,
                    }
                })?;
                Ok(self.from_parsed(frame, &parsed))
            }
            None => Ok(self.from_text(frame)),
        }
    }

    fn from_parsed(&self, frame: &Frame, parsed: &ParsedFrame) -> WeightReading {
        let weight = match parsed.get("weight") {
            Some(FieldValue::Number(value)) => Some(*value),
            _ => parsed.values.iter().find_map(|(_, value)| match value {
                FieldValue::Number(number) => Some(*number),
                _ => None,
            }),
        };
        let unit = match parsed.get("unit") {
            Some(FieldValue::Lookup(value) | FieldValue::Text(value) | FieldValue::Unknown(value)) => {
                Some(value.trim().to_string()).filter(|unit| !unit.is_empty())
            }
            _ => heuristic_unit(&frame.text),
        };
        let stable = parsed
            .get("status")
            .or_else(|| parsed.get("stability"))
            .map(|value| is_stable_marker(&value.to_string()));

        WeightReading {
            device_id: self.device_id.clone(),
            weight,
            unit,
            stable,
            timestamp: frame.captured_at,
            raw_data: frame.text.clone(),
        }
    }

    fn from_text(&self, frame: &Frame) -> WeightReading {
        let weight = weight_pattern()
            .find(&frame.text)
            .and_then(|m| m.as_str().parse::<f64>().ok());
        WeightReading {
            device_id: self.device_id.clone(),
            weight,
            unit: heuristic_unit(&frame.text).or_else(|| Some(DEFAULT_UNIT.to_string())),
            stable: Some(frame.text.to_uppercase().contains("ST")),
            timestamp: frame.captured_at,
            raw_data: frame.text.clone(),
        }
    }
}

fn heuristic_unit(text: &str) -> Option<String> {
    unit_pattern()
        .find(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
}

/// 状态字段值是否表示稳定（`ST`、`stable`；`unstable` 不算）
fn is_stable_marker(value: &str) -> bool {
    let lower = value.trim().to_lowercase();
    if lower.contains("unstable") {
        return false;
    }
    lower.contains("stable") || value.trim().eq_ignore_ascii_case("st")
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::ProtocolField;
    use std::collections::BTreeMap;

    fn mettler() -> ProtocolTemplate {
        let status = BTreeMap::from([
            ("ST".to_string(), "stable".to_string()),
            ("US".to_string(), "unstable".to_string()),
        ]);
        ProtocolTemplate {
            template_id: "mettler".to_string(),
            name: "Mettler".to_string(),
            description: String::new(),
            delimiter: "\r\n".to_string(),
            encoding: "ASCII".to_string(),
            fields: vec![
                ProtocolField::lookup("status", 0, 2, status),
                ProtocolField::numeric("weight", 3, 8),
                ProtocolField::text("unit", 12, 2),
            ],
            confidence_score: 0.0,
            discovery_date: None,
            discovery_method: None,
            original_template: None,
            manufacturer_info: None,
        }
    }

    #[test]
    fn heuristic_extraction() {
        let extractor = ReadingExtractor::heuristic("scale-1");
        let reading = extractor.extract(&Frame::new("ST,GS,+0012.50kg")).unwrap();
        assert_eq!(reading.weight, Some(12.5));
        assert_eq!(reading.unit.as_deref(), Some("kg"));
        assert_eq!(reading.stable, Some(true));
        assert_eq!(reading.device_id, "scale-1");
        assert_eq!(reading.raw_data, "ST,GS,+0012.50kg");

        let reading = extractor.extract(&Frame::new("US -3.2 LB")).unwrap();
        assert_eq!(reading.weight, Some(-3.2));
        assert_eq!(reading.unit.as_deref(), Some("lb"));
        assert_eq!(reading.stable, Some(false));

        let reading = extractor.extract(&Frame::new("OL")).unwrap();
        assert_eq!(reading.weight, None);
        assert_eq!(reading.unit.as_deref(), Some("kg"));
    }

    #[test]
    fn template_extraction() {
        let extractor = ReadingExtractor::with_template("scale-1", mettler());
        let reading = extractor.extract(&Frame::new("ST,   12.50 kg")).unwrap();
        assert_eq!(reading.weight, Some(12.5));
        assert_eq!(reading.unit.as_deref(), Some("kg"));
        assert_eq!(reading.stable, Some(true));

        let reading = extractor.extract(&Frame::new("US,    1.25 kg")).unwrap();
        assert_eq!(reading.stable, Some(false));
    }

    #[test]
    fn template_mismatch_is_an_error() {
        let extractor = ReadingExtractor::with_template("scale-1", mettler());
        let err = extractor.extract(&Frame::new("ST,")).unwrap_err();
        assert!(matches!(err, NormalizeError::TemplateMismatch { .. }));
    }

    #[test]
    fn stable_markers() {
        assert!(is_stable_marker("stable"));
        assert!(is_stable_marker("ST"));
        assert!(!is_stable_marker("unstable"));
        assert!(!is_stable_marker("unknown_OL"));
    }
}
