//! 协议模板：按固定偏移/长度/类型描述一帧的字段布局。
//!
//! 模板文档的 JSON 形态与此结构一一对应：
//!
//! ```json
//! {
//!   "template_id": "mettler_toledo_standard",
//!   "name": "Mettler Toledo Standard Continuous",
//!   "delimiter": "\r\n",
//!   "encoding": "ASCII",
//!   "fields": [
//!     { "name": "status", "start": 0, "length": 2, "field_type": "lookup",
//!       "values": { "ST": "stable", "US": "unstable" } },
//!     { "name": "weight", "start": 3, "length": 8, "field_type": "numeric", "decimal_places": 2 }
//!   ],
//!   "manufacturer_info": { "brand": "Mettler Toledo", "common_models": ["IND560"] }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 合成模板的默认帧分隔符。
pub const DEFAULT_DELIMITER: &str = "\r\n";
/// 合成模板的默认文本编码。
pub const DEFAULT_ENCODING: &str = "ASCII";
/// 未声明厂商时的分组键。
pub const UNKNOWN_BRAND: &str = "Unknown";

/// 字段类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// 去空白后必须能解析为数值
    Numeric,
    /// 查表字段，未知代码以 `unknown_<raw>` 标记
    Lookup,
    /// 原样透传
    Text,
}

/// 帧中的一个定宽切片。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolField {
    pub name: String,
    pub start: usize,
    pub length: usize,
    #[serde(rename = "field_type")]
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimal_places: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<BTreeMap<String, String>>,
}

impl ProtocolField {
    pub fn numeric(name: impl Into<String>, start: usize, length: usize) -> Self {
        Self {
            name: name.into(),
            start,
            length,
            kind: FieldKind::Numeric,
            decimal_places: None,
            values: None,
        }
    }

    pub fn text(name: impl Into<String>, start: usize, length: usize) -> Self {
        Self {
            name: name.into(),
            start,
            length,
            kind: FieldKind::Text,
            decimal_places: None,
            values: None,
        }
    }

    pub fn lookup(
        name: impl Into<String>,
        start: usize,
        length: usize,
        values: BTreeMap<String, String>,
    ) -> Self {
        Self {
            name: name.into(),
            start,
            length,
            kind: FieldKind::Lookup,
            decimal_places: None,
            values: Some(values),
        }
    }

    /// 字段结束位置（不含）。
    pub fn end(&self) -> usize {
        self.start.saturating_add(self.length)
    }
}

/// 模板的来源。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMethod {
    /// 阶段一：已知模板匹配
    TemplateMatching,
    /// 阶段二：交互式称重发现
    Interactive,
}

/// 厂商信息（仅用于分组展示）。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ManufacturerInfo {
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub common_models: Vec<String>,
}

/// 协议模板。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolTemplate {
    pub template_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub delimiter: String,
    pub encoding: String,
    pub fields: Vec<ProtocolField>,
    /// 验证得出的置信度，文档中可缺省
    #[serde(default)]
    pub confidence_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery_method: Option<DiscoveryMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer_info: Option<ManufacturerInfo>,
}

impl ProtocolTemplate {
    /// 分组键：厂商品牌，缺省为 `Unknown`。
    pub fn brand(&self) -> &str {
        self.manufacturer_info
            .as_ref()
            .and_then(|info| info.brand.as_deref())
            .filter(|brand| !brand.is_empty())
            .unwrap_or(UNKNOWN_BRAND)
    }

    pub fn common_models(&self) -> &[String] {
        self.manufacturer_info
            .as_ref()
            .map(|info| info.common_models.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_document_uses_field_type_key() {
        let json = r#"{
            "template_id": "t1",
            "name": "Test",
            "delimiter": "\r\n",
            "encoding": "ASCII",
            "fields": [
                { "name": "weight", "start": 0, "length": 6, "field_type": "numeric", "decimal_places": 3 },
                { "name": "unit", "start": 7, "length": 2, "field_type": "lookup", "values": { "kg": "kilogram" } }
            ],
            "manufacturer_info": { "brand": "Acme", "common_models": ["A1", "A2"] }
        }"#;
        let template: ProtocolTemplate = serde_json::from_str(json).unwrap();
        assert_eq!(template.fields[0].kind, FieldKind::Numeric);
        assert_eq!(template.fields[0].decimal_places, Some(3));
        assert_eq!(template.fields[1].kind, FieldKind::Lookup);
        assert_eq!(template.brand(), "Acme");
        assert_eq!(template.common_models().len(), 2);
        assert_eq!(template.confidence_score, 0.0);
        assert!(template.discovery_date.is_none());
    }

    #[test]
    fn brand_defaults_to_unknown() {
        let template = ProtocolTemplate {
            template_id: "t".to_string(),
            name: "n".to_string(),
            description: String::new(),
            delimiter: DEFAULT_DELIMITER.to_string(),
            encoding: DEFAULT_ENCODING.to_string(),
            fields: vec![ProtocolField::numeric("weight", 0, 6)],
            confidence_score: 0.0,
            discovery_date: None,
            discovery_method: None,
            original_template: None,
            manufacturer_info: Some(ManufacturerInfo::default()),
        };
        assert_eq!(template.brand(), UNKNOWN_BRAND);
        assert!(template.common_models().is_empty());
    }

    #[test]
    fn missing_delimiter_is_rejected() {
        let json = r#"{ "template_id": "t", "name": "n", "encoding": "ASCII", "fields": [] }"#;
        assert!(serde_json::from_str::<ProtocolTemplate>(json).is_err());
    }
}
