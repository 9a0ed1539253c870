//! # 协议模板目录
//!
//! 从模板目录加载 `*.json` 模板文档，提供按 ID、按厂商分组的查询。
//!
//! - 文件按文件名排序读取，目录的遍历顺序即加载顺序
//! - 单个文档无效（解析失败、结构校验失败、ID 重复）时记录告警并跳过，
//!   整个目录的加载不会因此失败

mod document;
mod error;

pub use document::{
    read_document, unescape_delimiter, validate, validate_template_id, write_document,
};
pub use error::CatalogError;

use domain::ProtocolTemplate;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// 内存中的模板目录
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: Vec<ProtocolTemplate>,
    index: HashMap<String, usize>,
}

impl TemplateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 加载目录下的全部模板文档。目录不存在时返回空目录。
    pub fn load_dir(dir: &Path) -> Self {
        let mut catalog = Self::new();
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "template directory not readable");
                return catalog;
            }
        };

        let mut paths: Vec<_> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file() && path.extension().is_some_and(|ext| ext == "json")
            })
            .collect();
        paths.sort();

        for path in paths {
            match read_document(&path) {
                Ok(template) => {
                    if catalog.index.contains_key(&template.template_id) {
                        warn!(
                            path = %path.display(),
                            template_id = %template.template_id,
                            "duplicate template id, skipped"
                        );
                        continue;
                    }
                    catalog.push(template);
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping invalid template document");
                }
            }
        }

        info!(dir = %dir.display(), count = catalog.len(), "loaded protocol templates");
        catalog
    }

    /// 由已有模板构造（重复 ID 保留第一个）
    pub fn from_templates(templates: impl IntoIterator<Item = ProtocolTemplate>) -> Self {
        let mut catalog = Self::new();
        for template in templates {
            if !catalog.index.contains_key(&template.template_id) {
                catalog.push(template);
            }
        }
        catalog
    }

    fn push(&mut self, template: ProtocolTemplate) {
        self.index
            .insert(template.template_id.clone(), self.templates.len());
        self.templates.push(template);
    }

    /// 新增或替换模板；替换时保持原有位置，返回旧模板
    pub fn insert(&mut self, template: ProtocolTemplate) -> Option<ProtocolTemplate> {
        match self.index.get(&template.template_id) {
            Some(&pos) => Some(std::mem::replace(&mut self.templates[pos], template)),
            None => {
                self.push(template);
                None
            }
        }
    }

    /// 按加载顺序遍历
    pub fn all(&self) -> impl Iterator<Item = &ProtocolTemplate> {
        self.templates.iter()
    }

    pub fn by_id(&self, template_id: &str) -> Option<&ProtocolTemplate> {
        self.index
            .get(template_id)
            .and_then(|&pos| self.templates.get(pos))
    }

    /// 厂商 → 模板 ID 列表（组内保持加载顺序）
    pub fn by_group(&self) -> BTreeMap<String, Vec<String>> {
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for template in &self.templates {
            groups
                .entry(template.brand().to_string())
                .or_default()
                .push(template.template_id.clone());
        }
        groups
    }

    pub fn ids(&self) -> Vec<&str> {
        self.templates
            .iter()
            .map(|template| template.template_id.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
