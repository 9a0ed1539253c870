//! 模板文档的读、校验、写

use crate::error::CatalogError;
use domain::ProtocolTemplate;
use std::fs;
use std::path::{Path, PathBuf};

/// 读取并校验单个模板文档
pub fn read_document(path: &Path) -> Result<ProtocolTemplate, CatalogError> {
    let raw = fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut template: ProtocolTemplate =
        serde_json::from_str(&raw).map_err(|source| CatalogError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    template.delimiter = unescape_delimiter(&template.delimiter);
    validate(&template)?;
    Ok(template)
}

/// 写出 `<template_id>.json`（缩进格式），必要时创建目录
pub fn write_document(dir: &Path, template: &ProtocolTemplate) -> Result<PathBuf, CatalogError> {
    validate(template)?;
    fs::create_dir_all(dir).map_err(|source| CatalogError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let path = dir.join(format!("{}.json", template.template_id));
    let body = serde_json::to_string_pretty(template).map_err(|source| CatalogError::Parse {
        path: path.clone(),
        source,
    })?;
    fs::write(&path, body).map_err(|source| CatalogError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// 模板 ID 直接用作文件名，不能为空或含路径字符
pub fn validate_template_id(template_id: &str) -> Result<(), CatalogError> {
    if template_id.trim().is_empty() {
        return Err(CatalogError::Invalid("template_id is empty".to_string()));
    }
    if template_id.contains(|c: char| c == '/' || c == '\\' || c.is_control()) {
        return Err(CatalogError::Invalid(format!(
            "template_id {template_id:?} contains path characters"
        )));
    }
    Ok(())
}

/// 模板结构校验
pub fn validate(template: &ProtocolTemplate) -> Result<(), CatalogError> {
    validate_template_id(&template.template_id)?;
    if template.name.trim().is_empty() {
        return Err(CatalogError::Invalid(format!(
            "template {} has an empty name",
            template.template_id
        )));
    }
    if template.fields.is_empty() {
        return Err(CatalogError::Invalid(format!(
            "template {} has no fields",
            template.template_id
        )));
    }
    for field in &template.fields {
        if field.name.trim().is_empty() {
            return Err(CatalogError::Invalid(format!(
                "template {} has a field without a name",
                template.template_id
            )));
        }
        if field.length == 0 {
            return Err(CatalogError::Invalid(format!(
                "field {} of template {} has zero length",
                field.name, template.template_id
            )));
        }
    }
    Ok(())
}

/// 文档中以转义文本书写的分隔符（`"\\r\\n"`）还原为控制字符
pub fn unescape_delimiter(raw: &str) -> String {
    raw.replace("\\r", "\r")
        .replace("\\n", "\n")
        .replace("\\t", "\t")
}
