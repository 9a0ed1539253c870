//! 模板目录错误类型定义

use std::path::PathBuf;

/// 单个模板文档的加载错误
///
/// 目录加载时这些错误只记录日志并跳过该文档。
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid template document {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid template: {0}")]
    Invalid(String),
}
