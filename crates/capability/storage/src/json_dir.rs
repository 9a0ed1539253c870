//! 模板目录存储：把模板写成目录中的模板文档，供下次加载目录时读取
//!
//! 文件读写在阻塞线程池中执行。

use crate::error::StorageError;
use crate::traits::TemplateStore;
use domain::ProtocolTemplate;
use scale_catalog::{CatalogError, read_document, validate_template_id, write_document};
use std::path::PathBuf;
use tracing::debug;

pub struct JsonTemplateDir {
    dir: PathBuf,
}

impl JsonTemplateDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

fn task_failed(err: tokio::task::JoinError) -> StorageError {
    StorageError::new(format!("template file task failed: {err}"))
}

#[async_trait::async_trait]
impl TemplateStore for JsonTemplateDir {
    fn backend(&self) -> &'static str {
        "template_dir"
    }

    async fn save_template(&self, template: &ProtocolTemplate) -> Result<(), StorageError> {
        let dir = self.dir.clone();
        let template = template.clone();
        let path = tokio::task::spawn_blocking(move || write_document(&dir, &template))
            .await
            .map_err(task_failed)??;
        debug!(path = %path.display(), "template document written");
        Ok(())
    }

    async fn find_template(
        &self,
        template_id: &str,
    ) -> Result<Option<ProtocolTemplate>, StorageError> {
        validate_template_id(template_id)?;
        let path = self.dir.join(format!("{template_id}.json"));
        let found = tokio::task::spawn_blocking(move || -> Result<_, CatalogError> {
            if !path.is_file() {
                return Ok(None);
            }
            read_document(&path).map(Some)
        })
        .await
        .map_err(task_failed)??;
        Ok(found)
    }
}
