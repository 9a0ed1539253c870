//! 内存存储实现
//!
//! 用于测试与不需要落盘的运行方式。

use crate::error::StorageError;
use crate::traits::{ReadingStore, ScaleStore, TemplateStore};
use domain::{ProtocolTemplate, WeightReading};
use std::collections::HashMap;
use std::sync::RwLock;

pub struct InMemoryScaleStore {
    templates: RwLock<HashMap<String, ProtocolTemplate>>,
    readings: RwLock<Vec<WeightReading>>,
}

impl InMemoryScaleStore {
    pub fn new() -> Self {
        Self {
            templates: RwLock::new(HashMap::new()),
            readings: RwLock::new(Vec::new()),
        }
    }

    /// 已保存的读数数量（用于测试）
    pub fn reading_count(&self) -> usize {
        self.readings.read().map(|r| r.len()).unwrap_or(0)
    }

    /// 已保存的模板数量（用于测试）
    pub fn template_count(&self) -> usize {
        self.templates.read().map(|t| t.len()).unwrap_or(0)
    }
}

impl Default for InMemoryScaleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TemplateStore for InMemoryScaleStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn save_template(&self, template: &ProtocolTemplate) -> Result<(), StorageError> {
        let mut templates = self
            .templates
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        templates.insert(template.template_id.clone(), template.clone());
        Ok(())
    }

    async fn find_template(
        &self,
        template_id: &str,
    ) -> Result<Option<ProtocolTemplate>, StorageError> {
        let templates = self
            .templates
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(templates.get(template_id).cloned())
    }
}

#[async_trait::async_trait]
impl ReadingStore for InMemoryScaleStore {
    async fn save_reading(&self, reading: &WeightReading) -> Result<(), StorageError> {
        let mut readings = self
            .readings
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        readings.push(reading.clone());
        Ok(())
    }

    async fn recent_readings(&self, limit: usize) -> Result<Vec<WeightReading>, StorageError> {
        let readings = self
            .readings
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(readings.iter().rev().take(limit).cloned().collect())
    }
}

#[async_trait::async_trait]
impl ScaleStore for InMemoryScaleStore {
    async fn close(&self) {}
}
