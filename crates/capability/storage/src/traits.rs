//! 存储接口 Trait 定义
//!
//! - TemplateStore：协议模板存储（按 template_id 插入或更新）
//! - ReadingStore：称重读数存储（仅追加）
//! - ScaleStore：数据库后端，同时提供两者
//!
//! 设计原则：
//! - 所有接口返回 StorageError
//! - 使用 async_trait 支持动态分发，后端在启动时选择一次

use crate::error::StorageError;
use async_trait::async_trait;
use domain::{ProtocolTemplate, WeightReading};

/// 协议模板存储接口
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// 后端名称（日志与会话结果中使用）
    fn backend(&self) -> &'static str;

    /// 保存模板；同一 template_id 已存在时整体覆盖
    async fn save_template(&self, template: &ProtocolTemplate) -> Result<(), StorageError>;

    async fn find_template(
        &self,
        template_id: &str,
    ) -> Result<Option<ProtocolTemplate>, StorageError>;
}

/// 称重读数存储接口
#[async_trait]
pub trait ReadingStore: Send + Sync {
    async fn save_reading(&self, reading: &WeightReading) -> Result<(), StorageError>;

    /// 最近的读数，新的在前
    async fn recent_readings(&self, limit: usize) -> Result<Vec<WeightReading>, StorageError>;
}

/// 数据库后端
#[async_trait]
pub trait ScaleStore: TemplateStore + ReadingStore {
    /// 关闭连接池。可重复调用。
    async fn close(&self);
}
