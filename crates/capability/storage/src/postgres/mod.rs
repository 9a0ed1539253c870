//! # PostgreSQL 存储实现模块
//!
//! 生产环境使用。表结构：
//!
//! - `weight_readings`：称重读数（device_id, weight, unit, stable, raw_data, timestamp）
//! - `protocol_templates`：协议模板（template_id 唯一，template_data 为 JSONB）
//!
//! 表不存在时在连接后创建；模板保存使用 `ON CONFLICT (template_id) DO UPDATE`。

pub mod scale;

pub use scale::*;
