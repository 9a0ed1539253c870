//! # Scale Storage 模块
//!
//! 协议模板与称重读数的持久化抽象层。
//!
//! ## 架构设计
//!
//! 1. **接口抽象层** (`traits.rs`)：`TemplateStore`、`ReadingStore`、`ScaleStore`
//! 2. **错误处理层** (`error.rs`)：统一的存储错误类型
//! 3. **连接管理层** (`connection.rs`)：连接池与后端选择（`open_store`）
//! 4. **实现层**：
//!    - `in_memory/`：内存存储（测试、演示）
//!    - `postgres/`：PostgreSQL 存储（生产环境）
//!    - `sqlite/`：SQLite 存储（默认，嵌入式文件）
//!    - `json_dir`：模板目录（仅模板）
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use scale_storage::{open_store, TemplateStore};
//! use scale_config::DatabaseKind;
//!
//! let store = open_store(DatabaseKind::Sqlite, "sqlite:adam_weight_data.db?mode=rwc").await?;
//! store.save_template(&template).await?;
//! store.close().await;
//! ```

pub mod connection;
pub mod error;
pub mod in_memory;
pub mod json_dir;
pub mod postgres;
pub mod sqlite;
pub mod traits;

pub use connection::*;
pub use error::*;
pub use in_memory::InMemoryScaleStore;
pub use json_dir::JsonTemplateDir;
pub use postgres::PgScaleStore;
pub use sqlite::SqliteScaleStore;
pub use traits::*;
