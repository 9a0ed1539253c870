//! # SQLite 存储实现模块
//!
//! 嵌入式文件存储，默认后端。表结构与 PostgreSQL 实现一致，
//! 时间戳以 RFC 3339 文本保存，模板数据以 JSON 文本保存。

pub mod scale;

pub use scale::*;
