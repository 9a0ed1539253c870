//! # 内存存储实现模块
//!
//! 使用 `RwLock` 保存模板与读数，适用于单元测试、集成测试和演示运行。

pub mod scale;

pub use scale::*;
