//! # 链路管理能力模块
//!
//! 主动连接称重仪表所在的串口服务器，持续采集文本帧：
//! - **TCP 连接**：连接超时、读超时、断线后按间隔自动重连
//! - **组帧**：以 CR/LF 为边界切分字节流，跨分块保留半行
//! - **帧缓冲**：有界滑动窗口，按时间取最近的帧
//!
//! ## 架构设计
//!
//! ```text
//! 串口服务器 (TCP)
//!       │
//!       ▼
//! LinkManager ── capture_loop (后台任务)
//!       │               │
//!       │               ▼
//!       │          LineFramer
//!       │               │
//!       ▼               ▼
//! FrameSource ◄── FrameBuffer
//!       │
//!       ▼
//! TemplateValidator / DiscoveryOrchestrator
//! ```

mod buffer;
mod error;
mod framer;
mod link;
mod types;

pub use buffer::{DEFAULT_BUFFER_CAPACITY, DEFAULT_BUFFER_RETAIN, FrameBuffer};
pub use error::LinkError;
pub use framer::{Decoded, FramerOutput, LineFramer, decode};
pub use link::{FrameSource, LinkConfig, LinkManager};
pub use types::*;
