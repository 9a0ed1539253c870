//! 操作员交互边界
//!
//! 发现流程只通过该 trait 显示进度、等待“就绪/取消”信号，
//! 不关心信号来自终端、界面还是测试脚本。

use async_trait::async_trait;

/// 操作员在等待点给出的信号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorSignal {
    Ready,
    Cancel,
}

#[async_trait]
pub trait Operator: Send + Sync {
    /// 显示进度或结果
    fn notify(&self, message: &str);

    /// 显示提示并等待操作员确认；没有超时
    async fn wait_ready(&self, prompt: &str) -> OperatorSignal;
}
