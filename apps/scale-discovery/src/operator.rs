//! 终端操作员：回车表示就绪，输入 `q` 或 EOF 表示取消。

use async_trait::async_trait;
use scale_discovery::{Operator, OperatorSignal};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

pub struct StdinOperator {
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl StdinOperator {
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }
}

/// 解析一行输入
pub fn signal_for(line: Option<&str>) -> OperatorSignal {
    match line.map(|l| l.trim().to_ascii_lowercase()) {
        None => OperatorSignal::Cancel,
        Some(l) if l == "q" || l == "quit" => OperatorSignal::Cancel,
        Some(_) => OperatorSignal::Ready,
    }
}

#[async_trait]
impl Operator for StdinOperator {
    fn notify(&self, message: &str) {
        println!("{message}");
    }

    async fn wait_ready(&self, prompt: &str) -> OperatorSignal {
        print!("{prompt} (q to cancel): ");
        let _ = std::io::stdout().flush();
        let mut lines = self.lines.lock().await;
        match lines.next_line().await {
            Ok(line) => signal_for(line.as_deref()),
            Err(err) => {
                tracing::warn!(error = %err, "failed to read operator input");
                OperatorSignal::Cancel
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_operator_input() {
        assert_eq!(signal_for(Some("")), OperatorSignal::Ready);
        assert_eq!(signal_for(Some("  Q ")), OperatorSignal::Cancel);
        assert_eq!(signal_for(Some("quit")), OperatorSignal::Cancel);
        assert_eq!(signal_for(None), OperatorSignal::Cancel);
    }
}
