//! TCP 链路管理
//!
//! 主动连接串口服务器（ADAM-4571 一类设备），在后台任务中持续读取字节流，
//! 组帧后写入帧缓冲。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let link = LinkManager::new(LinkConfig::new("192.168.1.101", 4001));
//! link.start_capture().await?;
//! tokio::time::sleep(Duration::from_secs(5)).await;
//! let frames = link.recent_frames(Duration::from_secs(6));
//! link.close().await;
//! ```
//!
//! ## 所有权
//!
//! socket 任一时刻只属于一方：未采集时存放在 `LinkManager` 中，采集时移交给
//! 后台任务，停止采集时任务把它交还。因此不会出现任务读取一个已被关闭的 socket。

use crate::buffer::{DEFAULT_BUFFER_CAPACITY, DEFAULT_BUFFER_RETAIN, FrameBuffer};
use crate::error::LinkError;
use crate::framer::LineFramer;
use crate::types::{LinkHealth, LinkState, TextEncoding};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::Frame;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// 等待采集任务退出的上限
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// 链路配置
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub reconnect_delay: Duration,
    pub read_buffer_size: usize,
    pub buffer_capacity: usize,
    pub buffer_retain: usize,
    pub encoding: TextEncoding,
    /// 断线后是否在采集任务内自动重连
    pub auto_reconnect: bool,
}

impl LinkConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(1),
            reconnect_delay: Duration::from_secs(2),
            read_buffer_size: 1024,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            buffer_retain: DEFAULT_BUFFER_RETAIN,
            encoding: TextEncoding::Ascii,
            auto_reconnect: true,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 帧来源：验证器与发现流程只通过它读取帧
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// 确保已连接并在采集
    async fn ensure_capturing(&self) -> Result<(), LinkError>;

    /// 清空缓冲，开始新的采样窗口
    fn clear_buffer(&self);

    /// 最近 `max_age` 内捕获的帧副本
    fn recent_frames(&self, max_age: Duration) -> Vec<Frame>;

    /// 捕获时间晚于 `after` 的帧副本（按到达顺序），用于游标式增量读取
    fn frames_since(&self, after: Option<DateTime<Utc>>) -> Vec<Frame> {
        self.recent_frames(Duration::MAX)
            .into_iter()
            .filter(|frame| after.is_none_or(|after| frame.captured_at > after))
            .collect()
    }
}

#[derive(Debug)]
struct LinkStatus {
    state: LinkState,
    consecutive_failures: u32,
    last_successful_read: Option<DateTime<Utc>>,
}

/// 采集任务与管理器共享的状态
#[derive(Debug)]
struct LinkShared {
    status: Mutex<LinkStatus>,
    buffer: FrameBuffer,
}

impl LinkShared {
    fn status(&self) -> MutexGuard<'_, LinkStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: LinkState) {
        self.status().state = state;
    }

    fn mark_connected(&self) {
        let mut status = self.status();
        status.state = LinkState::Connected;
        status.consecutive_failures = 0;
        status.last_successful_read = Some(Utc::now());
    }

    fn mark_connect_failed(&self) -> u32 {
        let mut status = self.status();
        status.state = LinkState::Faulted;
        status.consecutive_failures = status.consecutive_failures.saturating_add(1);
        status.consecutive_failures
    }

    fn mark_disconnected(&self) {
        let mut status = self.status();
        status.state = LinkState::Disconnected;
        status.consecutive_failures = status.consecutive_failures.saturating_add(1);
    }

    fn mark_read(&self) {
        let mut status = self.status();
        status.consecutive_failures = 0;
        status.last_successful_read = Some(Utc::now());
    }
}

struct CaptureHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<Option<TcpStream>>,
}

/// 链路管理器
pub struct LinkManager {
    config: LinkConfig,
    shared: Arc<LinkShared>,
    /// 未采集时持有的 socket
    stream: tokio::sync::Mutex<Option<TcpStream>>,
    capture: tokio::sync::Mutex<Option<CaptureHandle>>,
}

impl LinkManager {
    pub fn new(config: LinkConfig) -> Self {
        let buffer = FrameBuffer::new(config.buffer_capacity, config.buffer_retain);
        Self {
            config,
            shared: Arc::new(LinkShared {
                status: Mutex::new(LinkStatus {
                    state: LinkState::Disconnected,
                    consecutive_failures: 0,
                    last_successful_read: None,
                }),
                buffer,
            }),
            stream: tokio::sync::Mutex::new(None),
            capture: tokio::sync::Mutex::new(None),
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn state(&self) -> LinkState {
        self.shared.status().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Connected
    }

    /// 建立连接。可重复调用：先停止采集并关闭旧 socket。
    pub async fn connect(&self) -> Result<(), LinkError> {
        self.stop_capture().await;
        let mut slot = self.stream.lock().await;
        drop(slot.take());
        let stream = open_stream(&self.config, &self.shared).await?;
        *slot = Some(stream);
        Ok(())
    }

    /// 开始后台采集；未连接时先连接。已在采集时直接返回。
    pub async fn start_capture(&self) -> Result<(), LinkError> {
        let mut capture = self.capture.lock().await;
        if let Some(handle) = capture.as_ref() {
            if !handle.task.is_finished() {
                return Ok(());
            }
        }
        if let Some(finished) = capture.take() {
            if let Ok(Some(stream)) = finished.task.await {
                *self.stream.lock().await = Some(stream);
            }
        }

        let existing = self.stream.lock().await.take();
        let stream = match existing {
            Some(stream) if self.is_connected() => stream,
            _ => open_stream(&self.config, &self.shared).await?,
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(capture_loop(
            self.config.clone(),
            Arc::clone(&self.shared),
            Some(stream),
            stop_rx,
        ));
        *capture = Some(CaptureHandle { stop_tx, task });
        info!(addr = %self.config.addr(), "started data capture");
        Ok(())
    }

    /// 停止采集并等待任务退出（有上限）。幂等。
    pub async fn stop_capture(&self) {
        let handle = self.capture.lock().await.take();
        let Some(handle) = handle else {
            return;
        };
        let _ = handle.stop_tx.send(true);
        let mut task = handle.task;
        match tokio::time::timeout(STOP_TIMEOUT, &mut task).await {
            Ok(Ok(Some(stream))) => {
                *self.stream.lock().await = Some(stream);
            }
            Ok(Ok(None)) => {}
            Ok(Err(err)) => {
                warn!(error = %err, "capture task ended abnormally");
                self.shared.set_state(LinkState::Disconnected);
            }
            Err(_) => {
                warn!("capture task did not stop in time, aborting");
                task.abort();
                self.shared.set_state(LinkState::Disconnected);
            }
        }
        info!("stopped data capture");
    }

    /// 停止采集、关闭 socket。幂等。
    pub async fn close(&self) {
        self.stop_capture().await;
        let previous = self.stream.lock().await.take();
        if previous.is_some() {
            info!(addr = %self.config.addr(), "tcp connection closed");
        }
        self.shared.set_state(LinkState::Disconnected);
    }

    pub fn recent_frames(&self, max_age: Duration) -> Vec<Frame> {
        self.shared.buffer.recent(max_age)
    }

    pub fn clear_buffer(&self) {
        self.shared.buffer.clear();
    }

    pub fn frames_since(&self, after: Option<DateTime<Utc>>) -> Vec<Frame> {
        self.shared.buffer.frames_since(after)
    }

    pub fn health(&self) -> LinkHealth {
        let buffer_size = self.shared.buffer.len();
        let status = self.shared.status();
        let seconds_since_last_read = status
            .last_successful_read
            .map(|at| (Utc::now() - at).num_milliseconds() as f64 / 1000.0);
        LinkHealth {
            connected: status.state == LinkState::Connected,
            state: status.state,
            consecutive_failures: status.consecutive_failures,
            last_successful_read: status.last_successful_read,
            seconds_since_last_read,
            buffer_size,
        }
    }
}

#[async_trait]
impl FrameSource for LinkManager {
    async fn ensure_capturing(&self) -> Result<(), LinkError> {
        self.start_capture().await
    }

    fn clear_buffer(&self) {
        LinkManager::clear_buffer(self);
    }

    fn recent_frames(&self, max_age: Duration) -> Vec<Frame> {
        LinkManager::recent_frames(self, max_age)
    }

    fn frames_since(&self, after: Option<DateTime<Utc>>) -> Vec<Frame> {
        LinkManager::frames_since(self, after)
    }
}

/// 打开一条新连接并更新链路状态
async fn open_stream(config: &LinkConfig, shared: &LinkShared) -> Result<TcpStream, LinkError> {
    let addr = config.addr();
    shared.set_state(LinkState::Connecting);
    scale_telemetry::record_connect_attempt();
    info!(addr = %addr, "connecting to scale");

    let result = match tokio::time::timeout(config.connect_timeout, TcpStream::connect(&addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(err)) => Err(LinkError::Connection(err.to_string())),
        Err(_) => Err(LinkError::Timeout(format!(
            "connect to {addr} exceeded {}ms",
            config.connect_timeout.as_millis()
        ))),
    };

    match result {
        Ok(stream) => {
            let _ = stream.set_nodelay(true);
            shared.mark_connected();
            info!(addr = %addr, "connected to scale");
            Ok(stream)
        }
        Err(err) => {
            let failures = shared.mark_connect_failed();
            scale_telemetry::record_connect_failure();
            error!(addr = %addr, failures, error = %err, "failed to connect to scale");
            Err(err)
        }
    }
}

/// 后台采集循环；退出时交还仍然可用的 socket
async fn capture_loop(
    config: LinkConfig,
    shared: Arc<LinkShared>,
    mut stream: Option<TcpStream>,
    mut stop_rx: watch::Receiver<bool>,
) -> Option<TcpStream> {
    let mut framer = LineFramer::new(config.encoding);
    let mut buf = vec![0u8; config.read_buffer_size.max(1)];

    loop {
        if *stop_rx.borrow() {
            return stream;
        }

        let Some(active) = stream.as_mut() else {
            if !config.auto_reconnect {
                return None;
            }
            tokio::select! {
                changed = stop_rx.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                    continue;
                }
                _ = tokio::time::sleep(config.reconnect_delay) => {}
            }
            if let Ok(reconnected) = open_stream(&config, &shared).await {
                framer.reset();
                stream = Some(reconnected);
            }
            continue;
        };

        let read = tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() {
                    return stream;
                }
                continue;
            }
            read = tokio::time::timeout(config.read_timeout, active.read(&mut buf)) => read,
        };

        match read {
            // 读超时只表示暂时没有数据
            Err(_) => continue,
            Ok(Ok(0)) => {
                warn!("no data received, connection closed by peer");
                shared.mark_disconnected();
                scale_telemetry::record_disconnect();
                stream = None;
            }
            Ok(Ok(n)) => {
                shared.mark_read();
                scale_telemetry::record_bytes_received(n as u64);
                let output = framer.push(&buf[..n]);
                if output.decode_fallback {
                    scale_telemetry::record_decode_fallback();
                    debug!(bytes = n, "decoded chunk with latin-1 fallback");
                }
                if !output.frames.is_empty() {
                    let count = output.frames.len();
                    let now = Utc::now();
                    let truncations = shared
                        .buffer
                        .extend(output.frames.into_iter().map(|text| Frame::at(text, now)));
                    scale_telemetry::record_frames_captured(count as u64);
                    for _ in 0..truncations {
                        scale_telemetry::record_buffer_truncation();
                    }
                    debug!(frames = count, "captured frames");
                }
            }
            Ok(Err(err)) => {
                error!(error = %err, "socket error in capture loop");
                shared.mark_disconnected();
                scale_telemetry::record_disconnect();
                stream = None;
            }
        }
    }
}
