//! 追踪初始化与进程级计数指标。

use serde::Serialize;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 基础指标快照。
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct MetricsSnapshot {
    pub frames_captured: u64,
    pub bytes_received: u64,
    pub decode_fallbacks: u64,
    pub connect_attempts: u64,
    pub connect_failures: u64,
    pub disconnects: u64,
    pub buffer_truncations: u64,
    pub templates_tested: u64,
    pub frames_parsed: u64,
    pub frames_rejected: u64,
    pub readings_saved: u64,
    pub reading_save_failures: u64,
}

/// 基础指标。
pub struct TelemetryMetrics {
    frames_captured: AtomicU64,
    bytes_received: AtomicU64,
    decode_fallbacks: AtomicU64,
    connect_attempts: AtomicU64,
    connect_failures: AtomicU64,
    disconnects: AtomicU64,
    buffer_truncations: AtomicU64,
    templates_tested: AtomicU64,
    frames_parsed: AtomicU64,
    frames_rejected: AtomicU64,
    readings_saved: AtomicU64,
    reading_save_failures: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            frames_captured: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            decode_fallbacks: AtomicU64::new(0),
            connect_attempts: AtomicU64::new(0),
            connect_failures: AtomicU64::new(0),
            disconnects: AtomicU64::new(0),
            buffer_truncations: AtomicU64::new(0),
            templates_tested: AtomicU64::new(0),
            frames_parsed: AtomicU64::new(0),
            frames_rejected: AtomicU64::new(0),
            readings_saved: AtomicU64::new(0),
            reading_save_failures: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            decode_fallbacks: self.decode_fallbacks.load(Ordering::Relaxed),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            buffer_truncations: self.buffer_truncations.load(Ordering::Relaxed),
            templates_tested: self.templates_tested.load(Ordering::Relaxed),
            frames_parsed: self.frames_parsed.load(Ordering::Relaxed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
            readings_saved: self.readings_saved.load(Ordering::Relaxed),
            reading_save_failures: self.reading_save_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的发现会话 ID。
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 记录组帧完成的帧数。
pub fn record_frames_captured(count: u64) {
    metrics().frames_captured.fetch_add(count, Ordering::Relaxed);
}

/// 记录收到的字节数。
pub fn record_bytes_received(bytes: u64) {
    metrics().bytes_received.fetch_add(bytes, Ordering::Relaxed);
}

/// 记录解码回退（ASCII/UTF-8 → Latin-1）次数。
pub fn record_decode_fallback() {
    metrics().decode_fallbacks.fetch_add(1, Ordering::Relaxed);
}

/// 记录连接尝试次数。
pub fn record_connect_attempt() {
    metrics().connect_attempts.fetch_add(1, Ordering::Relaxed);
}

/// 记录连接失败次数。
pub fn record_connect_failure() {
    metrics().connect_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录连接断开次数（对端关闭或读错误）。
pub fn record_disconnect() {
    metrics().disconnects.fetch_add(1, Ordering::Relaxed);
}

/// 记录帧缓冲截断次数。
pub fn record_buffer_truncation() {
    metrics().buffer_truncations.fetch_add(1, Ordering::Relaxed);
}

/// 记录模板测试次数。
pub fn record_template_tested() {
    metrics().templates_tested.fetch_add(1, Ordering::Relaxed);
}

/// 记录模板解析成功/失败的帧数。
pub fn record_frame_parse(parsed: u64, rejected: u64) {
    let metrics = metrics();
    metrics.frames_parsed.fetch_add(parsed, Ordering::Relaxed);
    metrics.frames_rejected.fetch_add(rejected, Ordering::Relaxed);
}

/// 记录读数写入成功次数。
pub fn record_reading_saved() {
    metrics().readings_saved.fetch_add(1, Ordering::Relaxed);
}

/// 记录读数写入失败次数。
pub fn record_reading_save_failure() {
    metrics()
        .reading_save_failures
        .fetch_add(1, Ordering::Relaxed);
}
