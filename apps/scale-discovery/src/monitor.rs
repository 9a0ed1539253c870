//! 读数监控服务：持续采集，按周期把新帧转换为读数入库，并提供 `/health`。
//!
//! 每次轮询只处理捕获时间晚于上次游标的帧，读数不会重复入库，也不会因
//! 轮询时刻抖动而遗漏。

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use scale_config::AppConfig;
use scale_normalize::ReadingExtractor;
use scale_protocol::{FrameSource, LinkManager};
use scale_storage::{ReadingStore, ScaleStore, TemplateStore};
use scale_telemetry::{
    metrics, record_frame_parse, record_reading_save_failure, record_reading_saved,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// 单次轮询统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub saved: usize,
    /// 与模板不匹配的帧
    pub rejected: usize,
    /// 入库失败的读数
    pub failed: usize,
}

/// 增量轮询器：把游标之后的新帧转换为读数并逐条保存
#[derive(Debug)]
pub struct ReadingPoller {
    extractor: ReadingExtractor,
    /// 已处理的最新帧的捕获时间
    last_processed: Option<DateTime<Utc>>,
}

impl ReadingPoller {
    pub fn new(extractor: ReadingExtractor) -> Self {
        Self {
            extractor,
            last_processed: None,
        }
    }

    pub fn last_processed(&self) -> Option<DateTime<Utc>> {
        self.last_processed
    }

    /// 处理一轮。入库失败的读数不重试，游标照常前移。
    pub async fn poll(&mut self, source: &dyn FrameSource, store: &dyn ReadingStore) -> PollSummary {
        let mut summary = PollSummary::default();
        let frames = source.frames_since(self.last_processed);
        if let Some(newest) = frames.iter().map(|frame| frame.captured_at).max() {
            self.last_processed = Some(newest);
        }

        let mut parsed = 0u64;
        for frame in &frames {
            let reading = match self.extractor.extract(frame) {
                Ok(reading) => reading,
                Err(err) => {
                    debug!(error = %err, "frame rejected");
                    summary.rejected += 1;
                    continue;
                }
            };
            parsed += 1;
            match store.save_reading(&reading).await {
                Ok(()) => {
                    record_reading_saved();
                    summary.saved += 1;
                }
                Err(err) => {
                    warn!(error = %err, device_id = %reading.device_id, "failed to save reading");
                    record_reading_save_failure();
                    summary.failed += 1;
                }
            }
        }
        record_frame_parse(parsed, summary.rejected as u64);
        summary
    }
}

/// `/health` 路由
pub fn health_router(link: Arc<LinkManager>) -> Router {
    Router::new().route("/health", get(health)).with_state(link)
}

async fn health(State(link): State<Arc<LinkManager>>) -> (StatusCode, Json<serde_json::Value>) {
    let health = link.health();
    let (code, status) = if health.connected {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };
    (
        code,
        Json(serde_json::json!({
            "status": status,
            "link": health,
            "metrics": metrics().snapshot(),
        })),
    )
}

/// 运行监控服务直到 Ctrl-C。
pub async fn run(
    config: &AppConfig,
    link: Arc<LinkManager>,
    store: Arc<dyn ScaleStore>,
    extractor: ReadingExtractor,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(&config.health_addr).await?;
    info!(addr = %config.health_addr, "health endpoint listening");
    let app = health_router(link.clone());
    let server = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            warn!(error = %err, "health endpoint stopped");
        }
    });

    if let Err(err) = link.ensure_capturing().await {
        warn!(error = %err, "scale unavailable, will retry every poll interval");
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(config.poll_interval_ms));
    ticker.tick().await;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_ms = config.poll_interval_ms,
        backend = store.backend(),
        template = extractor
            .template()
            .map(|t| t.template_id.as_str())
            .unwrap_or("heuristic"),
        "monitor started"
    );
    let mut poller = ReadingPoller::new(extractor);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown requested");
                break;
            }
            _ = ticker.tick() => {
                if let Err(err) = link.ensure_capturing().await {
                    warn!(error = %err, "scale unavailable");
                    continue;
                }
                let summary = poller.poll(&*link, &*store).await;
                info!(
                    saved = summary.saved,
                    rejected = summary.rejected,
                    failed = summary.failed,
                    "poll complete"
                );
            }
        }
    }

    server.abort();
    link.close().await;
    store.close().await;
    info!("monitor stopped");
    Ok(())
}
