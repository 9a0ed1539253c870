//! 应用运行配置加载。

use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 存储后端类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseKind {
    Sqlite,
    Postgres,
    Memory,
}

impl DatabaseKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "sqlite" => Some(Self::Sqlite),
            "postgresql" | "postgres" => Some(Self::Postgres),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

const SUPPORTED_ENCODINGS: &[&str] = &["ascii", "utf-8", "utf8", "latin-1", "latin1"];

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub scale_host: String,
    pub scale_port: u16,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub reconnect_delay_ms: u64,
    pub read_buffer_size: usize,
    pub buffer_capacity: usize,
    pub buffer_retain: usize,
    pub encoding: String,
    pub confidence_threshold: f64,
    pub template_sample_seconds: u64,
    pub baseline_sample_seconds: u64,
    pub step_sample_seconds: u64,
    pub templates_dir: String,
    pub database_kind: DatabaseKind,
    pub database_url: String,
    pub device_id: String,
    pub poll_interval_ms: u64,
    pub health_addr: String,
    pub monitor_template: Option<String>,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 从任意键值来源读取配置（环境变量、测试用映射）。
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let reader = Reader { lookup: &lookup };

        let scale_host = reader.string("SCALE_HOST", "192.168.1.101");
        let scale_port = reader.parsed("SCALE_PORT", 4001u16)?;
        let connect_timeout_ms = reader.parsed("SCALE_CONNECT_TIMEOUT_MS", 5000u64)?;
        let read_timeout_ms = reader.parsed("SCALE_READ_TIMEOUT_MS", 1000u64)?;
        let reconnect_delay_ms = reader.parsed("SCALE_RECONNECT_DELAY_MS", 2000u64)?;
        let read_buffer_size = reader.parsed("SCALE_READ_BUFFER_SIZE", 1024usize)?;
        let buffer_capacity = reader.parsed("SCALE_BUFFER_CAPACITY", 1000usize)?;
        let buffer_retain = reader.parsed("SCALE_BUFFER_RETAIN", 500usize)?;
        let encoding = reader.string("SCALE_ENCODING", "ascii");
        let confidence_threshold = reader.parsed("SCALE_CONFIDENCE_THRESHOLD", 85.0f64)?;
        let template_sample_seconds = reader.parsed("SCALE_TEMPLATE_SAMPLE_SECONDS", 5u64)?;
        let baseline_sample_seconds = reader.parsed("SCALE_BASELINE_SAMPLE_SECONDS", 5u64)?;
        let step_sample_seconds = reader.parsed("SCALE_STEP_SAMPLE_SECONDS", 3u64)?;
        let templates_dir = reader.string("SCALE_TEMPLATES_DIR", "protocol_templates");
        let db_type = reader.string("SCALE_DB_TYPE", "sqlite");
        let database_kind = DatabaseKind::parse(&db_type)
            .ok_or_else(|| ConfigError::Invalid("SCALE_DB_TYPE".to_string(), db_type.clone()))?;
        let database_url = match reader.optional("SCALE_DB_URL") {
            Some(url) => url,
            None if database_kind == DatabaseKind::Postgres => {
                return Err(ConfigError::Missing("SCALE_DB_URL".to_string()));
            }
            None => "sqlite:adam_weight_data.db?mode=rwc".to_string(),
        };
        let device_id = reader.string("SCALE_DEVICE_ID", "ADAM-4571-Scale");
        let poll_interval_ms = reader.parsed("SCALE_POLL_INTERVAL_MS", 10_000u64)?;
        let health_addr = reader.string("SCALE_HEALTH_ADDR", "127.0.0.1:8090");
        let monitor_template = reader.optional("SCALE_MONITOR_TEMPLATE");

        for (key, value) in [
            ("SCALE_CONNECT_TIMEOUT_MS", connect_timeout_ms),
            ("SCALE_READ_TIMEOUT_MS", read_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(key.to_string(), value.to_string()));
            }
        }
        if !(0.0..=100.0).contains(&confidence_threshold) {
            return Err(ConfigError::Invalid(
                "SCALE_CONFIDENCE_THRESHOLD".to_string(),
                confidence_threshold.to_string(),
            ));
        }
        if buffer_capacity == 0 || buffer_retain > buffer_capacity {
            return Err(ConfigError::Invalid(
                "SCALE_BUFFER_RETAIN".to_string(),
                format!("{buffer_retain} (capacity {buffer_capacity})"),
            ));
        }
        if !SUPPORTED_ENCODINGS.contains(&encoding.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::Invalid("SCALE_ENCODING".to_string(), encoding));
        }
        if !(1_000..=3_600_000).contains(&poll_interval_ms) {
            return Err(ConfigError::Invalid(
                "SCALE_POLL_INTERVAL_MS".to_string(),
                poll_interval_ms.to_string(),
            ));
        }

        Ok(Self {
            scale_host,
            scale_port,
            connect_timeout_ms,
            read_timeout_ms,
            reconnect_delay_ms,
            read_buffer_size,
            buffer_capacity,
            buffer_retain,
            encoding,
            confidence_threshold,
            template_sample_seconds,
            baseline_sample_seconds,
            step_sample_seconds,
            templates_dir,
            database_kind,
            database_url,
            device_id,
            poll_interval_ms,
            health_addr,
            monitor_template,
        })
    }
}

struct Reader<'a, F> {
    lookup: &'a F,
}

impl<F> Reader<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        match (self.lookup)(key) {
            Some(value) if !value.is_empty() => Some(value),
            _ => None,
        }
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        let value = match self.optional(key) {
            Some(value) => value,
            None => return Ok(default),
        };
        value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid(key.to_string(), value))
    }
}
