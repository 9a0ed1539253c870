//! 运行配置 → 各能力模块配置。

use scale_config::AppConfig;
use scale_discovery::DiscoveryConfig;
use scale_protocol::{LinkConfig, TextEncoding};
use std::time::Duration;

pub fn link_config(config: &AppConfig) -> LinkConfig {
    LinkConfig {
        connect_timeout: Duration::from_millis(config.connect_timeout_ms),
        read_timeout: Duration::from_millis(config.read_timeout_ms),
        reconnect_delay: Duration::from_millis(config.reconnect_delay_ms),
        read_buffer_size: config.read_buffer_size,
        buffer_capacity: config.buffer_capacity,
        buffer_retain: config.buffer_retain,
        encoding: TextEncoding::from_label(&config.encoding).unwrap_or_default(),
        ..LinkConfig::new(config.scale_host.clone(), config.scale_port)
    }
}

pub fn discovery_config(config: &AppConfig) -> DiscoveryConfig {
    DiscoveryConfig {
        confidence_threshold: config.confidence_threshold,
        template_sample: Duration::from_secs(config.template_sample_seconds),
        baseline_sample: Duration::from_secs(config.baseline_sample_seconds),
        step_sample: Duration::from_secs(config.step_sample_seconds),
        ..DiscoveryConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_env_config() {
        let config = AppConfig::from_lookup(|key: &str| match key {
            "SCALE_HOST" => Some("10.0.0.7".to_string()),
            "SCALE_ENCODING" => Some("latin-1".to_string()),
            "SCALE_CONFIDENCE_THRESHOLD" => Some("90".to_string()),
            "SCALE_STEP_SAMPLE_SECONDS" => Some("4".to_string()),
            _ => None,
        })
        .expect("config");

        let link = link_config(&config);
        assert_eq!(link.addr(), "10.0.0.7:4001");
        assert_eq!(link.encoding, TextEncoding::Latin1);
        assert!(link.auto_reconnect);

        let discovery = discovery_config(&config);
        assert_eq!(discovery.confidence_threshold, 90.0);
        assert_eq!(discovery.step_sample, Duration::from_secs(4));
        assert_eq!(discovery.early_accept_score, 95.0);
    }
}
