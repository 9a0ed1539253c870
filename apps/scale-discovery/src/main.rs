//! 称重仪表协议发现工具：连通测试、协议发现、模板验证与读数监控。

mod commands;
mod monitor;
mod operator;
mod settings;

use clap::{Parser, Subcommand};
use scale_catalog::TemplateCatalog;
use scale_config::AppConfig;
use scale_normalize::ReadingExtractor;
use scale_protocol::LinkManager;
use scale_storage::open_store;
use scale_telemetry::init_tracing;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Parser)]
#[command(name = "scale-discovery", version, about = "Scale protocol discovery tool")]
struct Cli {
    /// 仪表地址（覆盖 SCALE_HOST）
    #[arg(long, global = true)]
    host: Option<String>,
    /// 仪表端口（覆盖 SCALE_PORT）
    #[arg(long, global = true)]
    port: Option<u16>,
    /// 模板目录（覆盖 SCALE_TEMPLATES_DIR）
    #[arg(long, global = true)]
    templates_dir: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Test the connection and show sample frames
    Test,
    /// Run interactive protocol discovery
    Discover,
    /// Validate one template against live data
    Template { template_id: String },
    /// List available protocol templates
    ListTemplates,
    /// Continuously store readings and serve /health
    Monitor,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    // 加载本地 .env（如存在）
    dotenvy::dotenv().ok();
    let mut config = AppConfig::from_env()?;
    init_tracing();

    if let Some(host) = cli.host {
        config.scale_host = host;
    }
    if let Some(port) = cli.port {
        config.scale_port = port;
    }
    if let Some(dir) = cli.templates_dir {
        config.templates_dir = dir;
    }

    let link = Arc::new(LinkManager::new(settings::link_config(&config)));
    let ok = match cli.command {
        Command::Test => commands::test_connection(&link).await,
        Command::Discover => commands::discover(&config, link).await,
        Command::Template { template_id } => {
            commands::test_template(&config, link, &template_id).await
        }
        Command::ListTemplates => {
            let catalog = TemplateCatalog::load_dir(Path::new(&config.templates_dir));
            print!("{}", commands::render_template_list(&catalog));
            true
        }
        Command::Monitor => {
            let store = open_store(config.database_kind, &config.database_url).await?;
            let extractor = monitor_extractor(&config);
            monitor::run(&config, link, store, extractor).await?;
            true
        }
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// 配置了 SCALE_MONITOR_TEMPLATE 且目录中存在时按模板解析，否则启发式
fn monitor_extractor(config: &AppConfig) -> ReadingExtractor {
    let Some(template_id) = config.monitor_template.as_deref() else {
        return ReadingExtractor::heuristic(config.device_id.clone());
    };
    let catalog = TemplateCatalog::load_dir(Path::new(&config.templates_dir));
    match catalog.by_id(template_id) {
        Some(template) => ReadingExtractor::with_template(config.device_id.clone(), template.clone()),
        None => {
            warn!(template_id, "monitor template not found, using heuristic extraction");
            ReadingExtractor::heuristic(config.device_id.clone())
        }
    }
}
