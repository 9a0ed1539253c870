//! 一次性子命令：连通测试、协议发现、单模板验证、模板列表。

use crate::operator::StdinOperator;
use crate::settings;
use scale_catalog::TemplateCatalog;
use scale_config::AppConfig;
use scale_discovery::{DiscoveryOrchestrator, Phase, Rating, SessionOutcome, TemplateValidator};
use scale_protocol::LinkManager;
use scale_storage::{JsonTemplateDir, open_store};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const CONNECTION_TEST_SAMPLE: Duration = Duration::from_secs(5);
const TEMPLATE_TEST_SAMPLE: Duration = Duration::from_secs(10);
const SAMPLE_PREVIEW: usize = 3;
const MODEL_PREVIEW: usize = 3;

/// 连接仪表并采集 5 秒，返回是否连通。
pub async fn test_connection(link: &LinkManager) -> bool {
    let config = link.config();
    println!("Testing connection to {}...", config.addr());

    if let Err(err) = link.start_capture().await {
        println!("Connection failed: {err}");
        return false;
    }
    println!("Connected, capturing data for {}s...", CONNECTION_TEST_SAMPLE.as_secs());
    tokio::time::sleep(CONNECTION_TEST_SAMPLE).await;

    let frames = link.recent_frames(Duration::from_secs(60));
    println!("Captured {} frames", frames.len());
    if frames.is_empty() {
        println!("No data received; check that the scale is transmitting");
    } else {
        println!("Sample data:");
        for (index, frame) in frames.iter().take(SAMPLE_PREVIEW).enumerate() {
            println!("  {}: {:?}", index + 1, frame.text);
        }
    }

    link.close().await;
    true
}

/// 交互式协议发现，成功接受模板时返回 true。
pub async fn discover(config: &AppConfig, link: Arc<LinkManager>) -> bool {
    let templates_dir = Path::new(&config.templates_dir);
    let catalog = TemplateCatalog::load_dir(templates_dir);
    info!(templates = catalog.len(), dir = %templates_dir.display(), "template catalog loaded");

    let mut orchestrator =
        DiscoveryOrchestrator::new(link.clone(), catalog, settings::discovery_config(config))
            .with_sink(Arc::new(JsonTemplateDir::new(templates_dir)));

    let store = match open_store(config.database_kind, &config.database_url).await {
        Ok(store) => {
            orchestrator = orchestrator.with_sink(store.clone());
            Some(store)
        }
        Err(err) => {
            warn!(error = %err, "database unavailable, templates will only be written to disk");
            None
        }
    };

    let operator = StdinOperator::new();
    let accepted = match orchestrator.run(&operator).await {
        Ok(outcome) => {
            print_outcome(&outcome);
            matches!(outcome, SessionOutcome::Accepted { .. })
        }
        Err(err) => {
            println!("Discovery failed: {err}");
            false
        }
    };

    link.close().await;
    if let Some(store) = store {
        store.close().await;
    }
    accepted
}

fn print_outcome(outcome: &SessionOutcome) {
    match outcome {
        SessionOutcome::Accepted {
            template,
            phase,
            persisted,
        } => {
            let how = match phase {
                Phase::TemplateMatching => "matched an existing template",
                Phase::Interactive => "discovered interactively",
            };
            println!("Protocol {how}");
            println!("  id: {}", template.template_id);
            println!("  name: {}", template.name);
            println!("  confidence: {:.1}%", template.confidence_score);
            for field in &template.fields {
                println!(
                    "  field {}: start {}, length {}",
                    field.name, field.start, field.length
                );
            }
            if persisted.is_empty() {
                println!("  template was not saved");
            } else {
                println!("  saved to: {}", persisted.join(", "));
            }
        }
        SessionOutcome::Cancelled => println!("Discovery cancelled"),
        SessionOutcome::NoData => println!("No data captured; discovery aborted"),
        SessionOutcome::NoTemplate => println!("Discovery did not produce a template"),
    }
}

/// 用实时数据验证单个模板，得分 ≥ 70 时返回 true。
pub async fn test_template(config: &AppConfig, link: Arc<LinkManager>, template_id: &str) -> bool {
    let catalog = TemplateCatalog::load_dir(Path::new(&config.templates_dir));
    let Some(template) = catalog.by_id(template_id) else {
        println!("Template '{template_id}' not found");
        println!("Available templates: {}", catalog.ids().join(", "));
        return false;
    };

    println!("Testing template: {}", template.name);
    let validator = TemplateValidator::new(link.clone());
    let result = validator.test_template(template, TEMPLATE_TEST_SAMPLE).await;
    link.close().await;

    match result {
        Ok(result) => {
            println!("Confidence score: {:.1}%", result.confidence);
            println!(
                "Successful parses: {}/{}",
                result.successful_parses, result.total_attempts
            );
            println!("Rating: {}", result.rating());
            if !result.parsing_errors.is_empty() {
                println!("Parsing errors:");
                for error in result.parsing_errors.iter().take(SAMPLE_PREVIEW) {
                    println!("  - {error}");
                }
            }
            result.rating() >= Rating::Good
        }
        Err(err) => {
            println!("Template test failed: {err}");
            false
        }
    }
}

/// 按厂商分组渲染模板目录。
pub fn render_template_list(catalog: &TemplateCatalog) -> String {
    let mut out = String::new();
    if catalog.is_empty() {
        out.push_str("No templates available\n");
        return out;
    }

    let _ = writeln!(out, "Available protocol templates ({}):", catalog.len());
    for (brand, ids) in catalog.by_group() {
        let _ = writeln!(out, "\n{brand}:");
        for template in ids.iter().filter_map(|id| catalog.by_id(id)) {
            let _ = writeln!(out, "  {} ({})", template.name, template.template_id);
            let _ = writeln!(out, "    confidence: {:.1}%", template.confidence_score);
            let models = template.common_models();
            if !models.is_empty() {
                let preview: Vec<&str> = models.iter().take(MODEL_PREVIEW).map(String::as_str).collect();
                let _ = writeln!(out, "    models: {}", preview.join(", "));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{ManufacturerInfo, ProtocolField, ProtocolTemplate};

    fn template(id: &str, brand: Option<&str>, models: &[&str]) -> ProtocolTemplate {
        ProtocolTemplate {
            template_id: id.to_string(),
            name: format!("{id} format"),
            description: String::new(),
            delimiter: "\r\n".to_string(),
            encoding: "ASCII".to_string(),
            fields: vec![ProtocolField::numeric("weight", 0, 8)],
            confidence_score: 72.5,
            discovery_date: None,
            discovery_method: None,
            original_template: None,
            manufacturer_info: brand.map(|brand| ManufacturerInfo {
                brand: Some(brand.to_string()),
                common_models: models.iter().map(|m| m.to_string()).collect(),
            }),
        }
    }

    #[test]
    fn lists_templates_grouped_by_brand() {
        let catalog = TemplateCatalog::from_templates(vec![
            template("toledo_std", Some("Mettler Toledo"), &["IND560", "IND570", "IND780", "IND890"]),
            template("generic", None, &[]),
        ]);
        let text = render_template_list(&catalog);

        assert!(text.starts_with("Available protocol templates (2):"));
        assert!(text.contains("Mettler Toledo:\n  toledo_std format (toledo_std)"));
        assert!(text.contains("models: IND560, IND570, IND780\n"));
        assert!(!text.contains("IND890"));
        assert!(text.contains("confidence: 72.5%"));
        assert!(text.contains("Unknown:\n  generic format (generic)"));
    }

    #[test]
    fn empty_catalog_listing() {
        assert_eq!(render_template_list(&TemplateCatalog::new()), "No templates available\n");
    }
}
