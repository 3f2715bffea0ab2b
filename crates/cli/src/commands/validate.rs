//! `validate` command implementation.

use std::path::Path;

use anyhow::{Context, Result};
use contracts::{SinkType, StreamerConfig};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    sink: String,
    sink_type: SinkType,
    batch_size: usize,
    worker_count: i32,
    worker_queue_size: i32,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(&args.config);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(path: &Path) -> ValidationResult {
    let config_path = path.display().to_string();

    if !path.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", path.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(path) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    sink: config.sink.name.clone(),
                    sink_type: config.sink.sink_type,
                    batch_size: config.sink.effective_batch_size(),
                    worker_count: config.worker_count,
                    worker_queue_size: config.worker_queue_size,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &StreamerConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.worker_queue_size == config_loader::SYNCHRONOUS_QUEUE {
        warnings.push(
            "worker_queue_size < 0 - every write waits until a worker takes the record"
                .to_string(),
        );
    }

    if config.retry.max_attempts < 0 {
        warnings.push(
            "retry.max_attempts < 0 - failing sink calls are retried until the deadline offset"
                .to_string(),
        );
    }

    if config.sink.sink_type == SinkType::Log && config.sink.effective_batch_size() == 1 {
        warnings.push("log sink with batch_size 1 - every record is a separate put".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Sink: {} ({:?})", summary.sink, summary.sink_type);
            println!("  Batch size: {}", summary.batch_size);
            println!("  Workers: {}", summary.worker_count);
            println!("  Queue size: {}", summary.worker_queue_size);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_valid_config_with_warnings() {
        let file = config_file(
            r#"
worker_queue_size = -1

[sink]
name = "events"
sink_type = "log"
batch_size = -1
"#,
        );

        let result = validate_config(file.path());
        assert!(result.valid);
        let summary = result.summary.unwrap();
        assert_eq!(summary.batch_size, 1);
        assert_eq!(summary.worker_count, 2);
        assert_eq!(result.warnings.unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_config() {
        let file = config_file(
            r#"
[sink]
name = "udp"
sink_type = "network"
"#,
        );

        let result = validate_config(file.path());
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("addr"));
    }

    #[test]
    fn test_missing_file() {
        let result = validate_config(Path::new("/no/such/flushline.toml"));
        assert!(!result.valid);
        assert!(result.error.unwrap().starts_with("File not found"));
    }
}
