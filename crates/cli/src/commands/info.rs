//! `info` command implementation.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use contracts::{SinkType, StreamerConfig};
use serde::Serialize;
use streamer::{QueueCapacity, RetryPolicy};
use tracing::info;

use crate::cli::InfoArgs;
use crate::error::ensure_config_exists;

/// Effective configuration for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    workers: usize,
    queue_capacity: String,
    max_batch_delay_ms: u64,
    retry: RetryInfo,
    sink: SinkInfo,
}

#[derive(Serialize)]
struct RetryInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_attempts: Option<u32>,
    initial_delay_ms: u128,
    multiplier: f64,
    max_deadline_offset_ms: u128,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    sink_type: SinkType,
    batch_size: usize,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    params: BTreeMap<String, String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    ensure_config_exists(&args.config)?;

    let config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    let info = build_config_info(&config, args.params);

    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

fn build_config_info(config: &StreamerConfig, with_params: bool) -> ConfigInfo {
    let batch_size = config.sink.effective_batch_size();
    let queue_capacity = match QueueCapacity::from_config_value(config.worker_queue_size) {
        QueueCapacity::Synchronous => "synchronous".to_string(),
        capacity => capacity.resolve(batch_size).to_string(),
    };
    let retry = RetryPolicy::from_config(&config.retry);

    let params = if with_params {
        config
            .sink
            .params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    } else {
        BTreeMap::new()
    };

    ConfigInfo {
        workers: config.worker_count.max(1) as usize,
        queue_capacity,
        max_batch_delay_ms: config.max_batch_delay_ms,
        retry: RetryInfo {
            max_attempts: retry.max_attempts,
            initial_delay_ms: retry.initial_delay.as_millis(),
            multiplier: retry.multiplier,
            max_deadline_offset_ms: retry.max_deadline_offset.as_millis(),
        },
        sink: SinkInfo {
            name: config.sink.name.clone(),
            sink_type: config.sink.sink_type,
            batch_size,
            params,
        },
    }
}

fn print_config_info(info: &ConfigInfo) {
    println!("=== Flushline Configuration ===\n");

    println!("Engine");
    println!("  Workers: {}", info.workers);
    println!("  Queue capacity: {}", info.queue_capacity);
    println!("  Max batch delay: {} ms", info.max_batch_delay_ms);

    println!("\nRetry");
    match info.retry.max_attempts {
        Some(n) => println!("  Max attempts: {}", n),
        None => println!("  Max attempts: unlimited"),
    }
    println!("  Initial delay: {} ms", info.retry.initial_delay_ms);
    println!("  Multiplier: {}", info.retry.multiplier);
    println!("  Deadline offset: {} ms", info.retry.max_deadline_offset_ms);

    println!("\nSink");
    println!("  Name: {}", info.sink.name);
    println!("  Type: {:?}", info.sink.sink_type);
    println!("  Batch size: {}", info.sink.batch_size);
    for (key, value) in &info.sink.params {
        println!("  {}: {}", key, value);
    }

    println!();
}
