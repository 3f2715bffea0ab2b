//! 配置验证
//!
//! 在默认值填充之后运行，此时每个参数都已是生效值。
//!
//! 验证规则：
//! - sink 名称非空
//! - file sink: `base_path` 存在且非空，
//!   `max_buffer_bytes`（如设置）为正整数
//! - network sink: `addr` 可解析为 socket 地址，
//!   `format`（如设置）为 `json` 或 `bincode`，
//!   `max_packet_size`（如设置）为正整数
//! - 重试预算：初始延迟不超过截止偏移

use std::net::SocketAddr;

use ::validator::Validate;
use contracts::{ContractError, SinkConfig, SinkType, StreamerConfig};

/// 验证已填充默认值的 StreamerConfig
///
/// 返回遇到的第一个错误，全部通过时返回 Ok(())。
pub fn validate(config: &StreamerConfig) -> Result<(), ContractError> {
    validate_derived(config)?;
    validate_retry(config)?;
    validate_sink_params(&config.sink)?;
    Ok(())
}

/// 基于 derive 的字段规则
fn validate_derived(config: &StreamerConfig) -> Result<(), ContractError> {
    config.validate().map_err(|errors| {
        let field = errors
            .errors()
            .keys()
            .next()
            .map(|k| k.to_string())
            .unwrap_or_else(|| "config".to_string());
        let message = errors.to_string();
        ContractError::config_validation(field, message)
    })
}

fn validate_retry(config: &StreamerConfig) -> Result<(), ContractError> {
    let retry = &config.retry;
    if retry.initial_delay_ms > retry.max_deadline_offset_ms {
        return Err(ContractError::config_validation(
            "retry.initial_delay_ms",
            format!(
                "initial_delay_ms ({}) must be <= max_deadline_offset_ms ({})",
                retry.initial_delay_ms, retry.max_deadline_offset_ms
            ),
        ));
    }
    Ok(())
}

fn validate_sink_params(sink: &SinkConfig) -> Result<(), ContractError> {
    match sink.sink_type {
        SinkType::Log => Ok(()),
        SinkType::File => {
            let base_path = sink.params.get("base_path").map(|s| s.trim());
            if base_path.is_none_or(str::is_empty) {
                return Err(ContractError::config_validation(
                    "sink.params.base_path",
                    "file sink requires a non-empty base_path",
                ));
            }
            validate_positive(sink, "max_buffer_bytes")
        }
        SinkType::Network => {
            let addr = sink.params.get("addr").ok_or_else(|| {
                ContractError::config_validation("sink.params.addr", "network sink requires addr")
            })?;
            addr.parse::<SocketAddr>().map_err(|e| {
                ContractError::config_validation(
                    "sink.params.addr",
                    format!("invalid socket address '{addr}': {e}"),
                )
            })?;

            if let Some(format) = sink.params.get("format") {
                if !matches!(format.as_str(), "json" | "bincode") {
                    return Err(ContractError::config_validation(
                        "sink.params.format",
                        format!("unsupported format '{format}', expected json or bincode"),
                    ));
                }
            }

            validate_positive(sink, "max_packet_size")
        }
    }
}

/// 可选整数参数，存在时必须 `> 0`
fn validate_positive(sink: &SinkConfig, key: &str) -> Result<(), ContractError> {
    match sink.params.get(key) {
        None => Ok(()),
        Some(raw) => match raw.parse::<usize>() {
            Ok(n) if n > 0 => Ok(()),
            _ => Err(ContractError::config_validation(
                format!("sink.params.{key}"),
                format!("{key} must be a positive integer, got '{raw}'"),
            )),
        },
    }
}
