//! StreamerConfig - Config Loader 输出
//!
//! 描述引擎参数、重试预算与 sink 路由。
//! 零值表示"使用默认值"，默认值规则见 `config_loader`。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use validator::Validate;

/// 配置未指定时的 worker 数量
pub const DEFAULT_WORKER_COUNT: i32 = 2;

/// 流式 sink 的单 worker 队列容量
pub const DEFAULT_WORKER_QUEUE_SIZE: usize = 100;

/// worker 保持批次打开的最长时间
pub const DEFAULT_MAX_BATCH_DELAY: Duration = Duration::from_secs(5);

/// 批量 sink 的批次大小
pub const DEFAULT_BATCH_SIZE: usize = 200;

/// 每次刷写的尝试次数（含首次）
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

pub const DEFAULT_INITIAL_RETRY_DELAY: Duration = Duration::from_secs(1);

pub const DEFAULT_RETRY_DELAY_MULTIPLIER: f64 = 1.1;

/// 单次刷写的墙钟上限（含重试）
pub const DEFAULT_MAX_RETRY_DEADLINE_OFFSET: Duration = Duration::from_secs(15);

/// 完整的 streamer 配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct StreamerConfig {
    /// worker 任务数；`<= 0` 表示单个 worker
    #[serde(default = "default_worker_count")]
    pub worker_count: i32,

    /// 单 worker 队列容量；`< 0` 表示同步交接，
    /// `0` 表示由 sink 批次大小推导
    #[serde(default)]
    pub worker_queue_size: i32,

    /// 最大批次延迟（毫秒），`0` 使用默认值
    #[serde(default)]
    pub max_batch_delay_ms: u64,

    /// sink 调用的重试预算
    #[serde(default)]
    pub retry: RetryConfig,

    /// 输出路由
    #[validate(nested)]
    pub sink: SinkConfig,
}

fn default_worker_count() -> i32 {
    DEFAULT_WORKER_COUNT
}

impl StreamerConfig {
    /// 除 `sink` 外全部使用默认值的配置
    pub fn with_sink(sink: SinkConfig) -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            worker_queue_size: 0,
            max_batch_delay_ms: 0,
            retry: RetryConfig::default(),
            sink,
        }
    }

    pub fn max_batch_delay(&self) -> Duration {
        Duration::from_millis(self.max_batch_delay_ms)
    }
}

/// 重试预算配置
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RetryConfig {
    /// 每次刷写的尝试次数；`0` 使用默认值，`< 0` 不限次数
    #[serde(default)]
    pub max_attempts: i32,

    /// 首次重试前的延迟
    #[serde(default)]
    pub initial_delay_ms: u64,

    /// 每次失败后延迟的增长倍数
    #[serde(default)]
    pub multiplier: f64,

    /// 单次刷写的耗时上限
    #[serde(default)]
    pub max_deadline_offset_ms: u64,
}

impl RetryConfig {
    /// `None` 表示不限次数
    pub fn max_attempts(&self) -> Option<u32> {
        u32::try_from(self.max_attempts).ok()
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_deadline_offset(&self) -> Duration {
        Duration::from_millis(self.max_deadline_offset_ms)
    }
}

/// Sink 输出配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SinkConfig {
    /// Sink 名称
    #[validate(length(min = 1, message = "sink name cannot be empty"))]
    pub name: String,

    /// Sink 类型
    pub sink_type: SinkType,

    /// 每次 put 的记录数；`0` 使用类型默认值，`< 0` 不分批
    #[serde(default)]
    pub batch_size: i32,

    /// 类型相关参数
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl SinkConfig {
    pub fn new(name: impl Into<String>, sink_type: SinkType) -> Self {
        Self {
            name: name.into(),
            sink_type,
            batch_size: 0,
            params: HashMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// 填充默认值后的批次大小，始终 `>= 1`
    pub fn effective_batch_size(&self) -> usize {
        match self.batch_size {
            n if n < 0 => 1,
            0 => self.sink_type.default_batch_size(),
            n => n as usize,
        }
    }
}

/// Sink 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// 批量插入（记录日志）
    Log,
    /// 磁盘上的缓冲文件
    File,
    /// 流式数据报 (UDP)
    Network,
}

impl SinkType {
    /// 配置为零时使用的批次大小
    pub fn default_batch_size(self) -> usize {
        match self {
            SinkType::Log => DEFAULT_BATCH_SIZE,
            SinkType::File | SinkType::Network => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_batch_size_rules() {
        let mut sink = SinkConfig::new("s", SinkType::Log);
        assert_eq!(sink.effective_batch_size(), DEFAULT_BATCH_SIZE);

        sink.batch_size = -5;
        assert_eq!(sink.effective_batch_size(), 1);

        sink.batch_size = 42;
        assert_eq!(sink.effective_batch_size(), 42);

        let file = SinkConfig::new("f", SinkType::File);
        assert_eq!(file.effective_batch_size(), 1);
    }

    #[test]
    fn retry_unlimited_attempts() {
        let retry = RetryConfig {
            max_attempts: -1,
            ..Default::default()
        };
        assert_eq!(retry.max_attempts(), None);

        let retry = RetryConfig {
            max_attempts: 4,
            ..Default::default()
        };
        assert_eq!(retry.max_attempts(), Some(4));
    }

    #[test]
    fn deserialize_minimal_toml() {
        let config: StreamerConfig = toml::from_str(
            r#"
[sink]
name = "events"
sink_type = "log"
"#,
        )
        .unwrap();
        assert_eq!(config.worker_count, DEFAULT_WORKER_COUNT);
        assert_eq!(config.worker_queue_size, 0);
        assert_eq!(config.retry, RetryConfig::default());
        assert_eq!(config.sink.sink_type, SinkType::Log);
    }

    #[test]
    fn validate_rejects_empty_sink_name() {
        let config = StreamerConfig::with_sink(SinkConfig::new("", SinkType::Log));
        assert!(config.validate().is_err());
    }
}
