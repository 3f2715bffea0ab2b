//! 刷写指标
//!
//! 基于 `metrics` facade 的全局指标（启用时经 Prometheus 导出），
//! 以及用于运行结束汇总的内存统计。

use metrics::{counter, gauge, histogram};

/// 记录进入 worker 队列的记录
pub fn record_record_enqueued(worker: usize) {
    counter!(
        "flushline_records_enqueued_total",
        "worker" => worker.to_string()
    )
    .increment(1);
}

/// 记录 worker 队列深度
pub fn record_queue_depth(worker: usize, depth: usize) {
    gauge!(
        "flushline_queue_depth",
        "worker" => worker.to_string()
    )
    .set(depth as f64);
}

/// 记录成功写入 sink 的批次
pub fn record_batch_flushed(sink_name: &str, records: usize, latency_ms: f64) {
    counter!(
        "flushline_batches_flushed_total",
        "sink" => sink_name.to_string()
    )
    .increment(1);
    counter!(
        "flushline_records_flushed_total",
        "sink" => sink_name.to_string()
    )
    .increment(records as u64);
    histogram!("flushline_batch_size", "sink" => sink_name.to_string()).record(records as f64);
    histogram!("flushline_flush_latency_ms", "sink" => sink_name.to_string()).record(latency_ms);
}

/// 记录一次显式刷写
pub fn record_explicit_flush(sink_name: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "flushline_explicit_flushes_total",
        "sink" => sink_name.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录单次刷写消耗的重试次数
pub fn record_retries(sink_name: &str, retries: u64) {
    if retries > 0 {
        counter!(
            "flushline_retries_total",
            "sink" => sink_name.to_string()
        )
        .increment(retries);
    }
}

/// 记录重试预算耗尽后丢弃的批次
pub fn record_batch_dropped(sink_name: &str, records: usize) {
    counter!(
        "flushline_batches_dropped_total",
        "sink" => sink_name.to_string()
    )
    .increment(1);
    counter!(
        "flushline_records_dropped_total",
        "sink" => sink_name.to_string()
    )
    .increment(records as u64);
}

/// 刷写统计聚合器
///
/// 在内存中聚合刷写结果用于汇总。每个 worker 持有一个实例，
/// 通过 [`FlushStatsAggregator::merge`] 合并。
#[derive(Debug, Clone, Default)]
pub struct FlushStatsAggregator {
    /// 成功批次数
    pub total_flushes: u64,

    /// 成功记录数
    pub total_records: u64,

    /// 丢弃批次数
    pub failed_flushes: u64,

    /// 丢弃记录数
    pub dropped_records: u64,

    /// 全部刷写的重试总数
    pub total_retries: u64,

    /// 批次大小统计（记录数）
    pub batch_size_stats: RunningStats,

    /// 刷写延迟统计（毫秒，含重试）
    pub latency_stats: RunningStats,
}

impl FlushStatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录成功批次
    pub fn record_success(&mut self, records: usize, latency_ms: f64, retries: u64) {
        self.total_flushes += 1;
        self.total_records += records as u64;
        self.total_retries += retries;
        self.batch_size_stats.push(records as f64);
        self.latency_stats.push(latency_ms);
    }

    /// 记录丢弃批次
    pub fn record_failure(&mut self, records: usize, retries: u64) {
        self.failed_flushes += 1;
        self.dropped_records += records as u64;
        self.total_retries += retries;
    }

    /// 合并另一个聚合器
    pub fn merge(&mut self, other: &FlushStatsAggregator) {
        self.total_flushes += other.total_flushes;
        self.total_records += other.total_records;
        self.failed_flushes += other.failed_flushes;
        self.dropped_records += other.dropped_records;
        self.total_retries += other.total_retries;
        self.batch_size_stats.merge(&other.batch_size_stats);
        self.latency_stats.merge(&other.latency_stats);
    }

    /// 生成统计摘要
    pub fn summary(&self) -> FlushSummary {
        let attempted = self.total_flushes + self.failed_flushes;
        FlushSummary {
            total_flushes: self.total_flushes,
            total_records: self.total_records,
            failed_flushes: self.failed_flushes,
            dropped_records: self.dropped_records,
            total_retries: self.total_retries,
            failure_rate: if attempted > 0 {
                self.failed_flushes as f64 / attempted as f64 * 100.0
            } else {
                0.0
            },
            batch_size: StatsSummary::from(&self.batch_size_stats),
            latency_ms: StatsSummary::from(&self.latency_stats),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 刷写统计摘要
#[derive(Debug, Clone, Default)]
pub struct FlushSummary {
    pub total_flushes: u64,
    pub total_records: u64,
    pub failed_flushes: u64,
    pub dropped_records: u64,
    pub total_retries: u64,
    pub failure_rate: f64,
    pub batch_size: StatsSummary,
    pub latency_ms: StatsSummary,
}

impl std::fmt::Display for FlushSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Flush Summary ===")?;
        writeln!(f, "Batches flushed: {}", self.total_flushes)?;
        writeln!(f, "Records flushed: {}", self.total_records)?;
        writeln!(
            f,
            "Batches dropped: {} ({:.2}%)",
            self.failed_flushes, self.failure_rate
        )?;
        writeln!(f, "Records dropped: {}", self.dropped_records)?;
        writeln!(f, "Retries: {}", self.total_retries)?;
        writeln!(f, "Batch size: {}", self.batch_size)?;
        writeln!(f, "Flush latency (ms): {}", self.latency_ms)?;
        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计 (Welford 算法)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// 合并两组样本 (Chan 并行方差算法)
    pub fn merge(&mut self, other: &RunningStats) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = other.clone();
            return;
        }

        let count = self.count + other.count;
        let delta = other.mean - self.mean;
        self.m2 += other.m2 + delta * delta * (self.count as f64 * other.count as f64) / count as f64;
        self.mean += delta * other.count as f64 / count as f64;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.count = count;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
