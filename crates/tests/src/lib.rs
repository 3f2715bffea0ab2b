//! # Integration Tests
//!
//! Cross-crate end-to-end tests.
//!
//! Covers:
//! - config file -> sanitized config -> streamer -> real sinks
//! - delivery guarantees under concurrency, retries and shutdown

#[cfg(test)]
mod support {
    use std::collections::VecDeque;
    use std::fmt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use contracts::{ContractError, Record, Sink};
    use streamer::Logger;

    /// Logger keeping error lines for assertions
    #[derive(Default)]
    pub struct RecordingLogger {
        errors: Mutex<Vec<String>>,
    }

    impl RecordingLogger {
        pub fn errors(&self) -> Vec<String> {
            self.errors.lock().unwrap().clone()
        }
    }

    impl Logger for RecordingLogger {
        fn debug(&self, _args: fmt::Arguments<'_>) {}

        fn error(&self, args: fmt::Arguments<'_>) {
            self.errors.lock().unwrap().push(args.to_string());
        }
    }

    /// Batching sink whose puts fail according to a script
    pub struct ScriptedSink {
        batch_size: usize,
        failures: Mutex<VecDeque<ContractError>>,
        delivered: Mutex<Vec<String>>,
        puts: AtomicUsize,
        flushes: AtomicUsize,
    }

    impl ScriptedSink {
        pub fn new(batch_size: usize) -> Self {
            Self {
                batch_size,
                failures: Mutex::new(VecDeque::new()),
                delivered: Mutex::new(Vec::new()),
                puts: AtomicUsize::new(0),
                flushes: AtomicUsize::new(0),
            }
        }

        pub fn fail_next_puts(&self, errors: impl IntoIterator<Item = ContractError>) {
            self.failures.lock().unwrap().extend(errors);
        }

        pub fn delivered(&self) -> Vec<String> {
            self.delivered.lock().unwrap().clone()
        }

        pub fn put_calls(&self) -> usize {
            self.puts.load(Ordering::SeqCst)
        }

        pub fn flush_calls(&self) -> usize {
            self.flushes.load(Ordering::SeqCst)
        }
    }

    impl Sink for ScriptedSink {
        fn name(&self) -> &str {
            "scripted"
        }

        fn batch_size(&self) -> usize {
            self.batch_size
        }

        async fn put(&self, batch: &[Record]) -> Result<bool, ContractError> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = self.failures.lock().unwrap().pop_front() {
                return Err(err);
            }
            self.delivered.lock().unwrap().extend(
                batch
                    .iter()
                    .map(|r| r.as_str().unwrap_or_default().to_string()),
            );
            Ok(true)
        }

        async fn flush(&self) -> Result<(), ContractError> {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&self) -> Result<(), ContractError> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod config_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::SinkType;
    use streamer::{QueueCapacity, StreamerOptions};

    #[test]
    fn test_loaded_config_drives_options() {
        let config = ConfigLoader::load_from_str(
            r#"
worker_count = 0
worker_queue_size = 0
max_batch_delay_ms = 250

[retry]
max_attempts = -1
multiplier = 0.5

[sink]
name = "audit"
sink_type = "log"
batch_size = 10
"#,
            ConfigFormat::Toml,
        )
        .unwrap();

        assert_eq!(config.sink.sink_type, SinkType::Log);
        let options = StreamerOptions::from_config(&config);
        assert_eq!(options.worker_count, 1);
        assert_eq!(options.queue_capacity, QueueCapacity::Bounded(5));
        assert_eq!(options.max_batch_delay.as_millis(), 250);
        assert_eq!(options.retry.max_attempts, None);
        assert_eq!(options.retry.multiplier, 1.1);
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = ConfigLoader::load_from_str(
            r#"{"sink": {"name": "udp", "sink_type": "network", "params": {"addr": "127.0.0.1:9"}}}"#,
            ConfigFormat::Json,
        )
        .unwrap();

        let toml = ConfigLoader::to_toml(&config).unwrap();
        let reloaded = ConfigLoader::load_from_str(&toml, ConfigFormat::Toml).unwrap();
        assert_eq!(reloaded, config);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::{BTreeMap, HashSet};
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{ContractError, Record};
    use streamer::{
        create_streamer, EngineState, MetricsSnapshot, RetryPolicy, StdLogger, Streamer,
        StreamerError, StreamerOptions,
    };
    use tempfile::tempdir;

    use crate::support::{RecordingLogger, ScriptedSink};

    fn read_lines(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "ndjson"))
            .flat_map(|p| {
                std::fs::read_to_string(p)
                    .unwrap()
                    .lines()
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Config file -> file sink: nothing admitted before close is lost
    #[tokio::test]
    async fn test_e2e_file_sink_concurrent_writers() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("segments");
        let config = ConfigLoader::load_from_str(
            &format!(
                r#"
worker_count = 4
worker_queue_size = 8
max_batch_delay_ms = 50

[sink]
name = "events"
sink_type = "file"
[sink.params]
base_path = "{}"
"#,
                out.display()
            ),
            ConfigFormat::Toml,
        )
        .unwrap();

        let streamer = Arc::new(create_streamer(&config, Arc::new(StdLogger)).await.unwrap());

        let writers: Vec<_> = (0..8)
            .map(|writer| {
                let streamer = Arc::clone(&streamer);
                tokio::spawn(async move {
                    for seq in 0..50 {
                        let record = Record::from_json(&serde_json::json!({
                            "writer": writer,
                            "seq": seq,
                        }))
                        .unwrap();
                        streamer.write(record).await.unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }

        streamer.close().await;
        assert_eq!(streamer.state(), EngineState::Closed);

        let lines = read_lines(&out);
        assert_eq!(lines.len(), 400);
        let unique: HashSet<_> = lines.iter().collect();
        assert_eq!(unique.len(), 400);

        let totals = MetricsSnapshot::total(&streamer.metrics());
        assert_eq!(totals.records_enqueued, 400);
        assert_eq!(totals.records_flushed, 400);
        assert_eq!(totals.records_dropped, 0);
        assert_eq!(streamer.flush_summary().total_records, 400);

        assert!(matches!(
            streamer.write("late").await,
            Err(StreamerError::Closed)
        ));
    }

    /// Records from one writer keep their order within each worker
    #[tokio::test]
    async fn test_e2e_per_worker_order() {
        let sink = ScriptedSink::new(3);
        let options = StreamerOptions::default()
            .with_worker_count(1)
            .with_max_batch_delay(Duration::from_millis(20));
        let streamer = Streamer::new(sink, options);

        for i in 0..10 {
            streamer.write(format!("r{i}")).await.unwrap();
        }
        streamer.close().await;

        let expected: Vec<String> = (0..10).map(|i| format!("r{i}")).collect();
        assert_eq!(streamer.sink().delivered(), expected);
    }

    /// Retryable failures are absorbed by the budget
    #[tokio::test]
    async fn test_e2e_retry_recovers() {
        let sink = ScriptedSink::new(2);
        sink.fail_next_puts([
            ContractError::sink_connection("scripted", "reset by peer"),
            ContractError::sink_write("scripted", "timeout"),
        ]);

        let logger = Arc::new(RecordingLogger::default());
        let options = StreamerOptions::default()
            .with_worker_count(1)
            .with_retry(RetryPolicy::new(
                Some(5),
                Duration::from_millis(5),
                2.0,
                Duration::from_secs(2),
            ))
            .with_logger(logger.clone());
        let streamer = Streamer::new(sink, options);

        streamer.write("a").await.unwrap();
        streamer.write("b").await.unwrap();
        streamer.close().await;

        assert_eq!(streamer.sink().delivered(), vec!["a", "b"]);
        assert_eq!(streamer.sink().put_calls(), 3);
        let totals = MetricsSnapshot::total(&streamer.metrics());
        assert_eq!(totals.retries, 2);
        assert_eq!(totals.records_dropped, 0);
        assert!(logger.errors().is_empty());
    }

    /// A fatal error drops only the failing batch and is reported
    #[tokio::test]
    async fn test_e2e_fatal_error_drops_batch() {
        let sink = ScriptedSink::new(2);
        sink.fail_next_puts([ContractError::sink_fatal("scripted", "schema mismatch")]);

        let logger = Arc::new(RecordingLogger::default());
        let options = StreamerOptions::default()
            .with_worker_count(1)
            .with_retry(RetryPolicy::new(
                Some(5),
                Duration::from_millis(5),
                2.0,
                Duration::from_secs(2),
            ))
            .with_logger(logger.clone());
        let streamer = Streamer::new(sink, options);

        for record in ["a", "b", "c", "d"] {
            streamer.write(record).await.unwrap();
        }
        streamer.close().await;

        // first batch [a, b] hit the fatal error without retries
        assert_eq!(streamer.sink().delivered(), vec!["c", "d"]);
        assert_eq!(streamer.sink().put_calls(), 2);

        let totals = MetricsSnapshot::total(&streamer.metrics());
        assert_eq!(totals.batches_dropped, 1);
        assert_eq!(totals.records_dropped, 2);
        assert_eq!(totals.retries, 0);

        let errors = logger.errors();
        assert!(errors
            .iter()
            .any(|e| e.contains("dropping batch of 2 record(s)") && e.contains("schema mismatch")));
    }

    /// The batch timer delivers partial batches without a close
    #[tokio::test]
    async fn test_e2e_timer_flushes_partial_batch() {
        let sink = ScriptedSink::new(100);
        let options = StreamerOptions::default()
            .with_worker_count(2)
            .with_max_batch_delay(Duration::from_millis(50));
        let streamer = Streamer::new(sink, options);

        streamer.write("x").await.unwrap();
        streamer.write("y").await.unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while streamer.sink().delivered().len() < 2 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let mut delivered = streamer.sink().delivered();
        delivered.sort();
        assert_eq!(delivered, vec!["x", "y"]);
        assert_eq!(streamer.state(), EngineState::Open);

        streamer.close().await;
        // every worker issues a final explicit flush
        assert!(streamer.sink().flush_calls() >= 2);
    }

    /// Network sink: every record arrives as one JSON line
    #[tokio::test]
    async fn test_e2e_network_sink() {
        let receiver = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = receiver.local_addr().unwrap();

        let config = ConfigLoader::load_from_str(
            &format!(
                r#"
worker_count = 2

[sink]
name = "udp"
sink_type = "network"
[sink.params]
addr = "{addr}"
format = "json"
"#
            ),
            ConfigFormat::Toml,
        )
        .unwrap();

        let streamer = create_streamer(&config, Arc::new(StdLogger)).await.unwrap();
        for i in 0..20 {
            streamer.write(format!(r#"{{"i":{i}}}"#)).await.unwrap();
        }
        streamer.close().await;

        let mut seen = BTreeMap::new();
        let mut buf = vec![0u8; 65536];
        while seen.len() < 20 {
            let n = tokio::time::timeout(Duration::from_secs(2), receiver.recv(&mut buf))
                .await
                .expect("missing datagrams")
                .unwrap();
            for line in std::str::from_utf8(&buf[..n]).unwrap().lines() {
                let value: serde_json::Value = serde_json::from_str(line).unwrap();
                seen.insert(value["i"].as_u64().unwrap(), ());
            }
        }
        assert_eq!(seen.keys().copied().collect::<Vec<_>>(), (0..20).collect::<Vec<_>>());
    }

    /// Synchronous queues still deliver everything on close
    #[tokio::test]
    async fn test_e2e_synchronous_queue() {
        let sink = ScriptedSink::new(4);
        let options = StreamerOptions::default()
            .with_worker_count(2)
            .with_queue_capacity(streamer::QueueCapacity::Synchronous);
        let streamer = Streamer::new(sink, options);

        for i in 0..9 {
            streamer.write(format!("s{i}")).await.unwrap();
        }
        streamer.close().await;
        streamer.close().await;

        let mut delivered = streamer.sink().delivered();
        delivered.sort();
        let mut expected: Vec<String> = (0..9).map(|i| format!("s{i}")).collect();
        expected.sort();
        assert_eq!(delivered, expected);
    }
}
