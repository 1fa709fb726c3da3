use async_trait::async_trait;
use chrono::Utc;
use cpuwatch_agent::app;
use cpuwatch_agent::config::AgentConfig;
use cpuwatch_agent::report::{Outcome, Report, ReportSink};
use cpuwatch_backend::error::{self, BackendError};
use cpuwatch_backend::memory::MemoryBackend;
use cpuwatch_backend::MetricsBackend;
use cpuwatch_common::types::{AlarmSpec, AlarmState, Datapoint, MetricQuery};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

const MEMORY_CONFIG: &str = r#"
    backend = "memory"
    region = "local"
    resource_id = "i-0abc"
    history_minutes = 0

    [alarm]
    name = "HighCPUUtilization"
    threshold = 70.0
    period_secs = 60
    notification_targets = ["ops-topic"]
"#;

fn config(extra: &str) -> AgentConfig {
    let config = AgentConfig::parse(&format!("{MEMORY_CONFIG}{extra}")).unwrap();
    config.validate().unwrap();
    config
}

/// Collects reports and signals shutdown after `limit` of them.
struct StopAfter {
    limit: usize,
    reports: Vec<Report>,
    shutdown: watch::Sender<bool>,
}

impl StopAfter {
    fn new(limit: usize) -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                limit,
                reports: Vec::new(),
                shutdown: tx,
            },
            rx,
        )
    }
}

impl ReportSink for StopAfter {
    fn report(&mut self, report: &Report) {
        self.reports.push(report.clone());
        if self.reports.len() >= self.limit {
            let _ = self.shutdown.send(true);
        }
    }
}

/// Backend whose alarm upsert always fails with a fixed error.
struct RejectingBackend {
    error: fn() -> BackendError,
    queries: AtomicUsize,
    deletes: AtomicUsize,
}

impl RejectingBackend {
    fn new(error: fn() -> BackendError) -> Self {
        Self {
            error,
            queries: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl MetricsBackend for RejectingBackend {
    fn name(&self) -> &str {
        "rejecting"
    }

    async fn get_metric_statistics(&self, _query: &MetricQuery) -> error::Result<Vec<Datapoint>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }

    async fn put_metric_alarm(&self, _spec: &AlarmSpec) -> error::Result<()> {
        Err((self.error)())
    }

    async fn delete_alarms(&self, _names: &[String]) -> error::Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Backend that accepts the alarm but fails the first `failing_fetches`
/// statistics calls and, optionally, every delete.
struct UnreliableBackend {
    failing_fetches: usize,
    fail_delete: bool,
    queries: AtomicUsize,
    deletes: AtomicUsize,
}

impl UnreliableBackend {
    fn new(failing_fetches: usize, fail_delete: bool) -> Self {
        Self {
            failing_fetches,
            fail_delete,
            queries: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl MetricsBackend for UnreliableBackend {
    fn name(&self) -> &str {
        "unreliable"
    }

    async fn get_metric_statistics(&self, _query: &MetricQuery) -> error::Result<Vec<Datapoint>> {
        if self.queries.fetch_add(1, Ordering::SeqCst) < self.failing_fetches {
            return Err(BackendError::HttpError {
                backend: "unreliable".into(),
                status: 503,
                body: "ServiceUnavailable".into(),
            });
        }
        Ok(Vec::new())
    }

    async fn put_metric_alarm(&self, _spec: &AlarmSpec) -> error::Result<()> {
        Ok(())
    }

    async fn delete_alarms(&self, _names: &[String]) -> error::Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete {
            return Err(BackendError::HttpError {
                backend: "unreliable".into(),
                status: 500,
                body: "InternalFailure".into(),
            });
        }
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn provisions_samples_and_tears_down_on_shutdown() {
    let config = config("");
    let memory = Arc::new(MemoryBackend::new("memory:local"));
    memory.put_metric_data(
        &config.metric_identity(),
        Datapoint {
            timestamp: Utc::now() - chrono::Duration::seconds(10),
            value: 42.5,
        },
    );
    let backend: Arc<dyn MetricsBackend> = memory.clone();
    let (mut sink, shutdown) = StopAfter::new(3);

    let summary = app::run(&config, backend, &mut sink, shutdown).await.unwrap();

    assert_eq!(summary.iterations, 3);
    assert_eq!(summary.alarm.unwrap().name, "HighCPUUtilization");
    assert!(summary.torn_down);
    assert!(memory.alarm_names().is_empty());
    assert_eq!(sink.reports[0].value(), Some(42.5));
}

#[tokio::test(start_paused = true)]
async fn keeps_alarm_when_teardown_disabled() {
    let config = config("delete_on_shutdown = false\n");
    let memory = Arc::new(MemoryBackend::new("memory:local"));
    let backend: Arc<dyn MetricsBackend> = memory.clone();
    let (mut sink, shutdown) = StopAfter::new(1);

    let summary = app::run(&config, backend, &mut sink, shutdown).await.unwrap();

    assert!(!summary.torn_down);
    assert_eq!(memory.alarm_names(), vec!["HighCPUUtilization".to_string()]);
    assert_eq!(
        memory.alarm_state("HighCPUUtilization"),
        Some(AlarmState::InsufficientData)
    );
    assert_eq!(sink.reports[0].outcome, Outcome::NoData);
}

#[tokio::test(start_paused = true)]
async fn rejected_credentials_stop_before_sampling() {
    let config = config("");
    let stub = Arc::new(RejectingBackend::new(|| BackendError::Unauthorized {
        backend: "rejecting".into(),
        message: "The security token included in the request is invalid".into(),
    }));
    let backend: Arc<dyn MetricsBackend> = stub.clone();
    let (mut sink, shutdown) = StopAfter::new(1);

    let err = app::run(&config, backend, &mut sink, shutdown)
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), 3);
    assert!(sink.reports.is_empty());
    assert_eq!(stub.queries.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn other_provisioning_failures_still_sample() {
    let config = config("");
    let stub = Arc::new(RejectingBackend::new(|| BackendError::HttpError {
        backend: "rejecting".into(),
        status: 500,
        body: "InternalFailure".into(),
    }));
    let backend: Arc<dyn MetricsBackend> = stub.clone();
    let (mut sink, shutdown) = StopAfter::new(2);

    let summary = app::run(&config, backend, &mut sink, shutdown).await.unwrap();

    assert_eq!(summary.iterations, 2);
    assert!(summary.alarm.is_none());
    assert!(!summary.torn_down);
    assert_eq!(stub.queries.load(Ordering::SeqCst), 2);
    assert_eq!(stub.deletes.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn history_failure_does_not_stop_startup() {
    let mut config = config("");
    config.history_minutes = 10;
    let stub = Arc::new(UnreliableBackend::new(1, false));
    let backend: Arc<dyn MetricsBackend> = stub.clone();
    let (mut sink, shutdown) = StopAfter::new(2);

    let summary = app::run(&config, backend, &mut sink, shutdown).await.unwrap();

    assert_eq!(summary.iterations, 2);
    assert!(summary.alarm.is_some());
    assert!(summary.torn_down);
    // one history fetch, then one per iteration
    assert_eq!(stub.queries.load(Ordering::SeqCst), 3);
    assert!(sink.reports.iter().all(|r| r.outcome == Outcome::NoData));
}

#[tokio::test(start_paused = true)]
async fn teardown_failure_still_completes_run() {
    let config = config("");
    let stub = Arc::new(UnreliableBackend::new(0, true));
    let backend: Arc<dyn MetricsBackend> = stub.clone();
    let (mut sink, shutdown) = StopAfter::new(2);

    let summary = app::run(&config, backend, &mut sink, shutdown).await.unwrap();

    assert_eq!(summary.iterations, 2);
    assert_eq!(summary.alarm.unwrap().name, "HighCPUUtilization");
    assert!(!summary.torn_down);
    assert_eq!(stub.deletes.load(Ordering::SeqCst), 1);
    assert_eq!(sink.reports.len(), 2);
}

#[test]
fn missing_resource_is_a_config_error() {
    let config = AgentConfig::parse("backend = \"memory\"\n").unwrap();
    let err = config.validate().unwrap_err();
    assert_eq!(err.exit_code(), 2);
}
