use crate::report::{Outcome, Report, ReportSink};
use chrono::{DateTime, Utc};
use cpuwatch_backend::error::BackendError;
use cpuwatch_backend::MetricsBackend;
use cpuwatch_common::stats;
use cpuwatch_common::types::{
    Datapoint, MetricIdentity, MetricQuery, Statistic, ValidationError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Length of the window queried on each iteration, and its period.
pub const SAMPLE_PERIOD_SECS: u32 = 60;

/// Source of wall-clock time for queries and report stamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// The one-minute Average query ending at `now`.
pub fn build_query(
    identity: &MetricIdentity,
    now: DateTime<Utc>,
) -> Result<MetricQuery, ValidationError> {
    MetricQuery::trailing(
        identity.clone(),
        now,
        chrono::Duration::seconds(i64::from(SAMPLE_PERIOD_SECS)),
        SAMPLE_PERIOD_SECS,
        Statistic::Average,
    )
}

/// Most recent datapoint answering `query`, `None` when the backend has none.
pub async fn fetch_latest(
    backend: &dyn MetricsBackend,
    query: &MetricQuery,
) -> Result<Option<Datapoint>, BackendError> {
    let points = backend.get_metric_statistics(query).await?;
    Ok(stats::latest(&points))
}

/// Periodically samples one metric and reports each observation.
///
/// Iterations are spaced by sleeping `interval` after each one finishes, so
/// the cadence drifts by the time each fetch takes. Backend failures are
/// reported and the loop carries on.
pub struct Sampler {
    backend: Arc<dyn MetricsBackend>,
    identity: MetricIdentity,
    interval: Duration,
    clock: Arc<dyn Clock>,
}

impl Sampler {
    pub fn new(backend: Arc<dyn MetricsBackend>, identity: MetricIdentity, interval: Duration) -> Self {
        Self {
            backend,
            identity,
            interval,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub async fn sample_once(&self) -> Report {
        let query = match build_query(&self.identity, self.clock.now()) {
            Ok(query) => query,
            Err(e) => {
                return Report {
                    reported_at: self.clock.now(),
                    outcome: Outcome::Failed(e.to_string()),
                }
            }
        };

        let outcome = match fetch_latest(self.backend.as_ref(), &query).await {
            Ok(Some(dp)) => {
                tracing::debug!(metric = %self.identity, value = dp.value, "Sampled");
                Outcome::Value {
                    value: dp.value,
                    observed_at: dp.timestamp,
                }
            }
            Ok(None) => {
                tracing::debug!(metric = %self.identity, "No datapoint in the last period");
                Outcome::NoData
            }
            Err(e) => {
                tracing::warn!(
                    metric = %self.identity,
                    backend = self.backend.name(),
                    error = %e,
                    "Failed to fetch metric, continuing"
                );
                Outcome::Failed(e.to_string())
            }
        };

        Report {
            reported_at: self.clock.now(),
            outcome,
        }
    }

    /// Samples until `shutdown` turns true or its sender is dropped.
    /// Returns the number of completed iterations.
    pub async fn run(&self, sink: &mut dyn ReportSink, mut shutdown: watch::Receiver<bool>) -> u64 {
        tracing::info!(
            metric = %self.identity,
            interval_secs = self.interval.as_secs(),
            backend = self.backend.name(),
            "Starting sampling loop"
        );

        let mut iterations = 0u64;
        loop {
            if *shutdown.borrow() {
                break;
            }

            let report = self.sample_once().await;
            sink.report(&report);
            iterations += 1;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.wait_for(|stop| *stop) => break,
            }
        }

        tracing::info!(iterations, "Sampling loop stopped");
        iterations
    }
}
