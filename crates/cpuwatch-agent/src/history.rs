use chrono::{DateTime, SecondsFormat, Utc};
use cpuwatch_backend::error::BackendError;
use cpuwatch_backend::MetricsBackend;
use cpuwatch_common::types::{Datapoint, MetricIdentity, MetricQuery, Statistic};

use crate::sampler::SAMPLE_PERIOD_SECS;

/// Per-minute averages over the `minutes` before `now`, oldest first.
pub async fn fetch_history(
    backend: &dyn MetricsBackend,
    identity: &MetricIdentity,
    now: DateTime<Utc>,
    minutes: u32,
) -> Result<Vec<Datapoint>, BackendError> {
    let query = MetricQuery::trailing(
        identity.clone(),
        now,
        chrono::Duration::minutes(i64::from(minutes)),
        SAMPLE_PERIOD_SECS,
        Statistic::Average,
    )?;
    let mut points = backend.get_metric_statistics(&query).await?;
    points.sort_by_key(|dp| dp.timestamp);
    Ok(points)
}

pub fn format_datapoint(dp: &Datapoint) -> String {
    format!(
        "{}: {:.2}%",
        dp.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        dp.value
    )
}

/// Prints recent history at startup. Failures are logged and otherwise
/// ignored. Returns the number of datapoints printed.
pub async fn print_history(
    backend: &dyn MetricsBackend,
    identity: &MetricIdentity,
    now: DateTime<Utc>,
    minutes: u32,
) -> usize {
    if minutes == 0 {
        return 0;
    }

    match fetch_history(backend, identity, now, minutes).await {
        Ok(points) => {
            println!("{identity} over the last {minutes} minutes:");
            if points.is_empty() {
                println!("  no datapoints");
            }
            for dp in &points {
                println!("  {}", format_datapoint(dp));
            }
            points.len()
        }
        Err(e) => {
            tracing::warn!(metric = %identity, minutes, error = %e, "Failed to fetch metric history");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use cpuwatch_backend::memory::MemoryBackend;

    fn identity() -> MetricIdentity {
        MetricIdentity::for_resource("AWS/EC2", "CPUUtilization", "InstanceId", "i-123")
    }

    fn at(minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, second).unwrap()
    }

    fn seeded() -> MemoryBackend {
        let backend = MemoryBackend::new("memory:test");
        for (minute, value) in [(1, 10.0), (3, 30.0), (8, 80.0), (9, 95.0)] {
            backend.put_metric_data(
                &identity(),
                Datapoint {
                    timestamp: at(minute, 15),
                    value,
                },
            );
        }
        backend
    }

    #[tokio::test]
    async fn returns_minutes_inside_window_in_order() {
        let backend = seeded();
        let points = fetch_history(&backend, &identity(), at(10, 0), 5).await.unwrap();

        let values: Vec<f64> = points.iter().map(|dp| dp.value).collect();
        assert_eq!(values, vec![80.0, 95.0]);
        assert_eq!(points[0].timestamp, at(8, 0));
    }

    #[tokio::test]
    async fn zero_minutes_prints_nothing() {
        let backend = seeded();
        assert_eq!(print_history(&backend, &identity(), at(10, 0), 0).await, 0);
    }

    #[tokio::test]
    async fn prints_every_datapoint() {
        let backend = seeded();
        assert_eq!(print_history(&backend, &identity(), at(10, 0), 10).await, 4);
    }

    #[test]
    fn datapoint_line_has_two_decimals() {
        let dp = Datapoint {
            timestamp: at(2, 0),
            value: 12.346,
        };
        assert_eq!(format_datapoint(&dp), "2024-05-01T12:02:00Z: 12.35%");
    }
}
