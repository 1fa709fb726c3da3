use crate::types::{Datapoint, Statistic};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

/// Groups raw samples into `period_secs` buckets aligned on `start` and
/// reduces each bucket with `statistic`.
///
/// Samples outside `[start, end)` are ignored. Empty buckets produce no
/// datapoint. Each result is stamped with its bucket's start time and the
/// output is ordered by timestamp.
pub fn aggregate(
    samples: &[Datapoint],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    period_secs: u32,
    statistic: Statistic,
) -> Vec<Datapoint> {
    if period_secs == 0 || start >= end {
        return Vec::new();
    }

    let period = i64::from(period_secs);
    let mut buckets: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
    for sample in samples {
        if sample.timestamp < start || sample.timestamp >= end {
            continue;
        }
        let index = (sample.timestamp - start).num_seconds() / period;
        buckets.entry(index).or_default().push(sample.value);
    }

    buckets
        .into_iter()
        .filter_map(|(index, values)| {
            statistic.apply(&values).map(|value| Datapoint {
                timestamp: start + Duration::seconds(index * period),
                value,
            })
        })
        .collect()
}

/// The datapoint with the greatest timestamp, if any.
pub fn latest(points: &[Datapoint]) -> Option<Datapoint> {
    points.iter().copied().max_by_key(|dp| dp.timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(base: DateTime<Utc>, secs: i64, value: f64) -> Datapoint {
        Datapoint {
            timestamp: base + Duration::seconds(secs),
            value,
        }
    }

    #[test]
    fn should_average_samples_per_period() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let samples = vec![
            at(start, 5, 10.0),
            at(start, 30, 30.0),
            at(start, 65, 50.0),
            at(start, 170, 90.0),
        ];

        let points = aggregate(
            &samples,
            start,
            start + Duration::seconds(180),
            60,
            Statistic::Average,
        );

        assert_eq!(points.len(), 3);
        assert_eq!(points[0], at(start, 0, 20.0));
        assert_eq!(points[1], at(start, 60, 50.0));
        assert_eq!(points[2], at(start, 120, 90.0));
    }

    #[test]
    fn should_ignore_samples_outside_range() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let end = start + Duration::seconds(60);
        let samples = vec![at(start, -1, 99.0), at(start, 60, 99.0)];

        assert!(aggregate(&samples, start, end, 60, Statistic::Maximum).is_empty());
    }

    #[test]
    fn should_pick_latest_regardless_of_order() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let points = vec![at(start, 120, 3.0), at(start, 0, 1.0), at(start, 60, 2.0)];

        assert_eq!(latest(&points), Some(at(start, 120, 3.0)));
        assert_eq!(latest(&[]), None);
    }
}
