use crate::error::Result;
use crate::MetricsBackend;
use chrono::{DateTime, Duration, Utc};
use cpuwatch_alarm::{AlarmEvaluator, StateTransition};
use cpuwatch_common::stats::aggregate;
use cpuwatch_common::types::{AlarmSpec, AlarmState, Datapoint, MetricIdentity, MetricQuery};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};

/// How long raw samples are kept when no alarm needs a longer window.
pub const DEFAULT_RETENTION_SECS: i64 = 24 * 60 * 60;

const MAX_FIRED_ACTIONS: usize = 1024;

/// An alarm action invoked on a transition into ALARM.
#[derive(Debug, Clone, PartialEq)]
pub struct FiredAction {
    pub alarm_name: String,
    pub action_ref: String,
    pub timestamp: DateTime<Utc>,
}

struct AlarmEntry {
    evaluator: AlarmEvaluator,
    /// Start of the newest period holding samples that has not been evaluated.
    open_period: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct State {
    samples: HashMap<MetricIdentity, Vec<Datapoint>>,
    alarms: BTreeMap<String, AlarmEntry>,
    fired: VecDeque<FiredAction>,
}

/// Process-local backend that stores raw samples and evaluates alarms itself.
///
/// An alarm sees a period's statistic only once the period is closed, either
/// by a sample from a later period or by [`MemoryBackend::advance_to`].
/// Every alarm is evaluated; `enabled` only gates its actions, matching
/// CloudWatch's `ActionsEnabled`.
pub struct MemoryBackend {
    name: String,
    retention: Duration,
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            retention: Duration::seconds(DEFAULT_RETENTION_SECS),
            state: Mutex::new(State::default()),
        }
    }

    /// Samples older than `retention` (or the longest alarm window on the
    /// metric, if longer) before the newest sample are dropped.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Records a raw sample. Alarms on the metric whose open period ends
    /// before the sample's period are evaluated for that period.
    pub fn put_metric_data(
        &self,
        identity: &MetricIdentity,
        sample: Datapoint,
    ) -> Vec<StateTransition> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let samples = state.samples.entry(identity.clone()).or_default();
        samples.push(sample);

        let mut transitions = Vec::new();
        for entry in state.alarms.values_mut() {
            if entry.evaluator.spec().identity != *identity {
                continue;
            }

            let period_start = align_to_period(sample.timestamp, entry.evaluator.spec().period_seconds);
            match entry.open_period {
                Some(open) if period_start > open => {
                    transitions.extend(close_period(entry, samples, open, &mut state.fired));
                    entry.open_period = Some(period_start);
                }
                // same period, or a late sample for one already evaluated
                Some(_) => {}
                None => entry.open_period = Some(period_start),
            }
        }

        let horizon = state
            .alarms
            .values()
            .map(|entry| entry.evaluator.spec())
            .filter(|spec| spec.identity == *identity)
            .map(|spec| {
                Duration::seconds(
                    i64::from(spec.period_seconds) * (i64::from(spec.evaluation_periods) + 1),
                )
            })
            .fold(self.retention, |longest, window| longest.max(window));
        if let Some(newest) = samples.iter().map(|dp| dp.timestamp).max() {
            let cutoff = newest - horizon;
            samples.retain(|dp| dp.timestamp >= cutoff);
        }

        transitions
    }

    /// Evaluates every open period that ends at or before `now`.
    pub fn advance_to(&self, now: DateTime<Utc>) -> Vec<StateTransition> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let mut transitions = Vec::new();
        for entry in state.alarms.values_mut() {
            let Some(open) = entry.open_period else {
                continue;
            };
            let period = Duration::seconds(i64::from(entry.evaluator.spec().period_seconds));
            if open + period > now {
                continue;
            }
            entry.open_period = None;
            let Some(samples) = state.samples.get(&entry.evaluator.spec().identity) else {
                continue;
            };
            transitions.extend(close_period(entry, samples, open, &mut state.fired));
        }
        transitions
    }

    pub fn alarm(&self, name: &str) -> Option<AlarmSpec> {
        self.state
            .lock()
            .alarms
            .get(name)
            .map(|entry| entry.evaluator.spec().clone())
    }

    pub fn alarm_names(&self) -> Vec<String> {
        self.state.lock().alarms.keys().cloned().collect()
    }

    pub fn alarm_state(&self, name: &str) -> Option<AlarmState> {
        self.state
            .lock()
            .alarms
            .get(name)
            .map(|entry| entry.evaluator.state())
    }

    /// The most recent fired actions, oldest first.
    pub fn fired_actions(&self) -> Vec<FiredAction> {
        self.state.lock().fired.iter().cloned().collect()
    }

    #[cfg(test)]
    fn sample_count(&self, identity: &MetricIdentity) -> usize {
        self.state
            .lock()
            .samples
            .get(identity)
            .map_or(0, Vec::len)
    }
}

/// Feeds the statistic of the period starting at `start` to the alarm and
/// fires its actions if that moved it into ALARM.
fn close_period(
    entry: &mut AlarmEntry,
    samples: &[Datapoint],
    start: DateTime<Utc>,
    fired: &mut VecDeque<FiredAction>,
) -> Option<StateTransition> {
    let spec = entry.evaluator.spec();
    let (period_seconds, statistic) = (spec.period_seconds, spec.statistic);
    let end = start + Duration::seconds(i64::from(period_seconds));

    let point = aggregate(samples, start, end, period_seconds, statistic)
        .into_iter()
        .next()?;
    let transition = entry.evaluator.observe(point)?;

    let spec = entry.evaluator.spec();
    if transition.entered_alarm() && spec.enabled {
        for action_ref in &spec.action_refs {
            tracing::info!(
                alarm = %transition.alarm_name,
                action = %action_ref,
                reason = %transition.reason,
                "Invoking alarm action"
            );
            if fired.len() == MAX_FIRED_ACTIONS {
                fired.pop_front();
            }
            fired.push_back(FiredAction {
                alarm_name: transition.alarm_name.clone(),
                action_ref: action_ref.clone(),
                timestamp: transition.timestamp,
            });
        }
    }
    Some(transition)
}

fn align_to_period(ts: DateTime<Utc>, period_secs: u32) -> DateTime<Utc> {
    let secs = ts.timestamp();
    let aligned = secs - secs.rem_euclid(i64::from(period_secs.max(1)));
    DateTime::from_timestamp(aligned, 0).unwrap_or(ts)
}

#[async_trait::async_trait]
impl MetricsBackend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_metric_statistics(&self, query: &MetricQuery) -> Result<Vec<Datapoint>> {
        let state = self.state.lock();
        let Some(samples) = state.samples.get(&query.identity) else {
            return Ok(Vec::new());
        };
        Ok(aggregate(
            samples,
            query.start,
            query.end,
            query.period_seconds,
            query.statistic,
        ))
    }

    async fn put_metric_alarm(&self, spec: &AlarmSpec) -> Result<()> {
        spec.validate()?;
        let mut state = self.state.lock();
        let replaced = state
            .alarms
            .insert(
                spec.name.clone(),
                AlarmEntry {
                    evaluator: AlarmEvaluator::new(spec.clone()),
                    open_period: None,
                },
            )
            .is_some();
        tracing::debug!(backend = %self.name, alarm = %spec.name, replaced, "Alarm stored");
        Ok(())
    }

    async fn delete_alarms(&self, names: &[String]) -> Result<()> {
        let mut state = self.state.lock();
        for name in names {
            if state.alarms.remove(name).is_none() {
                tracing::debug!(backend = %self.name, alarm = %name, "Alarm to delete not found");
            }
        }
        Ok(())
    }
}
