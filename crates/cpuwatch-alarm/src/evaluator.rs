use crate::window::PeriodWindow;
use chrono::{DateTime, Utc};
use cpuwatch_common::types::{AlarmSpec, AlarmState, ComparisonOperator, Datapoint};

/// A change of alarm state caused by a new period statistic.
#[derive(Debug, Clone, PartialEq)]
pub struct StateTransition {
    pub alarm_name: String,
    pub from: AlarmState,
    pub to: AlarmState,
    pub value: f64,
    pub threshold: f64,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

impl StateTransition {
    pub fn entered_alarm(&self) -> bool {
        self.to == AlarmState::Alarm && self.from != AlarmState::Alarm
    }
}

pub struct AlarmEvaluator {
    spec: AlarmSpec,
    window: PeriodWindow,
    state: AlarmState,
}

impl AlarmEvaluator {
    pub fn new(spec: AlarmSpec) -> Self {
        let window = PeriodWindow::new(spec.period_seconds, spec.evaluation_periods as usize);
        Self {
            spec,
            window,
            state: AlarmState::InsufficientData,
        }
    }

    pub fn spec(&self) -> &AlarmSpec {
        &self.spec
    }

    pub fn state(&self) -> AlarmState {
        self.state
    }

    /// Feeds the statistic of one period (stamped with the period start) and
    /// returns the transition it caused, if any.
    pub fn observe(&mut self, point: Datapoint) -> Option<StateTransition> {
        if !self.window.push(point) {
            tracing::debug!(
                alarm = %self.spec.name,
                timestamp = %point.timestamp,
                "Ignoring datapoint older than the current period"
            );
            return None;
        }

        let next = self.evaluate();
        if next == self.state {
            return None;
        }

        let transition = StateTransition {
            alarm_name: self.spec.name.clone(),
            from: self.state,
            to: next,
            value: point.value,
            threshold: self.spec.threshold,
            timestamp: point.timestamp,
            reason: self.reason(next),
        };
        tracing::info!(
            alarm = %self.spec.name,
            from = %transition.from,
            to = %transition.to,
            value = point.value,
            "Alarm state changed"
        );
        self.state = next;
        Some(transition)
    }

    /// Feeds every point in order and collects the transitions.
    pub fn replay(&mut self, points: &[Datapoint]) -> Vec<StateTransition> {
        points.iter().filter_map(|p| self.observe(*p)).collect()
    }

    fn evaluate(&self) -> AlarmState {
        if !self.window.is_full() {
            return AlarmState::InsufficientData;
        }
        let all_breached = self
            .window
            .iter()
            .all(|dp| self.spec.comparator.breaches(dp.value, self.spec.threshold));
        if all_breached {
            AlarmState::Alarm
        } else {
            AlarmState::Ok
        }
    }

    fn reason(&self, state: AlarmState) -> String {
        let latest = self.window.latest().map(|dp| dp.value).unwrap_or_default();
        match state {
            AlarmState::Alarm => format!(
                "{} {} has been {} {:.1} for {} consecutive period(s) of {}s (latest {:.2})",
                self.spec.statistic,
                self.spec.identity,
                op_str(self.spec.comparator),
                self.spec.threshold,
                self.spec.evaluation_periods,
                self.spec.period_seconds,
                latest,
            ),
            AlarmState::Ok => format!(
                "{} {} no longer {} {:.1} (latest {:.2})",
                self.spec.statistic,
                self.spec.identity,
                op_str(self.spec.comparator),
                self.spec.threshold,
                latest,
            ),
            AlarmState::InsufficientData => format!(
                "{} of {} consecutive period(s) available",
                self.window.len(),
                self.spec.evaluation_periods,
            ),
        }
    }
}

fn op_str(op: ComparisonOperator) -> &'static str {
    match op {
        ComparisonOperator::GreaterThanThreshold => "above",
        ComparisonOperator::GreaterThanOrEqualToThreshold => "at or above",
        ComparisonOperator::LessThanThreshold => "below",
        ComparisonOperator::LessThanOrEqualToThreshold => "at or below",
    }
}
