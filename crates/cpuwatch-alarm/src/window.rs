use chrono::Duration;
use cpuwatch_common::types::Datapoint;
use std::collections::VecDeque;

/// The most recent `capacity` consecutive period statistics.
///
/// A datapoint for the period already at the back replaces it. A datapoint
/// that skips one or more periods clears the window, so the contents are
/// always gap-free.
pub struct PeriodWindow {
    period: Duration,
    capacity: usize,
    data: VecDeque<Datapoint>,
}

impl PeriodWindow {
    pub fn new(period_secs: u32, capacity: usize) -> Self {
        Self {
            period: Duration::seconds(i64::from(period_secs)),
            capacity: capacity.max(1),
            data: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    /// Returns `false` if the point is older than the newest period held.
    pub fn push(&mut self, point: Datapoint) -> bool {
        if let Some(back) = self.data.back_mut() {
            if point.timestamp < back.timestamp {
                return false;
            }
            if point.timestamp == back.timestamp {
                *back = point;
                return true;
            }
            if point.timestamp - back.timestamp > self.period {
                self.data.clear();
            }
        }

        if self.data.len() == self.capacity {
            self.data.pop_front();
        }
        self.data.push_back(point);
        true
    }

    pub fn is_full(&self) -> bool {
        self.data.len() == self.capacity
    }

    pub fn latest(&self) -> Option<&Datapoint> {
        self.data.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Datapoint> {
        self.data.iter()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
