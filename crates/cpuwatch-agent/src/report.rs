use chrono::{DateTime, SecondsFormat, Utc};

/// What one sampler iteration observed.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Value {
        value: f64,
        observed_at: DateTime<Utc>,
    },
    NoData,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub reported_at: DateTime<Utc>,
    pub outcome: Outcome,
}

impl Report {
    pub fn value(&self) -> Option<f64> {
        match self.outcome {
            Outcome::Value { value, .. } => Some(value),
            _ => None,
        }
    }
}

impl std::fmt::Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let at = self.reported_at.to_rfc3339_opts(SecondsFormat::Secs, true);
        match &self.outcome {
            Outcome::Value { value, observed_at } => write!(
                f,
                "CPU Utilization at {at}: {value:.2}% (datapoint {})",
                observed_at.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
            Outcome::NoData => write!(f, "CPU Utilization at {at}: no data"),
            Outcome::Failed(err) => write!(f, "CPU Utilization at {at}: fetch failed: {err}"),
        }
    }
}

/// Destination for sampler reports.
pub trait ReportSink: Send {
    fn report(&mut self, report: &Report);
}

/// Prints each report as one line on stdout.
pub struct ConsoleSink;

impl ReportSink for ConsoleSink {
    fn report(&mut self, report: &Report) {
        println!("{report}");
    }
}

impl ReportSink for Vec<Report> {
    fn report(&mut self, report: &Report) {
        self.push(report.clone());
    }
}
