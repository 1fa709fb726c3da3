use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Rejected construction of a query or alarm definition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid metric query: {0}")]
    Query(String),

    #[error("invalid alarm spec: {0}")]
    Alarm(String),
}

/// Key/value tag selecting one resource instance of a metric.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

/// Namespace, metric name and dimension set naming a single time series.
///
/// # Examples
///
/// ```
/// use cpuwatch_common::types::MetricIdentity;
///
/// let id = MetricIdentity::for_resource("AWS/EC2", "CPUUtilization", "InstanceId", "i-0abc");
/// assert_eq!(id.to_string(), "AWS/EC2/CPUUtilization{InstanceId=i-0abc}");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricIdentity {
    pub namespace: String,
    pub metric_name: String,
    pub dimensions: Vec<Dimension>,
}

impl MetricIdentity {
    pub fn for_resource(
        namespace: &str,
        metric_name: &str,
        dimension_key: &str,
        dimension_value: &str,
    ) -> Self {
        Self {
            namespace: namespace.to_string(),
            metric_name: metric_name.to_string(),
            dimensions: vec![Dimension {
                name: dimension_key.to_string(),
                value: dimension_value.to_string(),
            }],
        }
    }
}

impl std::fmt::Display for MetricIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dims: Vec<String> = self
            .dimensions
            .iter()
            .map(|d| format!("{}={}", d.name, d.value))
            .collect();
        write!(
            f,
            "{}/{}{{{}}}",
            self.namespace,
            self.metric_name,
            dims.join(",")
        )
    }
}

/// Aggregation applied to the raw samples of one period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Statistic {
    #[default]
    Average,
    Sum,
    Minimum,
    Maximum,
    SampleCount,
}

impl Statistic {
    /// Reduces `values` with this statistic. Returns `None` for an empty slice.
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let result = match self {
            Self::Average => values.iter().sum::<f64>() / values.len() as f64,
            Self::Sum => values.iter().sum(),
            Self::Minimum => values.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Maximum => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::SampleCount => values.len() as f64,
        };
        Some(result)
    }
}

impl std::fmt::Display for Statistic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Average => write!(f, "Average"),
            Self::Sum => write!(f, "Sum"),
            Self::Minimum => write!(f, "Minimum"),
            Self::Maximum => write!(f, "Maximum"),
            Self::SampleCount => write!(f, "SampleCount"),
        }
    }
}

impl std::str::FromStr for Statistic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "average" | "avg" => Ok(Self::Average),
            "sum" => Ok(Self::Sum),
            "minimum" | "min" => Ok(Self::Minimum),
            "maximum" | "max" => Ok(Self::Maximum),
            "samplecount" | "sample_count" | "count" => Ok(Self::SampleCount),
            _ => Err(format!("unknown statistic: {s}")),
        }
    }
}

/// One aggregated sample of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// A statistics request for one metric over `[start, end)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricQuery {
    pub identity: MetricIdentity,
    pub period_seconds: u32,
    pub statistic: Statistic,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl MetricQuery {
    /// Builds a query, rejecting an empty time range or a zero period.
    pub fn new(
        identity: MetricIdentity,
        period_seconds: u32,
        statistic: Statistic,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        if period_seconds == 0 {
            return Err(ValidationError::Query(
                "period_seconds must be greater than zero".to_string(),
            ));
        }
        if start >= end {
            return Err(ValidationError::Query(format!(
                "start {start} must be before end {end}"
            )));
        }
        Ok(Self {
            identity,
            period_seconds,
            statistic,
            start,
            end,
        })
    }

    /// Query covering the `window` that ends at `now`.
    pub fn trailing(
        identity: MetricIdentity,
        now: DateTime<Utc>,
        window: Duration,
        period_seconds: u32,
        statistic: Statistic,
    ) -> Result<Self, ValidationError> {
        Self::new(identity, period_seconds, statistic, now - window, now)
    }
}

/// How the period statistic is compared against the alarm threshold.
///
/// # Examples
///
/// ```
/// use cpuwatch_common::types::ComparisonOperator;
///
/// let op: ComparisonOperator = "gt".parse().unwrap();
/// assert_eq!(op, ComparisonOperator::GreaterThanThreshold);
/// assert!(op.breaches(70.5, 70.0));
/// assert!(!op.breaches(70.0, 70.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    GreaterThanThreshold,
    GreaterThanOrEqualToThreshold,
    LessThanThreshold,
    LessThanOrEqualToThreshold,
}

impl ComparisonOperator {
    pub fn breaches(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::GreaterThanThreshold => value > threshold,
            Self::GreaterThanOrEqualToThreshold => value >= threshold,
            Self::LessThanThreshold => value < threshold,
            Self::LessThanOrEqualToThreshold => value <= threshold,
        }
    }
}

impl std::fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GreaterThanThreshold => write!(f, "GreaterThanThreshold"),
            Self::GreaterThanOrEqualToThreshold => write!(f, "GreaterThanOrEqualToThreshold"),
            Self::LessThanThreshold => write!(f, "LessThanThreshold"),
            Self::LessThanOrEqualToThreshold => write!(f, "LessThanOrEqualToThreshold"),
        }
    }
}

impl std::str::FromStr for ComparisonOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GreaterThanThreshold" | "greater_than" | "gt" => Ok(Self::GreaterThanThreshold),
            "GreaterThanOrEqualToThreshold" | "greater_equal" | "gte" => {
                Ok(Self::GreaterThanOrEqualToThreshold)
            }
            "LessThanThreshold" | "less_than" | "lt" => Ok(Self::LessThanThreshold),
            "LessThanOrEqualToThreshold" | "less_equal" | "lte" => {
                Ok(Self::LessThanOrEqualToThreshold)
            }
            _ => Err(format!("unknown comparison operator: {s}")),
        }
    }
}

/// Evaluation state of an alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmState {
    Ok,
    Alarm,
    InsufficientData,
}

impl std::fmt::Display for AlarmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Alarm => write!(f, "ALARM"),
            Self::InsufficientData => write!(f, "INSUFFICIENT_DATA"),
        }
    }
}

/// Threshold alarm definition, keyed by `name` in the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmSpec {
    pub name: String,
    pub description: String,
    pub identity: MetricIdentity,
    pub statistic: Statistic,
    pub period_seconds: u32,
    pub evaluation_periods: u32,
    pub threshold: f64,
    pub comparator: ComparisonOperator,
    /// Notification targets invoked, in order, on transition into ALARM.
    pub action_refs: Vec<String>,
    /// Whether `action_refs` are invoked. The alarm state is tracked either way.
    pub enabled: bool,
}

impl AlarmSpec {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::Alarm("name must not be empty".to_string()));
        }
        if self.period_seconds == 0 {
            return Err(ValidationError::Alarm(
                "period_seconds must be greater than zero".to_string(),
            ));
        }
        if self.evaluation_periods == 0 {
            return Err(ValidationError::Alarm(
                "evaluation_periods must be greater than zero".to_string(),
            ));
        }
        if !self.threshold.is_finite() {
            return Err(ValidationError::Alarm(format!(
                "threshold must be finite, got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}
