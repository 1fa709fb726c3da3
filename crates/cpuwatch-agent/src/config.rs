use crate::error::{AgentError, Result};
use cpuwatch_backend::{BackendConfig, Credentials};
use cpuwatch_common::types::{AlarmSpec, ComparisonOperator, MetricIdentity, Statistic};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// `"cloudwatch"` or `"memory"`.
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default)]
    pub region: String,
    /// Overrides the regional endpoint URL
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Value of the resource dimension, e.g. an EC2 instance id.
    #[serde(default)]
    pub resource_id: String,
    #[serde(default = "default_dimension_key")]
    pub dimension_key: String,
    #[serde(default = "default_metric_namespace")]
    pub metric_namespace: String,
    #[serde(default = "default_metric_name")]
    pub metric_name: String,
    #[serde(default = "default_sample_interval")]
    pub sample_interval_secs: u64,
    /// Minutes of history printed at startup; 0 disables it.
    #[serde(default = "default_history_minutes")]
    pub history_minutes: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub alarm: AlarmConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlarmConfig {
    #[serde(default = "default_alarm_name")]
    pub name: String,
    #[serde(default = "default_alarm_description")]
    pub description: String,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_comparator")]
    pub comparator: String,
    #[serde(default = "default_evaluation_periods")]
    pub evaluation_periods: u32,
    #[serde(default = "default_alarm_period")]
    pub period_secs: u32,
    #[serde(default = "default_statistic")]
    pub statistic: String,
    /// Notification targets, e.g. SNS topic ARNs.
    #[serde(default)]
    pub notification_targets: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub delete_on_shutdown: bool,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            name: default_alarm_name(),
            description: default_alarm_description(),
            threshold: default_threshold(),
            comparator: default_comparator(),
            evaluation_periods: default_evaluation_periods(),
            period_secs: default_alarm_period(),
            statistic: default_statistic(),
            notification_targets: Vec::new(),
            enabled: true,
            delete_on_shutdown: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialsConfig {
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
}

fn default_backend() -> String {
    "cloudwatch".to_string()
}

fn default_dimension_key() -> String {
    "InstanceId".to_string()
}

fn default_metric_namespace() -> String {
    "AWS/EC2".to_string()
}

fn default_metric_name() -> String {
    "CPUUtilization".to_string()
}

fn default_sample_interval() -> u64 {
    60
}

fn default_history_minutes() -> u32 {
    10
}

fn default_request_timeout() -> u64 {
    30
}

fn default_alarm_name() -> String {
    "HighCPUUtilization".to_string()
}

fn default_alarm_description() -> String {
    "Alarm when CPU exceeds 70%".to_string()
}

fn default_threshold() -> f64 {
    70.0
}

fn default_comparator() -> String {
    "GreaterThanThreshold".to_string()
}

fn default_evaluation_periods() -> u32 {
    1
}

fn default_alarm_period() -> u32 {
    300
}

fn default_statistic() -> String {
    "Average".to_string()
}

fn default_true() -> bool {
    true
}

/// Empty strings in the file count as absent.
fn is_unset(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

impl AgentConfig {
    /// Reads the TOML file at `path`, fills credentials and region from the
    /// process environment where the file leaves them empty, and validates.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AgentError::Config(format!("cannot read {path}: {e}")))?;
        let mut config = Self::parse(&content)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| AgentError::Config(e.to_string()))
    }

    /// Fills unset fields from `lookup` (normally the process environment).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if self.region.is_empty() {
            if let Some(region) = non_empty("AWS_REGION").or_else(|| non_empty("AWS_DEFAULT_REGION")) {
                self.region = region;
            }
        }
        let creds = &mut self.credentials;
        for (field, key) in [
            (&mut creds.access_key_id, "AWS_ACCESS_KEY_ID"),
            (&mut creds.secret_access_key, "AWS_SECRET_ACCESS_KEY"),
            (&mut creds.session_token, "AWS_SESSION_TOKEN"),
        ] {
            if is_unset(field) {
                *field = non_empty(key);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self.backend.as_str() {
            "cloudwatch" => {
                if self.region.trim().is_empty() {
                    return Err(AgentError::Config(
                        "region is required (set `region` or AWS_REGION)".to_string(),
                    ));
                }
                if is_unset(&self.credentials.access_key_id)
                    || is_unset(&self.credentials.secret_access_key)
                {
                    return Err(AgentError::Config(
                        "credentials are required (set [credentials] or AWS_ACCESS_KEY_ID/AWS_SECRET_ACCESS_KEY)"
                            .to_string(),
                    ));
                }
            }
            "memory" => {}
            other => {
                return Err(AgentError::Config(format!("unknown backend: {other}")));
            }
        }

        if self.resource_id.trim().is_empty() {
            return Err(AgentError::Config("resource_id is required".to_string()));
        }
        if self.metric_namespace.is_empty() || self.metric_name.is_empty() {
            return Err(AgentError::Config(
                "metric_namespace and metric_name must not be empty".to_string(),
            ));
        }
        if self.sample_interval_secs == 0 {
            return Err(AgentError::Config(
                "sample_interval_secs must be greater than zero".to_string(),
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(AgentError::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }

        self.alarm_spec()?
            .validate()
            .map_err(|e| AgentError::Config(e.to_string()))
    }

    pub fn metric_identity(&self) -> MetricIdentity {
        MetricIdentity::for_resource(
            &self.metric_namespace,
            &self.metric_name,
            &self.dimension_key,
            &self.resource_id,
        )
    }

    pub fn alarm_spec(&self) -> Result<AlarmSpec> {
        let comparator: ComparisonOperator = self
            .alarm
            .comparator
            .parse()
            .map_err(AgentError::Config)?;
        let statistic: Statistic = self.alarm.statistic.parse().map_err(AgentError::Config)?;

        Ok(AlarmSpec {
            name: self.alarm.name.clone(),
            description: self.alarm.description.clone(),
            identity: self.metric_identity(),
            statistic,
            period_seconds: self.alarm.period_secs,
            evaluation_periods: self.alarm.evaluation_periods,
            threshold: self.alarm.threshold,
            comparator,
            action_refs: self.alarm.notification_targets.clone(),
            enabled: self.alarm.enabled,
        })
    }

    pub fn backend_config(&self) -> BackendConfig {
        BackendConfig {
            region: self.region.clone(),
            endpoint: self.endpoint.clone(),
            credentials: Credentials {
                access_key_id: self.credentials.access_key_id.clone().unwrap_or_default(),
                secret_access_key: self
                    .credentials
                    .secret_access_key
                    .clone()
                    .unwrap_or_default(),
                session_token: self.credentials.session_token.clone(),
            },
            timeout_secs: self.request_timeout_secs,
        }
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const MINIMAL: &str = r#"
        region = "us-east-1"
        resource_id = "i-0abc"
    "#;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn should_apply_defaults_for_minimal_config() {
        let cfg = AgentConfig::parse(MINIMAL).unwrap();
        assert_eq!(cfg.backend, "cloudwatch");
        assert_eq!(cfg.dimension_key, "InstanceId");
        assert_eq!(cfg.metric_namespace, "AWS/EC2");
        assert_eq!(cfg.metric_name, "CPUUtilization");
        assert_eq!(cfg.sample_interval(), Duration::from_secs(60));
        assert_eq!(cfg.history_minutes, 10);
        assert_eq!(cfg.alarm.name, "HighCPUUtilization");
        assert_eq!(cfg.alarm.threshold, 70.0);
        assert_eq!(cfg.alarm.period_secs, 300);
        assert!(cfg.alarm.delete_on_shutdown);
    }

    #[test]
    fn should_take_credentials_from_environment() {
        let mut cfg = AgentConfig::parse(MINIMAL).unwrap();
        cfg.apply_env(env(&[
            ("AWS_ACCESS_KEY_ID", "AKIDEXAMPLE"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
        ]));
        assert!(cfg.validate().is_ok());

        let backend = cfg.backend_config();
        assert_eq!(backend.credentials.access_key_id, "AKIDEXAMPLE");
        assert!(backend.credentials.session_token.is_none());
    }

    #[test]
    fn should_prefer_file_values_over_environment() {
        let mut cfg = AgentConfig::parse(
            r#"
            region = "eu-west-1"
            resource_id = "i-0abc"
            [credentials]
            access_key_id = "FROMFILE"
            secret_access_key = "filesecret"
            "#,
        )
        .unwrap();
        cfg.apply_env(env(&[
            ("AWS_REGION", "us-west-2"),
            ("AWS_ACCESS_KEY_ID", "FROMENV"),
        ]));
        assert_eq!(cfg.region, "eu-west-1");
        assert_eq!(cfg.credentials.access_key_id.as_deref(), Some("FROMFILE"));
    }

    #[test]
    fn should_replace_empty_file_credentials_from_environment() {
        let mut cfg = AgentConfig::parse(
            r#"
            region = "us-east-1"
            resource_id = "i-0abc"
            [credentials]
            access_key_id = ""
            secret_access_key = ""
            "#,
        )
        .unwrap();
        cfg.apply_env(env(&[
            ("AWS_ACCESS_KEY_ID", "AKIDEXAMPLE"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
        ]));
        assert_eq!(cfg.credentials.access_key_id.as_deref(), Some("AKIDEXAMPLE"));
        assert_eq!(cfg.credentials.secret_access_key.as_deref(), Some("secret"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn should_reject_empty_credentials_without_environment() {
        let mut cfg = AgentConfig::parse(
            r#"
            region = "us-east-1"
            resource_id = "i-0abc"
            [credentials]
            access_key_id = ""
            secret_access_key = ""
            "#,
        )
        .unwrap();
        cfg.apply_env(env(&[]));
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, AgentError::Config(ref msg) if msg.contains("credentials")));
    }

    #[test]
    fn should_reject_zero_request_timeout() {
        let cfg = AgentConfig::parse(
            r#"
            backend = "memory"
            resource_id = "i-0abc"
            request_timeout_secs = 0
            "#,
        )
        .unwrap();
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, AgentError::Config(ref msg) if msg.contains("request_timeout_secs")));
    }

    #[test]
    fn should_fill_region_from_environment() {
        let mut cfg = AgentConfig::parse(r#"resource_id = "i-0abc""#).unwrap();
        cfg.apply_env(env(&[("AWS_DEFAULT_REGION", "ap-southeast-2")]));
        assert_eq!(cfg.region, "ap-southeast-2");
    }

    #[test]
    fn should_reject_cloudwatch_without_credentials() {
        let cfg = AgentConfig::parse(MINIMAL).unwrap();
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, AgentError::Config(ref msg) if msg.contains("credentials")));
    }

    #[test]
    fn should_reject_missing_resource_id() {
        let cfg = AgentConfig::parse(r#"backend = "memory""#).unwrap();
        assert!(matches!(cfg.validate(), Err(AgentError::Config(_))));
    }

    #[test]
    fn should_reject_unknown_backend_and_comparator() {
        let cfg = AgentConfig::parse(
            r#"
            backend = "graphite"
            resource_id = "i-0abc"
            "#,
        )
        .unwrap();
        assert!(cfg.validate().is_err());

        let cfg = AgentConfig::parse(
            r#"
            backend = "memory"
            resource_id = "i-0abc"
            [alarm]
            comparator = "roughly"
            "#,
        )
        .unwrap();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("roughly"));
    }

    #[test]
    fn should_reject_zero_evaluation_periods() {
        let cfg = AgentConfig::parse(
            r#"
            backend = "memory"
            resource_id = "i-0abc"
            [alarm]
            evaluation_periods = 0
            "#,
        )
        .unwrap();
        assert!(matches!(cfg.validate(), Err(AgentError::Config(_))));
    }

    #[test]
    fn should_build_alarm_spec_from_config() {
        let cfg = AgentConfig::parse(
            r#"
            backend = "memory"
            resource_id = "i-0abc"
            [alarm]
            threshold = 85.5
            comparator = "gte"
            statistic = "maximum"
            evaluation_periods = 3
            notification_targets = ["arn:aws:sns:us-east-1:123456789012:ops", "arn:aws:sns:us-east-1:123456789012:pager"]
            "#,
        )
        .unwrap();

        let spec = cfg.alarm_spec().unwrap();
        assert_eq!(spec.threshold, 85.5);
        assert_eq!(spec.comparator, ComparisonOperator::GreaterThanOrEqualToThreshold);
        assert_eq!(spec.statistic, Statistic::Maximum);
        assert_eq!(spec.evaluation_periods, 3);
        assert_eq!(spec.action_refs.len(), 2);
        assert!(spec.action_refs[1].ends_with(":pager"));
        assert_eq!(spec.identity, cfg.metric_identity());
    }

    #[test]
    fn should_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            backend = "memory"
            resource_id = "i-0abc"
            sample_interval_secs = 15
            "#
        )
        .unwrap();

        let cfg = AgentConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(cfg.sample_interval_secs, 15);
    }

    #[test]
    fn should_report_unreadable_file_as_config_error() {
        let err = AgentConfig::load("/nonexistent/cpuwatch/agent.toml").unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn should_parse_shipped_example() {
        let cfg = AgentConfig::parse(include_str!("../../../config/agent.example.toml")).unwrap();
        assert_eq!(cfg.backend, "cloudwatch");
        assert_eq!(cfg.alarm.period_secs, 300);
        let spec = cfg.alarm_spec().unwrap();
        assert_eq!(spec.comparator, ComparisonOperator::GreaterThanThreshold);
        assert_eq!(spec.action_refs.len(), 1);
    }
}
