pub mod cloudwatch;
pub mod error;
pub mod memory;

use cpuwatch_common::types::{AlarmSpec, Datapoint, MetricQuery};
use serde::{Deserialize, Serialize};

/// Static credentials used to sign backend requests.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default)]
    pub session_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"***")
            .field("session_token", &self.session_token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Connection settings for a metrics backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub region: String,
    /// Overrides the regional endpoint, e.g. `http://localhost:4566`.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

/// The external service that stores metrics and evaluates alarms.
#[async_trait::async_trait]
pub trait MetricsBackend: Send + Sync {
    /// Backend name used in logs and errors (e.g., `"cloudwatch:us-east-1"`).
    fn name(&self) -> &str;

    /// Returns the per-period statistics of `query`, zero or more datapoints.
    async fn get_metric_statistics(&self, query: &MetricQuery) -> error::Result<Vec<Datapoint>>;

    /// Creates or replaces the alarm named `spec.name`.
    async fn put_metric_alarm(&self, spec: &AlarmSpec) -> error::Result<()>;

    /// Deletes the named alarms. Unknown names are ignored.
    async fn delete_alarms(&self, names: &[String]) -> error::Result<()>;
}

/// Build a metrics backend by kind.
///
/// # Errors
///
/// Returns [`error::BackendError::UnsupportedBackend`] if `kind` is not
/// `"cloudwatch"` or `"memory"`.
/// Returns [`error::BackendError::ConfigError`] if the config is invalid.
pub fn build_backend(
    kind: &str,
    config: BackendConfig,
) -> error::Result<Box<dyn MetricsBackend>> {
    match kind {
        "cloudwatch" => Ok(Box::new(cloudwatch::CloudWatchBackend::new(config)?)),
        "memory" => Ok(Box::new(memory::MemoryBackend::new(&format!(
            "memory:{}",
            config.region
        )))),
        _ => Err(error::BackendError::UnsupportedBackend(kind.to_string())),
    }
}
