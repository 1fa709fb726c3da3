//! Startup, sampling and teardown in the order the agent runs them.

use crate::config::AgentConfig;
use crate::error::{AgentError, Result};
use crate::history;
use crate::provisioner::{self, AlarmHandle};
use crate::report::ReportSink;
use crate::sampler::Sampler;
use chrono::Utc;
use cpuwatch_backend::MetricsBackend;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub iterations: u64,
    /// Set when the alarm was provisioned at startup.
    pub alarm: Option<AlarmHandle>,
    pub torn_down: bool,
}

/// Runs the agent until `shutdown` fires.
///
/// Rejected credentials while provisioning abort the run before sampling
/// starts. Any other provisioning or teardown failure is logged and the run
/// carries on.
pub async fn run(
    config: &AgentConfig,
    backend: Arc<dyn MetricsBackend>,
    sink: &mut dyn ReportSink,
    shutdown: watch::Receiver<bool>,
) -> Result<RunSummary> {
    let identity = config.metric_identity();
    let spec = config.alarm_spec()?;

    history::print_history(backend.as_ref(), &identity, Utc::now(), config.history_minutes).await;

    let alarm = match provisioner::provision_alarm(backend.as_ref(), &spec).await {
        Ok(handle) => Some(handle),
        Err(e) if e.is_unauthorized() => {
            tracing::error!(alarm = %spec.name, error = %e, "Backend rejected credentials");
            return Err(AgentError::Backend(e));
        }
        Err(e) => {
            tracing::warn!(alarm = %spec.name, error = %e, "Failed to provision alarm, sampling anyway");
            println!("Alarm creation failed: {e}");
            None
        }
    };

    let sampler = Sampler::new(Arc::clone(&backend), identity, config.sample_interval());
    let iterations = sampler.run(sink, shutdown).await;

    let mut torn_down = false;
    match &alarm {
        Some(handle) if config.alarm.delete_on_shutdown => {
            match provisioner::delete_alarm(backend.as_ref(), &handle.name).await {
                Ok(()) => torn_down = true,
                Err(e) => {
                    tracing::warn!(alarm = %handle.name, error = %e, "Failed to delete alarm on shutdown");
                }
            }
        }
        Some(handle) => {
            tracing::info!(alarm = %handle.name, "Keeping alarm after shutdown");
        }
        None => {}
    }

    Ok(RunSummary {
        iterations,
        alarm,
        torn_down,
    })
}
