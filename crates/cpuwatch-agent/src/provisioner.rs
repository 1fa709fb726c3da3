use cpuwatch_backend::error::BackendError;
use cpuwatch_backend::MetricsBackend;
use cpuwatch_common::types::AlarmSpec;

/// Names an alarm this process created, so it can be deleted again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmHandle {
    pub name: String,
}

/// Creates or replaces `spec` on the backend.
///
/// `spec` is validated locally first; an invalid alarm never reaches the
/// backend. Provisioning the same spec twice leaves a single alarm.
pub async fn provision_alarm(
    backend: &dyn MetricsBackend,
    spec: &AlarmSpec,
) -> Result<AlarmHandle, BackendError> {
    spec.validate()?;

    backend.put_metric_alarm(spec).await?;
    tracing::info!(
        alarm = %spec.name,
        metric = %spec.identity,
        threshold = spec.threshold,
        comparator = %spec.comparator,
        period_secs = spec.period_seconds,
        evaluation_periods = spec.evaluation_periods,
        actions = spec.action_refs.len(),
        backend = backend.name(),
        "Alarm provisioned"
    );
    println!("Alarm created: {}", spec.name);

    Ok(AlarmHandle {
        name: spec.name.clone(),
    })
}

/// Deletes the alarm named `name`. Deleting an alarm that does not exist is
/// not an error.
pub async fn delete_alarm(backend: &dyn MetricsBackend, name: &str) -> Result<(), BackendError> {
    if name.trim().is_empty() {
        return Err(BackendError::InvalidRequest("alarm name is empty".to_string()));
    }

    backend.delete_alarms(&[name.to_string()]).await?;
    tracing::info!(alarm = %name, backend = backend.name(), "Alarm deleted");
    println!("Alarm deleted: {name}");
    Ok(())
}
