use anyhow::{Context, Result};
use cpuwatch_agent::app;
use cpuwatch_agent::config::AgentConfig;
use cpuwatch_agent::error::AgentError;
use cpuwatch_agent::lifecycle::ShutdownSignal;
use cpuwatch_agent::report::ConsoleSink;
use cpuwatch_backend::{build_backend, MetricsBackend};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

async fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("cpuwatch=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/agent.toml".to_string());

    let config = AgentConfig::load(&config_path)
        .with_context(|| format!("loading {config_path}"))?;
    tracing::info!(
        backend = %config.backend,
        region = %config.region,
        resource = %config.resource_id,
        "cpuwatch-agent starting"
    );

    let backend: Arc<dyn MetricsBackend> = build_backend(&config.backend, config.backend_config())
        .map(Arc::from)
        .map_err(|e| AgentError::Config(e.to_string()))?;

    let signal = Arc::new(ShutdownSignal::new());
    let shutdown = signal.subscribe();
    {
        let signal = Arc::clone(&signal);
        tokio::spawn(async move { signal.listen_for_os_signals().await });
    }

    let summary = app::run(&config, backend, &mut ConsoleSink, shutdown).await?;
    tracing::info!(
        iterations = summary.iterations,
        alarm_deleted = summary.torn_down,
        "cpuwatch-agent stopped"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            let code = e.downcast_ref::<AgentError>().map_or(1, AgentError::exit_code);
            ExitCode::from(code)
        }
    }
}
