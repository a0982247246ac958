use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;
use varia::config::Config;
use varia::server::{
    create_metrics, run_health_server, shutdown_channel, wait_for_signal, ReadinessState,
};
use varia::service::{
    ExperimentService, InMemoryCache, InMemoryStore, Snapshot, Store, SystemClock,
};

/// Build the store, seeding it from a snapshot file when one is configured
///
/// Returns the ids of the imported experiments.
async fn load_store(path: Option<&Path>) -> anyhow::Result<(InMemoryStore, Vec<Uuid>)> {
    let Some(path) = path else {
        info!("No snapshot configured - starting with an empty store");
        return Ok((InMemoryStore::new(), Vec::new()));
    };

    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("cannot read snapshot {}: {}", path.display(), e))?;
    let snapshot: Snapshot = serde_json::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("invalid snapshot {}: {}", path.display(), e))?;

    let ids: Vec<Uuid> = snapshot.experiments.iter().map(|e| e.id).collect();
    let variants = snapshot.variants.len();
    let store = InMemoryStore::from_snapshot(snapshot)?;
    info!(
        path = %path.display(),
        experiments = ids.len(),
        variants = variants,
        "Snapshot imported"
    );
    Ok((store, ids))
}

/// Log a one-line analysis for each imported experiment
async fn report(service: &ExperimentService, ids: &[Uuid]) {
    for id in ids {
        let result = service.get_results(*id).await;
        match result.data {
            Some(results) => info!(
                experiment_id = %id,
                name = %results.experiment.name,
                status = %results.experiment.status,
                percent_complete = results.progress.percent_complete,
                significant = results.significance.is_significant,
                recommendations = results.recommendations.len(),
                "Experiment results"
            ),
            None => warn!(
                experiment_id = %id,
                error = result.error.as_deref().unwrap_or("unknown"),
                "Experiment results unavailable"
            ),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting varia experiment service");

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };

    let (shutdown_controller, shutdown_signal) = shutdown_channel();
    let readiness = ReadinessState::new();
    let metrics = create_metrics()?;
    info!("Prometheus metrics registry initialized");

    let health_handle = tokio::spawn(run_health_server(
        config.health_port,
        readiness.clone(),
        metrics.clone(),
        shutdown_signal,
    ));

    let (store, imported) = load_store(config.snapshot_path.as_deref()).await?;
    let store: Arc<dyn Store> = Arc::new(store);
    let clock = Arc::new(SystemClock);
    let cache = Arc::new(InMemoryCache::new(clock.clone()));
    let service = ExperimentService::new(
        store,
        cache,
        clock,
        config.service_config(),
        Some(metrics.clone()),
    );

    report(&service, &imported).await;

    readiness.set_ready();
    info!(port = config.health_port, "Experiment service ready");

    match wait_for_signal().await {
        Ok(signal) => info!(signal = signal, "Initiating graceful shutdown"),
        Err(e) => error!(error = %e, "Cannot listen for termination signals, shutting down"),
    }
    readiness.set_not_ready();
    shutdown_controller.shutdown();

    match health_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Health server failed"),
        Err(e) => warn!(error = %e, "Health server task panicked"),
    }

    info!("varia shut down gracefully");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
