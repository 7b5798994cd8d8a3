//! cgwatch: a cgroup v1 resource-metrics collector.
//!
//! Mirrors the mounted cgroup hierarchies in memory, keeps the mirror in sync
//! through filesystem notifications and periodically collects the CPU,
//! memory, block I/O and huge page accounting of every cgroup. Metrics and a
//! JSON snapshot of the tree are served over HTTP.
use std::sync::Arc;

pub mod api;
pub mod cgroup;
pub mod config;
pub mod error;
pub mod fsutil;
pub mod metrics;
pub mod models;
pub mod mountinfo;

/// Runs the collector until Ctrl-C or SIGTERM.
///
/// # Errors
///
/// Possible errors include:
/// - Invalid configuration in the environment.
/// - A requested cgroup subsystem that is not mounted.
/// - Failure to create or release filesystem watches.
/// - Failure to bind the API listen address.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::Config::from_env()?;
    log::debug!("Configuration: {config:?}");

    let metrics = metrics::PrometheusSink::new()?;
    let resolver = mountinfo::MountinfoResolver::new(&config.mountinfo);
    let mut watcher = cgroup::Watcher::new(
        config.collection_interval,
        &config.cgroups,
        &resolver,
        Arc::new(metrics.clone()),
    )?;
    watcher.start().await?;

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
    let api = api::ApiServer::new(watcher.tree(), metrics);
    let mut api_task = tokio::spawn(api.listen(config.listen_address, async move {
        let _ = shutdown_rx.changed().await;
    }));

    let api_result = tokio::select! {
        _ = shutdown_signal() => {
            log::info!("Received shutdown signal");
            None
        }
        result = &mut api_task => Some(result),
    };
    let _ = shutdown_tx.send(true);
    let api_result = match api_result {
        Some(result) => result,
        None => api_task.await,
    };

    watcher.stop().await?;
    api_result??;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                log::error!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
