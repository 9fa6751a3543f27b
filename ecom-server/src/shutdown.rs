//! Signal handling for graceful shutdown and config reload.

use crate::config::ConfigLoader;
use ecom_core::config::{ConfigStore, RelayConfig};
use ecom_core::processors::ProjectorError;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Completes when SIGTERM or SIGINT (Ctrl+C) is received.
pub async fn shutdown_signal() {
    let (mut sigterm, mut sigint) =
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!(error = %e, "Failed to install signal handlers, waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT, initiating graceful shutdown");
        }
    }
}

/// Completes once the shutdown flag is set or its sender is gone.
pub async fn wait_for_shutdown(mut shutdown_rx: watch::Receiver<bool>) {
    let _ = shutdown_rx.wait_for(|stop| *stop).await;
}

/// Waits for a projector task and turns its failure into a process failure.
///
/// On error or panic the shutdown flag is raised and the error is returned,
/// so the process exits non-zero and the supervisor restarts it.
pub async fn supervise_projector(
    task: JoinHandle<Result<(), ProjectorError>>,
    shutdown_tx: Arc<watch::Sender<bool>>,
) -> anyhow::Result<()> {
    let failure = match task.await {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(e)) => anyhow::Error::new(e).context("projector failed"),
        Err(e) => anyhow::Error::new(e).context("projector task panicked"),
    };
    tracing::error!(error = %failure, "Projector stopped, shutting down");
    let _ = shutdown_tx.send(true);
    Err(failure)
}

/// Spawns a task that reloads the config file on SIGHUP.
///
/// Only the relay settings take effect without a restart; the running
/// relay picks them up through `relay_config`.
pub fn spawn_config_reload_handler(
    config_loader: Arc<ConfigLoader>,
    relay_config: ConfigStore<RelayConfig>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut sighup = match signal(SignalKind::hangup()) {
            Ok(sighup) => sighup,
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGHUP handler, reload disabled");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = sighup.recv() => {
                    tracing::info!("Received SIGHUP, reloading configuration");
                    match config_loader.reload() {
                        Ok(loaded_config) => {
                            relay_config.update(loaded_config.relay).await;
                            tracing::info!(
                                interval_ms = loaded_config.relay.interval.as_millis() as u64,
                                batch_limit = loaded_config.relay.batch_limit,
                                "Relay configuration reloaded"
                            );
                        }
                        Err(e) => {
                            tracing::error!("Failed to reload configuration: {}", e);
                        }
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        tracing::debug!("Config reload handler shutting down");
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_projector_failure_fails_the_process() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async {
            Err(ProjectorError::StreamEnded {
                queue: "orders.products_cache".to_string(),
            })
        });

        let result = supervise_projector(task, Arc::new(shutdown_tx)).await;

        let err = result.expect_err("projector failure must surface");
        assert!(format!("{err:#}").contains("orders.products_cache"));
        assert!(*shutdown_rx.borrow());
    }

    #[tokio::test]
    async fn test_projector_panic_fails_the_process() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task: JoinHandle<Result<(), ProjectorError>> =
            tokio::spawn(async { panic!("boom") });

        let result = supervise_projector(task, Arc::new(shutdown_tx)).await;

        assert!(result.is_err());
        assert!(*shutdown_rx.borrow());
    }

    #[tokio::test]
    async fn test_clean_projector_exit_leaves_flag_alone() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async { Ok(()) });

        supervise_projector(task, Arc::new(shutdown_tx))
            .await
            .expect("clean exit");

        assert!(!*shutdown_rx.borrow());
    }
}
