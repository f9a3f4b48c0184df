use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::config::ServiceConfig;
use crate::http::{build_router, serve, UPDATE_PATH};
use crate::startup::{bind_listener, build_pipeline};

/// How long shutdown waits for detached pushes before abandoning them.
pub const PUSH_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Run the service until Ctrl+C or SIGTERM.
pub async fn run(config: ServiceConfig) -> Result<()> {
    run_until(config, shutdown_signal()).await
}

/// Run the service until `shutdown` resolves, then let in-flight requests and
/// pushes finish.
pub async fn run_until<F>(config: ServiceConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let pipeline = build_pipeline(&config)?;
    let pushes = pipeline.pushes().clone();
    let listener = bind_listener(config.listen).await?;
    let local_addr = listener.local_addr().context("listener has no local address")?;

    info!(address = %format!("http://{local_addr}{UPDATE_PATH}"), "listening for updates");

    serve(listener, build_router(pipeline), shutdown)
        .await
        .context("update listener exited unexpectedly")?;

    info!("update listener stopped");

    let abandoned = pushes.drain(PUSH_DRAIN_TIMEOUT).await;
    if abandoned > 0 {
        warn!(abandoned, "exiting with pushes still running");
    }
    Ok(())
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            error!(%error, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                error!(%error, "failed to install SIGTERM handler");
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

    info!("shutdown signal received");
}
