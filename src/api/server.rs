//! Listener setup and graceful shutdown.

use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{router, AppState};
use crate::config::ServerConfig;
use crate::error::{NewsError, Result};
use crate::store::NewsStorer;

/// Bind the configured address and serve until a shutdown signal arrives
pub async fn serve<S: NewsStorer>(config: &ServerConfig, store: Arc<S>) -> Result<()> {
    let addr = config.socket_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| NewsError::Server(format!("failed to bind {}: {}", addr, e)))?;
    info!(address = %listener.local_addr()?, "listening");

    let state = AppState::new(store)
        .with_request_timeout(config.request_timeout())
        .with_body_limit(config.max_body_bytes);
    run(listener, state, config.shutdown_timeout(), shutdown_signal()).await
}

/// Serve on `listener` until `signal` resolves.
///
/// After the signal no new connections are accepted and in-flight requests
/// get `grace` to finish. Past that their contexts are canceled and an
/// error is returned.
pub async fn run<S, F>(
    listener: TcpListener,
    state: AppState<S>,
    grace: Duration,
    signal: F,
) -> Result<()>
where
    S: NewsStorer,
    F: Future<Output = ()> + Send + 'static,
{
    let requests = state.shutdown.clone();
    let stop = CancellationToken::new();

    let server = axum::serve(listener, router(state))
        .with_graceful_shutdown(stop.clone().cancelled_owned())
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            return result.map_err(|e| NewsError::Server(e.to_string()));
        }
        () = signal => {}
    }

    info!(grace_ms = grace.as_millis() as u64, "shutting down");
    stop.cancel();

    match tokio::time::timeout(grace, &mut server).await {
        Ok(result) => {
            result.map_err(|e| NewsError::Server(e.to_string()))?;
            info!("server stopped");
            Ok(())
        }
        Err(_) => {
            warn!("grace period elapsed, canceling in-flight requests");
            requests.cancel();
            Err(NewsError::Server(format!(
                "server forced to shutdown after {:?}",
                grace
            )))
        }
    }
}

/// Resolves on SIGINT, SIGTERM or SIGQUIT
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::terminate()), signal(SignalKind::quit())) {
            (Ok(mut term), Ok(mut quit)) => {
                tokio::select! {
                    _ = term.recv() => info!(signal = "SIGTERM", "received signal"),
                    _ = quit.recv() => info!(signal = "SIGQUIT", "received signal"),
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "failed to install signal handlers");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!(signal = "SIGINT", "received signal"),
        () = terminate => {}
    }
}
