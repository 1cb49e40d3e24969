// Server loop module
// Accepts connections until shutdown is requested, then drains in-flight ones

use hyper_util::server::graceful::GracefulShutdown;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;

use super::connection::accept_connection;
use crate::config::AppState;
use crate::logger;

/// Accept loop for the application listener.
///
/// Runs until `shutdown` is notified. The listener is then closed and
/// open connections get `performance.shutdown_timeout` seconds to finish
/// their current request before the function returns.
pub async fn start_server_loop(listener: TcpListener, state: Arc<AppState>, shutdown: Arc<Notify>) {
    let graceful = GracefulShutdown::new();

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        accept_connection(stream, peer_addr, &state, &graceful);
                    }
                    Err(e) => {
                        logger::log_error(&format!("Failed to accept connection: {e}"));
                    }
                }
            }

            () = shutdown.notified() => break,
        }
    }

    drop(listener);
    logger::log_shutdown_started(state.connection_count());

    let drain_timeout = Duration::from_secs(state.config.performance.shutdown_timeout);
    tokio::select! {
        () = graceful.shutdown() => logger::log_shutdown_complete(),
        () = tokio::time::sleep(drain_timeout) => {
            logger::log_warning(&format!(
                "Shutdown timed out after {}s with {} connection(s) still open",
                drain_timeout.as_secs(),
                state.connection_count()
            ));
        }
    }
}
