// Connection handling module
// Accepts and serves single TCP connections

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::graceful::GracefulShutdown;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppState;
use crate::handler;
use crate::logger;

/// Accept and process a connection, checking limits and logging.
///
/// # Arguments
///
/// * `stream` - The TCP stream to handle
/// * `peer_addr` - The peer's socket address
/// * `state` - Shared application state
/// * `graceful` - Shutdown watcher the connection registers with
pub fn accept_connection(
    stream: tokio::net::TcpStream,
    peer_addr: std::net::SocketAddr,
    state: &Arc<AppState>,
    graceful: &GracefulShutdown,
) {
    // Increment counter first, then check limit (prevents race condition)
    let prev_count = state.active_connections.fetch_add(1, Ordering::SeqCst);

    if let Some(max_conn) = state.config.performance.max_connections {
        if prev_count >= usize::try_from(max_conn).unwrap_or(usize::MAX) {
            // Exceeded limit: rollback counter and reject
            state.active_connections.fetch_sub(1, Ordering::SeqCst);
            logger::log_warning(&format!(
                "Max connections reached: {prev_count}/{max_conn}. Connection from {peer_addr} rejected."
            ));
            drop(stream);
            return;
        }
    }

    if state.access_log_enabled() {
        logger::log_connection_accepted(&peer_addr);
    }

    let io = TokioIo::new(stream);

    let perf = &state.config.performance;
    let keep_alive = perf.keep_alive_timeout > 0;
    // Hyper runs this clock whenever it waits for a request head, so it
    // also bounds how long an idle keep-alive connection stays open.
    // Zero disables a timeout.
    let head_timeout = [perf.read_timeout, perf.keep_alive_timeout]
        .into_iter()
        .filter(|&secs| secs > 0)
        .min()
        .map(Duration::from_secs);
    // Without keep-alive a connection carries one exchange, so it gets a hard cap
    let lifetime = Some(perf.read_timeout.saturating_add(perf.write_timeout))
        .filter(|&secs| !keep_alive && secs > 0)
        .map(Duration::from_secs);

    let service_state = Arc::clone(state);
    let conn = http1::Builder::new()
        .timer(TokioTimer::new())
        .header_read_timeout(head_timeout)
        .keep_alive(keep_alive)
        .serve_connection(
            io,
            service_fn(move |req| {
                handler::handle_request(req, Arc::clone(&service_state), peer_addr)
            }),
        );
    let conn = graceful.watch(conn);

    let state = Arc::clone(state);
    tokio::spawn(async move {
        // Write failures after the response head surface here
        let result = match lifetime {
            Some(limit) => tokio::time::timeout(limit, conn).await,
            None => Ok(conn.await),
        };
        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => logger::log_connection_error(&err),
            Err(_) => {
                logger::log_warning(&format!(
                    "Connection from {peer_addr} timed out after {} seconds",
                    lifetime.map_or(0, |d| d.as_secs())
                ));
            }
        }

        state.active_connections.fetch_sub(1, Ordering::SeqCst);
    });
}
