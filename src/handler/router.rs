//! Request routing dispatch module
//!
//! Entry point for HTTP request processing: health probes, body size checks,
//! then method + path matching against the fixed route table.

use crate::config::{AppState, HealthConfig};
use crate::error::ResponseError;
use crate::http;
use crate::logger::{self, AccessLogEntry};
use http_body_util::Full;
use hyper::body::{Body, Bytes};
use hyper::header;
use hyper::{HeaderMap, Method, Request, Response};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// Result every route handler produces
pub type HandlerResult = Result<Response<Full<Bytes>>, ResponseError>;

/// A (method, path) pair bound to a handler
pub struct Route {
    pub method: Method,
    pub path: &'static str,
    pub handler: fn(&AppState) -> HandlerResult,
}

/// Every route the server answers
pub static ROUTES: &[Route] = &[Route {
    method: Method::GET,
    path: "/games",
    handler: list_games,
}];

fn list_games(state: &AppState) -> HandlerResult {
    state.game_server.list_games()
}

/// Main entry point for HTTP request handling
#[allow(clippy::unused_async)]
pub async fn handle_request<B: Body>(
    req: Request<B>,
    state: Arc<AppState>,
    peer_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let started = Instant::now();

    logger::log_headers_count(req.headers().len(), state.config.logging.show_headers);

    let mut response = route_request(req.method(), req.uri().path(), req.headers(), &state);
    http::apply_common_headers(&mut response, &state.config.http);

    if state.access_log_enabled() {
        log_access(&req, &response, peer_addr, started, &state);
    }

    Ok(response)
}

/// Resolve a request to its response
fn route_request(
    method: &Method,
    path: &str,
    headers: &HeaderMap,
    state: &AppState,
) -> Response<Full<Bytes>> {
    // 0. Health check endpoints (highest priority, always fast)
    if let Some(resp) = check_health(path, &state.config.routes.health) {
        return resp;
    }

    // 1. Check body size
    if let Some(resp) = check_body_size(headers, state.config.http.max_body_size) {
        return resp;
    }

    // 2. Route table
    let bound: Vec<&Route> = ROUTES.iter().filter(|r| r.path == path).collect();
    if bound.is_empty() {
        return http::build_404_response();
    }

    if let Some(route) = bound.iter().find(|r| r.method == *method) {
        return into_response((route.handler)(state));
    }

    let allow = allow_header(&bound);
    if *method == Method::OPTIONS {
        return http::build_options_response(&allow, state.config.http.enable_cors);
    }

    logger::log_warning(&format!("Method not allowed: {method} {path}"));
    http::build_405_response(&allow)
}

/// Answer liveness/readiness probes
fn check_health(path: &str, health: &HealthConfig) -> Option<Response<Full<Bytes>>> {
    if !health.enabled {
        return None;
    }
    if path == health.liveness_path || path == health.readiness_path {
        return Some(http::build_health_response("ok"));
    }
    None
}

/// Validate Content-Length header and return 413 if exceeded
fn check_body_size(headers: &HeaderMap, max_body_size: u64) -> Option<Response<Full<Bytes>>> {
    let content_length = headers.get(header::CONTENT_LENGTH)?;
    content_length.to_str().map_or_else(
        |_| {
            logger::log_warning("Content-Length header contains non-ASCII characters");
            None
        },
        |size_str| match size_str.parse::<u64>() {
            Ok(size) if size > max_body_size => {
                logger::log_error(&format!(
                    "Request body too large: {size} bytes (max: {max_body_size})"
                ));
                Some(http::build_413_response())
            }
            Err(_) => {
                logger::log_warning(&format!(
                    "Invalid Content-Length value: '{size_str}', skipping size check"
                ));
                None
            }
            _ => None,
        },
    )
}

/// `Allow` header value for a path: its bound methods plus OPTIONS
fn allow_header(bound: &[&Route]) -> String {
    let mut methods: Vec<&str> = bound.iter().map(|r| r.method.as_str()).collect();
    if !methods.contains(&Method::OPTIONS.as_str()) {
        methods.push(Method::OPTIONS.as_str());
    }
    methods.join(", ")
}

/// Turn a handler failure into a logged 500
fn into_response(result: HandlerResult) -> Response<Full<Bytes>> {
    result.unwrap_or_else(|e| {
        logger::log_error(&e.to_string());
        http::build_500_response()
    })
}

fn log_access<B: Body>(
    req: &Request<B>,
    response: &Response<Full<Bytes>>,
    peer_addr: SocketAddr,
    started: Instant,
    state: &AppState,
) {
    let header_str = |name: header::HeaderName| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
    };

    let mut entry = AccessLogEntry::new(
        peer_addr.ip().to_string(),
        req.method().to_string(),
        req.uri().path().to_string(),
    );
    entry.query = req.uri().query().map(ToString::to_string);
    entry.http_version = logger::format_version(req.version());
    entry.status = response.status().as_u16();
    entry.body_bytes = usize::try_from(response.body().size_hint().exact().unwrap_or(0))
        .unwrap_or(usize::MAX);
    entry.referer = header_str(header::REFERER);
    entry.user_agent = header_str(header::USER_AGENT);
    entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);

    logger::log_access(&entry, &state.config.logging.access_log_format);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::games::{GameState, GameSummary};
    use http_body_util::BodyExt;
    use hyper::StatusCode;

    fn test_state(customize: impl FnOnce(&mut Config)) -> Arc<AppState> {
        let mut cfg = Config::test_defaults();
        cfg.logging.access_log = false;
        customize(&mut cfg);
        Arc::new(AppState::new(&cfg))
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    async fn send(state: &Arc<AppState>, method: Method, uri: &str) -> Response<Full<Bytes>> {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(Bytes::new()))
            .unwrap();
        handle_request(req, Arc::clone(state), peer()).await.unwrap()
    }

    async fn body_bytes(resp: Response<Full<Bytes>>) -> Bytes {
        resp.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_get_games() {
        let state = test_state(|_| {});
        let resp = send(&state, Method::GET, "/games").await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");

        let games: Vec<GameSummary> = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(games.len(), 3);
        assert_eq!(games[0], GameSummary::new("Game 1", 5, GameState::Countdown));
        assert_eq!(games[1], GameSummary::new("John's Game", 3, GameState::Waiting));
        assert_eq!(games[2], GameSummary::new("Unnamed Game", 6, GameState::Ended));
    }

    #[tokio::test]
    async fn test_get_games_raw_json() {
        let state = test_state(|_| {});
        let resp = send(&state, Method::GET, "/games?page=2").await;
        let value: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(
            value,
            serde_json::json!([
                {"Name": "Game 1", "QuestionCount": 5, "State": "countdown"},
                {"Name": "John's Game", "QuestionCount": 3, "State": "waiting"},
                {"Name": "Unnamed Game", "QuestionCount": 6, "State": "ended"},
            ])
        );
    }

    #[tokio::test]
    async fn test_unbound_methods_not_allowed() {
        let state = test_state(|_| {});
        for method in [Method::POST, Method::PUT, Method::DELETE, Method::HEAD] {
            let resp = send(&state, method.clone(), "/games").await;
            assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED, "{method}");
            assert_eq!(resp.headers()[header::ALLOW], "GET, OPTIONS");
        }
    }

    #[tokio::test]
    async fn test_unknown_path_not_found() {
        let state = test_state(|_| {});
        for uri in ["/", "/games/", "/games/1", "/game"] {
            let resp = send(&state, Method::GET, uri).await;
            assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_options_preflight() {
        let state = test_state(|_| {});
        let resp = send(&state, Method::OPTIONS, "/games").await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(resp.headers()[header::ALLOW], "GET, OPTIONS");
        assert_eq!(resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert!(body_bytes(resp).await.is_empty());
    }

    #[tokio::test]
    async fn test_cors_disabled() {
        let state = test_state(|cfg| cfg.http.enable_cors = false);
        let resp = send(&state, Method::GET, "/games").await;
        assert!(resp
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
    }

    #[tokio::test]
    async fn test_server_header() {
        let state = test_state(|cfg| cfg.http.server_name = "captrivia/test".to_string());
        let resp = send(&state, Method::GET, "/games").await;
        assert_eq!(resp.headers()[header::SERVER], "captrivia/test");
    }

    #[tokio::test]
    async fn test_health_probes() {
        let state = test_state(|_| {});
        for uri in ["/healthz", "/readyz"] {
            let resp = send(&state, Method::GET, uri).await;
            assert_eq!(resp.status(), StatusCode::OK);
            assert_eq!(&body_bytes(resp).await[..], b"ok");
        }

        let state = test_state(|cfg| cfg.routes.health.enabled = false);
        let resp = send(&state, Method::GET, "/healthz").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_body_too_large() {
        let state = test_state(|cfg| cfg.http.max_body_size = 16);
        let req = Request::builder()
            .method(Method::GET)
            .uri("/games")
            .header(header::CONTENT_LENGTH, "17")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let resp = handle_request(req, Arc::clone(&state), peer()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_access_log_enabled() {
        let state = test_state(|cfg| cfg.logging.access_log = true);
        let resp = send(&state, Method::GET, "/games").await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn test_handler_error_becomes_500() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let resp = into_response(Err(ResponseError::Serialize(err)));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_route_table_paths_unique_per_method() {
        for (i, a) in ROUTES.iter().enumerate() {
            for b in &ROUTES[i + 1..] {
                assert!(a.path != b.path || a.method != b.method);
            }
        }
    }
}
