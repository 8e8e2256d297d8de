use std::future::Future;
use std::net::SocketAddr;

use serde::Serialize;
use tokio::sync::watch;
use warp::Filter;

use crate::application::services::BridgeStatus;

use super::PrometheusReporter;

/// Health check response structure
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    bridge: Option<BridgeStatus>,
}

fn health(bridge: Option<BridgeStatus>) -> HealthResponse {
    let status = match &bridge {
        Some(bridge) if !bridge.connected => "degraded",
        _ => "healthy",
    };
    HealthResponse {
        status,
        service: "reality-relay",
        version: env!("CARGO_PKG_VERSION"),
        bridge,
    }
}

/// `/metrics`, `/health` and `/livez` routes
pub fn routes(
    bridge: Option<watch::Receiver<BridgeStatus>>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "OPTIONS"])
        .allow_headers(vec!["Content-Type"]);

    let metrics_route = warp::path("metrics").map(|| {
        let body = PrometheusReporter::gather_metrics();
        warp::reply::with_header(body, "content-type", "text/plain; version=0.0.4; charset=utf-8")
    });

    let health_route = warp::path("health").map(move || {
        let snapshot = bridge.as_ref().map(|status| status.borrow().clone());
        warp::reply::json(&health(snapshot))
    });

    // Liveness probe: is the process running?
    let liveness_route =
        warp::path("livez").map(|| warp::reply::with_status("OK", warp::http::StatusCode::OK));

    metrics_route.or(health_route).or(liveness_route).with(cors)
}

/// Serve the metrics routes until `shutdown` resolves
pub fn serve_metrics<F>(
    port: u16,
    bridge: Option<watch::Receiver<BridgeStatus>>,
    shutdown: F,
) -> (SocketAddr, impl Future<Output = ()>)
where
    F: Future<Output = ()> + Send + 'static,
{
    let (addr, server) =
        warp::serve(routes(bridge)).bind_with_graceful_shutdown(([0, 0, 0, 0], port), shutdown);
    tracing::info!("Metrics server listening on http://{}", addr);
    (addr, server)
}
