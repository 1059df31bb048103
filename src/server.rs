//! HTTP surface
//!
//! - `POST /traffic` routes one inbound message
//! - `POST /wip` assembles a client's work-in-progress report
//! - `GET /health` liveness and build info
//! - `GET /metrics` process-wide counters

use serde::Serialize;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::{Filter, Rejection, Reply};

use crate::error::{ErrorBody, TrafficError};
use crate::model::InboundMessage;
use crate::observability::metrics::metrics;
use crate::response::TrafficResponse;
use crate::routing::TrafficRouter;
use crate::wip::{WipReporter, WipRequest};

/// Largest accepted request body
const MAX_BODY_BYTES: u64 = 1024 * 1024;

/// Shared per-process state handed to every request
pub struct AppState {
    pub service_name: String,
    pub router: TrafficRouter,
    pub wip: WipReporter,
}

impl AppState {
    pub fn new(service_name: impl Into<String>, router: TrafficRouter, wip: WipReporter) -> Self {
        Self {
            service_name: service_name.into(),
            router,
            wip,
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: String,
    version: &'static str,
}

/// All routes, ready for `warp::serve` or `warp::test`
pub fn routes(
    state: Arc<AppState>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let with_state = warp::any().map(move || state.clone());

    let traffic = warp::path("traffic")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::bytes())
        .and(with_state.clone())
        .and_then(handle_traffic);

    let wip = warp::path("wip")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::bytes())
        .and(with_state.clone())
        .and_then(handle_wip);

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state)
        .map(|state: Arc<AppState>| {
            warp::reply::json(&HealthResponse {
                status: "healthy",
                service: state.service_name.clone(),
                version: env!("CARGO_PKG_VERSION"),
            })
        });

    let metrics_route = warp::path("metrics")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| warp::reply::json(&metrics().get_metrics()));

    traffic
        .or(wip)
        .or(health)
        .or(metrics_route)
        .with(
            warp::cors()
                .allow_any_origin()
                .allow_methods(vec!["GET", "POST"])
                .allow_header("content-type"),
        )
        .recover(handle_rejection)
}

async fn handle_traffic(body: Bytes, state: Arc<AppState>) -> Result<impl Reply, Infallible> {
    let message: InboundMessage = match serde_json::from_slice(&body) {
        Ok(message) => message,
        Err(e) => {
            metrics().validation_rejected();
            warn!(error = %e, "Rejected unparseable request body");
            let error = if body.iter().all(u8::is_ascii_whitespace) {
                TrafficError::validation("No content provided")
            } else {
                TrafficError::validation(format!("Invalid request body: {e}"))
            };
            return Ok(error_reply(&error));
        }
    };

    match state.router.route(&message).await {
        Ok(decision) => {
            let response = TrafficResponse::from_decision(&decision, &message);
            Ok(warp::reply::with_status(
                warp::reply::json(&response),
                StatusCode::OK,
            ))
        }
        Err(e) => {
            warn!(error = %e, "Routing failed");
            Ok(error_reply(&e))
        }
    }
}

async fn handle_wip(body: Bytes, state: Arc<AppState>) -> Result<impl Reply, Infallible> {
    let request: WipRequest = if body.iter().all(u8::is_ascii_whitespace) {
        WipRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(e) => {
                metrics().validation_rejected();
                warn!(error = %e, "Rejected unparseable WIP request");
                let error = TrafficError::validation(format!("Invalid request body: {e}"));
                return Ok(error_reply(&error));
            }
        }
    };

    match state.wip.report(&request).await {
        Ok(report) => Ok(warp::reply::with_status(
            warp::reply::json(&report),
            StatusCode::OK,
        )),
        Err(e) => {
            warn!(error = %e, "WIP report failed");
            Ok(error_reply(&e))
        }
    }
}

fn error_reply(error: &TrafficError) -> warp::reply::WithStatus<warp::reply::Json> {
    let (status, body) = error.to_error_body();
    warp::reply::with_status(
        warp::reply::json(&body),
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
    )
}

async fn handle_rejection(rejection: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found")
    } else if rejection
        .find::<warp::reject::PayloadTooLarge>()
        .is_some()
    {
        (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
    } else if rejection
        .find::<warp::reject::MethodNotAllowed>()
        .is_some()
    {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    } else {
        (StatusCode::BAD_REQUEST, "Bad request")
    };

    let body = ErrorBody {
        error: message.to_string(),
        details: None,
        raw_response: None,
        client_code: None,
    };
    Ok(warp::reply::with_status(warp::reply::json(&body), status))
}

/// Serve until `shutdown` completes
pub async fn serve<F>(
    state: Arc<AppState>,
    addr: SocketAddr,
    shutdown: F,
) -> Result<(), warp::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (bound, server) =
        warp::serve(routes(state)).try_bind_with_graceful_shutdown(addr, shutdown)?;
    info!(address = %bound, "Traffic service listening");
    server.await;
    info!("Traffic service stopped");
    Ok(())
}
