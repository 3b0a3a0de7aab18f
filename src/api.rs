//! HTTP API.
//!
//! - `GET /api/peering?asn=N`: peering report for AS N
//! - `GET /api/peering`: the list of known ISPs, no upstream calls
//! - `GET /health`
//!
//! Every `/api` response is wrapped in `{ "success": bool, "data"?: ..., "error"?: ... }`.
use crate::{parse_asn, PeerLens, PeerLensError};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::any::Any;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tracing::{error, info, warn};

/// Response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn err(error: impl ToString) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PeeringQuery {
    pub asn: Option<String>,
}

/// HTTP status for a failed report request.
pub fn error_status(err: &PeerLensError) -> StatusCode {
    match err {
        PeerLensError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        PeerLensError::NetworkError(_) | PeerLensError::UpstreamUnavailable { .. } => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: PeerLensError) -> Response {
    let status = error_status(&err);
    match status.is_client_error() {
        true => warn!("rejected request: {}", err),
        false => error!("report request failed: {}", err),
    }
    (status, Json(ApiResponse::err(err))).into_response()
}

async fn peering_handler(
    State(lens): State<PeerLens>,
    query: Result<Query<PeeringQuery>, QueryRejection>,
) -> Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            return error_response(PeerLensError::InvalidInput(rejection.body_text()))
        }
    };
    let Some(raw_asn) = query.asn else {
        return Json(ApiResponse::ok(lens.known_isps())).into_response();
    };

    let asn = match parse_asn(raw_asn.as_str()) {
        Ok(asn) => asn,
        Err(e) => return error_response(e),
    };

    match lens.report(asn).await {
        Ok(response) => Json(ApiResponse::ok(response)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn health_handler() -> &'static str {
    "OK"
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let details = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    error!("request handler panicked: {}", details);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::err("internal server error")),
    )
        .into_response()
}

/// Create the API router around a shared [PeerLens].
pub fn create_router(lens: PeerLens) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AnyOrigin)
        .allow_methods(AnyOrigin)
        .allow_headers(AnyOrigin);

    Router::new()
        .route("/api/peering", get(peering_handler))
        .route("/health", get(health_handler))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(cors)
        .with_state(lens)
}

pub async fn start_api_service(lens: PeerLens, host: &str, port: u16) -> Result<(), PeerLensError> {
    let app = create_router(lens);
    let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port)).await?;
    info!("starting API service on {}:{}", host, port);
    axum::serve(listener, app).await?;
    Ok(())
}
