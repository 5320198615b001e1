//! HTTP view answering framed calls for one route.

use std::time::Duration;

use avro_rpc::Route;
use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::{debug, error, warn};

/// Content type of framed replies.
pub const AVRO_CONTENT_TYPE: &str = "avro/binary";

#[derive(Clone)]
pub(crate) struct ViewState {
    pub(crate) route: Route,
    pub(crate) body_limit: usize,
    pub(crate) read_timeout: Duration,
}

pub(crate) async fn handle_call(State(state): State<ViewState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    if content_length(&parts.headers) == 0 {
        warn!("Rejecting call to '{}' without content", state.route.name());
        return StatusCode::BAD_REQUEST.into_response();
    }

    let body = match read_body(body, &state).await {
        Ok(body) => body,
        Err(status) => return status.into_response(),
    };
    if body.is_empty() {
        warn!("Rejecting call to '{}' with an empty body", state.route.name());
        return StatusCode::BAD_REQUEST.into_response();
    }

    match state.route.handle(&body).await {
        Ok(reply) => {
            debug!("Finished call to '{}'", state.route.name());
            ([(header::CONTENT_TYPE, AVRO_CONTENT_TYPE)], reply).into_response()
        }
        Err(e) if e.is_client_error() => {
            warn!("Failed to process call to '{}': {}", state.route.name(), e);
            StatusCode::BAD_REQUEST.into_response()
        }
        Err(e) => {
            error!("Error processing call to '{}': {}", state.route.name(), e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub(crate) async fn method_not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

fn content_length(headers: &HeaderMap) -> u64 {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(0)
}

async fn read_body(body: Body, state: &ViewState) -> Result<bytes::Bytes, StatusCode> {
    match tokio::time::timeout(state.read_timeout, to_bytes(body, state.body_limit)).await {
        Ok(Ok(body)) => Ok(body),
        Ok(Err(e)) => {
            warn!("Failed to read call to '{}': {}", state.route.name(), e);
            Err(StatusCode::BAD_REQUEST)
        }
        Err(_) => {
            warn!("Timed out reading call to '{}'", state.route.name());
            Err(StatusCode::REQUEST_TIMEOUT)
        }
    }
}
