//! Image relay server
//!
//! A stateless byte relay: `GET /image?url=<encoded url>` (or `GET /?url=`)
//! fetches the remote image and returns its bytes with an image content type.
//! Hosts that cannot fetch arbitrary origins go through it.
//!
//! Only available with the `http` feature.
use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

const FALLBACK_CONTENT_TYPE: &str = "image/jpeg";

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("relay server error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct RelayState {
    client: reqwest::Client,
}

impl RelayState {
    pub fn new(timeout: Duration) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(RelayState { client })
    }
}

#[derive(Debug, Deserialize)]
struct ImageQuery {
    url: Option<String>,
}

/// Build the relay router; used by `serve` and integration tests
pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/", get(relay_image))
        .route("/image", get(relay_image))
        .with_state(state)
}

/// Bind `addr` and serve the relay until the process exits
pub async fn serve(addr: SocketAddr, state: RelayState) -> Result<(), RelayError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        "relay listening on http://{}/image?url=<URL>",
        listener.local_addr()?
    );
    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn text_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        ],
        message.to_string(),
    )
        .into_response()
}

async fn relay_image(State(state): State<RelayState>, Query(query): Query<ImageQuery>) -> Response {
    let Some(url) = query.url.filter(|u| !u.trim().is_empty()) else {
        return text_response(StatusCode::BAD_REQUEST, "missing url parameter");
    };

    let upstream = match state.client.get(url.as_str()).send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "upstream fetch failed");
            return text_response(StatusCode::BAD_GATEWAY, "failed to load image");
        }
    };
    if !upstream.status().is_success() {
        tracing::warn!(url = %url, status = upstream.status().as_u16(), "upstream returned an error");
        return text_response(StatusCode::BAD_GATEWAY, "failed to load image");
    }

    let content_type = upstream
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|ct| ct.starts_with("image/"))
        .unwrap_or(FALLBACK_CONTENT_TYPE)
        .to_string();

    let bytes = match upstream.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "upstream body failed");
            return text_response(StatusCode::BAD_GATEWAY, "failed to load image");
        }
    };
    tracing::debug!(url = %url, bytes = bytes.len(), "relayed image");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .body(Body::from(bytes))
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "invalid relay response");
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to load image")
        })
}
