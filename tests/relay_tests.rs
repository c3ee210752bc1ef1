//! Tests for the image relay and the proxy fetcher, over real sockets
#![cfg(feature = "http")]

use axum::{http::header, routing::get, Router};
use gridfill::fetch::{FetchError, ImageFetcher, ProxyFetcher};
use gridfill::relay::{self, RelayState};
use std::time::Duration;

const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

/// Serve `app` on a random local port, return the base URL
async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Upstream image host with one PNG, one untyped blob and one error route
async fn spawn_upstream() -> String {
    let app = Router::new()
        .route(
            "/photo.png",
            get(|| async { ([(header::CONTENT_TYPE, "image/png")], PNG) }),
        )
        .route("/blob", get(|| async { PNG }))
        .route(
            "/gone",
            get(|| async { (axum::http::StatusCode::NOT_FOUND, "nope") }),
        );
    spawn(app).await
}

async fn spawn_relay() -> String {
    spawn(relay::router(RelayState::new(Duration::from_secs(5)).unwrap())).await
}

#[tokio::test]
async fn test_relay_passes_image_through() {
    let upstream = spawn_upstream().await;
    let relay = spawn_relay().await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/image", relay))
        .query(&[("url", format!("{}/photo.png", upstream))])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/png");
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert_eq!(response.bytes().await.unwrap().as_ref(), PNG);
}

#[tokio::test]
async fn test_relay_root_route_and_fallback_content_type() {
    let upstream = spawn_upstream().await;
    let relay = spawn_relay().await;

    let response = reqwest::Client::new()
        .get(format!("{}/", relay))
        .query(&[("url", format!("{}/blob", upstream))])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/jpeg");
}

#[tokio::test]
async fn test_relay_requires_url() {
    let relay = spawn_relay().await;

    let response = reqwest::get(format!("{}/image", relay)).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    assert!(response.text().await.unwrap().contains("missing url"));
}

#[tokio::test]
async fn test_relay_reports_upstream_failure() {
    let upstream = spawn_upstream().await;
    let relay = spawn_relay().await;

    let response = reqwest::Client::new()
        .get(format!("{}/image", relay))
        .query(&[("url", format!("{}/gone", upstream))])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_proxy_fetcher_through_relay() {
    let upstream = spawn_upstream().await;
    let relay = spawn_relay().await;
    let fetcher = ProxyFetcher::new(format!("{}/image", relay), Duration::from_secs(5)).unwrap();

    let bytes = fetcher
        .fetch(&format!("{}/photo.png", upstream))
        .await
        .unwrap();
    assert_eq!(bytes, PNG);

    let err = fetcher
        .fetch(&format!("{}/gone", upstream))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 502, .. }));
}
