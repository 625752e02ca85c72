//! Tests for the HTTP sidecar client against a throwaway axum server

use super::*;
use axum::{extract::State, routing::get, Router};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Fake sidecar admin interface
///
/// - GET /ready → 200
/// - GET /starting → 503
/// - GET /slow → 200 after 2s
/// - POST /quitquitquit → 200, counted
async fn start_fake_sidecar() -> (u16, Arc<AtomicUsize>, tokio::task::JoinHandle<()>) {
    let quits = Arc::new(AtomicUsize::new(0));

    let app = Router::new()
        .route("/ready", get(|| async { StatusCode::OK }))
        .route("/starting", get(|| async { StatusCode::SERVICE_UNAVAILABLE }))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                StatusCode::OK
            }),
        )
        .route(
            "/quitquitquit",
            axum::routing::post(|State(quits): State<Arc<AtomicUsize>>| async move {
                quits.fetch_add(1, Ordering::SeqCst);
                "OK"
            }),
        )
        .with_state(quits.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (port, quits, handle)
}

fn sidecar_config(port: u16, timeout: Duration) -> SidecarConfig {
    SidecarConfig {
        host: "http://127.0.0.1".to_string(),
        ready_port: port,
        quit_port: port,
        ready_path: "/ready".to_string(),
        quit_path: "/quitquitquit".to_string(),
        http_timeout: timeout,
    }
}

#[tokio::test]
async fn test_ready_endpoint_200_is_success() {
    let (port, _, server) = start_fake_sidecar().await;
    let config = sidecar_config(port, Duration::from_secs(5));
    let client = HttpSidecarClient::new(&config).unwrap();

    let result = probe_ready(&client, &config).await;

    assert!(result.is_ok(), "200 should be success, got {:?}", result);
    server.abort();
}

#[tokio::test]
async fn test_non_200_carries_status_code() {
    let (port, _, server) = start_fake_sidecar().await;
    let config = sidecar_config(port, Duration::from_secs(5));
    let client = HttpSidecarClient::new(&config).unwrap();

    let result = client.invoke(Method::GET, port, "/starting").await;

    match result {
        Err(SidecarError::UnexpectedStatus { status, method, .. }) => {
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
            assert_eq!(method, Method::GET);
        }
        other => panic!("expected UnexpectedStatus, got {:?}", other),
    }
    server.abort();
}

#[tokio::test]
async fn test_unknown_path_is_not_success() {
    let (port, _, server) = start_fake_sidecar().await;
    let config = sidecar_config(port, Duration::from_secs(5));
    let client = HttpSidecarClient::new(&config).unwrap();

    let result = client.invoke(Method::GET, port, "/nope").await;

    assert!(matches!(
        result,
        Err(SidecarError::UnexpectedStatus {
            status: StatusCode::NOT_FOUND,
            ..
        })
    ));
    server.abort();
}

#[tokio::test]
async fn test_quit_posts_once() {
    let (port, quits, server) = start_fake_sidecar().await;
    let config = sidecar_config(port, Duration::from_secs(5));
    let client = HttpSidecarClient::new(&config).unwrap();

    quit(&client, &config).await.unwrap();

    assert_eq!(quits.load(Ordering::SeqCst), 1);
    server.abort();
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    // Grab a free port, then release it so nothing is listening
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = sidecar_config(port, Duration::from_secs(1));
    let client = HttpSidecarClient::new(&config).unwrap();

    let result = probe_ready(&client, &config).await;

    assert!(matches!(result, Err(SidecarError::Transport { .. })));
}

#[tokio::test]
async fn test_timeout_is_transport_error() {
    let (port, _, server) = start_fake_sidecar().await;
    let config = sidecar_config(port, Duration::from_millis(100));
    let client = HttpSidecarClient::new(&config).unwrap();

    let result = client.invoke(Method::GET, port, "/slow").await;

    match result {
        Err(SidecarError::Transport { message, .. }) => {
            assert_eq!(message, "request timed out");
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    server.abort();
}

#[tokio::test]
async fn test_mock_sidecar_replays_script_then_succeeds() {
    let mock = MockSidecar::scripted(vec![Err(StatusCode::SERVICE_UNAVAILABLE)]);
    let config = sidecar_config(18000, Duration::from_secs(1));

    assert!(probe_ready(&mock, &config).await.is_err());
    assert!(probe_ready(&mock, &config).await.is_ok());
    assert_eq!(mock.count(&Method::GET), 2);
    assert_eq!(
        mock.calls()[0],
        (Method::GET, 18000, "/ready".to_string())
    );
}
