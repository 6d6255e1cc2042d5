//! Serve over a real socket and shut down gracefully.

use std::sync::Arc;

use axum::Router;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use envelope_pipeline::{HttpServer, Pipeline};

mod common;

#[tokio::test]
async fn test_serves_envelope_over_tcp() {
    let config = common::test_config(false);
    let pipeline = Arc::new(Pipeline::from_config(&config).unwrap());
    let routes = Router::new().route(
        "/api/1/ping",
        pipeline.endpoint(|ctx| ctx.envelope().payload("pong")),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        HttpServer::new(config, routes)
            .run_until(listener, async {
                let _ = stop_rx.await;
            })
            .await
    });

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /api/1/ping HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();

    assert!(raw.starts_with("HTTP/1.1 200 OK"));
    let lower = raw.to_ascii_lowercase();
    assert!(lower.contains("set-cookie: session_cookie="));
    assert!(lower.contains("x-request-id: "));
    assert!(raw.contains(r#"{"meta":{"ise":false,"errors":[],"warns":[]},"payload":"pong"}"#));

    stop_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
}
