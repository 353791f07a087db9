//! Shared utilities for integration testing.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use stock_service::config::ServiceConfig;
use stock_service::lifecycle::{startup, Shutdown};

/// Canned `TIME_SERIES_DAILY` payload with three trading days.
#[allow(dead_code)]
pub const DAILY_SERIES: &str = r#"{
    "Meta Data": {"2. Symbol": "MSFT"},
    "Time Series (Daily)": {
        "2024-01-19": {"1. open": "412.00", "4. close": "416.85"},
        "2024-01-18": {"1. open": "411.00", "4. close": "420.12"},
        "2024-01-17": {"1. open": "410.00", "4. close": "412.89"}
    }
}"#;

/// Start a programmable mock upstream on an ephemeral port.
///
/// `f` receives the request target (path and query) and returns the status
/// and JSON body to send back.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let target = read_request_target(&mut socket).await;
                        let (status, body) = f(target).await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            429 => "429 Too Many Requests",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Read until the end of the request head and return the request target.
async fn read_request_target(socket: &mut tokio::net::TcpStream) -> String {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    String::from_utf8_lossy(&head)
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or_default()
        .to_string()
}

/// Config pointing the service at `upstream`, metrics off, sweeper off.
#[allow(dead_code)]
pub fn service_config(upstream: SocketAddr) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.upstream.base_url = format!("http://{}/query", upstream);
    config.upstream.api_key = "test-key".to_string();
    config.upstream.timeout_secs = 2;
    config.cache.sweep_interval_secs = 0;
    config.observability.metrics_enabled = false;
    config
}

/// Run the full service on an ephemeral port.
pub async fn start_service(config: ServiceConfig) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = startup::build_state(&config, None).unwrap();
    let shutdown = Shutdown::new();

    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        startup::serve(&config, listener, state, &server_shutdown).await.unwrap();
    });

    (addr, shutdown)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
