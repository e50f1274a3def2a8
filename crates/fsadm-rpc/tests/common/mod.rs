//! Shared helpers for fsadm-rpc integration tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use fsadm_rpc::tcp::{read_message, write_message};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

static TRACING: Once = Once::new();

/// Installs a test-friendly tracing subscriber once per test binary.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AddRequest {
    pub a: u64,
    pub b: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AddResponse {
    pub sum: u64,
    pub served_by: String,
}

/// Starts a server answering `AddRequest`s until the process exits.
pub async fn spawn_adder(name: &str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let name = name.to_string();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let name = name.clone();
            tokio::spawn(async move {
                while let Ok(req) = read_message::<_, AddRequest>(&mut stream).await {
                    let resp = AddResponse {
                        sum: req.a + req.b,
                        served_by: name.clone(),
                    };
                    if write_message(&mut stream, &resp).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    addr
}

/// Like [`spawn_adder`], but the very first request the server receives is
/// answered only after `delay`. Later requests, on any connection, are
/// answered at once.
pub async fn spawn_slow_first_adder(name: &str, delay: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let name = name.to_string();
    let delayed = Arc::new(AtomicBool::new(false));
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let name = name.clone();
            let delayed = Arc::clone(&delayed);
            tokio::spawn(async move {
                while let Ok(req) = read_message::<_, AddRequest>(&mut stream).await {
                    if !delayed.swap(true, Ordering::SeqCst) {
                        tokio::time::sleep(delay).await;
                    }
                    let resp = AddResponse {
                        sum: req.a + req.b,
                        served_by: name.clone(),
                    };
                    if write_message(&mut stream, &resp).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    addr
}

/// Returns an address nothing listens on.
pub async fn dead_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);
    addr
}
