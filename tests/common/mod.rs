//! Shared test helpers
//!
//! Provides a loopback HTTP receiver for exercising outbound webhook
//! delivery without any external service: it captures every request
//! (headers and raw body) and answers with a configured status code.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::any,
    Router,
};
use tokio::sync::Mutex;

/// One captured inbound request
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn body_json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("captured body is JSON")
    }
}

/// A running loopback receiver
pub struct MockReceiver {
    pub addr: SocketAddr,
    pub requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl MockReceiver {
    pub fn url(&self) -> String {
        format!("http://{}/hook", self.addr)
    }

    pub async fn captured(&self) -> Vec<CapturedRequest> {
        self.requests.lock().await.clone()
    }
}

#[derive(Clone)]
struct ReceiverState {
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    status: u16,
}

/// Spawn a receiver answering every request with `status`
pub async fn spawn_receiver(status: u16) -> MockReceiver {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let state = ReceiverState {
        requests: requests.clone(),
        status,
    };

    let app = Router::new()
        .route("/hook", any(capture))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockReceiver { addr, requests }
}

async fn capture(
    State(state): State<ReceiverState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let mut captured_headers = HashMap::new();
    for (name, value) in headers.iter() {
        if let Ok(value) = value.to_str() {
            captured_headers.insert(name.as_str().to_lowercase(), value.to_string());
        }
    }
    state.requests.lock().await.push(CapturedRequest {
        headers: captured_headers,
        body: body.to_vec(),
    });

    let status = StatusCode::from_u16(state.status).unwrap_or(StatusCode::OK);
    (status, "receiver response")
}
