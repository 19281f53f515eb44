//! In-process MCP server speaking the HTTP+SSE transport, for tests.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use serde_json::{Value, json};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

#[derive(Clone, Default)]
struct MockState {
    stream: Arc<Mutex<Option<mpsc::Sender<Event>>>>,
    received: Arc<Mutex<Vec<Value>>>,
}

pub struct MockServer {
    addr: SocketAddr,
    state: MockState,
    handle: JoinHandle<()>,
}

impl MockServer {
    pub async fn start() -> Self {
        let state = MockState::default();
        let app = Router::new()
            .route("/sse", get(open_stream))
            .route("/messages", post(receive))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn sse_url(&self) -> String {
        format!("http://{}/sse", self.addr)
    }

    pub async fn saw_method(&self, method: &str) -> bool {
        self.state
            .received
            .lock()
            .await
            .iter()
            .any(|m| m["method"] == method)
    }

    /// Send a server-initiated `ping` and wait for the client's answer.
    pub async fn ping_client(&self) -> Option<Value> {
        self.push(json!({"jsonrpc": "2.0", "id": "srv-1", "method": "ping"}))
            .await;

        for _ in 0..50 {
            let answer = self
                .state
                .received
                .lock()
                .await
                .iter()
                .find(|m| m["id"] == "srv-1")
                .cloned();
            if answer.is_some() {
                return answer;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        None
    }

    async fn push(&self, message: Value) {
        push(&self.state, &message).await;
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn push(state: &MockState, message: &Value) {
    if let Some(tx) = state.stream.lock().await.as_ref() {
        let _ = tx
            .send(Event::default().event("message").data(message.to_string()))
            .await;
    }
}

async fn open_stream(
    State(state): State<MockState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel(32);
    let _ = tx
        .send(Event::default().event("endpoint").data("/messages?session_id=test"))
        .await;
    *state.stream.lock().await = Some(tx);
    Sse::new(ReceiverStream::new(rx).map(Ok))
}

async fn receive(State(state): State<MockState>, Json(message): Json<Value>) -> StatusCode {
    state.received.lock().await.push(message.clone());

    let (Some(id), Some(method)) = (message.get("id").cloned(), message["method"].as_str())
    else {
        return StatusCode::ACCEPTED;
    };

    let params = &message["params"];
    let result = match method {
        "initialize" => json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {"tools": {}},
            "serverInfo": {"name": "mock-mcp", "version": "0.0.1"}
        }),
        "tools/list" if params["cursor"] == "page-2" => json!({
            "tools": [{"name": "explode", "description": "Always fails", "inputSchema": {"type": "object"}}]
        }),
        "tools/list" => json!({
            "tools": [{
                "name": "echo",
                "description": "Echo text back",
                "inputSchema": {
                    "type": "object",
                    "properties": {"text": {"type": "string", "description": "Text to echo"}},
                    "required": ["text"]
                }
            }],
            "nextCursor": "page-2"
        }),
        "tools/call" if params["name"] == "echo" => json!({
            "content": [{"type": "text", "text": params["arguments"]["text"]}],
            "isError": false
        }),
        "tools/call" => json!({
            "content": [{"type": "text", "text": "boom"}],
            "isError": true
        }),
        _ => {
            let error = json!({"jsonrpc": "2.0", "id": id, "error": {"code": -32601, "message": "Method not found"}});
            push(&state, &error).await;
            return StatusCode::ACCEPTED;
        }
    };

    push(&state, &json!({"jsonrpc": "2.0", "id": id, "result": result})).await;
    StatusCode::ACCEPTED
}
