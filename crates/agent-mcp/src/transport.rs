//! JSON-RPC over the MCP HTTP+SSE transport.
//!
//! The client opens a long-lived `GET` with `Accept: text/event-stream`. The
//! server's first event (`endpoint`) names the URL that requests are POSTed
//! to; responses come back as `message` events on the stream and are routed
//! to the waiting caller by request id.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures::StreamExt;
use reqwest::Url;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::{Value, json};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;

use crate::error::{McpError, Result};
use crate::sse::SseDecoder;
use crate::types::{Incoming, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

pub struct SseTransport {
    http: reqwest::Client,
    post_url: Url,
    pending: Pending,
    closed: Arc<AtomicBool>,
    next_id: AtomicU64,
    request_timeout: Duration,
    reader: JoinHandle<()>,
}

impl SseTransport {
    /// Open the event stream and wait for the server to announce its POST endpoint.
    pub async fn connect(
        endpoint: &str,
        handshake_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self> {
        let connect_err = |reason: String| McpError::Connect {
            endpoint: endpoint.to_string(),
            reason,
        };

        let base = Url::parse(endpoint).map_err(|e| connect_err(e.to_string()))?;
        // no overall timeout: it would cut the event stream
        let http = reqwest::Client::builder()
            .connect_timeout(handshake_timeout)
            .build()
            .map_err(|e| connect_err(e.to_string()))?;

        let response = tokio::time::timeout(
            handshake_timeout,
            http.get(base.clone()).header(ACCEPT, "text/event-stream").send(),
        )
        .await
        .map_err(|_| connect_err("timed out opening event stream".into()))?
        .map_err(|e| connect_err(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(connect_err(format!("HTTP {status}")));
        }

        let pending = Pending::default();
        let closed = Arc::new(AtomicBool::new(false));
        let (endpoint_tx, endpoint_rx) = oneshot::channel();
        let reader = tokio::spawn(read_events(
            response,
            base,
            http.clone(),
            pending.clone(),
            closed.clone(),
            endpoint_tx,
        ));

        let post_url = match tokio::time::timeout(handshake_timeout, endpoint_rx).await {
            Ok(Ok(url)) => url,
            Ok(Err(_)) => {
                reader.abort();
                return Err(McpError::Handshake(
                    "event stream ended before the endpoint event".into(),
                ));
            }
            Err(_) => {
                reader.abort();
                return Err(McpError::Handshake(format!(
                    "no endpoint event within {}s",
                    handshake_timeout.as_secs()
                )));
            }
        };

        tracing::debug!(endpoint, post_url = %post_url, "MCP event stream open");

        Ok(Self {
            http,
            post_url,
            pending,
            closed,
            next_id: AtomicU64::new(1),
            request_timeout,
            reader,
        })
    }

    /// Send a request and wait for its result.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let outcome = if self.closed.load(Ordering::Acquire) {
            Err(McpError::Closed)
        } else {
            self.exchange(JsonRpcRequest::new(id, method, params), rx).await
        };

        self.pending.lock().await.remove(&id);
        outcome?.into_result()
    }

    async fn exchange(
        &self,
        request: JsonRpcRequest,
        rx: oneshot::Receiver<JsonRpcResponse>,
    ) -> Result<JsonRpcResponse> {
        let response = self
            .http
            .post(self.post_url.clone())
            .timeout(self.request_timeout)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(McpError::Transport(format!(
                "POST {} returned HTTP {status}",
                request.method
            )));
        }

        // some servers answer inline instead of on the stream
        let inline_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));
        if inline_json {
            let body = response.text().await?;
            if let Ok(Incoming::Response(resp)) = Incoming::parse(&body) {
                if resp.id == request.id {
                    return Ok(resp);
                }
            }
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(_)) => Err(McpError::Closed),
            Err(_) => Err(McpError::Timeout {
                method: request.method,
                secs: self.request_timeout.as_secs(),
            }),
        }
    }

    /// Fire-and-forget notification.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let response = self
            .http
            .post(self.post_url.clone())
            .timeout(self.request_timeout)
            .json(&JsonRpcNotification::new(method, params))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(McpError::Transport(format!("POST {method} returned HTTP {status}")));
        }
        Ok(())
    }

    /// Stop reading the stream and fail every outstanding request.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.reader.abort();
        self.pending.lock().await.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.reader.is_finished()
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_events(
    response: reqwest::Response,
    base: Url,
    http: reqwest::Client,
    pending: Pending,
    closed: Arc<AtomicBool>,
    endpoint_tx: oneshot::Sender<Url>,
) {
    let mut endpoint_tx = Some(endpoint_tx);
    let mut post_url: Option<Url> = None;
    let mut decoder = SseDecoder::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(error = %e, "MCP event stream failed");
                break;
            }
        };

        for event in decoder.push(&chunk) {
            match event.event.as_str() {
                "endpoint" => match base.join(event.data.trim()) {
                    Ok(url) => {
                        post_url = Some(url.clone());
                        if let Some(tx) = endpoint_tx.take() {
                            let _ = tx.send(url);
                        }
                    }
                    Err(e) => tracing::warn!(data = %event.data, error = %e, "Bad endpoint event"),
                },
                "message" => dispatch(&event.data, &pending, &http, post_url.as_ref()).await,
                other => tracing::debug!(event = other, "Ignoring SSE event"),
            }
        }
    }

    tracing::debug!("MCP event stream ended");
    closed.store(true, Ordering::Release);
    pending.lock().await.clear();
}

async fn dispatch(data: &str, pending: &Pending, http: &reqwest::Client, post_url: Option<&Url>) {
    match Incoming::parse(data) {
        Ok(Incoming::Response(resp)) => {
            let waiter = pending.lock().await.remove(&resp.id);
            match waiter {
                Some(tx) => {
                    let _ = tx.send(resp);
                }
                None => tracing::debug!(id = resp.id, "Response for unknown request"),
            }
        }
        Ok(Incoming::Request { id, method }) => {
            let Some(url) = post_url else {
                return;
            };
            let reply = if method == "ping" {
                json!({"jsonrpc": "2.0", "id": id, "result": {}})
            } else {
                json!({"jsonrpc": "2.0", "id": id, "error": {"code": -32601, "message": "Method not found"}})
            };
            if let Err(e) = http.post(url.clone()).json(&reply).send().await {
                tracing::warn!(method, error = %e, "Failed to answer server request");
            }
        }
        Ok(Incoming::Notification { method }) => {
            tracing::debug!(method, "Server notification");
        }
        Err(e) => tracing::warn!(error = %e, "Unparseable MCP message"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockServer;

    async fn open(server: &MockServer) -> SseTransport {
        SseTransport::connect(&server.sse_url(), Duration::from_secs(5), Duration::from_secs(5))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_relative_endpoint_is_resolved() {
        let server = MockServer::start().await;
        let transport = open(&server).await;

        assert_eq!(transport.post_url.path(), "/messages");
        assert_eq!(transport.post_url.query(), Some("session_id=test"));
    }

    #[tokio::test]
    async fn test_request_ids_are_matched() {
        let server = MockServer::start().await;
        let transport = Arc::new(open(&server).await);

        let (a, b) = tokio::join!(
            transport.request("tools/call", Some(json!({"name": "echo", "arguments": {"text": "a"}}))),
            transport.request("tools/call", Some(json!({"name": "echo", "arguments": {"text": "b"}}))),
        );
        assert_eq!(a.unwrap()["content"][0]["text"], "a");
        assert_eq!(b.unwrap()["content"][0]["text"], "b");
        assert!(transport.pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_answers_server_ping() {
        let server = MockServer::start().await;
        let _transport = open(&server).await;

        let answer = server.ping_client().await.unwrap();
        assert_eq!(answer["result"], json!({}));
    }
}
