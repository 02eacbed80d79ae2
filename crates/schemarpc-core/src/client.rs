//! TCP client stub.
//!
//! Turns a method name and a request value into one network call. Method
//! names are checked against the locally loaded schema before any
//! connection is made.
//!
//! # Thread Safety
//!
//! `RpcClient` is `Send + Sync` and can be shared between tasks. Every
//! in-flight call owns its connection, so concurrent calls never share a
//! stream. With `reuse_connection` enabled one idle connection is parked in
//! a tokio `Mutex` between calls.

use crate::config::ClientConfig;
use crate::error::{Result, RpcError};
use crate::message::{from_message, to_partial_message, Message};
use crate::method::UnaryMethod;
use crate::protocol::{read_frame, write_frame, RequestFrame, ResponseFrame};
use crate::schema::{MethodDescriptor, SchemaSet};
use crate::transport::{self, Address};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

/// Where a call is in its lifecycle.
///
/// `Idle → Connecting → AwaitingResponse → Completed`, with `Failed`
/// reachable from `Connecting` and `AwaitingResponse`. Terminal states are
/// never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    Connecting,
    AwaitingResponse,
    Completed,
    Failed,
}

impl CallState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Completed | CallState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallState::Idle => "idle",
            CallState::Connecting => "connecting",
            CallState::AwaitingResponse => "awaiting-response",
            CallState::Completed => "completed",
            CallState::Failed => "failed",
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client bound to one server address and one schema.
#[derive(Debug)]
pub struct RpcClient {
    address: Address,
    schema: Arc<SchemaSet>,
    config: ClientConfig,
    next_id: AtomicU64,
    idle: Mutex<Option<TcpStream>>,
}

impl RpcClient {
    pub fn new(address: Address, schema: Arc<SchemaSet>) -> Self {
        Self::with_config(address, schema, ClientConfig::default())
    }

    pub fn with_config(address: Address, schema: Arc<SchemaSet>, config: ClientConfig) -> Self {
        Self {
            address,
            schema,
            config,
            next_id: AtomicU64::new(1),
            idle: Mutex::new(None),
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn schema(&self) -> &Arc<SchemaSet> {
        &self.schema
    }

    /// Build a call without touching the network.
    ///
    /// Fails with `UnknownMethod` if the schema does not declare the method
    /// and with `Validation` if `request` does not fit the request shape.
    pub fn prepare(&self, service: &str, method: &str, request: &Message) -> Result<UnaryCall<'_>> {
        let descriptor = self.schema.method(service, method)?.clone();
        let payload = descriptor.request.encode(request)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        Ok(UnaryCall {
            client: self,
            descriptor,
            id,
            payload,
            state: CallState::Idle,
        })
    }

    /// Call a method and wait for its response.
    pub async fn call(&self, service: &str, method: &str, request: &Message) -> Result<Message> {
        let mut call = self.prepare(service, method, request)?;
        call.invoke().await
    }

    /// Call a method described at compile time.
    pub async fn call_typed<M: UnaryMethod>(&self, request: &M::Request) -> Result<M::Response> {
        let descriptor = self.schema.method(M::SERVICE, M::METHOD)?.clone();
        let message = to_partial_message(&descriptor.request, request)?;
        let response = self.call(M::SERVICE, M::METHOD, &message).await?;
        from_message(&descriptor.response, &response)
    }

    async fn acquire(&self) -> Result<TcpStream> {
        if self.config.reuse_connection {
            if let Some(stream) = self.idle.lock().await.take() {
                debug!("Reusing connection to {}", self.address);
                return Ok(stream);
            }
        }
        transport::connect(&self.address).await
    }

    async fn release(&self, stream: TcpStream) {
        if !self.config.reuse_connection {
            return;
        }
        let mut idle = self.idle.lock().await;
        if idle.is_none() {
            *idle = Some(stream);
        }
    }
}

/// One unary call, from preparation to its terminal state.
#[derive(Debug)]
pub struct UnaryCall<'a> {
    client: &'a RpcClient,
    descriptor: MethodDescriptor,
    id: u64,
    payload: serde_json::Value,
    state: CallState,
}

impl UnaryCall<'_> {
    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.descriptor
    }

    /// Run the call to completion.
    ///
    /// A call runs at most once; invoking it again is refused. Dropping the
    /// returned future closes the connection the call was using.
    pub async fn invoke(&mut self) -> Result<Message> {
        if self.state != CallState::Idle {
            return Err(RpcError::Validation {
                field: "call".to_string(),
                message: format!("call {} is already {}", self.id, self.state),
            });
        }

        let outcome = match self.client.config.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.exchange()).await {
                Ok(result) => result,
                Err(_) => Err(RpcError::Timeout(limit)),
            },
            None => self.exchange().await,
        };

        match &outcome {
            Ok(_) => self.transition(CallState::Completed),
            Err(e) => {
                debug!("Call {} to {} failed: {}", self.id, self.descriptor.key(), e);
                self.transition(CallState::Failed);
            }
        }
        outcome
    }

    async fn exchange(&mut self) -> Result<Message> {
        self.transition(CallState::Connecting);
        let mut stream = self.client.acquire().await?;

        let request = RequestFrame::new(
            self.id,
            &self.descriptor.service,
            &self.descriptor.name,
            self.payload.clone(),
        );
        let request_bytes = serde_json::to_vec(&request)?;

        write_frame(&mut stream, &request_bytes)
            .await
            .map_err(|e| connection_lost(e, "sending request"))?;
        self.transition(CallState::AwaitingResponse);

        let response_bytes = read_frame(&mut stream)
            .await
            .map_err(|e| connection_lost(e, "reading response"))?
            .ok_or_else(|| RpcError::Transport {
                message: format!(
                    "Connection to {} closed before a response arrived",
                    self.client.address
                ),
                source: None,
            })?;

        let response: ResponseFrame =
            serde_json::from_slice(&response_bytes).map_err(|e| RpcError::Decode {
                message: format!("Failed to parse response: {}", e),
            })?;

        if let Some(id) = response.id {
            if id != self.id {
                return Err(RpcError::Decode {
                    message: format!("Response id {} does not match request id {}", id, self.id),
                });
            }
        }

        // A complete frame leaves the connection usable, whatever it says.
        self.client.release(stream).await;

        let result = response.into_result()?;
        self.descriptor.response.decode(&result)
    }

    fn transition(&mut self, next: CallState) {
        debug!(
            "Call {} to {}: {} -> {}",
            self.id,
            self.descriptor.key(),
            self.state,
            next
        );
        self.state = next;
    }
}

fn connection_lost(err: RpcError, context: &str) -> RpcError {
    match err {
        RpcError::Io {
            source: Some(source),
            ..
        } => RpcError::transport(format!("Connection lost while {}", context), source),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::HandlerRegistry;
    use crate::server::{RpcServer, RpcServerHandle};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::net::TcpListener;

    const SCHEMA: &str = r#"{
        "messages": [
            { "name": "AddRequest", "fields": [
                { "name": "a", "type": "integer" },
                { "name": "b", "type": "integer" }
            ]},
            { "name": "AddReply", "fields": [{ "name": "sum", "type": "integer" }] },
            { "name": "Empty" }
        ],
        "services": [{ "name": "Calc", "methods": [
            { "name": "Add", "request": "AddRequest", "response": "AddReply" },
            { "name": "Ping", "request": "Empty", "response": "Empty" },
            { "name": "Slow", "request": "Empty", "response": "Empty" },
            { "name": "Divide", "request": "AddRequest", "response": "AddReply" }
        ]}]
    }"#;

    fn schema() -> Arc<SchemaSet> {
        Arc::new(SchemaSet::from_json(SCHEMA).unwrap())
    }

    async fn start_server() -> RpcServerHandle {
        let mut registry = HandlerRegistry::new(schema());
        registry
            .register("Calc", "Add", |req: Message| -> Result<Message> {
                let sum = req.get_i64("a").unwrap_or(0) + req.get_i64("b").unwrap_or(0);
                Ok(Message::new().with("sum", sum))
            })
            .unwrap();
        registry
            .register("Calc", "Ping", |_req: Message| -> Result<Message> { Ok(Message::new()) })
            .unwrap();
        registry
            .register("Calc", "Slow", |_req: Message| -> Result<Message> {
                std::thread::sleep(Duration::from_millis(500));
                Ok(Message::new())
            })
            .unwrap();
        RpcServer::bind(&Address::new("127.0.0.1", 0), Arc::new(registry))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_client_call_success() {
        let mut handle = start_server().await;
        let client = RpcClient::new(handle.local_address(), schema());

        let reply = client
            .call("Calc", "Add", &Message::new().with("a", 3i64).with("b", 4i64))
            .await
            .unwrap();
        assert_eq!(reply.get_i64("sum"), Some(7));

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_client_call_unimplemented_returns_remote_error() {
        let mut handle = start_server().await;
        let client = RpcClient::new(handle.local_address(), schema());

        let result = client.call("Calc", "Divide", &Message::new()).await;
        match result {
            Err(RpcError::Remote { code, message }) => {
                assert_eq!(code, -32601);
                assert!(message.contains("Calc/Divide"));
            }
            other => panic!("Expected Remote, got: {:?}", other),
        }

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_client_connect_to_dead_server_returns_transport_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = RpcClient::new(Address::new("127.0.0.1", port), schema());

        let mut call = client.prepare("Calc", "Ping", &Message::new()).unwrap();
        let result = call.invoke().await;

        assert!(matches!(result, Err(RpcError::Transport { .. })));
        assert_eq!(call.state(), CallState::Failed);
    }

    #[tokio::test]
    async fn test_unknown_method_fails_before_connecting() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = RpcClient::new(Address::from(listener.local_addr().unwrap()), schema());

        let result = client.call("Calc", "Multiply", &Message::new()).await;
        assert!(matches!(result, Err(RpcError::UnknownMethod { .. })));

        let accepted = tokio::time::timeout(Duration::from_millis(100), listener.accept()).await;
        assert!(accepted.is_err(), "no connection should have been attempted");
    }

    #[tokio::test]
    async fn test_invalid_request_value_fails_before_connecting() {
        let client = RpcClient::new(Address::new("127.0.0.1", 1), schema());
        let result = client.prepare("Calc", "Add", &Message::new().with("a", "three"));
        assert!(matches!(result, Err(RpcError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_call_state_transitions() {
        let mut handle = start_server().await;
        let client = RpcClient::new(handle.local_address(), schema());

        let mut call = client.prepare("Calc", "Ping", &Message::new()).unwrap();
        assert_eq!(call.state(), CallState::Idle);

        call.invoke().await.unwrap();
        assert_eq!(call.state(), CallState::Completed);

        // Terminal states are never re-entered.
        assert!(matches!(
            call.invoke().await,
            Err(RpcError::Validation { .. })
        ));
        assert_eq!(call.state(), CallState::Completed);

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_call_ids_increase() {
        let client = RpcClient::new(Address::new("localhost", 1), schema());
        let first = client.prepare("Calc", "Ping", &Message::new()).unwrap();
        let second = client.prepare("Calc", "Ping", &Message::new()).unwrap();
        assert!(second.id() > first.id());
    }

    #[tokio::test]
    async fn test_timeout_fails_call() {
        let mut handle = start_server().await;
        let config = ClientConfig::default().with_timeout(Duration::from_millis(50));
        let client = RpcClient::with_config(handle.local_address(), schema(), config);

        let mut call = client.prepare("Calc", "Slow", &Message::new()).unwrap();
        let result = call.invoke().await;

        assert!(matches!(result, Err(RpcError::Timeout(_))));
        assert_eq!(call.state(), CallState::Failed);

        handle.shutdown();
    }

    /// Minimal peer that answers every frame with `reply(request)` and
    /// counts accepted connections.
    async fn fake_server<F>(reply: F) -> (Address, Arc<AtomicUsize>)
    where
        F: Fn(RequestFrame) -> Option<ResponseFrame> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = Address::from(listener.local_addr().unwrap());
        let accepted = Arc::new(AtomicUsize::new(0));
        let reply = Arc::new(reply);

        let counter = accepted.clone();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let reply = reply.clone();
                tokio::spawn(async move {
                    while let Ok(Some(frame)) = read_frame(&mut stream).await {
                        let request: RequestFrame = serde_json::from_slice(&frame).unwrap();
                        match (*reply)(request) {
                            Some(response) => {
                                let bytes = serde_json::to_vec(&response).unwrap();
                                write_frame(&mut stream, &bytes).await.unwrap();
                            }
                            None => return,
                        }
                    }
                });
            }
        });

        (address, accepted)
    }

    #[tokio::test]
    async fn test_connection_reuse() {
        let (address, accepted) =
            fake_server(|req| Some(ResponseFrame::success(Some(req.id), serde_json::json!({})))).await;

        let config = ClientConfig::default().with_reuse_connection(true);
        let client = RpcClient::with_config(address, schema(), config);
        client.call("Calc", "Ping", &Message::new()).await.unwrap();
        client.call("Calc", "Ping", &Message::new()).await.unwrap();

        assert_eq!(accepted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connection_per_call_by_default() {
        let (address, accepted) =
            fake_server(|req| Some(ResponseFrame::success(Some(req.id), serde_json::json!({})))).await;

        let client = RpcClient::new(address, schema());
        client.call("Calc", "Ping", &Message::new()).await.unwrap();
        client.call("Calc", "Ping", &Message::new()).await.unwrap();

        assert_eq!(accepted.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_mismatched_response_id_is_decode_error() {
        let (address, _) =
            fake_server(|req| Some(ResponseFrame::success(Some(req.id + 100), serde_json::json!({})))).await;

        let client = RpcClient::new(address, schema());
        let result = client.call("Calc", "Ping", &Message::new()).await;
        assert!(matches!(result, Err(RpcError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_connection_closed_before_response_is_transport_error() {
        let (address, _) = fake_server(|_req| None).await;

        let client = RpcClient::new(address, schema());
        let mut call = client.prepare("Calc", "Ping", &Message::new()).unwrap();
        let result = call.invoke().await;

        assert!(matches!(result, Err(RpcError::Transport { .. })));
        assert_eq!(call.state(), CallState::Failed);
    }

    #[tokio::test]
    async fn test_response_not_matching_shape_is_decode_error() {
        let (address, _) = fake_server(|req| {
            Some(ResponseFrame::success(Some(req.id), serde_json::json!({"sum": "many"})))
        })
        .await;

        let client = RpcClient::new(address, schema());
        let result = client.call("Calc", "Add", &Message::new()).await;
        assert!(matches!(result, Err(RpcError::Decode { .. })));
    }
}
