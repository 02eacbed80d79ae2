//! TCP server runtime.
//!
//! Binds an address, accepts connections, and serves calls from the
//! handler registry.
//!
//! # Thread Safety
//!
//! The server runs on the tokio runtime. Each connection is handled in its own
//! spawned task and serves its calls strictly in order. Handlers run on the
//! blocking pool, so a slow handler stalls only the connection that invoked
//! it. The registry is shared via `Arc` and never mutated after startup.

use crate::config::RpcConfig;
use crate::error::{Result, RpcError};
use crate::protocol::{read_frame, write_frame, RequestFrame, ResponseFrame};
use crate::registry::HandlerRegistry;
use crate::transport::{self, Address};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

/// A bound, serving server.
///
/// Dropping the handle stops the accept loop and closes open connections.
pub struct RpcServerHandle {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    conn_shutdown_tx: watch::Sender<bool>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl RpcServerHandle {
    /// Bound socket address, with the real port when 0 was requested.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Address a local client can dial.
    ///
    /// Wildcard binds are rewritten to the loopback address.
    pub fn local_address(&self) -> Address {
        let mut addr = self.addr;
        if addr.ip().is_unspecified() {
            addr.set_ip(match addr {
                SocketAddr::V4(_) => std::net::Ipv4Addr::LOCALHOST.into(),
                SocketAddr::V6(_) => std::net::Ipv6Addr::LOCALHOST.into(),
            });
        }
        Address::from(addr)
    }

    /// Stop serving.
    ///
    /// No further connections are accepted. Open connections close after
    /// the call they are serving, if any, has been answered.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.conn_shutdown_tx.send(true);
    }

    /// Wait until the accept loop has stopped.
    pub async fn stopped(&mut self) {
        if let Some(handle) = self.task_handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for RpcServerHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

/// Server runtime entry point.
pub struct RpcServer;

impl RpcServer {
    /// Bind `address` and start serving `registry` in background tasks.
    ///
    /// Fails with `Bind` if the address cannot be claimed. Port 0 asks the
    /// OS for a free port; see [`RpcServerHandle::addr`].
    pub async fn bind(address: &Address, registry: Arc<HandlerRegistry>) -> Result<RpcServerHandle> {
        let listener = transport::listen(address).await?;
        let addr = listener.local_addr().map_err(|e| RpcError::Bind {
            addr: address.to_string(),
            message: e.to_string(),
            source: Some(e),
        })?;

        info!("RPC server listening on {}", addr);
        for key in registry.unimplemented_methods() {
            warn!("No handler registered for {}; calls will fail", key);
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (conn_shutdown_tx, conn_shutdown_rx) = watch::channel(false);
        let open_connections = Arc::new(AtomicUsize::new(0));

        let task_handle = tokio::spawn(Self::accept_loop(
            listener,
            registry,
            shutdown_rx,
            conn_shutdown_rx,
            open_connections,
        ));

        Ok(RpcServerHandle {
            addr,
            shutdown_tx: Some(shutdown_tx),
            conn_shutdown_tx,
            task_handle: Some(task_handle),
        })
    }

    async fn accept_loop(
        listener: TcpListener,
        registry: Arc<HandlerRegistry>,
        mut shutdown_rx: oneshot::Receiver<()>,
        conn_shutdown_rx: watch::Receiver<bool>,
        open_connections: Arc<AtomicUsize>,
    ) {
        loop {
            let accepted = tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("RPC server on {:?} stopping", listener.local_addr().ok());
                    return;
                }
                accepted = listener.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    // EMFILE and the like persist; don't spin on them.
                    error!("Accept failed: {}", e);
                    tokio::time::sleep(RpcConfig::ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            if open_connections.load(Ordering::Relaxed) >= RpcConfig::MAX_CONNECTIONS {
                warn!(
                    "Dropping connection from {}: {} connections already open",
                    peer,
                    RpcConfig::MAX_CONNECTIONS
                );
                continue;
            }
            open_connections.fetch_add(1, Ordering::Relaxed);

            let registry = registry.clone();
            let open = open_connections.clone();
            let mut conn_shutdown = conn_shutdown_rx.clone();
            tokio::spawn(async move {
                debug!("Serving {}", peer);
                if let Err(e) = Self::handle_connection(stream, &registry, &mut conn_shutdown).await {
                    debug!("Connection {} closed: {}", peer, e);
                }
                open.fetch_sub(1, Ordering::Relaxed);
            });
        }
    }

    async fn handle_connection(
        mut stream: TcpStream,
        registry: &HandlerRegistry,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        let (mut reader, mut writer) = stream.split();

        loop {
            let frame = tokio::select! {
                result = read_frame(&mut reader) => {
                    match result? {
                        Some(f) => f,
                        None => return Ok(()), // Clean disconnect
                    }
                }
                _ = shutdown_rx.changed() => {
                    return Ok(());
                }
            };

            let response = Self::process_request(&frame, registry).await;
            let response_bytes = Self::encode_response(&response)?;
            write_frame(&mut writer, &response_bytes).await?;
        }
    }

    /// Serialize a response, replacing one too large for a frame with an
    /// internal error so the caller still gets an answer.
    fn encode_response(response: &ResponseFrame) -> Result<Vec<u8>> {
        let bytes = serde_json::to_vec(response)?;
        if bytes.len() <= RpcConfig::MAX_FRAME_SIZE {
            return Ok(bytes);
        }

        let err = RpcError::Internal {
            message: format!(
                "Response of {} bytes exceeds maximum frame size {}",
                bytes.len(),
                RpcConfig::MAX_FRAME_SIZE
            ),
        };
        warn!("Call {:?}: {}", response.id, err);
        Ok(serde_json::to_vec(&ResponseFrame::from_error(response.id, &err))?)
    }

    /// Turn one request frame into exactly one response frame.
    async fn process_request(frame: &[u8], registry: &HandlerRegistry) -> ResponseFrame {
        let request: RequestFrame = match serde_json::from_slice(frame) {
            Ok(req) => req,
            Err(e) => {
                warn!("Unparseable request frame: {}", e);
                return ResponseFrame::failure(None, -32700, format!("Parse error: {}", e));
            }
        };

        let id = Some(request.id);
        debug!("Call {}/{} (id {})", request.service, request.method, request.id);

        match Self::dispatch(&request, registry).await {
            Ok(result) => ResponseFrame::success(id, result),
            Err(e) => {
                warn!("Call {}/{} failed: {}", request.service, request.method, e);
                ResponseFrame::from_error(id, &e)
            }
        }
    }

    async fn dispatch(request: &RequestFrame, registry: &HandlerRegistry) -> Result<serde_json::Value> {
        let resolved = registry.lookup(&request.service, &request.method)?;
        let message = resolved.descriptor.request.decode(&request.payload)?;

        let handler = resolved.handler.clone();
        let response = tokio::task::spawn_blocking(move || handler.call(message))
            .await
            .map_err(|e| RpcError::Internal {
                message: format!("Handler for {} did not complete: {}", resolved.descriptor.key(), e),
            })??;

        resolved
            .descriptor
            .response
            .encode(&response)
            .map_err(|e| RpcError::Internal {
                message: format!(
                    "Handler for {} returned an invalid {}: {}",
                    resolved.descriptor.key(),
                    resolved.descriptor.response.name,
                    e
                ),
            })
    }
}
