//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Chat server implementation
//!
//! The ChatServer is the main entry point of the service. It owns the TCP
//! listener, accepts connections, and spawns one [`ConnectionHandler`] per
//! connection.

use crate::{
    ChatError, ConnectionHandler, HandlerConfig, HandlerContext, Registry, Result, ServerConfig,
    ServerMetrics, ServerSnapshot, protocol,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Delay before accepting again after a failed accept
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Group chat server
///
/// This is the main server that accepts connections and manages their lifecycle.
///
/// # Example
///
/// ```no_run
/// use confab_service::{ChatServer, ServerConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ServerConfig::default();
///     let server = ChatServer::new(config).await?;
///
///     server.start().await?;
///
///     // Server is now running, wait for shutdown signal
///     // tokio::signal::ctrl_c().await?;
///     server.shutdown().await?;
///
///     Ok(())
/// }
/// ```
pub struct ChatServer {
    /// Server configuration
    config: ServerConfig,
    /// State shared with every connection handler
    context: Arc<HandlerContext>,
    /// Bound listener, moved into the accept loop by `start()`
    listener: Mutex<Option<TcpListener>>,
    /// Actual bind address
    bind_address: SocketAddr,
    /// Server start time
    started_at: Instant,
    /// Running flag
    running: AtomicBool,
    /// Cancelled on shutdown; every session token is a child of it
    shutdown: CancellationToken,
    /// Accept loop task handle
    accept_handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ChatServer {
    /// Create a new server with the given configuration
    ///
    /// This binds to the configured address but does not start accepting
    /// connections. Call `start()` to begin accepting connections.
    pub async fn new(config: ServerConfig) -> Result<Self> {
        config.validate()?;

        let listener = TcpListener::bind(config.bind_address)
            .await
            .map_err(|source| ChatError::Bind {
                address: config.bind_address,
                source,
            })?;
        let actual_addr = listener.local_addr()?;

        let shutdown = CancellationToken::new();
        let context = Arc::new(HandlerContext::new(
            Arc::new(Registry::new()),
            Arc::new(ServerMetrics::new()),
            HandlerConfig::from(&config),
            shutdown.clone(),
        ));

        tracing::info!("Chat server bound to {}", actual_addr);

        Ok(Self {
            config,
            context,
            listener: Mutex::new(Some(listener)),
            bind_address: actual_addr,
            started_at: Instant::now(),
            running: AtomicBool::new(false),
            shutdown,
            accept_handle: tokio::sync::Mutex::new(None),
        })
    }

    /// Start accepting connections
    ///
    /// The accept loop runs on its own task until `shutdown()` is called.
    /// A server can be started once.
    pub async fn start(&self) -> Result<()> {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(ChatError::AlreadyRunning)?;
        self.running.store(true, Ordering::SeqCst);

        tracing::info!("Starting chat server on {}", self.bind_address);

        let handle = tokio::spawn(accept_loop(
            listener,
            self.context.clone(),
            self.config.max_connections,
            self.shutdown.clone(),
        ));

        *self.accept_handle.lock().await = Some(handle);

        Ok(())
    }

    /// Run the server until `signal` resolves, then shut down
    pub async fn run_until<F>(&self, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        signal.await;
        self.shutdown().await
    }

    /// Run the server until Ctrl-C is received
    pub async fn run_until_ctrl_c(&self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = ?e, "Failed to install Ctrl-C handler");
            }
        })
        .await
    }

    /// Shutdown the server gracefully
    ///
    /// Stops accepting, tells every session the server is going away, flags
    /// them all for teardown and waits (up to the shutdown timeout) for the
    /// registry to drain.
    pub async fn shutdown(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(ChatError::ServerNotRunning);
        }

        tracing::info!("Shutting down chat server");

        self.context
            .broadcaster()
            .send_to_all(protocol::SHUTTING_DOWN, None);
        self.shutdown.cancel();

        if let Some(handle) = self.accept_handle.lock().await.take() {
            let _ = tokio::time::timeout(self.config.shutdown_timeout, handle).await;
        }

        let deadline = Instant::now() + self.config.shutdown_timeout;
        while !self.context.registry().is_empty() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let remaining = self.context.registry().len();
        if remaining > 0 {
            tracing::warn!(remaining, "Sessions still open after shutdown timeout");
        }

        tracing::info!("Chat server shutdown complete");

        Ok(())
    }

    /// Check if the server is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the server's bind address
    pub fn bind_address(&self) -> SocketAddr {
        self.bind_address
    }

    /// Get the number of registered sessions
    pub fn session_count(&self) -> usize {
        self.context.registry().len()
    }

    /// Get a snapshot of the server state
    pub fn snapshot(&self) -> ServerSnapshot {
        ServerSnapshot {
            active_sessions: self.session_count(),
            total_sessions: self.context.metrics().total_sessions(),
            bind_address: self.bind_address(),
            uptime: self.started_at.elapsed(),
            started_at: self.started_at,
        }
    }

    /// Get the server metrics
    pub fn metrics(&self) -> Arc<ServerMetrics> {
        self.context.metrics().clone()
    }

    /// Get the session registry
    pub fn registry(&self) -> Arc<Registry> {
        self.context.registry().clone()
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Accept connections until `shutdown` is cancelled
async fn accept_loop(
    listener: TcpListener,
    context: Arc<HandlerContext>,
    max_connections: usize,
    shutdown: CancellationToken,
) {
    // One permit per live handler, taken before the handshake starts
    let slots = Arc::new(Semaphore::new(max_connections));

    loop {
        let accept_result = tokio::select! {
            result = listener.accept() => result,
            _ = shutdown.cancelled() => break,
        };

        match accept_result {
            Ok((socket, peer_addr)) => {
                tracing::debug!("Accepted connection from {}", peer_addr);

                let Ok(permit) = slots.clone().try_acquire_owned() else {
                    tracing::warn!(
                        "Connection limit reached ({}), rejecting connection from {}",
                        max_connections,
                        peer_addr
                    );
                    context.metrics().connection_rejected();
                    let _ = socket.try_write(format!("{}\n", protocol::SERVER_FULL).as_bytes());
                    continue;
                };

                if let Err(e) = socket.set_nodelay(true) {
                    tracing::trace!("Failed to set TCP_NODELAY for {}: {}", peer_addr, e);
                }

                let context = context.clone();
                tokio::spawn(async move {
                    ConnectionHandler::serve(context, socket, peer_addr).await;
                    drop(permit);
                });
            }
            Err(e) => {
                let error = ChatError::Accept(e);
                tracing::error!("{}", error);
                context.metrics().accept_error();

                // Back off on errors to avoid tight loop
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }

    tracing::info!("Accept loop terminated");
}

impl std::fmt::Debug for ChatServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatServer")
            .field("bind_address", &self.bind_address())
            .field("running", &self.is_running())
            .field("session_count", &self.session_count())
            .field("uptime", &self.started_at.elapsed())
            .finish()
    }
}

impl Drop for ChatServer {
    fn drop(&mut self) {
        if self.running.load(Ordering::SeqCst) {
            tracing::warn!("ChatServer dropped while still running");
            self.running.store(false, Ordering::SeqCst);
            self.shutdown.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> ServerConfig {
        ServerConfig::new("127.0.0.1:0".parse().unwrap())
            .with_shutdown_timeout(Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_server_lifecycle() {
        let server = ChatServer::new(local_config()).await.unwrap();
        assert!(!server.is_running());
        assert_ne!(server.bind_address().port(), 0);

        server.start().await.unwrap();
        assert!(server.is_running());

        server.shutdown().await.unwrap();
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_server_snapshot() {
        let server = ChatServer::new(local_config()).await.unwrap();
        let snapshot = server.snapshot();

        assert_eq!(snapshot.active_sessions, 0);
        assert_eq!(snapshot.total_sessions, 0);
    }

    #[tokio::test]
    async fn test_server_double_start() {
        let server = ChatServer::new(local_config()).await.unwrap();
        server.start().await.unwrap();

        assert!(matches!(
            server.start().await,
            Err(ChatError::AlreadyRunning)
        ));

        server.shutdown().await.unwrap();
        assert!(matches!(
            server.shutdown().await,
            Err(ChatError::ServerNotRunning)
        ));
    }

    #[tokio::test]
    async fn test_bind_failure_is_fatal() {
        let first = ChatServer::new(local_config()).await.unwrap();
        let taken = ServerConfig::new(first.bind_address());

        let err = ChatServer::new(taken).await.unwrap_err();
        assert!(matches!(err, ChatError::Bind { .. }));
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = local_config().with_max_connections(0);
        assert!(matches!(
            ChatServer::new(config).await,
            Err(ChatError::InvalidConfig(_))
        ));
    }
}
