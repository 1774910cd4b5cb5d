//! `WindrelayServer` builder and accept loop.
//!
//! This is the entry point for running a relay. It ties the layers
//! together: transport → protocol → session.

use std::sync::Arc;

use windrelay_protocol::{Codec, JsonCodec};
use windrelay_session::{IdentityVerifier, SessionRegistry};
use windrelay_transport::{Connection, Transport, WebSocketTransport};

use crate::handler::handle_connection;
use crate::{ServerConfig, WindrelayError};

/// Shared server state passed to each connection task.
///
/// The registry does its own locking; everything else is read-only after
/// the server is built.
pub(crate) struct ServerState<V: IdentityVerifier, C: Codec> {
    pub(crate) registry: Arc<SessionRegistry>,
    pub(crate) verifier: V,
    pub(crate) codec: C,
    pub(crate) config: ServerConfig,
}

/// Builder for configuring and starting a relay server.
///
/// # Example
///
/// ```rust,no_run
/// use windrelay::prelude::*;
///
/// # async fn run() -> Result<(), WindrelayError> {
/// let verifier = JwtVerifier::new("my-secret")?;
/// let server = WindrelayServer::<JwtVerifier, JsonCodec>::builder()
///     .bind("0.0.0.0:8080")
///     .build(verifier)
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct WindrelayServerBuilder {
    bind_addr: String,
    config: ServerConfig,
}

impl WindrelayServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            config: ServerConfig::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Validates the configuration, binds the listener, and returns a
    /// server ready to [`run`](WindrelayServer::run).
    ///
    /// Speaks JSON over WebSocket.
    pub async fn build<V: IdentityVerifier>(
        self,
        verifier: V,
    ) -> Result<WindrelayServer<V, JsonCodec>, WindrelayError> {
        self.config.validate()?;

        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let state = Arc::new(ServerState {
            registry: Arc::new(SessionRegistry::new(
                self.config.registry_config(),
            )),
            verifier,
            codec: JsonCodec,
            config: self.config,
        });

        Ok(WindrelayServer { transport, state })
    }
}

impl Default for WindrelayServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound relay server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct WindrelayServer<V: IdentityVerifier, C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<V, C>>,
}

impl<V, C> WindrelayServer<V, C>
where
    V: IdentityVerifier,
    C: Codec,
{
    /// Creates a new builder.
    pub fn builder() -> WindrelayServerBuilder {
        WindrelayServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// A handle on the live session registry.
    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.state.registry)
    }

    /// Runs the accept loop.
    ///
    /// Each accepted connection gets its own task. A failed accept (for
    /// example a client that never completes the WebSocket upgrade) is
    /// logged and the loop carries on. Runs until the future is dropped.
    pub async fn run(mut self) -> Result<(), WindrelayError> {
        tracing::info!(
            cell_size = self.state.config.cell_size,
            policy = ?self.state.config.duplicate_policy,
            "windrelay server running"
        );

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        let conn_id = conn.id();
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(
                                %conn_id,
                                error = %e,
                                "connection ended with error"
                            );
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                }
            }
        }
    }
}
