//! `QuizhallServer` builder and server loop.
//!
//! This is the entry point for running a Quizhall server. It ties together
//! all the layers: transport → session → room.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use quizhall_protocol::{Codec, JsonCodec};
use quizhall_room::{RoomLimits, RoomRegistry};
use quizhall_session::SessionResolver;
use quizhall_store::Store;
use quizhall_transport::{DEFAULT_QUEUE_CAPACITY, OriginGate, WebSocketTransport};

use crate::handler::handle_connection;
use crate::{QuizhallError, ServerConfig};

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. The registry
/// does its own locking; everything else is read-only.
pub(crate) struct ServerState<S, R> {
    pub(crate) registry: RoomRegistry<S>,
    pub(crate) resolver: R,
    pub(crate) codec: Arc<dyn Codec>,
    pub(crate) gate: OriginGate,
    pub(crate) idle_timeout: Option<Duration>,
    pub(crate) queue_capacity: usize,
}

/// Builder for configuring and starting a Quizhall server.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use quizhall::QuizhallServerBuilder;
/// use quizhall_session::StoreSessionResolver;
/// use quizhall_store::MemoryStore;
///
/// # async fn run() -> Result<(), quizhall::QuizhallError> {
/// let store = Arc::new(MemoryStore::new());
/// let server = QuizhallServerBuilder::new()
///     .bind("0.0.0.0:8080")
///     .allowed_origins(["https://quiz.example"])
///     .build(Arc::clone(&store), StoreSessionResolver::new(store))
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct QuizhallServerBuilder {
    bind_addr: String,
    limits: RoomLimits,
    gate: OriginGate,
    idle_timeout: Option<Duration>,
    queue_capacity: usize,
}

impl QuizhallServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::from_config(&ServerConfig::default())
    }

    /// Creates a builder from a loaded [`ServerConfig`].
    pub fn from_config(config: &ServerConfig) -> Self {
        let gate = if config.allowed_origins.is_empty() {
            OriginGate::allow_any()
        } else {
            OriginGate::new(config.allowed_origins.iter().cloned())
        };
        Self {
            bind_addr: config.bind_addr.clone(),
            limits: config.limits,
            gate,
            idle_timeout: config.idle_timeout,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    pub fn limits(mut self, limits: RoomLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Only accept upgrades whose `Origin` is one of `origins`.
    pub fn allowed_origins<I, O>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = O>,
        O: Into<String>,
    {
        self.gate = OriginGate::new(origins);
        self
    }

    /// Closes connections that send nothing for `timeout`. `None` never
    /// times out.
    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Bounds each connection's outbound queue.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Binds the listener and wires the registry to `store`.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build<S, R>(
        self,
        store: Arc<S>,
        resolver: R,
    ) -> Result<QuizhallServer<S, R>, QuizhallError>
    where
        S: Store,
        R: SessionResolver,
    {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;
        let codec: Arc<dyn Codec> = Arc::new(JsonCodec);

        let state = Arc::new(ServerState {
            registry: RoomRegistry::new(store, Arc::clone(&codec), self.limits),
            resolver,
            codec,
            gate: self.gate,
            idle_timeout: self.idle_timeout,
            queue_capacity: self.queue_capacity,
        });

        Ok(QuizhallServer { transport, state })
    }
}

impl Default for QuizhallServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running Quizhall server.
///
/// Call [`run()`](Self::run) to start accepting connections and
/// [`shutdown()`](Self::shutdown) to close every room.
pub struct QuizhallServer<S, R> {
    transport: WebSocketTransport,
    state: Arc<ServerState<S, R>>,
}

impl<S, R> QuizhallServer<S, R>
where
    S: Store,
    R: SessionResolver,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// The live rooms.
    pub fn registry(&self) -> &RoomRegistry<S> {
        &self.state.registry
    }

    /// Runs the server accept loop.
    ///
    /// Accepts incoming connections and spawns a handler task for each.
    /// Runs until the future is dropped.
    pub async fn run(&self) -> Result<(), QuizhallError> {
        tracing::info!(addr = ?self.local_addr().ok(), "quizhall server running");

        loop {
            match self.transport.accept().await {
                Ok(pending) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(pending, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }

    /// Shuts every live room down, closing the connections attached to
    /// them.
    pub async fn shutdown(&self) {
        self.state.registry.shutdown_all().await;
    }
}
