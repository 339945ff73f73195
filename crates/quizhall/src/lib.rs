//! # Quizhall
//!
//! Real-time quiz rooms over WebSockets.
//!
//! Players connect with the `session_id` cookie the web app issued them,
//! join a room by id, and play through the room's question pack while the
//! owner drives it. Every room is an actor task, so actions on one room
//! are serialized while different rooms run in parallel.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use quizhall::{QuizhallServerBuilder, ServerConfig};
//! use quizhall_session::StoreSessionResolver;
//! use quizhall_store::MemoryStore;
//!
//! # async fn run() -> Result<(), quizhall::QuizhallError> {
//! let config = ServerConfig::from_env()?;
//! let store = Arc::new(MemoryStore::new());
//! let server = QuizhallServerBuilder::from_config(&config)
//!     .build(Arc::clone(&store), StoreSessionResolver::new(store))
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod handler;
mod server;

pub use config::{ConfigError, ServerConfig};
pub use error::QuizhallError;
pub use server::{QuizhallServer, QuizhallServerBuilder};
