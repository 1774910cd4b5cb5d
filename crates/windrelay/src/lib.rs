//! # windrelay
//!
//! Real-time relay core for multiplayer flight games.
//!
//! Clients connect over WebSocket, prove who they are with a token, then
//! stream their position. windrelay forwards each update only to players
//! in the same or a neighbouring interest cell, so traffic grows with
//! local density rather than with the total number of players.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use windrelay::prelude::*;
//!
//! # async fn run() -> Result<(), WindrelayError> {
//! let server = WindrelayServer::<JwtVerifier, JsonCodec>::builder()
//!     .bind("0.0.0.0:8080")
//!     .config(ServerConfig {
//!         cell_size: 512.0,
//!         ..ServerConfig::default()
//!     })
//!     .build(JwtVerifier::new("shared-secret")?)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod handler;
mod server;

pub use config::ServerConfig;
pub use error::WindrelayError;
pub use server::{WindrelayServer, WindrelayServerBuilder};

/// Everything needed to run a server or write a custom verifier.
pub mod prelude {
    pub use crate::{
        ServerConfig, WindrelayError, WindrelayServer, WindrelayServerBuilder,
    };
    pub use windrelay_protocol::{
        ClientMessageKind, Codec, Envelope, Identity, JsonCodec, PlayerState,
        Quaternion, ServerMessage, SpawnPoint, Vector3, WorldEntity,
        WorldSeed,
    };
    pub use windrelay_session::{
        DuplicateIdentityPolicy, IdentityVerifier, JwtVerifier, SessionError,
        SessionRegistry,
    };
}
