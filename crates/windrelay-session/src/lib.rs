//! Session management for windrelay.
//!
//! 1. **Verification**: turning a client token into an [`Identity`]
//!    ([`IdentityVerifier`] trait, [`JwtVerifier`])
//! 2. **Registry**: who owns which connection and where everyone last
//!    reported being ([`SessionRegistry`])
//! 3. **Interest**: which peers are close enough to care about an
//!    update ([`InterestGrid`], [`Cell`])
//!
//! ```text
//! Server layer (above)   ← supervises connections, calls into the registry
//!     ↕
//! Session layer (this crate)
//!     ↕
//! Protocol layer (below) ← Identity, PlayerState, ServerMessage
//! ```
//!
//! [`Identity`]: windrelay_protocol::Identity

#![allow(async_fn_in_trait)]

mod auth;
mod error;
mod interest;
mod jwt;
mod registry;

pub use auth::IdentityVerifier;
pub use error::SessionError;
pub use interest::{Cell, InterestGrid, DEFAULT_CELL_SIZE};
pub use jwt::JwtVerifier;
pub use registry::{
    DuplicateIdentityPolicy, Outbound, Outbox, PeerHandle, RegistryConfig,
    SessionRegistry,
};
