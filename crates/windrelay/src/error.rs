//! Unified error type for windrelay.

use windrelay_protocol::ProtocolError;
use windrelay_session::SessionError;
use windrelay_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each layer's variant lets `?` convert
/// sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum WindrelayError {
    /// A transport-level error (bind, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (auth, registration).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The server was configured with values it cannot run with.
    #[error("invalid configuration: {0}")]
    Config(String),
}
