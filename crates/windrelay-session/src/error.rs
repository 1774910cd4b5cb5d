//! Error types for the session layer.

use windrelay_protocol::Identity;
use windrelay_transport::ConnectionId;

/// Errors that can occur while verifying or registering a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The token was malformed, expired, wrongly signed, or carried no
    /// subject. The message is safe to show to the client.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// No signing secret was configured. Fatal at startup.
    #[error("token signing secret is not configured")]
    MissingSecret,

    /// This connection already has an identity bound to it.
    #[error("connection {0} is already registered")]
    AlreadyRegistered(ConnectionId),

    /// The identity is bound to another live connection and the registry
    /// is configured to reject the newcomer.
    #[error("identity {0} already has an active connection")]
    AlreadyConnected(Identity),
}
