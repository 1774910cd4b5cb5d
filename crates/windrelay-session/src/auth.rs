//! Hook for turning a client token into a verified identity.
//!
//! windrelay does not issue tokens. Clients obtain one from an identity
//! provider and present it in `C2S_AUTH`; the server only checks it.
//! [`JwtVerifier`](crate::JwtVerifier) covers the usual shared-secret JWT
//! case. Tests and other deployments plug in their own implementation.

use windrelay_protocol::Identity;

use crate::SessionError;

/// Validates a client's token and returns their identity.
///
/// Called once per connection, by the authentication gate, with the
/// token from the first `C2S_AUTH` message (and from any retry after a
/// failure). Implementations must be stateless with respect to
/// connections; the same token may be verified concurrently by many
/// tasks.
///
/// # Example
///
/// ```rust
/// use windrelay_protocol::Identity;
/// use windrelay_session::{IdentityVerifier, SessionError};
///
/// /// Accepts `dev:<name>` tokens. Local development only.
/// struct DevVerifier;
///
/// impl IdentityVerifier for DevVerifier {
///     async fn verify(&self, token: &str) -> Result<Identity, SessionError> {
///         token
///             .strip_prefix("dev:")
///             .filter(|name| !name.is_empty())
///             .map(Identity::from)
///             .ok_or_else(|| SessionError::AuthFailed("not a dev token".into()))
///     }
/// }
/// ```
pub trait IdentityVerifier: Send + Sync + 'static {
    /// Checks `token` and returns the identity it was issued to.
    ///
    /// # Errors
    /// [`SessionError::AuthFailed`] when the token is rejected.
    fn verify(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<Identity, SessionError>> + Send;
}
