//! Shared-secret JWT verification.

use std::collections::HashSet;

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use windrelay_protocol::Identity;

use crate::{IdentityVerifier, SessionError};

/// The only claim the relay reads.
#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    sub: Option<String>,
}

/// Verifies HMAC-signed JWTs (HS256/HS384/HS512) against one shared
/// secret. The identity is the token's `sub` claim.
///
/// `exp` and `nbf` are enforced when present but not required. The
/// audience is only checked when configured with
/// [`with_audience`](Self::with_audience).
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    /// Creates a verifier for tokens signed with `secret`.
    ///
    /// # Errors
    /// [`SessionError::MissingSecret`] if `secret` is empty.
    pub fn new(secret: &str) -> Result<Self, SessionError> {
        if secret.is_empty() {
            return Err(SessionError::MissingSecret);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms =
            vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.required_spec_claims = HashSet::new();
        validation.validate_aud = false;

        Ok(Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    /// Additionally require the `aud` claim to contain `audience`.
    pub fn with_audience(mut self, audience: &str) -> Self {
        self.validation.set_audience(&[audience]);
        self.validation.validate_aud = true;
        self
    }

    /// Synchronous core of [`IdentityVerifier::verify`].
    pub fn verify_token(&self, token: &str) -> Result<Identity, SessionError> {
        let data =
            jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation)
                .map_err(|e| {
                    SessionError::AuthFailed(format!("invalid token: {e}"))
                })?;

        match data.claims.sub {
            Some(sub) if !sub.is_empty() => Ok(Identity::new(sub)),
            _ => Err(SessionError::AuthFailed("missing user id".into())),
        }
    }
}

impl IdentityVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, SessionError> {
        self.verify_token(token)
    }
}
