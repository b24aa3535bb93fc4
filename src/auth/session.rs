//! Session token issuance and validation.
//!
//! Sessions are stateless HS256 JWTs. Validity is purely a function of the
//! signature and the `exp` claim; nothing is stored server-side.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use tracing::{debug, error};
use uuid::Uuid;

use super::models::SessionClaims;

/// Lifetime of an issued session.
pub const SESSION_TTL_DAYS: i64 = 30;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("signing secret is empty")]
    EmptySecret,

    #[error("failed to sign session token: {0}")]
    Signing(String),

    #[error("session token has expired")]
    Expired,

    #[error("session token is invalid")]
    Invalid,
}

/// A freshly minted session credential.
#[derive(Debug, Clone)]
pub struct SessionToken {
    pub token: String,
    pub user_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Mints and checks session tokens with one process-wide secret.
pub struct SessionIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for SessionIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionIssuer").finish_non_exhaustive()
    }
}

impl SessionIssuer {
    pub fn new(secret: &str) -> Result<Self, SessionError> {
        if secret.is_empty() {
            return Err(SessionError::EmptySecret);
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        })
    }

    pub fn issue(&self, user_id: &str) -> Result<SessionToken, SessionError> {
        self.issue_at(user_id, Utc::now())
    }

    /// Issues a token as if the current time were `now`.
    pub fn issue_at(&self, user_id: &str, now: DateTime<Utc>) -> Result<SessionToken, SessionError> {
        // Whole seconds, so the returned times match what the token encodes.
        let issued_at = Utc
            .timestamp_opt(now.timestamp(), 0)
            .single()
            .unwrap_or(now);
        let expires_at = issued_at + Duration::days(SESSION_TTL_DAYS);

        let claims = SessionClaims {
            user_id: user_id.to_string(),
            sub: user_id.to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(
            |e| {
                error!(error = %e, user_id = %user_id, "JWT encoding error during session issuance");
                SessionError::Signing(e.to_string())
            },
        )?;

        debug!(user_id = %user_id, expires_at = %expires_at, "Session token issued");

        Ok(SessionToken {
            token,
            user_id: user_id.to_string(),
            issued_at,
            expires_at,
        })
    }

    /// Validates a session token and returns its claims.
    pub fn validate(&self, token: &str) -> Result<SessionClaims, SessionError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => SessionError::Expired,
                _ => {
                    debug!(error = %e, "Session token validation failed");
                    SessionError::Invalid
                }
            })
    }
}
