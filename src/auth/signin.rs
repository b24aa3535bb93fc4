//! OAuth sign-in orchestration.
//!
//! A request moves linearly through
//! `ProviderLookup → TokenVerification → IdentityResolution → SessionIssuance`.
//! The first failing stage ends the attempt; nothing is retried here.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use super::identity::{IdentityResolver, ResolveError};
use super::models::{AuthRequest, SignInResponse};
use super::providers::ProviderRegistry;
use super::session::{SessionError, SessionIssuer};
use super::verifier::{TokenVerifier, VerifyError};
use crate::common::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInStage {
    ProviderLookup,
    TokenVerification,
    IdentityResolution,
    SessionIssuance,
}

impl fmt::Display for SignInStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignInStage::ProviderLookup => "provider_lookup",
            SignInStage::TokenVerification => "token_verification",
            SignInStage::IdentityResolution => "identity_resolution",
            SignInStage::SessionIssuance => "session_issuance",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum SignInError {
    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("invalid identity token: {0}")]
    InvalidToken(VerifyError),

    /// The token is valid but was issued to a different subject.
    #[error("token subject does not match provider_user_id")]
    SubjectMismatch,

    #[error("signing keys unavailable: {0}")]
    KeysUnavailable(VerifyError),

    #[error(transparent)]
    Store(#[from] ResolveError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl SignInError {
    pub fn stage(&self) -> SignInStage {
        match self {
            SignInError::UnsupportedProvider(_) => SignInStage::ProviderLookup,
            SignInError::InvalidToken(_)
            | SignInError::SubjectMismatch
            | SignInError::KeysUnavailable(_) => SignInStage::TokenVerification,
            SignInError::Store(_) => SignInStage::IdentityResolution,
            SignInError::Session(_) => SignInStage::SessionIssuance,
        }
    }
}

impl From<VerifyError> for SignInError {
    fn from(err: VerifyError) -> Self {
        if err.is_authentication_failure() {
            SignInError::InvalidToken(err)
        } else {
            SignInError::KeysUnavailable(err)
        }
    }
}

impl From<SignInError> for ApiError {
    fn from(err: SignInError) -> Self {
        match err {
            SignInError::UnsupportedProvider(_) => {
                ApiError::BadRequest("Unsupported provider".to_string())
            }
            SignInError::InvalidToken(_) | SignInError::SubjectMismatch => {
                ApiError::Unauthorized("Invalid token".to_string())
            }
            other => ApiError::DependencyError(format!("{} failed: {}", other.stage(), other)),
        }
    }
}

/// Runs a sign-in request through verification, identity resolution and
/// session issuance.
#[derive(Clone)]
pub struct OAuthSignInHandler {
    providers: Arc<ProviderRegistry>,
    verifier: Arc<TokenVerifier>,
    resolver: IdentityResolver,
    sessions: Arc<SessionIssuer>,
}

impl OAuthSignInHandler {
    pub fn new(
        providers: Arc<ProviderRegistry>,
        verifier: Arc<TokenVerifier>,
        resolver: IdentityResolver,
        sessions: Arc<SessionIssuer>,
    ) -> Self {
        Self {
            providers,
            verifier,
            resolver,
            sessions,
        }
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    pub async fn sign_in(&self, request: &AuthRequest) -> Result<SignInResponse, SignInError> {
        let result = self.run(request).await;
        if let Err(e) = &result {
            warn!(
                provider = %request.provider,
                stage = %e.stage(),
                reason = %e,
                "OAuth sign-in failed"
            );
        }
        result
    }

    async fn run(&self, request: &AuthRequest) -> Result<SignInResponse, SignInError> {
        let config = self
            .providers
            .get(&request.provider)
            .ok_or_else(|| SignInError::UnsupportedProvider(request.provider.clone()))?;

        let claims = self.verifier.verify(&request.identity_token, config).await?;

        if claims.sub != request.provider_user_id {
            return Err(SignInError::SubjectMismatch);
        }

        let email = request
            .email
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .or(claims.email.as_deref());

        let user = self
            .resolver
            .resolve(&config.name, &request.provider_user_id, email)
            .await?;

        let session = self.sessions.issue(&user.id)?;

        info!(
            user_id = %user.id,
            provider = %config.name,
            expires_at = %session.expires_at,
            "OAuth sign-in completed"
        );

        Ok(SignInResponse {
            user,
            token: session.token,
        })
    }
}
