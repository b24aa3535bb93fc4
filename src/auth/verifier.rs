//! Identity token verification against a provider's published keys.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use super::keys::{KeySource, KeySourceError, SigningKey};
use super::models::IdentityClaims;
use super::providers::ProviderConfig;

/// Why an identity token was rejected.
///
/// Callers see a single 401 for every variant except `Keys`; the variant
/// itself is for logs.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("signature does not match any published key")]
    SignatureInvalid,

    #[error("audience does not match the configured client id")]
    AudienceMismatch,

    #[error("issuer does not match the configured issuer")]
    IssuerMismatch,

    #[error("token has expired")]
    TokenExpired,

    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error(transparent)]
    Keys(#[from] KeySourceError),
}

impl VerifyError {
    /// True when the failure lies with the token rather than a dependency.
    pub fn is_authentication_failure(&self) -> bool {
        !matches!(self, VerifyError::Keys(_))
    }
}

/// Verifies provider identity tokens.
pub struct TokenVerifier {
    keys: Arc<KeySource>,
    leeway_secs: u64,
}

impl TokenVerifier {
    pub fn new(keys: Arc<KeySource>, leeway_secs: u64) -> Self {
        Self { keys, leeway_secs }
    }

    /// Checks signature, issuer, audience and expiry; returns the claims.
    pub async fn verify(
        &self,
        token: &str,
        config: &ProviderConfig,
    ) -> Result<IdentityClaims, VerifyError> {
        let header = decode_header(token)
            .map_err(|e| VerifyError::MalformedToken(format!("undecodable header: {}", e)))?;

        let kid = header
            .kid
            .ok_or_else(|| VerifyError::MalformedToken("header has no key id".into()))?;

        if !is_asymmetric(header.alg) {
            // A shared-secret algorithm here would let anyone holding the
            // public key forge tokens.
            warn!(provider = %config.name, alg = ?header.alg, "Identity token uses a symmetric algorithm");
            return Err(VerifyError::SignatureInvalid);
        }

        let key = match self.keys.find_key(config, &kid).await? {
            Some(key) => key,
            None => {
                debug!(provider = %config.name, kid = %kid, "No published key for token key id");
                return Err(VerifyError::SignatureInvalid);
            }
        };

        let decoding_key = decoding_key_for(&key, header.alg)?;
        let claims = self.check_claims(token, header.alg, &decoding_key, config)?;

        debug!(
            provider = %config.name,
            kid = %kid,
            subject = %claims.sub,
            "Identity token verified"
        );
        Ok(claims)
    }

    fn check_claims(
        &self,
        token: &str,
        alg: Algorithm,
        key: &DecodingKey,
        config: &ProviderConfig,
    ) -> Result<IdentityClaims, VerifyError> {
        let mut validation = Validation::new(alg);
        validation.set_audience(&[config.client_id.as_str()]);
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "aud", "iss", "sub"]);
        validation.leeway = self.leeway_secs;

        let data = decode::<IdentityClaims>(token, key, &validation).map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature => VerifyError::SignatureInvalid,
            ErrorKind::InvalidAudience => VerifyError::AudienceMismatch,
            ErrorKind::InvalidIssuer => VerifyError::IssuerMismatch,
            ErrorKind::ExpiredSignature => VerifyError::TokenExpired,
            ErrorKind::MissingRequiredClaim(claim) if claim == "aud" => VerifyError::AudienceMismatch,
            ErrorKind::MissingRequiredClaim(claim) if claim == "iss" => VerifyError::IssuerMismatch,
            _ => VerifyError::MalformedToken(e.to_string()),
        })?;

        let claims = data.claims;

        // aud and iss are essential: absence is a failure on its own.
        match &claims.aud {
            Some(aud) if aud.contains(&config.client_id) => {}
            _ => return Err(VerifyError::AudienceMismatch),
        }
        if claims.iss.as_deref() != Some(config.issuer.as_str()) {
            return Err(VerifyError::IssuerMismatch);
        }

        Ok(claims)
    }
}

fn is_asymmetric(alg: Algorithm) -> bool {
    matches!(
        alg,
        Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512
    )
}

fn decoding_key_for(key: &SigningKey, alg: Algorithm) -> Result<DecodingKey, VerifyError> {
    if key.kty != "RSA" {
        debug!(kid = %key.kid, kty = %key.kty, "Unsupported key type for RSA token");
        return Err(VerifyError::SignatureInvalid);
    }

    if let Some(key_alg) = &key.alg {
        match key_alg.parse::<Algorithm>() {
            Ok(published) if published == alg => {}
            _ => {
                debug!(kid = %key.kid, key_alg = %key_alg, token_alg = ?alg, "Token algorithm differs from key algorithm");
                return Err(VerifyError::SignatureInvalid);
            }
        }
    }

    let (n, e) = match (&key.n, &key.e) {
        (Some(n), Some(e)) => (n, e),
        _ => {
            return Err(VerifyError::Keys(KeySourceError::Format(format!(
                "RSA key {} lacks modulus or exponent",
                key.kid
            ))))
        }
    };

    DecodingKey::from_rsa_components(n, e).map_err(|err| {
        VerifyError::Keys(KeySourceError::Format(format!(
            "RSA key {} is invalid: {}",
            key.kid, err
        )))
    })
}
