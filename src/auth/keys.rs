//! Provider signing-key fetching and caching.
//!
//! Keys are cached per provider for a configurable TTL. A key-id miss against
//! a cached set forces one refetch, which is how provider key rotation is
//! picked up before the TTL runs out. A TTL of zero disables caching.

use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::providers::ProviderConfig;

#[derive(Debug, Error)]
pub enum KeySourceError {
    /// Network failure, timeout or non-success status from the endpoint.
    #[error("failed to fetch signing keys: {0}")]
    Fetch(String),

    /// The endpoint answered but the body is not a usable key set.
    #[error("malformed signing key set: {0}")]
    Format(String),
}

/// One public key as published in a JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct SigningKey {
    pub kid: String,
    pub kty: String,
    #[serde(default)]
    pub alg: Option<String>,
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
    #[serde(default)]
    pub n: Option<String>,
    #[serde(default)]
    pub e: Option<String>,
}

/// A provider's current public keys, indexed by key id.
#[derive(Debug, Clone, Default)]
pub struct SigningKeySet {
    keys: HashMap<String, SigningKey>,
}

impl SigningKeySet {
    pub fn get(&self, kid: &str) -> Option<&SigningKey> {
        self.keys.get(kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Parses a JWKS document. Entries without a `kid` cannot be selected
    /// and are skipped.
    pub fn from_jwks(body: &[u8]) -> Result<Self, KeySourceError> {
        #[derive(Deserialize)]
        struct Document {
            keys: Vec<serde_json::Value>,
        }

        let document: Document = serde_json::from_slice(body)
            .map_err(|e| KeySourceError::Format(e.to_string()))?;

        let keys: HashMap<String, SigningKey> = document
            .keys
            .into_iter()
            .filter_map(|raw| match serde_json::from_value::<SigningKey>(raw) {
                Ok(key) => Some((key.kid.clone(), key)),
                Err(e) => {
                    debug!(error = %e, "Skipping unusable JWKS entry");
                    None
                }
            })
            .collect();

        let set = Self { keys };
        if set.is_empty() {
            return Err(KeySourceError::Format("key set contains no usable keys".into()));
        }
        Ok(set)
    }
}

struct CachedKeySet {
    keys: Arc<SigningKeySet>,
    fetched_at: Instant,
}

/// Default floor between kid-miss refetches of one provider's keys.
pub const DEFAULT_MIN_REFETCH_INTERVAL: Duration = Duration::from_secs(10);

/// HTTP client for provider key endpoints. Honors the standard proxy
/// environment variables.
pub fn provider_http_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder().timeout(timeout).build()
}

/// Fetches signing keys from provider key-distribution endpoints.
pub struct KeySource {
    http: Client,
    ttl: Duration,
    min_refetch_interval: Duration,
    cache: RwLock<HashMap<String, CachedKeySet>>,
}

impl KeySource {
    /// `http` should carry a request timeout.
    pub fn new(http: Client, ttl: Duration) -> Self {
        Self {
            http,
            ttl,
            min_refetch_interval: DEFAULT_MIN_REFETCH_INTERVAL,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Unknown key ids only trigger a refetch once the cached set is at
    /// least this old, which bounds the outbound load made-up ids can cause.
    pub fn with_min_refetch_interval(mut self, interval: Duration) -> Self {
        self.min_refetch_interval = interval;
        self
    }

    /// Returns the provider's key set, from cache when still fresh.
    pub async fn fetch(&self, provider: &ProviderConfig) -> Result<Arc<SigningKeySet>, KeySourceError> {
        self.fetch_tracked(provider).await.map(|(keys, _)| keys)
    }

    /// Like [`fetch`](Self::fetch), also returning when a cached set was fetched.
    /// `None` means the set was just downloaded.
    async fn fetch_tracked(
        &self,
        provider: &ProviderConfig,
    ) -> Result<(Arc<SigningKeySet>, Option<Instant>), KeySourceError> {
        if let Some((keys, fetched_at)) = self.cached(provider).await {
            return Ok((keys, Some(fetched_at)));
        }
        Ok((self.refresh(provider).await?, None))
    }

    /// Looks up one key by id, refetching once if the cached set lacks it
    /// and is older than the minimum refetch interval.
    pub async fn find_key(
        &self,
        provider: &ProviderConfig,
        kid: &str,
    ) -> Result<Option<SigningKey>, KeySourceError> {
        let (keys, fetched_at) = self.fetch_tracked(provider).await?;
        if let Some(key) = keys.get(kid) {
            return Ok(Some(key.clone()));
        }
        match fetched_at {
            None => return Ok(None),
            Some(at) if at.elapsed() < self.min_refetch_interval => {
                debug!(
                    provider = %provider.name,
                    kid = %kid,
                    "Key id not in recently fetched set, skipping refetch"
                );
                return Ok(None);
            }
            Some(_) => {}
        }

        info!(
            provider = %provider.name,
            kid = %kid,
            "Key id not in cached set, refetching signing keys"
        );
        let keys = self.refresh(provider).await?;
        Ok(keys.get(kid).cloned())
    }

    /// Fetches the key set from the network and replaces the cache entry.
    pub async fn refresh(&self, provider: &ProviderConfig) -> Result<Arc<SigningKeySet>, KeySourceError> {
        let keys = Arc::new(self.download(&provider.jwks_uri).await?);

        if !self.ttl.is_zero() {
            let mut cache = self.cache.write().await;
            cache.insert(
                provider.name.clone(),
                CachedKeySet {
                    keys: keys.clone(),
                    fetched_at: Instant::now(),
                },
            );
        }

        debug!(provider = %provider.name, key_count = keys.len(), "Signing keys fetched");
        Ok(keys)
    }

    async fn cached(&self, provider: &ProviderConfig) -> Option<(Arc<SigningKeySet>, Instant)> {
        if self.ttl.is_zero() {
            return None;
        }
        let cache = self.cache.read().await;
        cache
            .get(&provider.name)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| (entry.keys.clone(), entry.fetched_at))
    }

    async fn download(&self, jwks_uri: &str) -> Result<SigningKeySet, KeySourceError> {
        let response = self.http.get(jwks_uri).send().await.map_err(|e| {
            warn!(error = %e, jwks_uri = %jwks_uri, "HTTP error contacting key endpoint");
            KeySourceError::Fetch(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(http_status = %status, jwks_uri = %jwks_uri, "Key endpoint returned error status");
            return Err(KeySourceError::Fetch(format!("HTTP {}", status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| KeySourceError::Fetch(e.to_string()))?;

        SigningKeySet::from_jwks(&body)
    }
}
