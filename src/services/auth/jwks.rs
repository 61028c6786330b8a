//! Signing key resolution from the issuer's JWKS endpoint.
//!
//! Every call fetches the key set again unless a cache TTL is configured.
//! With a TTL, keys are cached per `(jwks_url, kid)` and concurrent lookups
//! of the same key share one in-flight fetch.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::DecodingKey;
use moka::future::Cache;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::AuthConfig;
use crate::retry::{RetryConfig, retry_with_backoff};
use crate::services::auth::AuthError;

/// JWKS document as served by the issuer.
///
/// Only the members needed to rebuild an RSA key are read; unknown members
/// and non-RSA keys are tolerated.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonWebKeySet {
    pub keys: Vec<JsonWebKey>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonWebKey {
    #[serde(default)]
    pub kid: Option<String>,
    #[serde(default)]
    pub kty: Option<String>,
    #[serde(default)]
    pub n: Option<String>,
    #[serde(default)]
    pub e: Option<String>,
}

impl JsonWebKeySet {
    /// Parses a JWKS body. Empty or unparseable bodies are `JwksNotFound`.
    pub fn parse(body: &str) -> Result<Self, AuthError> {
        if body.trim().is_empty() {
            return Err(AuthError::JwksNotFound);
        }
        serde_json::from_str(body).map_err(|e| {
            warn!(error = %e, "JWKS body is not a JSON Web Key Set");
            AuthError::JwksNotFound
        })
    }

    /// First key whose `kid` equals `kid`. Duplicates are not rejected.
    pub fn find(&self, kid: &str) -> Option<&JsonWebKey> {
        self.keys.iter().find(|k| k.kid.as_deref() == Some(kid))
    }
}

/// RSA public key rebuilt from a JWK, tagged with its key id.
#[derive(Clone)]
pub struct ResolvedKey {
    kid: String,
    key: DecodingKey,
}

impl std::fmt::Debug for ResolvedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print key material
        f.debug_struct("ResolvedKey").field("kid", &self.kid).finish()
    }
}

impl ResolvedKey {
    pub fn new(kid: impl Into<String>, key: DecodingKey) -> Self {
        Self {
            kid: kid.into(),
            key,
        }
    }

    /// Builds the key from base64url `n` / `e`.
    ///
    /// All leading zero bytes of the modulus are dropped first: some JWKS
    /// encoders prepend a sign byte to the big-endian integer.
    pub fn from_jwk(jwk: &JsonWebKey, kid: &str) -> Result<Self, AuthError> {
        let invalid = || AuthError::InvalidSigningKey {
            kid: kid.to_string(),
        };

        if let Some(kty) = jwk.kty.as_deref()
            && kty != "RSA"
        {
            warn!(kid = %kid, kty = %kty, "signing key is not an RSA key");
            return Err(invalid());
        }

        let n = jwk.n.as_deref().ok_or_else(invalid)?;
        let e = jwk.e.as_deref().ok_or_else(invalid)?;

        let modulus = decode_base64url(n).ok_or_else(invalid)?;
        let exponent = decode_base64url(e).ok_or_else(invalid)?;

        let modulus = trim_leading_zeros(&modulus);
        if modulus.is_empty() || exponent.is_empty() {
            return Err(invalid());
        }

        Ok(Self::new(
            kid,
            DecodingKey::from_rsa_raw_components(modulus, &exponent),
        ))
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }
}

fn decode_base64url(value: &str) -> Option<Vec<u8>> {
    // Some issuers keep the `=` padding.
    URL_SAFE_NO_PAD.decode(value.trim_end_matches('=')).ok()
}

pub(crate) fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[first..]
}

/// Fetches the JWKS and resolves signing keys by key id.
#[derive(Clone)]
pub struct SigningKeyResolver {
    http: reqwest::Client,
    jwks_url: String,
    retry: RetryConfig,
    cache: Option<Cache<(String, String), ResolvedKey>>,
}

impl std::fmt::Debug for SigningKeyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyResolver")
            .field("jwks_url", &self.jwks_url)
            .field("retry", &self.retry)
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

impl SigningKeyResolver {
    pub fn new(
        jwks_url: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            http,
            jwks_url: jwks_url.into(),
            retry: RetryConfig::default(),
            cache: None,
        })
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self, reqwest::Error> {
        let resolver = Self::new(config.jwks_url.clone(), config.request_timeout)?
            .with_retry(RetryConfig::with_max_attempts(config.jwks_fetch_attempts));

        Ok(match config.jwks_cache_ttl {
            Some(ttl) => resolver.with_cache_ttl(ttl),
            None => resolver,
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Enables the per-key cache. Failed lookups are never cached.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache = Some(Cache::builder().time_to_live(ttl).max_capacity(256).build());
        self
    }

    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    pub async fn resolve_key(&self, kid: &str) -> Result<ResolvedKey, AuthError> {
        let Some(cache) = &self.cache else {
            return self.fetch_and_select(kid).await;
        };

        let cache_key = (self.jwks_url.clone(), kid.to_string());
        cache
            .try_get_with(cache_key, self.fetch_and_select(kid))
            .await
            .map_err(|e: Arc<AuthError>| (*e).clone())
    }

    async fn fetch_and_select(&self, kid: &str) -> Result<ResolvedKey, AuthError> {
        let key_set = self.fetch_key_set().await?;

        let jwk = key_set.find(kid).ok_or_else(|| {
            warn!(kid = %kid, jwks_url = %self.jwks_url, "no JSON Web Key matches the token kid");
            AuthError::JwkNotFoundByKeyId {
                kid: kid.to_string(),
            }
        })?;

        ResolvedKey::from_jwk(jwk, kid)
    }

    async fn fetch_key_set(&self) -> Result<JsonWebKeySet, AuthError> {
        let body = retry_with_backoff(&self.retry, "jwks_fetch", AuthError::is_transient, || {
            self.fetch_body()
        })
        .await?;

        let key_set = JsonWebKeySet::parse(&body)?;
        debug!(
            jwks_url = %self.jwks_url,
            key_count = key_set.keys.len(),
            "fetched JWKS"
        );
        Ok(key_set)
    }

    async fn fetch_body(&self) -> Result<String, AuthError> {
        info!(jwks_url = %self.jwks_url, "fetching JWKS");

        let response = self.http.get(&self.jwks_url).send().await.map_err(|e| {
            warn!(jwks_url = %self.jwks_url, error = %e, "JWKS request failed");
            AuthError::SigningKeySourceUnavailable(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(jwks_url = %self.jwks_url, status = %status, "JWKS endpoint returned error status");
            return Err(AuthError::SigningKeySourceUnavailable(format!(
                "status {status}"
            )));
        }

        response.text().await.map_err(|e| {
            warn!(jwks_url = %self.jwks_url, error = %e, "failed to read JWKS body");
            AuthError::SigningKeySourceUnavailable(e.to_string())
        })
    }
}
