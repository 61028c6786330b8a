use std::fmt;
use std::time::Duration;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::AuthConfig;
use crate::services::auth::AuthError;
use crate::services::auth::jwks::ResolvedKey;

const RSA_ALGORITHMS: [Algorithm; 6] = [
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
];

/// `aud` may be a single string or an array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    pub fn values(&self) -> impl Iterator<Item = &str> {
        let values: &[String] = match self {
            Audience::Single(s) => std::slice::from_ref(s),
            Audience::Multiple(v) => v,
        };
        values.iter().map(String::as_str)
    }
}

/// Access token claims.
///
/// Registered claims are typed; everything else (scopes, roles, custom
/// application claims) is kept in `extra` for downstream handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub iss: String,
    pub aud: Audience,
    #[serde(deserialize_with = "numeric_date::deserialize")]
    pub exp: i64,
    #[serde(
        default,
        deserialize_with = "numeric_date::deserialize_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub nbf: Option<i64>,
    #[serde(
        default,
        deserialize_with = "numeric_date::deserialize_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cnf: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// RFC 7519 NumericDate: integer or fractional seconds since the epoch,
/// truncated to whole seconds.
mod numeric_date {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};
    use serde_json::Number;

    // i64::MAX is not exactly representable as f64; the bound is exclusive.
    const MAX_SECONDS: f64 = 9_223_372_036_854_775_807.0;

    fn whole_seconds<E: Error>(n: &Number) -> Result<i64, E> {
        if let Some(secs) = n.as_i64() {
            return Ok(secs);
        }
        match n.as_f64() {
            Some(f) if f.is_finite() && f > -MAX_SECONDS && f < MAX_SECONDS => {
                Ok(f.trunc() as i64)
            }
            _ => Err(E::custom(format!("NumericDate out of range: {n}"))),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        whole_seconds(&Number::deserialize(deserializer)?)
    }

    pub fn deserialize_option<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<i64>, D::Error> {
        Option::<Number>::deserialize(deserializer)?
            .map(|n| whole_seconds(&n))
            .transpose()
    }
}

/// Why a lifetime check failed. Logged, never returned.
#[derive(Debug, PartialEq, Eq)]
enum LifetimeRejection {
    NotYetValid { valid_from: i64, now: i64 },
    Expired { valid_until: i64, now: i64 },
    InvalidWindow { not_before: i64, expires: i64 },
}

impl fmt::Display for LifetimeRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotYetValid { valid_from, now } => {
                write!(f, "token not valid before {valid_from} (now {now})")
            }
            Self::Expired { valid_until, now } => {
                write!(f, "token expired at {valid_until} (now {now})")
            }
            Self::InvalidWindow {
                not_before,
                expires,
            } => write!(f, "nbf {not_before} is after exp {expires}"),
        }
    }
}

/// RSA access-token validator for one issuer and audience set.
#[derive(Debug, Clone)]
pub struct TokenValidator {
    issuer: String,
    audiences: Vec<String>,
    clock_skew: Duration,
    custom_token_lifetime: Option<Duration>,
}

impl TokenValidator {
    pub fn new(
        issuer: impl Into<String>,
        audiences: Vec<String>,
        clock_skew: Duration,
        custom_token_lifetime: Option<Duration>,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            audiences,
            clock_skew,
            custom_token_lifetime,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            config.issuer.clone(),
            config.audiences.clone(),
            config.clock_skew,
            config.custom_token_lifetime,
        )
    }

    /// Reads `kid` from the unverified header so the signing key can be
    /// resolved before the token is verified.
    pub fn read_key_id(token: &str) -> Result<String, AuthError> {
        let header = jsonwebtoken::decode_header(token).map_err(|e| {
            warn!(error = %e, "cannot decode access token header");
            AuthError::TokenMalformed
        })?;

        header.kid.filter(|kid| !kid.is_empty()).ok_or_else(|| {
            warn!("access token header has no kid");
            AuthError::TokenMalformed
        })
    }

    pub fn validate(&self, token: &str, key: &ResolvedKey) -> Result<TokenClaims, AuthError> {
        self.validate_at(token, key, chrono::Utc::now().timestamp())
    }

    /// Verifies signature, issuer, audience and lifetime at `now` (unix
    /// seconds). The specific failure is logged; callers only see
    /// `TokenMalformed` or `TokenValidationFailed`.
    pub fn validate_at(
        &self,
        token: &str,
        key: &ResolvedKey,
        now: i64,
    ) -> Result<TokenClaims, AuthError> {
        let header = jsonwebtoken::decode_header(token).map_err(|e| {
            warn!(error = %e, "cannot decode access token header");
            AuthError::TokenMalformed
        })?;

        if !RSA_ALGORITHMS.contains(&header.alg) {
            warn!(alg = ?header.alg, "access token is not RSA signed");
            return Err(AuthError::TokenValidationFailed);
        }

        let validation = self.validation(header.alg);
        let data = jsonwebtoken::decode::<TokenClaims>(token, key.decoding_key(), &validation)
            .map_err(|e| {
                warn!(
                    kid = %key.kid(),
                    issuer = %self.issuer,
                    audiences = ?self.audiences,
                    error = %e,
                    "access token validation failed"
                );
                match e.kind() {
                    ErrorKind::InvalidToken
                    | ErrorKind::Base64(_)
                    | ErrorKind::Json(_)
                    | ErrorKind::Utf8(_) => AuthError::TokenMalformed,
                    _ => AuthError::TokenValidationFailed,
                }
            })?;

        let claims = data.claims;
        if let Err(rejection) = self.check_lifetime(&claims, now) {
            warn!(kid = %key.kid(), reason = %rejection, "access token lifetime check failed");
            return Err(AuthError::TokenValidationFailed);
        }

        Ok(claims)
    }

    fn validation(&self, alg: Algorithm) -> Validation {
        let mut validation = Validation::new(alg);
        validation.algorithms = vec![alg];
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&self.audiences);
        // `exp` presence is enforced by `TokenClaims` itself: jsonwebtoken
        // only understands integer NumericDates.
        validation.set_required_spec_claims(&["iss", "aud"]);
        // Lifetime is checked in `check_lifetime` so the custom window can
        // replace `exp`.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.leeway = 0;
        validation
    }

    fn check_lifetime(&self, claims: &TokenClaims, now: i64) -> Result<(), LifetimeRejection> {
        let skew = i64::try_from(self.clock_skew.as_secs()).unwrap_or(i64::MAX);

        let (not_before, expires) = match self.custom_token_lifetime {
            Some(lifetime) => {
                let valid_from = claims.iat.or(claims.nbf).unwrap_or(0);
                let lifetime = i64::try_from(lifetime.as_secs()).unwrap_or(i64::MAX);
                (Some(valid_from), valid_from.saturating_add(lifetime))
            }
            None => (claims.nbf, claims.exp),
        };

        if let Some(not_before) = not_before {
            if not_before > expires {
                return Err(LifetimeRejection::InvalidWindow {
                    not_before,
                    expires,
                });
            }
            if not_before > now.saturating_add(skew) {
                return Err(LifetimeRejection::NotYetValid {
                    valid_from: not_before,
                    now,
                });
            }
        }

        if expires < now.saturating_sub(skew) {
            return Err(LifetimeRejection::Expired {
                valid_until: expires,
                now,
            });
        }

        Ok(())
    }
}
