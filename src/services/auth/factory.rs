/// Factory: build the `AuthorizationGate` from `AuthConfig`.
use std::sync::Arc;

use crate::config::AuthConfig;
use crate::error::AppError;
use crate::services::auth::AuthorizationGate;
use crate::services::auth::access_jwt::TokenValidator;
use crate::services::auth::jwks::SigningKeyResolver;

pub fn build_authorization_gate(config: &AuthConfig) -> Result<Arc<AuthorizationGate>, AppError> {
    let resolver = SigningKeyResolver::from_config(config).map_err(|e| {
        tracing::error!(error = %e, "failed to build JWKS client");
        AppError::Internal
    })?;

    tracing::info!(
        jwks_url = %resolver.jwks_url(),
        issuer = %config.issuer,
        audiences = ?config.audiences,
        cache_ttl_secs = config.jwks_cache_ttl.map(|t| t.as_secs()),
        fetch_attempts = config.jwks_fetch_attempts,
        key_fetch_budget_ms = config.key_fetch_budget().as_millis(),
        "authorization gate ready"
    );

    let validator = TokenValidator::from_config(config);
    let gate =
        AuthorizationGate::new(resolver, validator).with_key_fetch_budget(config.key_fetch_budget());
    Ok(Arc::new(gate))
}
