//! Certificate binding check on the unverified token payload.
//!
//! Runs before any key is fetched so that an unbound token is refused
//! without touching the JWKS endpoint. The signature is verified later; a
//! forged `cnf` therefore cannot get past the full pipeline.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::Value;
use tracing::debug;

use crate::services::auth::thumbprint::CertificateThumbprint;

/// `true` iff the payload has a string `cnf` claim equal to `thumbprint`.
pub fn is_bound(token: &str, thumbprint: &CertificateThumbprint) -> bool {
    match unverified_cnf(token) {
        Some(Value::String(cnf)) => cnf == thumbprint.as_str(),
        Some(other) => {
            debug!(cnf = %other, "cnf claim is not a string");
            false
        }
        None => false,
    }
}

fn unverified_cnf(token: &str) -> Option<Value> {
    let mut parts = token.split('.');
    let (_header, payload) = (parts.next()?, parts.next()?);
    if parts.next().is_none() {
        debug!("token does not have three segments");
        return None;
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| debug!(error = %e, "token payload is not base64url"))
        .ok()?;

    let mut payload: serde_json::Map<String, Value> = serde_json::from_slice(&bytes)
        .map_err(|e| debug!(error = %e, "token payload is not a JSON object"))
        .ok()?;

    payload.remove("cnf")
}
