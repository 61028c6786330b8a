/*
 * Responsibility
 * - the authenticated context as handlers see it
 * - the access middleware fills it from a gate Principal and stores it in
 *   request extensions; handlers only depend on this type
 */

use crate::services::auth::Principal;
use crate::services::auth::access_jwt::TokenClaims;

/// Context attached to an authorized request.
///
/// - `subject`: `sub` claim, if the issuer sets one
/// - `thumbprint`: SHA-256 of the client certificate the token is bound to
/// - `claims`: every validated claim, for handler-level policy checks
#[derive(Debug, Clone)]
pub struct AuthCtx {
    pub subject: Option<String>,
    pub thumbprint: String,
    pub claims: TokenClaims,
}

impl From<Principal> for AuthCtx {
    fn from(principal: Principal) -> Self {
        Self {
            subject: principal.claims.sub.clone(),
            thumbprint: principal.thumbprint.into_string(),
            claims: principal.claims,
        }
    }
}
