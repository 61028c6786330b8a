/*
 * Responsibility
 * - GET /api/v1/claims
 * - echo the authenticated principal back to the caller
 */
use axum::Json;
use serde::Serialize;

use crate::api::v1::extractors::AuthCtxExtractor;
use crate::services::auth::access_jwt::TokenClaims;

#[derive(Debug, Serialize)]
pub struct ClaimsResponse {
    pub subject: Option<String>,
    pub thumbprint: String,
    pub claims: TokenClaims,
}

pub async fn get_claims(AuthCtxExtractor(ctx): AuthCtxExtractor) -> Json<ClaimsResponse> {
    Json(ClaimsResponse {
        subject: ctx.subject,
        thumbprint: ctx.thumbprint,
        claims: ctx.claims,
    })
}
