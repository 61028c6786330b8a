/*
 * Responsibility
 * - URL layout of v1
 * - every route here is protected; the access middleware is applied in app.rs
 */
use axum::{Router, routing::get};

use crate::api::v1::handlers::claims::get_claims;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/claims", get(get_claims))
}
