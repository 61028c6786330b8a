/*!
 * Authentication context extractor
 *
 * Responsibility:
 * - hand the authenticated principal (AuthCtx) to handlers
 * - axum specifics live in core, the type itself in types
 *
 * Public API:
 * - AuthCtx
 * - AuthCtxExtractor
 */

mod core;
mod types;

pub use core::AuthCtxExtractor;
pub use types::AuthCtx;
