//! Resource server that only admits requests carrying a certificate-bound
//! access token (OAuth 2.0 mutual-TLS, RFC 8705 section 3).
//!
//! The TLS terminator forwards the client certificate in `X-SSL-CLIENT-CERT`;
//! the token's `cnf` claim must equal the certificate's SHA-256 thumbprint and
//! the token must verify against the issuer's JWKS.

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod retry;
pub mod services;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;
