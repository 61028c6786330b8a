/*
 * Responsibility
 * - middleware public interface
 * - http: cross-cutting layers for every route
 * - auth: certificate-bound access token check for protected routes
 */
pub mod auth;
pub mod http;
