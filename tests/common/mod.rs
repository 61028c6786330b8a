#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use mtls_resource_server::app::{build_router, build_state};
use mtls_resource_server::config::{AppEnv, AuthConfig, Config};
use serde_json::{Value, json};

pub const SIGNING_KEY_A_PEM: &str = include_str!("../fixtures/signing_key_a.pem");
pub const SIGNING_KEY_B_PEM: &str = include_str!("../fixtures/signing_key_b.pem");
pub const CLIENT_CERT_PEM: &str = include_str!("../fixtures/client_cert.pem");
pub const OTHER_CLIENT_CERT_PEM: &str = include_str!("../fixtures/other_client_cert.pem");

pub const CLIENT_CERT_THUMBPRINT: &str =
    "a0d0f7b5cea159dacaf2d1d6a1ca421680765efaab52928c5ccc45357c2f01d3";

pub const KEY_A_N: &str = "qowgL8AMNngrGsEgzRBwZKCLxcgTv7LgfHO6sEBoA2ZkXyUfCz7G8G6ybR1hxh2iEKTlEJlpuGs3fbZMQy4VM644KHxdHW3fIKz9GmV_zoOoxoZ7hI33SSuMBOUS-vZEA7LydFcN46K9tByKWTzCOrOB7K60p1is7MfdphibUPgfL3S4OO9GsvE7l2d2GpcGsYbQSrle-FgkOfV_Dpi4pDEowqzpGLbJ9El-bIs0bZppSeGcFZZ28hRXXTi4deEybwHBH9DebVhZgv6ME3IOYdiU64xjf3UQL3sIHsbY5XYhNBOq7Gk2hJPLIv7utWqQ81eptSWATi4eGIABw4mprQ";

pub const ISSUER: &str = "https://idp.example.com";
pub const AUDIENCE: &str = "orders-api";

pub fn config(jwks_url: &str) -> Config {
    config_with_timeouts(jwks_url, Duration::from_secs(5), Duration::from_secs(10))
}

/// `jwks_timeout` bounds each JWKS request; `http_timeout` the whole request.
pub fn config_with_timeouts(
    jwks_url: &str,
    jwks_timeout: Duration,
    http_timeout: Duration,
) -> Config {
    Config {
        addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        app_env: AppEnv::Development,
        http_timeout,
        auth: AuthConfig {
            request_timeout: jwks_timeout,
            clock_skew: Duration::ZERO,
            audiences: vec![AUDIENCE.to_string()],
            issuer: ISSUER.to_string(),
            jwks_url: jwks_url.to_string(),
            custom_token_lifetime: None,
            jwks_cache_ttl: None,
            jwks_fetch_attempts: 1,
        },
    }
}

pub fn app(config: &Config) -> Router {
    let state = build_state(config).expect("state");
    build_router(state, config)
}

pub fn jwks_body() -> Value {
    json!({
        "keys": [{ "kty": "RSA", "use": "sig", "kid": "key-a", "n": KEY_A_N, "e": "AQAB" }]
    })
}

pub fn claims(cnf: &str) -> Value {
    let now = chrono::Utc::now().timestamp();
    json!({
        "iss": ISSUER,
        "aud": AUDIENCE,
        "sub": "client-a",
        "iat": now,
        "nbf": now,
        "exp": now + 300,
        "cnf": cnf,
        "scope": "orders:read",
    })
}

pub fn sign(private_pem: &str, kid: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(private_pem.as_bytes()).expect("key");
    jsonwebtoken::encode(&header, claims, &key).expect("token")
}

/// Certificate as an nginx-style header value (escaped newlines).
pub fn cert_header(pem: &str) -> String {
    pem.trim_end().replace('\n', "\\n")
}
