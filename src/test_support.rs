//! Fixtures shared by unit tests.
//!
//! Keys and certificates were generated with openssl; the thumbprints are
//! `openssl x509 -outform DER | sha256sum` of the certificates.

use std::sync::{Arc, Mutex};

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header};
use serde_json::Value;

use crate::config::AuthConfig;
use crate::services::auth::jwks::ResolvedKey;

pub const SIGNING_KEY_A_PEM: &str = include_str!("../tests/fixtures/signing_key_a.pem");
pub const SIGNING_KEY_B_PEM: &str = include_str!("../tests/fixtures/signing_key_b.pem");
pub const CLIENT_CERT_PEM: &str = include_str!("../tests/fixtures/client_cert.pem");
pub const OTHER_CLIENT_CERT_PEM: &str = include_str!("../tests/fixtures/other_client_cert.pem");
pub const CLIENT_CSR_PEM: &str = include_str!("../tests/fixtures/client_csr.pem");

pub const CLIENT_CERT_THUMBPRINT: &str =
    "a0d0f7b5cea159dacaf2d1d6a1ca421680765efaab52928c5ccc45357c2f01d3";
pub const OTHER_CLIENT_CERT_THUMBPRINT: &str =
    "b2f1ca35dae652c00bb5d418f78e964b43f7c024cc33cf9ee5b13535ca68f7f4";

/// base64url modulus of `signing_key_a.pem`.
pub const KEY_A_N: &str = "qowgL8AMNngrGsEgzRBwZKCLxcgTv7LgfHO6sEBoA2ZkXyUfCz7G8G6ybR1hxh2iEKTlEJlpuGs3fbZMQy4VM644KHxdHW3fIKz9GmV_zoOoxoZ7hI33SSuMBOUS-vZEA7LydFcN46K9tByKWTzCOrOB7K60p1is7MfdphibUPgfL3S4OO9GsvE7l2d2GpcGsYbQSrle-FgkOfV_Dpi4pDEowqzpGLbJ9El-bIs0bZppSeGcFZZ28hRXXTi4deEybwHBH9DebVhZgv6ME3IOYdiU64xjf3UQL3sIHsbY5XYhNBOq7Gk2hJPLIv7utWqQ81eptSWATi4eGIABw4mprQ";
/// Same modulus left-padded with a zero sign byte.
pub const KEY_A_N_ZERO_PADDED: &str = "AKqMIC_ADDZ4KxrBIM0QcGSgi8XIE7-y4HxzurBAaANmZF8lHws-xvBusm0dYcYdohCk5RCZabhrN322TEMuFTOuOCh8XR1t3yCs_Rplf86DqMaGe4SN90krjATlEvr2RAOy8nRXDeOivbQcilk8wjqzgeyutKdYrOzH3aYYm1D4Hy90uDjvRrLxO5dndhqXBrGG0Eq5XvhYJDn1fw6YuKQxKMKs6Ri2yfRJfmyLNG2aaUnhnBWWdvIUV104uHXhMm8BwR_Q3m1YWYL-jBNyDmHYlOuMY391EC97CB7G2OV2ITQTquxpNoSTyyL-7rVqkPNXqbUlgE4uHhiAAcOJqa0";
/// base64url modulus of `signing_key_b.pem`.
pub const KEY_B_N: &str = "t6KaHUVOCcldUwvtnC3iM4e7H_U4wh9DS7VNUHiEUdJPA7gxTPYe_kla99HWjnsY1cshkBmmA0F5pM1KruOCcyZTAXcvrIueVbaJ5mDHcHVmPT8XHFXsq1k6SfI9riMSxkk7h4-4wIa7Em3KrejijTNnObIJxvtlocKaqZUTxW1qU1Dl2Pnh2EHgnzZ84ch2oxdRRGWuUQXrfvWi3Np4SEha-Qsj66MN0MIbybfPM4AEp-par6P1JY22aJwDW_kiZbcWzbTvJCMSkTHKR0yZMIAl9rFeWaXhutaS4yz24zO5-qGJmUq1mThAtYH-Lr-g08mxRlH7VV_6gBoYDTtzJw";
pub const RSA_E: &str = "AQAB";

pub const ISSUER: &str = "https://idp.example.com";
pub const AUDIENCE: &str = "orders-api";

pub fn auth_config(jwks_url: &str) -> AuthConfig {
    AuthConfig {
        request_timeout: std::time::Duration::from_secs(5),
        clock_skew: std::time::Duration::ZERO,
        audiences: vec![AUDIENCE.to_string(), "billing-api".to_string()],
        issuer: ISSUER.to_string(),
        jwks_url: jwks_url.to_string(),
        custom_token_lifetime: None,
        jwks_cache_ttl: None,
        jwks_fetch_attempts: 1,
    }
}

pub fn resolved_key(kid: &str, n: &str) -> ResolvedKey {
    let key = DecodingKey::from_rsa_components(n, RSA_E).unwrap();
    ResolvedKey::new(kid, key)
}

pub fn sign_rs256(private_pem: &str, kid: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(private_pem.as_bytes()).unwrap();
    jsonwebtoken::encode(&header, claims, &key).unwrap()
}

pub fn jwks_body(keys: &[(&str, &str)]) -> Value {
    let keys = keys
        .iter()
        .map(|(kid, n)| {
            serde_json::json!({
                "kty": "RSA",
                "use": "sig",
                "alg": "RS256",
                "kid": kid,
                "n": n,
                "e": RSA_E,
            })
        })
        .collect::<Vec<_>>();
    serde_json::json!({ "keys": keys })
}

/// Log output written while the returned guard is alive (current thread only).
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub fn capture_logs(level: tracing::Level) -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let captured = CapturedLogs::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    (captured, tracing::subscriber::set_default(subscriber))
}
