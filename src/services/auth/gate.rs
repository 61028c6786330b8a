//! mTLS certificate-bound access token の認可ゲート
//!
//! 1 リクエストごとに次の順で検証する（途中で失敗したらそこで Denied）：
//! 1. Bearer token / クライアント証明書が揃っているか
//! 2. 証明書 PEM → SHA-256 thumbprint
//! 3. token の `cnf` と thumbprint の一致（署名検証前・JWKS 取得前）
//! 4. header の `kid` → JWKS から署名鍵を解決 → 署名 / iss / aud / 有効期間
//!
//! Notes:
//! - 失敗理由は `AuthError` として返すが、HTTP 層では全て同じ 403 に潰す
//! - ログは middleware 側で 1 行だけ出す（method / uri 付き）。ここでは debug のみ

use std::time::Duration;

use tracing::{debug, info};

use crate::services::auth::AuthError;
use crate::services::auth::access_jwt::{TokenClaims, TokenValidator};
use crate::services::auth::cnf;
use crate::services::auth::jwks::{ResolvedKey, SigningKeyResolver};
use crate::services::auth::thumbprint::{CertificateThumbprint, thumbprint};

/// 認証済みの呼び出し元：検証済み claims + token が束縛されている証明書
#[derive(Debug, Clone)]
pub struct Principal {
    pub claims: TokenClaims,
    pub thumbprint: CertificateThumbprint,
}

#[derive(Debug)]
pub enum ValidationOutcome {
    Authenticated(Principal),
    Denied(AuthError),
}

impl ValidationOutcome {
    pub fn into_result(self) -> Result<Principal, AuthError> {
        match self {
            Self::Authenticated(principal) => Ok(principal),
            Self::Denied(err) => Err(err),
        }
    }
}

#[derive(Debug)]
pub struct AuthorizationGate {
    resolver: SigningKeyResolver,
    validator: TokenValidator,
    /// 署名鍵の解決（リトライ込み）に使える上限時間
    key_fetch_budget: Option<Duration>,
}

impl AuthorizationGate {
    pub fn new(resolver: SigningKeyResolver, validator: TokenValidator) -> Self {
        Self {
            resolver,
            validator,
            key_fetch_budget: None,
        }
    }

    /// 鍵解決を `budget` で打ち切る。超過は `SigningKeySourceUnavailable`。
    ///
    /// HTTP 層の timeout より短くしておくこと（そうしないと 403 ではなく 408 になる）。
    pub fn with_key_fetch_budget(mut self, budget: Duration) -> Self {
        self.key_fetch_budget = Some(budget);
        self
    }

    pub async fn authorize(
        &self,
        bearer_token: Option<&str>,
        client_cert_pem: Option<&str>,
    ) -> ValidationOutcome {
        match self.run(bearer_token, client_cert_pem).await {
            Ok(principal) => {
                info!(
                    sub = principal.claims.sub.as_deref().unwrap_or("-"),
                    thumbprint = %principal.thumbprint,
                    "request authorized"
                );
                ValidationOutcome::Authenticated(principal)
            }
            Err(err) => ValidationOutcome::Denied(err),
        }
    }

    async fn run(
        &self,
        bearer_token: Option<&str>,
        client_cert_pem: Option<&str>,
    ) -> Result<Principal, AuthError> {
        // Start: どちらか欠けていれば何もせず拒否
        let token = bearer_token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingCredentials("bearer token"))?;
        let cert = client_cert_pem
            .filter(|c| !c.trim().is_empty())
            .ok_or(AuthError::MissingCredentials("client certificate"))?;

        let thumbprint = thumbprint(cert)?;
        debug!(thumbprint = %thumbprint, "client certificate accepted");

        // BindingChecked: 未検証 payload の cnf を見るだけ。ネットワークには出ない
        if !cnf::is_bound(token, &thumbprint) {
            return Err(AuthError::NotBound);
        }
        debug!("token is bound to the client certificate");

        // 偽造 cnf はここで署名検証に落ちる
        let kid = TokenValidator::read_key_id(token)?;
        let key = self.resolve_key(&kid).await?;
        let claims = self.validator.validate(token, &key)?;

        Ok(Principal { claims, thumbprint })
    }

    async fn resolve_key(&self, kid: &str) -> Result<ResolvedKey, AuthError> {
        let Some(budget) = self.key_fetch_budget else {
            return self.resolver.resolve_key(kid).await;
        };

        tokio::time::timeout(budget, self.resolver.resolve_key(kid))
            .await
            .unwrap_or_else(|_| {
                debug!(kid = %kid, budget_ms = budget.as_millis(), "signing key lookup timed out");
                Err(AuthError::SigningKeySourceUnavailable(
                    "signing key lookup timed out".into(),
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        AUDIENCE, CLIENT_CERT_PEM, CLIENT_CERT_THUMBPRINT, ISSUER, KEY_A_N,
        OTHER_CLIENT_CERT_PEM, SIGNING_KEY_A_PEM, auth_config, capture_logs, jwks_body, sign_rs256,
    };
    use serde_json::{Value, json};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn gate_with_jwks(expected_fetches: u64) -> (AuthorizationGate, MockServer) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_body(&[("key-a", KEY_A_N)])))
            .expect(expected_fetches)
            .mount(&server)
            .await;

        let config = auth_config(&format!("{}/jwks", server.uri()));
        let gate = AuthorizationGate::new(
            SigningKeyResolver::from_config(&config).unwrap(),
            TokenValidator::from_config(&config),
        );
        (gate, server)
    }

    fn claims(cnf: &str) -> Value {
        let now = chrono::Utc::now().timestamp();
        json!({
            "iss": ISSUER,
            "aud": AUDIENCE,
            "sub": "client-a",
            "iat": now,
            "exp": now + 300,
            "cnf": cnf,
        })
    }

    #[tokio::test]
    async fn bound_and_valid_token_is_authenticated() {
        let (gate, _server) = gate_with_jwks(1).await;
        let token = sign_rs256(SIGNING_KEY_A_PEM, "key-a", &claims(CLIENT_CERT_THUMBPRINT));

        let principal = gate
            .authorize(Some(&token), Some(CLIENT_CERT_PEM))
            .await
            .into_result()
            .unwrap();

        assert_eq!(principal.thumbprint.as_str(), CLIENT_CERT_THUMBPRINT);
        assert_eq!(principal.claims.sub.as_deref(), Some("client-a"));
    }

    #[tokio::test]
    async fn missing_credentials_are_denied() {
        let (gate, _server) = gate_with_jwks(0).await;
        let token = sign_rs256(SIGNING_KEY_A_PEM, "key-a", &claims(CLIENT_CERT_THUMBPRINT));

        let denied = gate.authorize(None, Some(CLIENT_CERT_PEM)).await;
        assert!(matches!(
            denied,
            ValidationOutcome::Denied(AuthError::MissingCredentials(_))
        ));

        let denied = gate.authorize(Some(&token), None).await;
        assert!(matches!(
            denied,
            ValidationOutcome::Denied(AuthError::MissingCredentials(_))
        ));
    }

    #[tokio::test]
    async fn bad_certificate_is_denied_before_fetch() {
        let (gate, _server) = gate_with_jwks(0).await;
        let token = sign_rs256(SIGNING_KEY_A_PEM, "key-a", &claims(CLIENT_CERT_THUMBPRINT));

        let err = gate
            .authorize(Some(&token), Some("garbage"))
            .await
            .into_result()
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidCertificateFormat);
    }

    #[tokio::test]
    async fn unbound_token_never_reaches_jwks() {
        let (gate, server) = gate_with_jwks(0).await;
        let token = sign_rs256(SIGNING_KEY_A_PEM, "key-a", &claims(CLIENT_CERT_THUMBPRINT));

        let err = gate
            .authorize(Some(&token), Some(OTHER_CLIENT_CERT_PEM))
            .await
            .into_result()
            .unwrap_err();
        assert_eq!(err, AuthError::NotBound);
        server.verify().await;
    }

    #[tokio::test]
    async fn unknown_kid_is_denied() {
        let (gate, _server) = gate_with_jwks(1).await;
        let token = sign_rs256(SIGNING_KEY_A_PEM, "rotated", &claims(CLIENT_CERT_THUMBPRINT));

        let err = gate
            .authorize(Some(&token), Some(CLIENT_CERT_PEM))
            .await
            .into_result()
            .unwrap_err();
        assert_eq!(
            err,
            AuthError::JwkNotFoundByKeyId {
                kid: "rotated".into()
            }
        );
    }

    #[tokio::test]
    async fn slow_key_source_is_cut_off_by_budget() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(jwks_body(&[("key-a", KEY_A_N)]))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let config = auth_config(&format!("{}/jwks", server.uri()));
        let gate = AuthorizationGate::new(
            SigningKeyResolver::from_config(&config).unwrap(),
            TokenValidator::from_config(&config),
        )
        .with_key_fetch_budget(Duration::from_millis(200));
        let token = sign_rs256(SIGNING_KEY_A_PEM, "key-a", &claims(CLIENT_CERT_THUMBPRINT));

        let err = gate
            .authorize(Some(&token), Some(CLIENT_CERT_PEM))
            .await
            .into_result()
            .unwrap_err();
        assert!(matches!(err, AuthError::SigningKeySourceUnavailable(_)));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn denial_is_not_logged_at_warn_by_the_gate() {
        let (gate, _server) = gate_with_jwks(0).await;
        let token = sign_rs256(SIGNING_KEY_A_PEM, "key-a", &claims(CLIENT_CERT_THUMBPRINT));
        let (logs, _guard) = capture_logs(tracing::Level::WARN);

        let outcome = gate.authorize(Some(&token), Some(OTHER_CLIENT_CERT_PEM)).await;

        assert!(matches!(outcome, ValidationOutcome::Denied(AuthError::NotBound)));
        assert_eq!(logs.contents(), "");
    }
}
