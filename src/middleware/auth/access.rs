//! access token（JWT + mTLS 証明書 binding）検証 → AuthCtx を extensions に入れる
//!
//! 入力:
//! - `Authorization: Bearer <jwt>`（scheme は大文字小文字を区別しない）
//! - `X-SSL-CLIENT-CERT: <pem>`（TLS 終端の proxy が転送するクライアント証明書）
//!
//! 流れ:
//! - 2 つの header を取り出す（証明書は改行エスケープ / URL エンコードを戻す）
//! - `AuthorizationGate::authorize` に丸ごと渡す（順序・判定は gate 側の責務）
//! - Authenticated → `AuthCtx` を extensions に格納して次へ
//! - Denied → 理由はログにだけ残し、レスポンスは常に同じ 403
//!
//! Notes:
//! - 拒否ログはここで 1 行だけ（method / uri 付き）。gate 側では warn を出さない
//! - 401 ではなく 403 を返す（理由を外に漏らさない）

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderMap, Request, header},
    middleware::{self, Next},
    response::Response,
};

use crate::api::v1::extractors::AuthCtx;
use crate::error::AppError;
use crate::services::auth::ValidationOutcome;
use crate::services::auth::thumbprint::normalize_header_pem;
use crate::state::AppState;

pub const CLIENT_CERT_HEADER: &str = "x-ssl-client-cert";

/// `/api/v1/*` に認可を掛けるための middleware を適用する。
///
/// 例：
/// ```ignore
/// let v1 = middleware::auth::access::apply(api::v1::routes(), state.clone());
/// app = app.nest("/api/v1", v1);
/// ```
pub fn apply(router: Router<AppState>, state: AppState) -> Router<AppState> {
    // axum 0.8 の from_fn は State extractor を受け取れないため、`from_fn_with_state` で明示的に state を渡す
    router.layer(middleware::from_fn_with_state(state, access_middleware))
}

async fn access_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    // header が無い / 壊れている場合は None のまま gate に渡す（MissingCredentials になる）
    let token = bearer_token(req.headers());
    let cert = client_certificate(req.headers());

    let principal = match state
        .auth
        .authorize(token, cert.as_deref())
        .await
    {
        ValidationOutcome::Authenticated(principal) => principal,
        ValidationOutcome::Denied(err) => {
            tracing::warn!(
                error = %err,
                method = %req.method(),
                uri = %req.uri(),
                "access denied"
            );
            return Err(err.into());
        }
    };

    // middleware → extractor への受け渡し
    req.extensions_mut().insert(AuthCtx::from(principal));

    Ok(next.run(req).await)
}

/// Token from `Authorization: Bearer <token>`; the scheme is case-insensitive.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

fn client_certificate(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(CLIENT_CERT_HEADER)?.to_str().ok()?;
    let pem = normalize_header_pem(raw.trim());
    (!pem.is_empty()).then_some(pem)
}
