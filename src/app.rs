/*
 * Responsibility
 * - tracing / panic hook の初期化
 * - Config読み込み → 依存生成 (AuthorizationGate) → Router 組み立て
 * - Middleware の適用 (http 系は全体、mTLS bound token 認可は /api/v1 のみ)
 * - axum::serve() で起動
 */
use std::{panic, process};

use anyhow::Result;
use axum::{Router, routing::get};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api;
use crate::api::v1::handlers::health::health;
use crate::config::Config;
use crate::error::AppError;
use crate::middleware;
use crate::services::auth::build_authorization_gate;
use crate::state::AppState;

fn init_tracing() {
    // RUST_LOG wins, e.g. RUST_LOG=info,mtls_resource_server=debug
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    // default hook は fallback として残す（stderr に location / payload を出す）
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        // 起動方法によっては stderr が見えないので、必ず tracing にも流す
        tracing::error!(?info, "panic");

        // development では即落として気付けるようにする。production は default のまま

        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env()?;

    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        "starting resource server in {:?} mode on {}",
        config.app_env,
        config.addr
    );

    let state = build_state(&config)?;
    let app = build_router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_state(config: &Config) -> Result<AppState, AppError> {
    let auth = build_authorization_gate(&config.auth)?;
    Ok(AppState::new(auth))
}

pub fn build_router(state: AppState, config: &Config) -> Router {
    // /health は認可なし。/api/v1/* は全て証明書 binding 必須
    let v1 = middleware::auth::access::apply(api::v1::routes(), state.clone());

    let router = Router::new()
        .route("/health", get(health))
        .nest("/api/v1", v1)
        .fallback(|| async { AppError::not_found("route") })
        .with_state(state);

    // http_timeout は JWKS 取得の上限より長い（鍵取得の遅延は 408 ではなく 403 で返す）
    middleware::http::apply(router, config.http_timeout)
}
