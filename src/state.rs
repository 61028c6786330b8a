/*
 * Responsibility
 * - Router に紐づける共有コンテキスト (AppState)
 *   - auth: 設定から組み立てた AuthorizationGate（起動後は読み取り専用）
 * - Clone 前提で持つ (内部は Arc なので cheap)
 */
use std::sync::Arc;

use crate::services::auth::AuthorizationGate;

#[derive(Clone, Debug)]
pub struct AppState {
    pub auth: Arc<AuthorizationGate>,
}

impl AppState {
    pub fn new(auth: Arc<AuthorizationGate>) -> Self {
        Self { auth }
    }
}
