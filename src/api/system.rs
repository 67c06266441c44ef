//! 主机能力 API
//!
//! 包含 /api/scan 端点

use axum::{extract::State, routing::get, Json, Router};
use std::sync::Arc;

use crate::domain::system::SystemSpecs;
use crate::state::AppState;

/// 创建扫描路由
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/scan", get(scan))
}

/// 扫描主机能力
///
/// GET /api/scan
async fn scan(State(state): State<Arc<AppState>>) -> Json<SystemSpecs> {
    Json(state.scanner.scan().await)
}
