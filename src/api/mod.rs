//! API 模块
//!
//! HTTP handlers 和路由组装

pub mod chat;
pub mod deploy;
pub mod health;
pub mod system;

use axum::Router;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

/// 构建完整的 API 路由
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health
        .merge(health::router())
        // Deploy & Status
        .merge(deploy::router())
        // Capability scan
        .merge(system::router())
        // Chat pass-through
        .merge(chat::router())
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
