// Web服务器模块

pub mod channel;
pub mod error;
pub mod handlers;
pub mod state;
pub mod websocket;

pub use error::{ApiError, ApiResponse, ApiResult};
pub use state::AppState;
pub use websocket::WebSocketManager;

use axum::{
    routing::{delete, get, post},
    Router,
};

/// 构建 API 路由（不含中间件）
pub fn router(app_state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/downloads", post(handlers::create_download))
        .route("/downloads", get(handlers::list_downloads))
        .route("/downloads/continue", post(handlers::continue_downloads))
        .route(
            "/downloads/clear/finished",
            delete(handlers::clear_finished),
        )
        .route("/downloads/:id", get(handlers::get_download))
        .route("/downloads/:id", delete(handlers::cancel_download))
        .route("/downloads/:id/pause", post(handlers::pause_download))
        .route("/downloads/:id/resume", post(handlers::resume_download))
        .route("/channel", post(handlers::channel_call))
        .route("/ws", get(websocket::handle_websocket));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(handlers::health_check))
        .with_state(app_state)
}
