use anyhow::Context;
use axum::http::HeaderValue;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use widmate_downloader::{config::DEFAULT_CONFIG_PATH, logging, server, AppConfig, AppState};

/// WebSocket 连接超时
const WS_STALE_TIMEOUT: Duration = Duration::from_secs(120);

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let values: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match o.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!("忽略无效的 CORS 源: {}", o);
                    None
                }
            })
            .collect();
        AllowOrigin::list(values)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load_or_default(DEFAULT_CONFIG_PATH).await;

    // 必须保持 _log_guard 存活
    let _log_guard = logging::init_logging(&config.log);

    info!("WidMate Downloader v{} 启动中...", env!("CARGO_PKG_VERSION"));

    config.download.validate().context("配置校验失败")?;
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let cors_origins = config.server.cors_origins.clone();

    let app_state = AppState::new(config)?;
    info!("应用状态初始化完成");

    // 定期清理超时的 WebSocket 连接和节流记录
    {
        let state = app_state.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(WS_STALE_TIMEOUT / 2);
            loop {
                interval.tick().await;
                state.cleanup_connections(WS_STALE_TIMEOUT);
            }
        });
    }

    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&cors_origins));

    let app = server::router(app_state.clone()).layer(middleware);

    info!("服务器启动在: http://{}", addr);
    info!("API 基础路径: http://{}/api/v1", addr);
    info!("WebSocket: ws://{}/api/v1/ws", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("绑定地址失败: {}", addr))?;

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                error!("服务器错误: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("收到 Ctrl+C，开始优雅关闭...");
        }
    }

    app_state.shutdown().await;
    info!("应用已安全退出");

    Ok(())
}
