// 应用状态

use crate::config::AppConfig;
use crate::downloader::DownloadManager;
use crate::events::LogSink;
use crate::server::websocket::WebSocketManager;
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// 应用全局状态
#[derive(Clone)]
pub struct AppState {
    /// 下载管理器
    pub download_manager: Arc<DownloadManager>,
    /// WebSocket 管理器（同时是下载事件接收端）
    pub ws_manager: Arc<WebSocketManager>,
    /// 应用配置
    pub config: Arc<RwLock<AppConfig>>,
}

impl AppState {
    /// 根据配置创建下载管理器并注册事件接收端
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let download_manager =
            DownloadManager::new(&config.download).context("创建下载管理器失败")?;

        let ws_manager = Arc::new(WebSocketManager::new(Duration::from_millis(
            config.server.ws_progress_interval_ms,
        )));
        download_manager.add_sink(Arc::new(LogSink));
        download_manager.add_sink(ws_manager.clone());

        Ok(Self {
            download_manager: Arc::new(download_manager),
            ws_manager,
            config: Arc::new(RwLock::new(config)),
        })
    }

    /// 清理超时的 WebSocket 连接，并回收已移除任务的进度节流记录
    pub fn cleanup_connections(&self, stale_timeout: Duration) {
        self.ws_manager.cleanup_stale_connections(stale_timeout);
        let manager = &self.download_manager;
        self.ws_manager
            .prune_progress_keys(|id| manager.task(id).is_some());
    }

    /// 关闭下载管理器，停止所有传输
    pub async fn shutdown(&self) {
        self.download_manager.shutdown().await;
    }
}
