//! WebSocket 连接管理器
//!
//! 管理所有 WebSocket 连接，并作为事件接收端把下载事件广播出去。
//! 进度事件按任务 ID 节流，其他事件直接发送

use crate::events::{DownloadEvent, EventSink, ProgressThrottler, SinkError};
use crate::server::websocket::message::WsServerMessage;
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// WebSocket 连接信息
#[derive(Debug)]
pub struct WsConnection {
    pub id: String,
    pub sender: mpsc::UnboundedSender<WsServerMessage>,
    pub connected_at: Instant,
    pub last_active: Instant,
}

#[derive(Debug)]
pub struct WebSocketManager {
    connections: DashMap<String, WsConnection>,
    throttler: ProgressThrottler,
}

impl WebSocketManager {
    pub fn new(progress_interval: Duration) -> Self {
        Self {
            connections: DashMap::new(),
            throttler: ProgressThrottler::new(progress_interval),
        }
    }

    /// 注册新连接，返回用于接收服务端消息的接收器
    pub fn register(&self, connection_id: String) -> mpsc::UnboundedReceiver<WsServerMessage> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let now = Instant::now();

        self.connections.insert(
            connection_id.clone(),
            WsConnection {
                id: connection_id.clone(),
                sender,
                connected_at: now,
                last_active: now,
            },
        );
        info!("WebSocket 连接已注册: {}", connection_id);

        receiver
    }

    pub fn unregister(&self, connection_id: &str) {
        if let Some((_, conn)) = self.connections.remove(connection_id) {
            info!(
                "WebSocket 连接已移除: {}, 持续 {}s",
                connection_id,
                conn.connected_at.elapsed().as_secs()
            );
        }
    }

    /// 更新连接活动时间
    pub fn touch(&self, connection_id: &str) {
        if let Some(mut conn) = self.connections.get_mut(connection_id) {
            conn.last_active = Instant::now();
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// 向指定连接发送消息
    pub fn send_to(&self, connection_id: &str, message: WsServerMessage) -> bool {
        let Some(conn) = self.connections.get(connection_id) else {
            debug!("连接不存在: {}", connection_id);
            return false;
        };
        match conn.sender.send(message) {
            Ok(()) => true,
            Err(e) => {
                warn!("发送消息失败（可能连接已关闭）: {} - {}", connection_id, e);
                false
            }
        }
    }

    /// 广播消息给所有连接，发送失败的连接被移除
    pub fn broadcast(&self, message: WsServerMessage) {
        let failed: Vec<String> = self
            .connections
            .iter()
            .filter(|conn| conn.sender.send(message.clone()).is_err())
            .map(|conn| conn.id.clone())
            .collect();

        for id in failed {
            self.unregister(&id);
        }
    }

    /// 清理超时连接
    pub fn cleanup_stale_connections(&self, timeout: Duration) -> usize {
        let now = Instant::now();
        let stale: Vec<String> = self
            .connections
            .iter()
            .filter(|conn| now.duration_since(conn.last_active) > timeout)
            .map(|conn| conn.id.clone())
            .collect();

        for id in &stale {
            warn!("清理超时连接: {}", id);
            self.unregister(id);
        }
        stale.len()
    }

    /// 清除已不存在任务的节流记录
    ///
    /// 取消或关闭的任务不会产生终态事件，需要定期按注册表回收
    pub fn prune_progress_keys(&self, is_live: impl Fn(&str) -> bool) -> usize {
        let removed = self.throttler.retain(is_live);
        if removed > 0 {
            debug!("清理节流记录: {} 个", removed);
        }
        removed
    }

    pub fn tracked_progress_keys(&self) -> usize {
        self.throttler.tracked_keys()
    }
}

#[async_trait]
impl EventSink for WebSocketManager {
    async fn deliver(&self, event: &DownloadEvent) -> Result<(), SinkError> {
        match event {
            DownloadEvent::Progress { id, .. } => {
                if !self.throttler.should_emit(id) {
                    return Ok(());
                }
            }
            other if other.is_terminal() => self.throttler.forget(other.id()),
            _ => {}
        }

        if !self.connections.is_empty() {
            self.broadcast(WsServerMessage::event(event.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::ProgressSample;

    fn progress(id: &str, downloaded: u64) -> DownloadEvent {
        DownloadEvent::progress(
            id,
            ProgressSample {
                progress: downloaded as f64 / 100.0,
                downloaded_bytes: downloaded,
                total_bytes: 100,
                speed: 10,
                eta: 1,
            },
        )
    }

    #[test]
    fn test_register_and_unregister() {
        let manager = WebSocketManager::new(Duration::from_millis(200));
        let _rx = manager.register("c1".into());
        assert_eq!(manager.connection_count(), 1);

        manager.unregister("c1");
        assert_eq!(manager.connection_count(), 0);
        assert!(!manager.send_to("c1", WsServerMessage::pong(None)));
    }

    #[test]
    fn test_broadcast_drops_closed_connections() {
        let manager = WebSocketManager::new(Duration::from_millis(200));
        let mut alive = manager.register("alive".into());
        let dead = manager.register("dead".into());
        drop(dead);

        manager.broadcast(WsServerMessage::pong(Some(1)));
        assert_eq!(manager.connection_count(), 1);
        assert!(matches!(alive.try_recv(), Ok(WsServerMessage::Pong { .. })));
    }

    #[tokio::test]
    async fn test_progress_is_throttled_terminal_is_not() {
        let manager = WebSocketManager::new(Duration::from_secs(60));
        let mut rx = manager.register("c1".into());

        manager.deliver(&progress("d1", 10)).await.unwrap();
        manager.deliver(&progress("d1", 20)).await.unwrap();
        manager.deliver(&progress("d2", 5)).await.unwrap();
        manager
            .deliver(&DownloadEvent::Completed {
                id: "d1".into(),
                file_path: "/tmp/d1".into(),
            })
            .await
            .unwrap();

        let mut received = Vec::new();
        while let Ok(WsServerMessage::Event { event }) = rx.try_recv() {
            received.push(event);
        }
        assert_eq!(received.len(), 3);
        assert_eq!(received[0], progress("d1", 10));
        assert_eq!(received[1], progress("d2", 5));
        assert_eq!(received[2].event_type_name(), "completed");

        // 终态事件之后节流记录被清除
        manager.deliver(&progress("d1", 30)).await.unwrap();
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_prune_progress_keys_of_removed_tasks() {
        let manager = WebSocketManager::new(Duration::from_secs(60));
        for i in 0..1000 {
            manager.deliver(&progress(&format!("d{}", i), 10)).await.unwrap();
        }
        assert_eq!(manager.tracked_progress_keys(), 1000);

        assert_eq!(manager.prune_progress_keys(|id| id == "d7"), 999);
        assert_eq!(manager.tracked_progress_keys(), 1);
    }

    #[test]
    fn test_cleanup_stale_connections() {
        let manager = WebSocketManager::new(Duration::from_millis(200));
        let _rx = manager.register("c1".into());

        assert_eq!(manager.cleanup_stale_connections(Duration::from_secs(60)), 0);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(manager.cleanup_stale_connections(Duration::from_millis(10)), 1);
        assert_eq!(manager.connection_count(), 0);
    }
}
