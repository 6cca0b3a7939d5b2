//! 事件接收端
//!
//! 下载管理器把事件推送给所有已注册的 `EventSink`，投递失败只记录日志，
//! 不会传播给调用方

use crate::events::DownloadEvent;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::info;

/// 事件投递错误
#[derive(Debug, Error)]
pub enum SinkError {
    /// 接收端已关闭（例如宿主端断开）
    #[error("事件接收端已关闭")]
    Closed,
    /// 其他投递错误
    #[error("事件投递失败: {0}")]
    Delivery(String),
}

/// 事件接收端
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn deliver(&self, event: &DownloadEvent) -> Result<(), SinkError>;
}

/// 把事件转发到 mpsc 通道
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<DownloadEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<DownloadEvent>) -> Self {
        Self { tx }
    }

    /// 创建接收端以及对应的接收器
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DownloadEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn deliver(&self, event: &DownloadEvent) -> Result<(), SinkError> {
        self.tx.send(event.clone()).map_err(|_| SinkError::Closed)
    }
}

/// 把终态和控制事件写入日志，进度事件忽略
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl EventSink for LogSink {
    async fn deliver(&self, event: &DownloadEvent) -> Result<(), SinkError> {
        match event {
            DownloadEvent::Progress { .. } => {}
            DownloadEvent::Completed { id, file_path } => {
                info!("下载完成: id={}, 文件={}", id, file_path)
            }
            DownloadEvent::Failed { id, error } => info!("下载失败: id={}, 错误={}", id, error),
            DownloadEvent::Paused { id } => info!("下载已暂停: id={}", id),
            DownloadEvent::Resumed { id } => info!("下载已恢复: id={}", id),
        }
        Ok(())
    }
}
