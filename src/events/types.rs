//! 下载事件类型定义
//!
//! 事件以 `{type, id, ...payload}` 的形式推送给事件接收端（WebSocket、宿主通道等）

use crate::downloader::ProgressSample;
use serde::{Deserialize, Serialize};

/// 下载任务事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DownloadEvent {
    /// 进度更新
    #[serde(rename_all = "camelCase")]
    Progress {
        id: String,
        progress: f64,
        downloaded_bytes: u64,
        total_bytes: u64,
        speed: u64,
        eta: u64,
    },
    /// 下载完成
    #[serde(rename_all = "camelCase")]
    Completed { id: String, file_path: String },
    /// 下载失败
    Failed { id: String, error: String },
    /// 已暂停
    Paused { id: String },
    /// 已恢复
    Resumed { id: String },
}

impl DownloadEvent {
    pub fn progress(id: impl Into<String>, sample: ProgressSample) -> Self {
        DownloadEvent::Progress {
            id: id.into(),
            progress: sample.progress,
            downloaded_bytes: sample.downloaded_bytes,
            total_bytes: sample.total_bytes,
            speed: sample.speed,
            eta: sample.eta,
        }
    }

    /// 获取任务 ID
    pub fn id(&self) -> &str {
        match self {
            DownloadEvent::Progress { id, .. }
            | DownloadEvent::Completed { id, .. }
            | DownloadEvent::Failed { id, .. }
            | DownloadEvent::Paused { id }
            | DownloadEvent::Resumed { id } => id,
        }
    }

    /// 获取事件类型名称
    pub fn event_type_name(&self) -> &'static str {
        match self {
            DownloadEvent::Progress { .. } => "progress",
            DownloadEvent::Completed { .. } => "completed",
            DownloadEvent::Failed { .. } => "failed",
            DownloadEvent::Paused { .. } => "paused",
            DownloadEvent::Resumed { .. } => "resumed",
        }
    }

    /// 是否为终态事件（完成或失败）
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadEvent::Completed { .. } | DownloadEvent::Failed { .. }
        )
    }
}
