//! WebSocket 消息类型定义

use crate::downloader::TaskSnapshot;
use crate::events::DownloadEvent;
use serde::{Deserialize, Serialize};

/// 客户端发送给服务端的消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsClientMessage {
    /// 心跳 Ping
    Ping {
        /// 客户端时间戳（毫秒）
        timestamp: i64,
    },
    /// 请求全部任务快照
    RequestSnapshot,
}

/// 服务端发送给客户端的消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsServerMessage {
    /// 心跳 Pong
    Pong {
        /// 服务端时间戳（毫秒）
        timestamp: i64,
        /// 回显客户端时间戳（用于计算延迟）
        client_timestamp: Option<i64>,
    },
    /// 下载事件
    Event { event: DownloadEvent },
    /// 全部任务快照
    Snapshot { downloads: Vec<TaskSnapshot> },
    /// 连接成功
    Connected {
        connection_id: String,
        timestamp: i64,
    },
    /// 错误消息
    Error { code: String, message: String },
}

impl WsServerMessage {
    pub fn pong(client_timestamp: Option<i64>) -> Self {
        Self::Pong {
            timestamp: chrono::Utc::now().timestamp_millis(),
            client_timestamp,
        }
    }

    pub fn connected(connection_id: String) -> Self {
        Self::Connected {
            connection_id,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn event(event: DownloadEvent) -> Self {
        Self::Event { event }
    }

    pub fn snapshot(downloads: Vec<TaskSnapshot>) -> Self {
        Self::Snapshot { downloads }
    }
}
