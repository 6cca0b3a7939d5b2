//! 下载核心错误类型
//!
//! 传输过程中的所有错误都在引擎边界被转换为 `failed` 事件，
//! 不会传播给门面（`DownloadManager`）的调用方

use std::time::Duration;
use thiserror::Error;

/// 下载核心错误
#[derive(Debug, Error)]
pub enum DownloadError {
    /// 请求描述符缺少字段或格式错误
    #[error("无效的下载请求: {0}")]
    InvalidRequest(String),

    /// 任务 ID 已存在于注册表中
    #[error("任务已存在: {0}")]
    DuplicateId(String),

    /// 任务不存在
    #[error("任务不存在: {0}")]
    NotFound(String),

    /// 网络错误（连接失败、连接重置等）
    #[error("网络错误: {0}")]
    Network(String),

    /// 连接或读取超时
    #[error("{stage}超时 ({}s)", .after.as_secs())]
    Timeout { stage: &'static str, after: Duration },

    /// 非 2xx 响应
    #[error("HTTP错误: {status}")]
    Http { status: u16 },

    /// 本地文件写入错误
    #[error("文件写入失败: {0}")]
    Io(#[from] std::io::Error),

    /// 传输被取消（永远不会作为失败上报）
    #[error("传输已取消")]
    Canceled,

    /// 管理器正在关闭
    #[error("下载管理器已关闭")]
    ShuttingDown,
}

impl DownloadError {
    /// 是否属于网络类失败（超时、连接错误、非 2xx）
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            DownloadError::Network(_) | DownloadError::Timeout { .. } | DownloadError::Http { .. }
        )
    }

    /// 是否属于本地 IO 失败
    pub fn is_io(&self) -> bool {
        matches!(self, DownloadError::Io(_))
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, DownloadError::Canceled)
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return DownloadError::Http {
                status: status.as_u16(),
            };
        }
        DownloadError::Network(e.to_string())
    }
}

pub type DownloadResult<T> = Result<T, DownloadError>;
