// WidMate 下载核心库
//
// 分块 HTTP 下载、暂停/恢复/取消、进度事件推送

// 配置管理模块
pub mod config;

// 下载核心
pub mod downloader;

// 错误类型
pub mod error;

// 下载事件与事件接收端
pub mod events;

// 日志系统
pub mod logging;

// Web服务器与宿主通道
pub mod server;

// 导出常用类型
pub use config::AppConfig;
pub use downloader::{
    DownloadManager, DownloadRequest, DownloadTask, TaskSnapshot, TaskStatus, TransferEngine,
};
pub use error::{DownloadError, DownloadResult};
pub use events::{DownloadEvent, EventSink};
pub use server::AppState;
