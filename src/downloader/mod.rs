//! 下载核心
//!
//! - `transport.rs`: 传输与存储抽象（HTTP / 本地文件）
//! - `engine.rs`: 分块传输引擎
//! - `progress.rs`: 进度、速度与剩余时间计算
//! - `task.rs`: 下载任务及其状态机
//! - `registry.rs`: 任务注册表
//! - `manager.rs`: 下载管理器（对外门面）

pub mod engine;
pub mod manager;
pub mod progress;
pub mod registry;
pub mod task;
pub mod transport;

pub use engine::{TransferControl, TransferEngine, TransferOutcome};
pub use manager::DownloadManager;
pub use progress::{ProgressSample, SpeedCalculator};
pub use registry::TaskRegistry;
pub use task::{DownloadRequest, DownloadTask, TaskDescriptor, TaskSnapshot, TaskStatus};
pub use transport::{FileStorage, HttpTransport, Storage, TransferBody, Transport};
