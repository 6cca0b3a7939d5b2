use crate::downloader::engine::{TransferControl, TransferEngine, TransferOutcome};
use crate::downloader::ProgressSample;
use crate::error::{DownloadError, DownloadResult};
use crate::events::DownloadEvent;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// 下载任务状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// 已创建，尚未启动
    Queued,
    /// 下载中
    Downloading,
    /// 已暂停
    Paused,
    /// 已完成
    Completed,
    /// 失败
    Failed,
    /// 已取消
    Canceled,
}

impl TaskStatus {
    /// 终态不会再发生任何转换
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Canceled
        )
    }
}

/// 宿主提交的下载请求
///
/// 所有字段都是必填的，缺失任何一个时请求会被忽略
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    pub id: Option<String>,
    pub url: Option<String>,
    pub title: Option<String>,
    pub file_name: Option<String>,
    pub file_path: Option<String>,
    pub platform: Option<String>,
}

impl DownloadRequest {
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        title: impl Into<String>,
        file_name: impl Into<String>,
        file_path: impl Into<String>,
        platform: impl Into<String>,
    ) -> Self {
        Self {
            id: Some(id.into()),
            url: Some(url.into()),
            title: Some(title.into()),
            file_name: Some(file_name.into()),
            file_path: Some(file_path.into()),
            platform: Some(platform.into()),
        }
    }

    /// 校验必填字段，得到不可变的任务描述
    pub fn validate(self) -> DownloadResult<TaskDescriptor> {
        fn required(value: Option<String>, name: &str) -> DownloadResult<String> {
            match value {
                Some(v) if !v.trim().is_empty() => Ok(v),
                _ => Err(DownloadError::InvalidRequest(format!("缺少字段 {}", name))),
            }
        }

        Ok(TaskDescriptor {
            id: required(self.id, "id")?,
            url: required(self.url, "url")?,
            title: required(self.title, "title")?,
            file_name: required(self.file_name, "fileName")?,
            file_path: PathBuf::from(required(self.file_path, "filePath")?),
            platform: required(self.platform, "platform")?,
        })
    }
}

/// 任务的不可变描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDescriptor {
    pub id: String,
    pub url: String,
    pub title: String,
    pub file_name: String,
    /// 目标文件路径
    pub file_path: PathBuf,
    /// 平台标签，核心不解释其含义
    pub platform: String,
}

/// 任务的可变状态
#[derive(Debug, Clone)]
struct TaskState {
    status: TaskStatus,
    total_bytes: u64,
    downloaded_bytes: u64,
    progress: f64,
    speed: u64,
    eta: u64,
    completed_at: Option<DateTime<Utc>>,
    error: Option<String>,
}

impl TaskState {
    fn new() -> Self {
        Self {
            status: TaskStatus::Queued,
            total_bytes: 0,
            downloaded_bytes: 0,
            progress: 0.0,
            speed: 0,
            eta: 0,
            completed_at: None,
            error: None,
        }
    }
}

/// 任务快照（`getActiveDownloads` 的返回元素）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    pub id: String,
    pub url: String,
    pub title: String,
    pub file_name: String,
    pub file_path: String,
    pub total_bytes: u64,
    pub downloaded_bytes: u64,
    pub progress: f64,
    pub speed: u64,
    pub eta: u64,
    pub status: TaskStatus,
    pub platform: String,
    /// ISO-8601
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn iso8601(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// 下载任务
///
/// 持有一次传输的状态和控制标志。状态只由自身的传输循环写入字节计数，
/// 控制路径（暂停/恢复/取消）可以从任意线程并发调用
#[derive(Debug)]
pub struct DownloadTask {
    descriptor: TaskDescriptor,
    created_at: DateTime<Utc>,
    state: RwLock<TaskState>,
    control: TransferControl,
    /// 传输循环是否已经启动过
    started: AtomicBool,
}

impl DownloadTask {
    /// `cancel` 通常是管理器关闭令牌的子令牌
    pub fn new(descriptor: TaskDescriptor, cancel: CancellationToken) -> Self {
        Self {
            descriptor,
            created_at: Utc::now(),
            state: RwLock::new(TaskState::new()),
            control: TransferControl::new(cancel),
            started: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn descriptor(&self) -> &TaskDescriptor {
        &self.descriptor
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> TaskStatus {
        self.state.read().status
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn is_suspended(&self) -> bool {
        self.control.is_suspended()
    }

    /// 启动传输
    ///
    /// 已取消或已启动过时什么也不做并返回 false。
    /// 启动前已被暂停的任务保持暂停，传输循环会停在第一个块边界
    pub fn start(
        self: &Arc<Self>,
        engine: Arc<TransferEngine>,
        events: mpsc::UnboundedSender<DownloadEvent>,
        tracker: &TaskTracker,
    ) -> bool {
        {
            let mut state = self.state.write();
            if state.status.is_terminal() || self.control.is_cancelled() {
                debug!("任务已结束，跳过启动: {}", self.id());
                return false;
            }
            if self.started.swap(true, Ordering::SeqCst) {
                debug!("任务已启动，跳过: {}", self.id());
                return false;
            }
            if state.status == TaskStatus::Queued {
                state.status = TaskStatus::Downloading;
            }
        }

        info!(
            "启动下载任务: id={}, url={}, 目标={:?}",
            self.id(),
            self.descriptor.url,
            self.descriptor.file_path
        );

        let task = Arc::clone(self);
        tracker.spawn(async move { task.run(engine, events).await });
        true
    }

    async fn run(self: Arc<Self>, engine: Arc<TransferEngine>, events: mpsc::UnboundedSender<DownloadEvent>) {
        let outcome = engine
            .run(
                &self.descriptor.url,
                &self.descriptor.file_path,
                &self.control,
                |sample| self.publish_progress(sample, &events),
            )
            .await;

        match outcome {
            TransferOutcome::Completed {
                file_path,
                downloaded_bytes,
                total_bytes,
            } => {
                let file_path = file_path.to_string_lossy().into_owned();
                let mut state = self.state.write();
                if Self::apply_completed(&mut state, downloaded_bytes, total_bytes) {
                    info!("✓ 下载完成: id={}, {} bytes", self.id(), downloaded_bytes);
                    let _ = events.send(DownloadEvent::Completed {
                        id: self.id().to_string(),
                        file_path,
                    });
                }
            }
            TransferOutcome::Failed(e) => {
                let message = e.to_string();
                let mut state = self.state.write();
                if Self::apply_failed(&mut state, message.clone()) {
                    warn!("下载失败: id={}, 错误={}", self.id(), message);
                    let _ = events.send(DownloadEvent::Failed {
                        id: self.id().to_string(),
                        error: message,
                    });
                }
            }
            TransferOutcome::Canceled => {
                info!("下载已取消: id={}", self.id());
            }
        }
    }

    /// 记录一次进度，持锁发送事件，保证取消之后不会再有进度事件
    fn publish_progress(&self, sample: ProgressSample, events: &mpsc::UnboundedSender<DownloadEvent>) {
        let mut state = self.state.write();
        if Self::apply_progress(&mut state, &sample) {
            let _ = events.send(DownloadEvent::progress(self.id(), sample));
        }
    }

    /// 记录一次进度，任务已结束时返回 false
    pub fn record_progress(&self, sample: &ProgressSample) -> bool {
        Self::apply_progress(&mut self.state.write(), sample)
    }

    fn apply_progress(state: &mut TaskState, sample: &ProgressSample) -> bool {
        if state.status.is_terminal() {
            return false;
        }
        state.total_bytes = sample.total_bytes;
        state.downloaded_bytes = state.downloaded_bytes.max(sample.downloaded_bytes);
        state.progress = sample.progress.clamp(0.0, 1.0);
        state.speed = sample.speed;
        state.eta = sample.eta;
        true
    }

    fn apply_completed(state: &mut TaskState, downloaded_bytes: u64, total_bytes: u64) -> bool {
        if state.status.is_terminal() {
            return false;
        }
        state.status = TaskStatus::Completed;
        state.downloaded_bytes = downloaded_bytes;
        // 长度未知时以实际大小为准
        state.total_bytes = if total_bytes == 0 {
            downloaded_bytes
        } else {
            total_bytes
        };
        state.progress = if state.downloaded_bytes >= state.total_bytes {
            1.0
        } else {
            state.downloaded_bytes as f64 / state.total_bytes as f64
        };
        state.eta = 0;
        state.completed_at = Some(Utc::now());
        true
    }

    fn apply_failed(state: &mut TaskState, error: String) -> bool {
        if state.status.is_terminal() {
            return false;
        }
        state.status = TaskStatus::Failed;
        state.speed = 0;
        state.eta = 0;
        state.error = Some(error);
        true
    }

    /// 暂停，状态发生变化时返回 true
    pub fn pause(&self) -> bool {
        let mut state = self.state.write();
        match state.status {
            TaskStatus::Queued | TaskStatus::Downloading => {
                state.status = TaskStatus::Paused;
                self.control.set_paused(true);
                true
            }
            _ => false,
        }
    }

    /// 恢复，只对已暂停的任务生效
    pub fn resume(&self) -> bool {
        let mut state = self.state.write();
        if state.status != TaskStatus::Paused {
            return false;
        }
        state.status = TaskStatus::Downloading;
        self.control.set_paused(false);
        true
    }

    /// 取消，可在任意状态下重复调用；终态任务不受影响
    pub fn cancel(&self) -> bool {
        let mut state = self.state.write();
        if state.status.is_terminal() {
            return false;
        }
        state.status = TaskStatus::Canceled;
        state.speed = 0;
        state.eta = 0;
        self.control.cancel();
        true
    }

    /// 宿主挂起：传输停在块边界，状态保持 downloading
    pub fn suspend(&self) -> bool {
        let state = self.state.read();
        if state.status != TaskStatus::Downloading || self.control.is_suspended() {
            return false;
        }
        self.control.set_suspended(true);
        true
    }

    /// 解除宿主挂起
    pub fn continue_transfer(&self) -> bool {
        let state = self.state.read();
        if state.status != TaskStatus::Downloading || !self.control.is_suspended() {
            return false;
        }
        self.control.set_suspended(false);
        true
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        let state = self.state.read();
        TaskSnapshot {
            id: self.descriptor.id.clone(),
            url: self.descriptor.url.clone(),
            title: self.descriptor.title.clone(),
            file_name: self.descriptor.file_name.clone(),
            file_path: self.descriptor.file_path.to_string_lossy().into_owned(),
            total_bytes: state.total_bytes,
            downloaded_bytes: state.downloaded_bytes,
            progress: state.progress,
            speed: state.speed,
            eta: state.eta,
            status: state.status,
            platform: self.descriptor.platform.clone(),
            created_at: iso8601(&self.created_at),
            completed_at: state.completed_at.as_ref().map(iso8601),
            thumbnail_url: None,
            error: state.error.clone(),
        }
    }
}
