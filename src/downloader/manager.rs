use crate::config::DownloadConfig;
use crate::downloader::{
    DownloadRequest, DownloadTask, TaskRegistry, TaskSnapshot, TransferEngine,
};
use crate::error::{DownloadError, DownloadResult};
use crate::events::{ChannelSink, DownloadEvent, EventSink};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// 下载管理器
///
/// 外部协作方（宿主通道、HTTP 接口）唯一的操作入口，同时负责把事件
/// 依次投递给所有已注册的事件接收端
pub struct DownloadManager {
    registry: Arc<TaskRegistry>,
    engine: Arc<TransferEngine>,
    /// 相对路径的基准目录
    download_dir: PathBuf,
    /// 事件队列（所有任务共用，保证单个任务内事件有序）
    events_tx: mpsc::UnboundedSender<DownloadEvent>,
    sinks: Arc<RwLock<Vec<Arc<dyn EventSink>>>>,
    /// 传输任务的监督者，单个任务失败不影响其他任务
    tracker: TaskTracker,
    /// 关闭令牌，所有任务的取消令牌都是它的子令牌
    shutdown: CancellationToken,
}

impl std::fmt::Debug for DownloadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadManager")
            .field("download_dir", &self.download_dir)
            .field("tasks", &self.registry.len())
            .field("sinks", &self.sinks.read().len())
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl DownloadManager {
    /// 使用 HTTP 传输和本地文件存储创建下载管理器
    ///
    /// 需要在 tokio 运行时中调用
    pub fn new(config: &DownloadConfig) -> DownloadResult<Self> {
        let engine = TransferEngine::new(config)?;
        Ok(Self::with_engine(config, engine))
    }

    /// 使用自定义引擎创建下载管理器
    pub fn with_engine(config: &DownloadConfig, engine: TransferEngine) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let sinks: Arc<RwLock<Vec<Arc<dyn EventSink>>>> = Arc::new(RwLock::new(Vec::new()));

        Self::spawn_event_forwarder(events_rx, sinks.clone());

        info!(
            "创建下载管理器: 下载目录={:?}, 块大小={}",
            config.download_dir,
            engine.chunk_size()
        );

        Self {
            registry: Arc::new(TaskRegistry::new()),
            engine: Arc::new(engine),
            download_dir: config.download_dir.clone(),
            events_tx,
            sinks,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// 事件转发循环：按入队顺序投递给每个接收端，投递失败只记录日志
    fn spawn_event_forwarder(
        mut events_rx: mpsc::UnboundedReceiver<DownloadEvent>,
        sinks: Arc<RwLock<Vec<Arc<dyn EventSink>>>>,
    ) {
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                let targets: Vec<Arc<dyn EventSink>> = sinks.read().clone();
                for sink in targets {
                    if let Err(e) = sink.deliver(&event).await {
                        debug!(
                            "事件投递失败（已忽略）: type={}, id={}, 错误={}",
                            event.event_type_name(),
                            event.id(),
                            e
                        );
                    }
                }
            }
            debug!("事件转发循环已退出");
        });
    }

    /// 注册事件接收端
    pub fn add_sink(&self, sink: Arc<dyn EventSink>) {
        self.sinks.write().push(sink);
    }

    /// 注册一个通道接收端并返回对应的接收器
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<DownloadEvent> {
        let (sink, rx) = ChannelSink::channel();
        self.add_sink(Arc::new(sink));
        rx
    }

    fn emit(&self, event: DownloadEvent) {
        if self.events_tx.send(event).is_err() {
            debug!("事件队列已关闭");
        }
    }

    fn resolve_path(&self, path: PathBuf) -> PathBuf {
        if path.is_absolute() {
            path
        } else {
            self.download_dir.join(path)
        }
    }

    /// 创建、注册并启动下载任务
    ///
    /// 缺少必填字段的请求被忽略（返回 Ok，不产生事件）；
    /// ID 已存在时返回 `DuplicateId`
    pub fn start_download(&self, request: DownloadRequest) -> DownloadResult<()> {
        if self.shutdown.is_cancelled() {
            return Err(DownloadError::ShuttingDown);
        }

        let mut descriptor = match request.validate() {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!("忽略无效的下载请求: {}", e);
                return Ok(());
            }
        };
        descriptor.file_path = self.resolve_path(descriptor.file_path);

        let task = Arc::new(DownloadTask::new(descriptor, self.shutdown.child_token()));
        self.registry.insert_new(task.clone())?;

        info!("创建下载任务: id={}, 文件={}", task.id(), task.descriptor().file_name);
        task.start(self.engine.clone(), self.events_tx.clone(), &self.tracker);
        Ok(())
    }

    /// 暂停任务，未知 ID 忽略
    pub fn pause_download(&self, id: &str) {
        let Some(task) = self.registry.get(id) else {
            debug!("暂停: 任务不存在 {}", id);
            return;
        };
        if task.pause() {
            info!("暂停下载任务: {}", id);
            self.emit(DownloadEvent::Paused { id: id.to_string() });
        }
    }

    /// 恢复任务，未知 ID 忽略
    pub fn resume_download(&self, id: &str) {
        let Some(task) = self.registry.get(id) else {
            debug!("恢复: 任务不存在 {}", id);
            return;
        };
        if task.resume() {
            info!("恢复下载任务: {}", id);
            self.emit(DownloadEvent::Resumed { id: id.to_string() });
        }
    }

    /// 取消任务并从注册表移除，未知 ID 忽略
    pub fn cancel_download(&self, id: &str) {
        let Some(task) = self.registry.remove(id) else {
            debug!("取消: 任务不存在 {}", id);
            return;
        };
        task.cancel();
        info!("取消下载任务: {}", id);
    }

    /// 所有任务的快照（包括已结束的任务），按创建时间排序
    pub fn list_active(&self) -> Vec<TaskSnapshot> {
        let mut tasks = self.registry.list();
        tasks.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        tasks.iter().map(|task| task.snapshot()).collect()
    }

    pub fn get_download(&self, id: &str) -> Option<TaskSnapshot> {
        self.registry.get(id).map(|task| task.snapshot())
    }

    pub fn task(&self, id: &str) -> Option<Arc<DownloadTask>> {
        self.registry.get(id)
    }

    /// 宿主即将挂起：让所有下载中的任务停在块边界，状态保持不变
    pub fn suspend_transfers(&self) -> usize {
        let count = self
            .registry
            .list()
            .iter()
            .filter(|task| task.suspend())
            .count();
        if count > 0 {
            info!("已挂起 {} 个下载任务", count);
        }
        count
    }

    /// 继续所有仍处于下载中、但传输被挂起的任务
    pub fn continue_eligible(&self) -> usize {
        let count = self
            .registry
            .list()
            .iter()
            .filter(|task| task.continue_transfer())
            .count();
        if count > 0 {
            info!("已继续 {} 个下载任务", count);
        }
        count
    }

    /// 移除一个已结束的任务
    pub fn evict(&self, id: &str) -> bool {
        self.registry.remove_terminal(id).is_some()
    }

    /// 移除所有已结束的任务，返回移除数量
    pub fn clear_finished(&self) -> usize {
        let count = self
            .registry
            .list()
            .iter()
            .filter(|task| task.is_terminal())
            .filter(|task| self.registry.remove_terminal(task.id()).is_some())
            .count();
        if count > 0 {
            info!("清除了 {} 个已结束的任务", count);
        }
        count
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// 关闭管理器：通知所有传输停止，清空注册表并等待传输退出
    pub async fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        info!("正在关闭下载管理器...");

        self.shutdown.cancel();
        let tasks = self.registry.drain();
        for task in &tasks {
            task.cancel();
        }

        self.tracker.close();
        self.tracker.wait().await;
        info!("✓ 下载管理器已关闭，停止了 {} 个任务", tasks.len());
    }
}
