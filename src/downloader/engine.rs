use crate::config::DownloadConfig;
use crate::downloader::transport::{FileStorage, HttpTransport, Storage, Transport};
use crate::downloader::{ProgressSample, SpeedCalculator};
use crate::error::{DownloadError, DownloadResult};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 传输控制标志
///
/// 由控制路径（暂停/恢复/取消）写入，由引擎在块边界读取
#[derive(Debug)]
pub struct TransferControl {
    cancel: CancellationToken,
    /// 用户暂停
    paused: AtomicBool,
    /// 宿主挂起（任务状态仍为 downloading）
    suspended: AtomicBool,
}

impl TransferControl {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            paused: AtomicBool::new(false),
            suspended: AtomicBool::new(false),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn set_suspended(&self, suspended: bool) {
        self.suspended.store(suspended, Ordering::SeqCst);
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }

    /// 引擎是否应停在块边界等待
    pub fn is_held(&self) -> bool {
        self.is_paused() || self.is_suspended()
    }
}

impl Default for TransferControl {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

/// 一次传输的结果
#[derive(Debug)]
pub enum TransferOutcome {
    Completed {
        file_path: PathBuf,
        downloaded_bytes: u64,
        /// 响应声明的长度，未知时为 0
        total_bytes: u64,
    },
    Failed(DownloadError),
    Canceled,
}

/// 传输引擎
///
/// 逐块（默认 8KiB）从网络读取并追加写入目标文件，每写入一块回调一次进度
#[derive(Clone)]
pub struct TransferEngine {
    transport: Arc<dyn Transport>,
    storage: Arc<dyn Storage>,
    chunk_size: usize,
    read_timeout: Duration,
    pause_poll_interval: Duration,
}

impl std::fmt::Debug for TransferEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferEngine")
            .field("chunk_size", &self.chunk_size)
            .field("read_timeout", &self.read_timeout)
            .field("pause_poll_interval", &self.pause_poll_interval)
            .finish_non_exhaustive()
    }
}

impl TransferEngine {
    /// 使用 HTTP 传输和本地文件存储创建引擎
    pub fn new(config: &DownloadConfig) -> DownloadResult<Self> {
        let transport = HttpTransport::new(config)?;
        Ok(Self::with_parts(
            config,
            Arc::new(transport),
            Arc::new(FileStorage),
        ))
    }

    /// 使用自定义传输和存储创建引擎（平台适配层入口）
    pub fn with_parts(
        config: &DownloadConfig,
        transport: Arc<dyn Transport>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        Self {
            transport,
            storage,
            chunk_size: config.chunk_size.max(1),
            read_timeout: config.read_timeout(),
            pause_poll_interval: config.pause_poll_interval(),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// 执行一次完整传输
    ///
    /// 取消永远不会以 `Failed` 返回
    pub async fn run<F>(
        &self,
        url: &str,
        dest: &Path,
        control: &TransferControl,
        on_progress: F,
    ) -> TransferOutcome
    where
        F: FnMut(ProgressSample) + Send,
    {
        match self.transfer(url, dest, control, on_progress).await {
            Ok(outcome) => outcome,
            Err(_) if control.is_cancelled() => TransferOutcome::Canceled,
            Err(DownloadError::Canceled) => TransferOutcome::Canceled,
            Err(e) => TransferOutcome::Failed(e),
        }
    }

    async fn transfer<F>(
        &self,
        url: &str,
        dest: &Path,
        control: &TransferControl,
        mut on_progress: F,
    ) -> DownloadResult<TransferOutcome>
    where
        F: FnMut(ProgressSample) + Send,
    {
        if control.is_cancelled() {
            return Ok(TransferOutcome::Canceled);
        }

        let body = or_cancel(control, self.transport.open(url)).await??;
        let mut reader = body.reader;
        let total_bytes = body.content_length.unwrap_or(0);

        let mut writer = or_cancel(control, self.storage.create(dest)).await??;

        info!(
            "开始传输: url={}, 目标={:?}, 总大小={}",
            url, dest, total_bytes
        );

        let calculator = SpeedCalculator::new(total_bytes);
        let mut buf = vec![0u8; self.chunk_size];
        let mut downloaded_bytes = 0u64;

        loop {
            if control.is_cancelled() {
                return Ok(TransferOutcome::Canceled);
            }

            let read = or_cancel(
                control,
                tokio::time::timeout(self.read_timeout, reader.read(&mut buf)),
            )
            .await?;
            let n = match read {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(DownloadError::Network(e.to_string())),
                Err(_) => {
                    return Err(DownloadError::Timeout {
                        stage: "读取",
                        after: self.read_timeout,
                    })
                }
            };

            if n == 0 {
                break;
            }

            if control.is_cancelled() {
                return Ok(TransferOutcome::Canceled);
            }

            if !self.wait_while_held(control).await {
                return Ok(TransferOutcome::Canceled);
            }

            writer.write_all(&buf[..n]).await?;
            downloaded_bytes += n as u64;

            on_progress(calculator.sample(downloaded_bytes));
        }

        writer.flush().await?;
        writer.shutdown().await?;

        if total_bytes > 0 && downloaded_bytes != total_bytes {
            warn!(
                "传输结束但大小不一致: 期望={}, 实际={}",
                total_bytes, downloaded_bytes
            );
            return Err(DownloadError::Network(format!(
                "响应体不完整: 期望 {} 字节, 实际 {} 字节",
                total_bytes, downloaded_bytes
            )));
        }

        info!("传输完成: {:?}, {} bytes", dest, downloaded_bytes);

        Ok(TransferOutcome::Completed {
            file_path: dest.to_path_buf(),
            downloaded_bytes,
            total_bytes,
        })
    }

    /// 暂停或挂起期间按固定间隔轮询，不消费任何输入
    ///
    /// 返回 false 表示等待期间被取消
    async fn wait_while_held(&self, control: &TransferControl) -> bool {
        if control.is_held() {
            debug!("传输已暂停，等待恢复");
        }
        while control.is_held() && !control.is_cancelled() {
            tokio::select! {
                _ = tokio::time::sleep(self.pause_poll_interval) => {}
                _ = control.cancelled() => {}
            }
        }
        !control.is_cancelled()
    }
}

/// 让一次 I/O 与取消信号赛跑，取消时返回 `DownloadError::Canceled`
async fn or_cancel<T>(control: &TransferControl, fut: impl Future<Output = T>) -> DownloadResult<T> {
    tokio::select! {
        biased;
        _ = control.cancelled() => Err(DownloadError::Canceled),
        out = fut => Ok(out),
    }
}
