//! 传输与存储抽象
//!
//! 引擎只依赖 `Transport`（打开远程资源）与 `Storage`（创建本地目标文件）两个接口，
//! 平台差异由具体实现承担

use crate::config::DownloadConfig;
use crate::error::{DownloadError, DownloadResult};
use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::Client;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::io::StreamReader;
use tracing::debug;

/// 已打开的响应体
pub struct TransferBody {
    /// 响应声明的长度，未知时为 None
    pub content_length: Option<u64>,
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
}

impl fmt::Debug for TransferBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferBody")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// 远程资源的打开方式
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, url: &str) -> DownloadResult<TransferBody>;
}

/// 本地目标文件的创建方式
#[async_trait]
pub trait Storage: Send + Sync {
    async fn create(&self, path: &Path) -> DownloadResult<Box<dyn AsyncWrite + Send + Unpin>>;
}

/// 基于 reqwest 的 HTTP GET 传输
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    /// 建立连接的超时
    connect_timeout: Duration,
    /// 等待响应头的超时
    response_timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &DownloadConfig) -> DownloadResult<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(config.connect_timeout())
            .tcp_nodelay(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| DownloadError::Network(format!("创建HTTP客户端失败: {}", e)))?;

        Ok(Self {
            client,
            connect_timeout: config.connect_timeout(),
            response_timeout: config.read_timeout(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, url: &str) -> DownloadResult<TransferBody> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| DownloadError::InvalidRequest(format!("Invalid URL: {}", e)))?;

        let resp = match tokio::time::timeout(self.response_timeout, self.client.get(parsed).send())
            .await
        {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) if e.is_timeout() => {
                return Err(DownloadError::Timeout {
                    stage: "连接",
                    after: self.connect_timeout,
                })
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(DownloadError::Timeout {
                    stage: "等待响应",
                    after: self.response_timeout,
                })
            }
        };

        if !resp.status().is_success() {
            return Err(DownloadError::Http {
                status: resp.status().as_u16(),
            });
        }

        let content_length = resp.content_length();
        debug!("已建立连接: url={}, content_length={:?}", url, content_length);

        let stream = resp
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));

        Ok(TransferBody {
            content_length,
            reader: Box::new(StreamReader::new(Box::pin(stream))),
        })
    }
}

/// 本地文件系统存储，自动创建父目录
#[derive(Debug, Clone, Copy, Default)]
pub struct FileStorage;

#[async_trait]
impl Storage for FileStorage {
    async fn create(&self, path: &Path) -> DownloadResult<Box<dyn AsyncWrite + Send + Unpin>> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            debug!("文件已存在: {:?}，将覆盖", path);
        }
        let file = tokio::fs::File::create(path).await?;
        Ok(Box::new(file))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! 测试用传输实现与本地 HTTP 服务

    use super::*;
    use axum::body::{Body, Bytes};
    use axum::routing::get;
    use axum::Router;
    use std::net::SocketAddr;
    use tokio::io::AsyncWriteExt;

    /// 第 i 个字节的内容，用于校验没有重复或遗漏
    pub fn pattern_byte(i: u64) -> u8 {
        (i % 251) as u8
    }

    pub fn pattern(len: u64) -> Vec<u8> {
        (0..len).map(pattern_byte).collect()
    }

    /// 按固定节奏吐出数据的内存传输
    #[derive(Debug, Clone)]
    pub struct PacedTransport {
        pub total: u64,
        pub piece: usize,
        pub delay: Duration,
        /// 声明的 content length，None 表示不声明
        pub declared_length: Option<u64>,
    }

    impl PacedTransport {
        pub fn new(total: u64, piece: usize, delay: Duration) -> Self {
            Self {
                total,
                piece,
                delay,
                declared_length: Some(total),
            }
        }

        pub fn without_length(mut self) -> Self {
            self.declared_length = None;
            self
        }

        /// 声明与实际发送量不同的长度
        pub fn declaring(mut self, length: u64) -> Self {
            self.declared_length = Some(length);
            self
        }
    }

    #[async_trait]
    impl Transport for PacedTransport {
        async fn open(&self, _url: &str) -> DownloadResult<TransferBody> {
            let (mut writer, reader) = tokio::io::duplex(64 * 1024);
            let (total, piece, delay) = (self.total, self.piece as u64, self.delay);
            tokio::spawn(async move {
                let mut sent = 0u64;
                while sent < total {
                    let end = (sent + piece).min(total);
                    let data: Vec<u8> = (sent..end).map(pattern_byte).collect();
                    if writer.write_all(&data).await.is_err() {
                        return;
                    }
                    sent = end;
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                let _ = writer.shutdown().await;
            });
            Ok(TransferBody {
                content_length: self.declared_length,
                reader: Box::new(reader),
            })
        }
    }

    /// 总是返回给定错误的传输
    #[derive(Debug, Clone)]
    pub struct FailingTransport {
        pub message: String,
    }

    #[async_trait]
    impl Transport for FailingTransport {
        async fn open(&self, _url: &str) -> DownloadResult<TransferBody> {
            Err(DownloadError::Network(self.message.clone()))
        }
    }

    /// 永远连接不上的传输（直到被取消）
    #[derive(Debug, Clone, Copy)]
    pub struct HangingTransport;

    #[async_trait]
    impl Transport for HangingTransport {
        async fn open(&self, _url: &str) -> DownloadResult<TransferBody> {
            futures::future::pending().await
        }
    }

    /// 启动本地 HTTP 服务
    ///
    /// - `/file`: 一次性返回 `total` 字节（带 Content-Length）
    /// - `/slow`: 每 8KiB 间隔 `delay` 流式返回（无 Content-Length）
    /// - `/stall`: 等待 `delay` 之后才返回响应头
    /// - `/missing`: 404
    pub async fn spawn_server(total: u64, delay: Duration) -> SocketAddr {
        let app = Router::new()
            .route("/file", get(move || async move { pattern(total) }))
            .route(
                "/slow",
                get(move || async move {
                    let stream = futures::stream::unfold(0u64, move |sent| async move {
                        if sent >= total {
                            return None;
                        }
                        tokio::time::sleep(delay).await;
                        let end = (sent + 8192).min(total);
                        let data: Vec<u8> = (sent..end).map(pattern_byte).collect();
                        Some((Ok::<_, std::io::Error>(Bytes::from(data)), end))
                    });
                    Body::from_stream(stream)
                }),
            )
            .route(
                "/stall",
                get(move || async move {
                    tokio::time::sleep(delay).await;
                    pattern(total)
                }),
            )
            .route(
                "/missing",
                get(|| async { (axum::http::StatusCode::NOT_FOUND, "not found") }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        addr
    }
}
