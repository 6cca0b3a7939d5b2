// 配置管理模块

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config/app.toml";

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 服务器配置
    #[serde(default)]
    pub server: ServerConfig,
    /// 下载配置
    #[serde(default)]
    pub download: DownloadConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数（默认 7 天）
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
    /// 单个日志文件最大大小（字节，默认 20MB）
    #[serde(default = "default_log_max_file_size")]
    pub max_file_size: u64,
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_max_file_size() -> u64 {
    20 * 1024 * 1024
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            retention_days: default_log_retention_days(),
            level: default_log_level(),
            max_file_size: default_log_max_file_size(),
        }
    }
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,
    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS允许的源
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
    /// WebSocket 进度事件节流间隔（毫秒）
    #[serde(default = "default_ws_progress_interval_ms")]
    pub ws_progress_interval_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    18890
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_ws_progress_interval_ms() -> u64 {
    200
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
            ws_progress_interval_ms: default_ws_progress_interval_ms(),
        }
    }
}

/// 下载配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// 默认下载目录（请求未给出绝对路径时的落盘目录）
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    /// 单次读取的块大小（字节）
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// 连接超时（秒）
    #[serde(default = "default_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// 读取超时（秒），每次块读取单独计时
    #[serde(default = "default_timeout_secs")]
    pub read_timeout_secs: u64,
    /// 暂停时的轮询间隔（毫秒）
    #[serde(default = "default_pause_poll_interval_ms")]
    pub pause_poll_interval_ms: u64,
    /// HTTP User-Agent
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// 最大重定向次数
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

fn default_download_dir() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("downloads")
}

fn default_chunk_size() -> usize {
    8 * 1024
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_pause_poll_interval_ms() -> u64 {
    100
}

fn default_user_agent() -> String {
    concat!("widmate-downloader/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_max_redirects() -> usize {
    10
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            chunk_size: default_chunk_size(),
            connect_timeout_secs: default_timeout_secs(),
            read_timeout_secs: default_timeout_secs(),
            pause_poll_interval_ms: default_pause_poll_interval_ms(),
            user_agent: default_user_agent(),
            max_redirects: default_max_redirects(),
        }
    }
}

impl DownloadConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn pause_poll_interval(&self) -> Duration {
        Duration::from_millis(self.pause_poll_interval_ms)
    }

    /// 校验下载配置
    pub fn validate(&self) -> Result<()> {
        if !self.download_dir.is_absolute() {
            anyhow::bail!("下载目录必须是绝对路径: {:?}", self.download_dir);
        }
        if self.chunk_size == 0 {
            anyhow::bail!("chunk_size 必须大于 0");
        }
        if self.connect_timeout_secs == 0 || self.read_timeout_secs == 0 {
            anyhow::bail!("超时时间必须大于 0");
        }
        if self.pause_poll_interval_ms == 0 {
            anyhow::bail!("pause_poll_interval_ms 必须大于 0");
        }
        Ok(())
    }
}

impl AppConfig {
    /// 从文件加载配置
    pub async fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;

        let config: AppConfig = toml::from_str(&content).context("Failed to parse config file")?;

        config
            .download
            .validate()
            .context("配置文件中的下载配置验证失败")?;

        Ok(config)
    }

    /// 保存配置到文件
    pub async fn save_to_file(&self, path: &str) -> Result<()> {
        self.download.validate().context("保存配置失败")?;

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create config directory")?;
            }
        }

        fs::write(path, content)
            .await
            .context("Failed to write config file")?;

        tracing::info!("✓ 配置已保存: {}", path);
        Ok(())
    }

    /// 加载或创建默认配置
    pub async fn load_or_default(path: &str) -> Self {
        match Self::load_from_file(path).await {
            Ok(config) => {
                tracing::info!("配置文件加载成功: {}", path);
                config
            }
            Err(e) => {
                tracing::warn!("配置文件加载失败，使用默认配置: {:#}", e);
                let default_config = Self::default();

                if let Err(e) = default_config.save_to_file(path).await {
                    tracing::error!("保存默认配置失败: {:#}", e);
                }

                default_config
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 18890);
        assert_eq!(config.download.chunk_size, 8192);
        assert_eq!(config.download.connect_timeout(), Duration::from_secs(30));
        assert_eq!(config.download.read_timeout(), Duration::from_secs(30));
        assert_eq!(
            config.download.pause_poll_interval(),
            Duration::from_millis(100)
        );
        assert!(config.download.validate().is_ok());
    }

    #[test]
    fn test_default_log_config() {
        let config = LogConfig::default();
        assert!(config.enabled);
        assert_eq!(config.log_dir, PathBuf::from("logs"));
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.level, "info");
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.toml");
        let path = path.to_str().unwrap();

        let mut config = AppConfig::default();
        config.server.port = 20001;
        config.download.chunk_size = 16 * 1024;
        config.save_to_file(path).await.unwrap();

        let loaded = AppConfig::load_from_file(path).await.unwrap();
        assert_eq!(loaded.server.port, 20001);
        assert_eq!(loaded.download.chunk_size, 16 * 1024);
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("partial.toml");
        let download_dir = temp_dir.path().join("dl");
        let content = format!(
            "[download]\ndownload_dir = {:?}\nread_timeout_secs = 5\n",
            download_dir.to_string_lossy()
        );
        tokio::fs::write(&path, content).await.unwrap();

        let loaded = AppConfig::load_from_file(path.to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(loaded.download.read_timeout_secs, 5);
        assert_eq!(loaded.download.connect_timeout_secs, 30);
        assert_eq!(loaded.server.port, 18890);
    }

    #[test]
    fn test_config_validation() {
        let mut config = DownloadConfig::default();
        assert!(config.validate().is_ok());

        config.chunk_size = 0;
        assert!(config.validate().is_err());

        config.chunk_size = 8192;
        config.read_timeout_secs = 0;
        assert!(config.validate().is_err());

        config.read_timeout_secs = 30;
        config.download_dir = PathBuf::from("relative/downloads");
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_load_or_default_writes_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("app.toml");
        let path = path.to_str().unwrap();

        let config = AppConfig::load_or_default(path).await;
        assert_eq!(config.server.port, 18890);
        assert!(std::path::Path::new(path).exists());
    }
}
