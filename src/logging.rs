//! 日志系统
//!
//! 控制台 + 文件双输出。文件按启动时间命名，超过大小上限时滚动到新序号，
//! 启动时清理超过保留天数的旧文件

use crate::config::LogConfig;
use chrono::{Local, NaiveDate};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// 日志文件名前缀
pub const LOG_FILE_PREFIX: &str = "widmate-downloader.";

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// 当前写入中的日志文件
struct RollingState {
    dir: PathBuf,
    /// 启动时间戳 YYYY-MM-DD-HHMMSS
    session: String,
    index: u32,
    file: File,
    written: u64,
    max_size: u64,
}

impl RollingState {
    fn path_for(dir: &Path, session: &str, index: u32) -> PathBuf {
        match index {
            0 => dir.join(format!("{}{}.log", LOG_FILE_PREFIX, session)),
            n => dir.join(format!("{}{}_{}.log", LOG_FILE_PREFIX, session, n)),
        }
    }

    fn open(dir: &Path, session: &str, index: u32) -> io::Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(Self::path_for(dir, session, index))
    }

    fn roll(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.index += 1;
        self.file = Self::open(&self.dir, &self.session, self.index)?;
        self.written = 0;
        Ok(())
    }
}

/// 按大小滚动的日志文件写入器
#[derive(Clone)]
pub struct RollingFileWriter {
    state: Arc<Mutex<RollingState>>,
}

impl RollingFileWriter {
    pub fn new(dir: impl Into<PathBuf>, max_size: u64) -> io::Result<Self> {
        let dir = dir.into();
        let session = Local::now().format("%Y-%m-%d-%H%M%S").to_string();
        let file = RollingState::open(&dir, &session, 0)?;
        Ok(Self {
            state: Arc::new(Mutex::new(RollingState {
                dir,
                session,
                index: 0,
                file,
                written: 0,
                max_size: max_size.max(1),
            })),
        })
    }

    /// 当前正在写入的文件路径
    pub fn current_path(&self) -> PathBuf {
        let state = self.state.lock();
        RollingState::path_for(&state.dir, &state.session, state.index)
    }
}

impl Write for RollingFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        if state.written > 0 && state.written + buf.len() as u64 > state.max_size {
            state.roll()?;
        }
        let n = state.file.write(buf)?;
        state.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.state.lock().file.flush()
    }
}

/// 日志守卫，必须保持存活直到程序退出，否则文件写入线程会提前终止
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// 初始化全局日志订阅器
///
/// 文件输出初始化失败时回退到仅控制台输出
pub fn init_logging(config: &LogConfig) -> LogGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
        .with_ansi(true);

    let writer = if config.enabled {
        fs::create_dir_all(&config.log_dir)
            .and_then(|_| RollingFileWriter::new(&config.log_dir, config.max_file_size))
            .map_err(|e| eprintln!("日志文件初始化失败: {:?}, {}，仅输出到控制台", config.log_dir, e))
            .ok()
    } else {
        None
    };

    let Some(writer) = writer else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();
        info!("日志系统初始化完成（仅控制台输出）");
        return LogGuard { _file_guard: None };
    };

    let (non_blocking, file_guard) = tracing_appender::non_blocking(writer);
    let file_layer = fmt::layer()
        .with_target(true)
        .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
        .with_ansi(false)
        .with_writer(non_blocking);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!(
        "日志系统初始化完成: 目录={:?}, 级别={}, 保留{}天, 单文件最大{:.1}MB",
        config.log_dir,
        config.level,
        config.retention_days,
        config.max_file_size as f64 / 1024.0 / 1024.0
    );

    let removed = cleanup_old_logs(&config.log_dir, config.retention_days, Local::now().date_naive());
    if removed > 0 {
        info!("已清理 {} 个过期日志文件", removed);
    }

    LogGuard {
        _file_guard: Some(file_guard),
    }
}

/// 从日志文件名中取出日期，非本程序的日志文件返回 None
fn log_file_date(filename: &str) -> Option<NaiveDate> {
    let stem = filename.strip_prefix(LOG_FILE_PREFIX)?.strip_suffix(".log")?;
    let date = stem.get(..10)?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// 删除早于 `today - retention_days` 的日志文件，返回删除数量
fn cleanup_old_logs(dir: &Path, retention_days: u32, today: NaiveDate) -> usize {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("读取日志目录失败: {:?}, {}", dir, e);
            return 0;
        }
    };

    let retention = chrono::Duration::days(i64::from(retention_days));
    let mut removed = 0;

    for entry in entries.flatten() {
        let path = entry.path();
        let Some(date) = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(log_file_date)
        else {
            continue;
        };
        if today.signed_duration_since(date) <= retention {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("已删除过期日志: {:?}", path);
                removed += 1;
            }
            Err(e) => warn!("删除过期日志失败: {:?}, {}", path, e),
        }
    }

    removed
}
