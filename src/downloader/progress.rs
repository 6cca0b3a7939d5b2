use std::time::{Duration, Instant};

/// 单次进度快照
///
/// 引擎每写入一个块后生成一次，字段与 `progress` 事件的负载一一对应
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    /// 进度 [0, 1]
    pub progress: f64,
    /// 已下载字节数
    pub downloaded_bytes: u64,
    /// 总字节数（0 表示未知）
    pub total_bytes: u64,
    /// 平均速度 (bytes/s)
    pub speed: u64,
    /// 预计剩余时间（秒）
    pub eta: u64,
}

/// 速度计算器
///
/// 速度取传输开始以来的简单平均值（不是滑动窗口），每个块重新计算一次
#[derive(Debug, Clone)]
pub struct SpeedCalculator {
    started_at: Instant,
    total_bytes: u64,
}

impl SpeedCalculator {
    pub fn new(total_bytes: u64) -> Self {
        Self::starting_at(Instant::now(), total_bytes)
    }

    pub fn starting_at(started_at: Instant, total_bytes: u64) -> Self {
        Self {
            started_at,
            total_bytes,
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// 以当前时刻计算进度快照
    pub fn sample(&self, downloaded_bytes: u64) -> ProgressSample {
        self.sample_after(downloaded_bytes, self.started_at.elapsed())
    }

    /// 以给定的已用时间计算进度快照
    pub fn sample_after(&self, downloaded_bytes: u64, elapsed: Duration) -> ProgressSample {
        let speed = average_speed(downloaded_bytes, elapsed);
        ProgressSample {
            progress: progress_ratio(downloaded_bytes, self.total_bytes),
            downloaded_bytes,
            total_bytes: self.total_bytes,
            speed,
            eta: estimate_eta(downloaded_bytes, self.total_bytes, speed),
        }
    }
}

/// downloaded / total，总大小未知时为 0，结果夹在 [0, 1]
pub fn progress_ratio(downloaded_bytes: u64, total_bytes: u64) -> f64 {
    if total_bytes == 0 {
        return 0.0;
    }
    (downloaded_bytes as f64 / total_bytes as f64).clamp(0.0, 1.0)
}

/// 传输开始以来的平均速度 (bytes/s)
pub fn average_speed(downloaded_bytes: u64, elapsed: Duration) -> u64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0;
    }
    (downloaded_bytes as f64 / secs) as u64
}

/// 剩余秒数；速度为 0 或已到达总大小时为 0
pub fn estimate_eta(downloaded_bytes: u64, total_bytes: u64, speed: u64) -> u64 {
    if speed == 0 || downloaded_bytes >= total_bytes {
        return 0;
    }
    (total_bytes - downloaded_bytes) / speed
}
