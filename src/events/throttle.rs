//! 进度事件节流器
//!
//! 按任务 ID 分桶控制进度事件的推送频率，避免事件风暴。
//! 只作用于推送端（如 WebSocket），核心事件流本身不做节流

use dashmap::DashMap;
use std::time::{Duration, Instant};

/// 默认节流间隔（毫秒）
pub const DEFAULT_THROTTLE_INTERVAL_MS: u64 = 200;

/// 按 key 分桶的进度节流器
#[derive(Debug)]
pub struct ProgressThrottler {
    /// key -> 上次放行时间
    last_emit: DashMap<String, Instant>,
    interval: Duration,
}

impl ProgressThrottler {
    pub fn new(interval: Duration) -> Self {
        Self {
            last_emit: DashMap::new(),
            interval,
        }
    }

    /// 使用指定毫秒间隔创建节流器
    pub fn with_millis(interval_ms: u64) -> Self {
        Self::new(Duration::from_millis(interval_ms))
    }

    /// 检查 key 对应的事件是否应该放行
    ///
    /// 距离上次放行已超过节流间隔（或从未放行）时返回 true 并记录时间
    pub fn should_emit(&self, key: &str) -> bool {
        let now = Instant::now();
        match self.last_emit.get_mut(key) {
            Some(mut last) => {
                if now.duration_since(*last) >= self.interval {
                    *last = now;
                    true
                } else {
                    false
                }
            }
            None => {
                self.last_emit.insert(key.to_string(), now);
                true
            }
        }
    }

    /// 移除 key 的节流记录（任务结束时调用）
    pub fn forget(&self, key: &str) {
        self.last_emit.remove(key);
    }

    /// 只保留 `keep` 返回 true 的 key，返回移除数量
    pub fn retain(&self, keep: impl Fn(&str) -> bool) -> usize {
        let before = self.last_emit.len();
        self.last_emit.retain(|key, _| keep(key));
        before.saturating_sub(self.last_emit.len())
    }

    pub fn tracked_keys(&self) -> usize {
        self.last_emit.len()
    }
}

impl Default for ProgressThrottler {
    fn default() -> Self {
        Self::with_millis(DEFAULT_THROTTLE_INTERVAL_MS)
    }
}
