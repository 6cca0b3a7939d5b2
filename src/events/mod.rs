//! 事件模块
//!
//! - `types.rs`: 下载事件类型
//! - `sink.rs`: 事件接收端抽象与内置实现
//! - `throttle.rs`: 进度事件节流，用于控制推送端的发布频率

mod sink;
mod throttle;
mod types;

pub use sink::*;
pub use throttle::*;
pub use types::*;
