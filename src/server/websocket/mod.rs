//! WebSocket 模块
//!
//! 把下载事件实时推送给所有已连接的客户端

mod handler;
mod manager;
mod message;

pub use handler::handle_websocket;
pub use manager::WebSocketManager;
pub use message::{WsClientMessage, WsServerMessage};
