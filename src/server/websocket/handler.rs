//! WebSocket 路由处理器

use crate::server::websocket::message::{WsClientMessage, WsServerMessage};
use crate::server::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// GET /api/v1/ws
pub async fn handle_websocket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4().to_string();
    let mut outgoing = state.ws_manager.register(connection_id.clone());
    let (mut sender, mut receiver) = socket.split();

    if let Ok(json) = serde_json::to_string(&WsServerMessage::connected(connection_id.clone())) {
        if sender.send(Message::Text(json)).await.is_err() {
            error!("发送连接成功消息失败");
            state.ws_manager.unregister(&connection_id);
            return;
        }
    }

    let send_task = tokio::spawn(async move {
        while let Some(message) = outgoing.recv().await {
            match serde_json::to_string(&message) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(e) => error!("序列化消息失败: {}", e),
            }
        }
    });

    let recv_state = state.clone();
    let recv_id = connection_id.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => handle_client_message(&recv_state, &recv_id, &text),
                Message::Binary(data) => {
                    if let Ok(text) = String::from_utf8(data) {
                        handle_client_message(&recv_state, &recv_id, &text);
                    }
                }
                Message::Ping(_) | Message::Pong(_) => recv_state.ws_manager.touch(&recv_id),
                Message::Close(_) => {
                    info!("收到关闭消息: {}", recv_id);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = send_task => debug!("发送任务结束: {}", connection_id),
        _ = recv_task => debug!("接收任务结束: {}", connection_id),
    }

    state.ws_manager.unregister(&connection_id);
}

fn handle_client_message(state: &AppState, connection_id: &str, text: &str) {
    state.ws_manager.touch(connection_id);

    let reply = match serde_json::from_str::<WsClientMessage>(text) {
        Ok(WsClientMessage::Ping { timestamp }) => WsServerMessage::pong(Some(timestamp)),
        Ok(WsClientMessage::RequestSnapshot) => {
            debug!("收到快照请求: {}", connection_id);
            WsServerMessage::snapshot(state.download_manager.list_active())
        }
        Err(e) => {
            warn!("解析客户端消息失败: {} - {}", connection_id, e);
            WsServerMessage::error("PARSE_ERROR", format!("消息解析失败: {}", e))
        }
    };
    state.ws_manager.send_to(connection_id, reply);
}
