//! 宿主方法通道
//!
//! 宿主（移动端壳、桌面端等）通过 `{method, arguments}` 形式的调用驱动下载管理器，
//! 方法名与移动端通道保持一致。控制类方法缺少 `id` 时静默忽略

use crate::downloader::{DownloadManager, DownloadRequest};
use crate::error::DownloadError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// 一次方法调用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }

    /// 取 `arguments.id`
    fn id(&self) -> Option<&str> {
        self.arguments.get("id").and_then(Value::as_str)
    }
}

/// 方法调用结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum MethodResult {
    Success {
        #[serde(default)]
        value: Value,
    },
    Error {
        code: String,
        message: String,
    },
    NotImplemented,
}

impl MethodResult {
    fn ok() -> Self {
        Self::Success { value: Value::Null }
    }

    fn value(value: impl Serialize) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => Self::Success { value },
            Err(e) => Self::Error {
                code: "SERIALIZE_ERROR".to_string(),
                message: e.to_string(),
            },
        }
    }
}

impl From<DownloadError> for MethodResult {
    fn from(e: DownloadError) -> Self {
        let code = match &e {
            DownloadError::DuplicateId(_) => "DUPLICATE_ID",
            DownloadError::ShuttingDown => "SHUTTING_DOWN",
            DownloadError::InvalidRequest(_) => "INVALID_REQUEST",
            _ => "DOWNLOAD_ERROR",
        };
        MethodResult::Error {
            code: code.to_string(),
            message: e.to_string(),
        }
    }
}

/// 分发一次方法调用
pub fn dispatch(manager: &DownloadManager, call: &MethodCall) -> MethodResult {
    debug!("通道调用: {}", call.method);

    match call.method.as_str() {
        "initialize" => MethodResult::ok(),
        "startDownload" => {
            let request = match serde_json::from_value::<DownloadRequest>(call.arguments.clone()) {
                Ok(request) => request,
                Err(e) => {
                    warn!("startDownload 参数无法解析，已忽略: {}", e);
                    return MethodResult::ok();
                }
            };
            match manager.start_download(request) {
                Ok(()) => MethodResult::ok(),
                Err(e) => e.into(),
            }
        }
        "pauseDownload" => {
            if let Some(id) = call.id() {
                manager.pause_download(id);
            }
            MethodResult::ok()
        }
        "resumeDownload" => {
            if let Some(id) = call.id() {
                manager.resume_download(id);
            }
            MethodResult::ok()
        }
        "cancelDownload" => {
            if let Some(id) = call.id() {
                manager.cancel_download(id);
            }
            MethodResult::ok()
        }
        "getActiveDownloads" => MethodResult::value(manager.list_active()),
        "getDownload" => MethodResult::value(call.id().and_then(|id| manager.get_download(id))),
        "continueEligible" => MethodResult::value(manager.continue_eligible()),
        other => {
            debug!("未实现的通道方法: {}", other);
            MethodResult::NotImplemented
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DownloadConfig;
    use crate::downloader::transport::test_support::HangingTransport;
    use crate::downloader::transport::FileStorage;
    use crate::downloader::{TaskStatus, TransferEngine};
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> DownloadManager {
        let config = DownloadConfig {
            download_dir: dir.path().to_path_buf(),
            ..DownloadConfig::default()
        };
        let engine =
            TransferEngine::with_parts(&config, Arc::new(HangingTransport), Arc::new(FileStorage));
        DownloadManager::with_engine(&config, engine)
    }

    fn start_args(id: &str) -> Value {
        json!({
            "id": id,
            "url": "mem://file",
            "title": "Title",
            "fileName": "file.bin",
            "filePath": "file.bin",
            "platform": "youtube",
        })
    }

    #[tokio::test]
    async fn test_start_pause_resume_cancel() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);

        let result = dispatch(&manager, &MethodCall::new("startDownload", start_args("d1")));
        assert_eq!(result, MethodResult::Success { value: Value::Null });

        dispatch(&manager, &MethodCall::new("pauseDownload", json!({"id": "d1"})));
        assert_eq!(manager.task("d1").unwrap().status(), TaskStatus::Paused);

        dispatch(&manager, &MethodCall::new("resumeDownload", json!({"id": "d1"})));
        assert_eq!(manager.task("d1").unwrap().status(), TaskStatus::Downloading);

        dispatch(&manager, &MethodCall::new("cancelDownload", json!({"id": "d1"})));
        assert!(manager.task("d1").is_none());
    }

    #[tokio::test]
    async fn test_get_active_downloads() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        dispatch(&manager, &MethodCall::new("startDownload", start_args("d1")));

        match dispatch(&manager, &MethodCall::new("getActiveDownloads", Value::Null)) {
            MethodResult::Success { value } => {
                let list = value.as_array().unwrap();
                assert_eq!(list.len(), 1);
                assert_eq!(list[0]["id"], "d1");
                assert_eq!(list[0]["platform"], "youtube");
            }
            other => panic!("unexpected result: {:?}", other),
        }

        match dispatch(&manager, &MethodCall::new("getDownload", json!({"id": "zz"}))) {
            MethodResult::Success { value } => assert!(value.is_null()),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_duplicate_start_reports_error() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        dispatch(&manager, &MethodCall::new("startDownload", start_args("d1")));

        match dispatch(&manager, &MethodCall::new("startDownload", start_args("d1"))) {
            MethodResult::Error { code, .. } => assert_eq!(code, "DUPLICATE_ID"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_arguments_are_ignored() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);

        let ok = MethodResult::ok();
        assert_eq!(dispatch(&manager, &MethodCall::new("startDownload", json!("oops"))), ok);
        assert_eq!(dispatch(&manager, &MethodCall::new("startDownload", json!({"id": "d1"}))), ok);
        assert_eq!(dispatch(&manager, &MethodCall::new("pauseDownload", Value::Null)), ok);
        assert_eq!(dispatch(&manager, &MethodCall::new("cancelDownload", json!({"id": 5}))), ok);
        assert!(manager.list_active().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        assert_eq!(
            dispatch(&manager, &MethodCall::new("rewind", Value::Null)),
            MethodResult::NotImplemented
        );
        assert_eq!(
            dispatch(&manager, &MethodCall::new("initialize", Value::Null)),
            MethodResult::ok()
        );
    }

    #[test]
    fn test_method_call_deserialize() {
        let call: MethodCall = serde_json::from_str(r#"{"method":"getActiveDownloads"}"#).unwrap();
        assert_eq!(call.method, "getActiveDownloads");
        assert!(call.arguments.is_null());

        let json = serde_json::to_value(MethodResult::NotImplemented).unwrap();
        assert_eq!(json["result"], "notImplemented");
    }
}
