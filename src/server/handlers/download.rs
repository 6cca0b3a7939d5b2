use crate::downloader::{DownloadRequest, TaskSnapshot};
use crate::error::DownloadError;
use crate::server::channel::{self, MethodCall, MethodResult};
use crate::server::{ApiError, ApiResponse, ApiResult, AppState};
use axum::{
    extract::{Path, State},
    response::Json,
};
use tracing::info;

fn require_snapshot(app_state: &AppState, id: &str) -> Result<TaskSnapshot, ApiError> {
    app_state
        .download_manager
        .get_download(id)
        .ok_or_else(|| DownloadError::NotFound(id.to_string()).into())
}

/// POST /api/v1/downloads
/// 创建并启动下载任务
pub async fn create_download(
    State(app_state): State<AppState>,
    Json(req): Json<DownloadRequest>,
) -> ApiResult<String> {
    // HTTP 接口对缺字段的请求直接报错，不走静默忽略
    let id = req.clone().validate()?.id;
    app_state.download_manager.start_download(req)?;
    info!("API: 创建下载任务 {}", id);
    Ok(Json(ApiResponse::success(id)))
}

/// GET /api/v1/downloads
pub async fn list_downloads(State(app_state): State<AppState>) -> ApiResult<Vec<TaskSnapshot>> {
    Ok(Json(ApiResponse::success(
        app_state.download_manager.list_active(),
    )))
}

/// GET /api/v1/downloads/:id
pub async fn get_download(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<TaskSnapshot> {
    Ok(Json(ApiResponse::success(require_snapshot(&app_state, &id)?)))
}

/// POST /api/v1/downloads/:id/pause
pub async fn pause_download(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<TaskSnapshot> {
    require_snapshot(&app_state, &id)?;
    app_state.download_manager.pause_download(&id);
    Ok(Json(ApiResponse::success(require_snapshot(&app_state, &id)?)))
}

/// POST /api/v1/downloads/:id/resume
pub async fn resume_download(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<TaskSnapshot> {
    require_snapshot(&app_state, &id)?;
    app_state.download_manager.resume_download(&id);
    Ok(Json(ApiResponse::success(require_snapshot(&app_state, &id)?)))
}

/// DELETE /api/v1/downloads/:id
/// 取消任务并从列表移除
pub async fn cancel_download(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<String> {
    require_snapshot(&app_state, &id)?;
    app_state.download_manager.cancel_download(&id);
    Ok(Json(ApiResponse::success(id)))
}

/// POST /api/v1/downloads/continue
/// 继续所有被宿主挂起的传输
pub async fn continue_downloads(State(app_state): State<AppState>) -> ApiResult<usize> {
    Ok(Json(ApiResponse::success(
        app_state.download_manager.continue_eligible(),
    )))
}

/// DELETE /api/v1/downloads/clear/finished
pub async fn clear_finished(State(app_state): State<AppState>) -> ApiResult<usize> {
    Ok(Json(ApiResponse::success(
        app_state.download_manager.clear_finished(),
    )))
}

/// POST /api/v1/channel
/// 宿主方法通道
pub async fn channel_call(
    State(app_state): State<AppState>,
    Json(call): Json<MethodCall>,
) -> Json<MethodResult> {
    Json(channel::dispatch(&app_state.download_manager, &call))
}
