//! 设备模型 handlers
//!
//! - GET /model - 列出设备模型
//! - PUT /model - 创建或更新（ID 取自请求体）
//! - GET/PUT/DELETE /model/{id}

use crate::AppState;
use crate::utils::{
    bad_request_error, model_to_dto, normalize_optional, not_found_error, ok, resolve_id,
    storage_error,
};
use api_contract::{ModelDto, UpsertModelRequest};
use axum::{
    Json,
    extract::{Path, State},
    response::Response,
};
use domain::CapabilityModel;
use starling_storage::DeviceModelRecord;

#[derive(serde::Deserialize)]
pub struct ModelPath {
    model_id: String,
}

/// 列出设备模型
pub async fn list_models(State(state): State<AppState>) -> Response {
    match state.stores.models.list_models().await {
        Ok(models) => {
            let data: Vec<ModelDto> = models.into_iter().map(model_to_dto).collect();
            ok(data)
        }
        Err(err) => storage_error(err),
    }
}

/// 获取设备模型
pub async fn get_model(State(state): State<AppState>, Path(path): Path<ModelPath>) -> Response {
    match state.stores.models.find_model(&path.model_id).await {
        Ok(Some(model)) => ok(model_to_dto(model)),
        Ok(None) => not_found_error("model not found"),
        Err(err) => storage_error(err),
    }
}

/// 创建或更新设备模型
///
/// 已开通设备在下次启动模拟时才使用新的模型定义。
pub async fn upsert_model(
    State(state): State<AppState>,
    Path(path): Path<ModelPath>,
    Json(req): Json<UpsertModelRequest>,
) -> Response {
    save_model(&state, Some(&path.model_id), req).await
}

pub async fn put_model(
    State(state): State<AppState>,
    Json(req): Json<UpsertModelRequest>,
) -> Response {
    save_model(&state, None, req).await
}

async fn save_model(
    state: &AppState,
    path_id: Option<&str>,
    req: UpsertModelRequest,
) -> Response {
    let model_id = match resolve_id(path_id, req.id, "id") {
        Ok(value) => value,
        Err(response) => return response,
    };
    let name = match normalize_optional(req.name, "name") {
        Ok(value) => value,
        Err(response) => return response,
    };
    let capability = CapabilityModel {
        components: req.components,
    };
    if let Err(message) = capability.validate() {
        return bad_request_error(message);
    }
    let record = DeviceModelRecord {
        name: name.unwrap_or_else(|| model_id.clone()),
        id: model_id,
        capability,
    };
    match state.stores.models.upsert_model(record).await {
        Ok(model) => ok(model_to_dto(model)),
        Err(err) => storage_error(err),
    }
}

/// 删除设备模型
pub async fn delete_model(State(state): State<AppState>, Path(path): Path<ModelPath>) -> Response {
    match state.stores.models.delete_model(&path.model_id).await {
        Ok(true) => ok(()),
        Ok(false) => not_found_error("model not found"),
        Err(err) => storage_error(err),
    }
}
