//! 目标平台 handlers
//!
//! - GET/PUT /target, GET/PUT/DELETE /target/{id} - 目标平台 CRUD
//! - GET/PUT/DELETE /target/{id}/models - 目标关联的设备模型
//! - GET/PUT/DELETE /target/{id}/device - 目标设备列表 / 创建或更新 / 清空
//! - GET/PUT/DELETE /target/{id}/device/{deviceId} - 单个目标设备
//!
//! 目标设备接口直接读写存储，不经过平台协议；被运行中模拟使用的目标不可删除或清空设备。

use crate::AppState;
use crate::utils::{
    conflict_error, model_to_dto, normalize_optional, normalize_required, not_found_error, ok,
    resolve_id, storage_error, target_device_to_dto, target_to_dto,
};
use api_contract::{
    ModelDto, TargetDeviceDto, TargetDto, TargetModelsRequest, UpsertTargetDeviceRequest,
    UpsertTargetRequest,
};
use axum::{
    Json,
    extract::{Path, State},
    response::Response,
};
use domain::TargetEndpoints;
use starling_storage::{TargetDeviceRecord, TargetRecord};

#[derive(serde::Deserialize)]
pub struct TargetPath {
    target_id: String,
}

#[derive(serde::Deserialize)]
pub struct TargetDevicePath {
    target_id: String,
    device_id: String,
}

async fn load_target(state: &AppState, target_id: &str) -> Result<TargetRecord, Response> {
    match state.stores.targets.find_target(target_id).await {
        Ok(Some(target)) => Ok(target),
        Ok(None) => Err(not_found_error("target not found")),
        Err(err) => Err(storage_error(err)),
    }
}

/// 目标被运行中的模拟使用时返回冲突响应
async fn ensure_target_idle(state: &AppState, target_id: &str) -> Option<Response> {
    let simulations = match state.stores.simulations.list_simulations().await {
        Ok(simulations) => simulations,
        Err(err) => return Some(storage_error(err)),
    };
    simulations
        .into_iter()
        .find(|simulation| {
            simulation.target_id == target_id && state.controller.has_runner(&simulation.id)
        })
        .map(|simulation| {
            conflict_error(format!(
                "target {} is in use by running simulation {}",
                target_id, simulation.id
            ))
        })
}

/// 列出目标平台
pub async fn list_targets(State(state): State<AppState>) -> Response {
    match state.stores.targets.list_targets().await {
        Ok(targets) => {
            let data: Vec<TargetDto> = targets.into_iter().map(target_to_dto).collect();
            ok(data)
        }
        Err(err) => storage_error(err),
    }
}

/// 获取目标平台
pub async fn get_target(State(state): State<AppState>, Path(path): Path<TargetPath>) -> Response {
    match load_target(&state, &path.target_id).await {
        Ok(target) => ok(target_to_dto(target)),
        Err(response) => response,
    }
}

/// 创建或更新目标平台（ID 取自路径）
pub async fn upsert_target(
    State(state): State<AppState>,
    Path(path): Path<TargetPath>,
    Json(req): Json<UpsertTargetRequest>,
) -> Response {
    save_target(&state, Some(&path.target_id), req).await
}

/// 创建或更新目标平台（ID 取自请求体）
pub async fn put_target(
    State(state): State<AppState>,
    Json(req): Json<UpsertTargetRequest>,
) -> Response {
    save_target(&state, None, req).await
}

/// 未提供 modelIds 时保留已有关联。
async fn save_target(
    state: &AppState,
    path_id: Option<&str>,
    req: UpsertTargetRequest,
) -> Response {
    let target_id = match resolve_id(path_id, req.id, "id") {
        Ok(value) => value,
        Err(response) => return response,
    };
    let provisioning_endpoint =
        match normalize_required(req.provisioning_endpoint, "provisioningEndpoint") {
            Ok(value) => value,
            Err(response) => return response,
        };
    let data_endpoint = match normalize_required(req.data_endpoint, "dataEndpoint") {
        Ok(value) => value,
        Err(response) => return response,
    };
    let name = match normalize_optional(req.name, "name") {
        Ok(value) => value,
        Err(response) => return response,
    };
    let existing = match state.stores.targets.find_target(&target_id).await {
        Ok(existing) => existing,
        Err(err) => return storage_error(err),
    };
    let record = TargetRecord {
        name: name
            .or_else(|| existing.as_ref().map(|target| target.name.clone()))
            .unwrap_or_else(|| target_id.clone()),
        id: target_id,
        endpoints: TargetEndpoints {
            provisioning_endpoint,
            data_endpoint,
            id_scope: req.id_scope,
            shared_access_key: req.shared_access_key,
        },
        model_ids: req
            .model_ids
            .or_else(|| existing.map(|target| target.model_ids))
            .unwrap_or_default(),
    };
    match state.stores.targets.upsert_target(record).await {
        Ok(target) => ok(target_to_dto(target)),
        Err(err) => storage_error(err),
    }
}

/// 删除目标平台
pub async fn delete_target(
    State(state): State<AppState>,
    Path(path): Path<TargetPath>,
) -> Response {
    if let Some(response) = ensure_target_idle(&state, &path.target_id).await {
        return response;
    }
    match state.stores.targets.delete_target(&path.target_id).await {
        Ok(true) => ok(()),
        Ok(false) => not_found_error("target not found"),
        Err(err) => storage_error(err),
    }
}

/// 目标关联的设备模型；已删除的模型被跳过
pub async fn list_target_models(
    State(state): State<AppState>,
    Path(path): Path<TargetPath>,
) -> Response {
    let target = match load_target(&state, &path.target_id).await {
        Ok(target) => target,
        Err(response) => return response,
    };
    let mut data: Vec<ModelDto> = Vec::with_capacity(target.model_ids.len());
    for model_id in &target.model_ids {
        match state.stores.models.find_model(model_id).await {
            Ok(Some(model)) => data.push(model_to_dto(model)),
            Ok(None) => {}
            Err(err) => return storage_error(err),
        }
    }
    ok(data)
}

/// 替换目标关联的设备模型
pub async fn set_target_models(
    State(state): State<AppState>,
    Path(path): Path<TargetPath>,
    Json(req): Json<TargetModelsRequest>,
) -> Response {
    let mut target = match load_target(&state, &path.target_id).await {
        Ok(target) => target,
        Err(response) => return response,
    };
    let mut model_ids = Vec::with_capacity(req.model_ids.len());
    for model_id in req.model_ids {
        let model_id = match normalize_required(model_id, "modelIds") {
            Ok(value) => value,
            Err(response) => return response,
        };
        match state.stores.models.find_model(&model_id).await {
            Ok(Some(_)) => {}
            Ok(None) => return not_found_error(format!("model not found: {}", model_id)),
            Err(err) => return storage_error(err),
        }
        if !model_ids.contains(&model_id) {
            model_ids.push(model_id);
        }
    }
    target.model_ids = model_ids;
    match state.stores.targets.upsert_target(target).await {
        Ok(target) => ok(target_to_dto(target)),
        Err(err) => storage_error(err),
    }
}

/// 清除目标关联的设备模型
pub async fn clear_target_models(
    State(state): State<AppState>,
    Path(path): Path<TargetPath>,
) -> Response {
    let mut target = match load_target(&state, &path.target_id).await {
        Ok(target) => target,
        Err(response) => return response,
    };
    target.model_ids.clear();
    match state.stores.targets.upsert_target(target).await {
        Ok(target) => ok(target_to_dto(target)),
        Err(err) => storage_error(err),
    }
}

/// 列出目标设备
pub async fn list_target_devices(
    State(state): State<AppState>,
    Path(path): Path<TargetPath>,
) -> Response {
    if let Err(response) = load_target(&state, &path.target_id).await {
        return response;
    }
    match state
        .stores
        .target_devices
        .list_target_devices(&path.target_id)
        .await
    {
        Ok(devices) => {
            let data: Vec<TargetDeviceDto> =
                devices.into_iter().map(target_device_to_dto).collect();
            ok(data)
        }
        Err(err) => storage_error(err),
    }
}

/// 获取目标设备
pub async fn get_target_device(
    State(state): State<AppState>,
    Path(path): Path<TargetDevicePath>,
) -> Response {
    match state
        .stores
        .target_devices
        .find_target_device(&path.target_id, &path.device_id)
        .await
    {
        Ok(Some(device)) => ok(target_device_to_dto(device)),
        Ok(None) => not_found_error("target device not found"),
        Err(err) => storage_error(err),
    }
}

/// 创建或更新目标设备（设备 ID 取自路径）
pub async fn upsert_target_device(
    State(state): State<AppState>,
    Path(path): Path<TargetDevicePath>,
    Json(req): Json<UpsertTargetDeviceRequest>,
) -> Response {
    save_target_device(&state, &path.target_id, Some(&path.device_id), req).await
}

/// 创建或更新目标设备（设备 ID 取自请求体）
pub async fn put_target_device(
    State(state): State<AppState>,
    Path(path): Path<TargetPath>,
    Json(req): Json<UpsertTargetDeviceRequest>,
) -> Response {
    save_target_device(&state, &path.target_id, None, req).await
}

async fn save_target_device(
    state: &AppState,
    target_id: &str,
    path_device_id: Option<&str>,
    req: UpsertTargetDeviceRequest,
) -> Response {
    let device_id = match resolve_id(path_device_id, req.device_id, "deviceId") {
        Ok(value) => value,
        Err(response) => return response,
    };
    if let Err(response) = load_target(state, target_id).await {
        return response;
    }
    let existing = match state
        .stores
        .target_devices
        .find_target_device(target_id, &device_id)
        .await
    {
        Ok(existing) => existing,
        Err(err) => return storage_error(err),
    };
    let record = match existing {
        Some(mut record) => {
            if let Some(simulation_id) = req.simulation_id {
                record.simulation_id = simulation_id;
            }
            if let Some(model_id) = req.model_id {
                record.model_id = model_id;
            }
            if req.credentials.is_some() {
                record.credentials = req.credentials;
            }
            record
        }
        None => TargetDeviceRecord {
            device_id,
            target_id: target_id.to_string(),
            simulation_id: req.simulation_id.unwrap_or_default(),
            model_id: req.model_id.unwrap_or_default(),
            credentials: req.credentials,
            created_at_ms: domain::now_epoch_ms(),
        },
    };
    match state
        .stores
        .target_devices
        .upsert_target_device(record)
        .await
    {
        Ok(device) => ok(target_device_to_dto(device)),
        Err(err) => storage_error(err),
    }
}

/// 删除目标设备
pub async fn delete_target_device(
    State(state): State<AppState>,
    Path(path): Path<TargetDevicePath>,
) -> Response {
    match state
        .stores
        .target_devices
        .delete_target_device(&path.target_id, &path.device_id)
        .await
    {
        Ok(true) => ok(()),
        Ok(false) => not_found_error("target device not found"),
        Err(err) => storage_error(err),
    }
}

/// 清空目标下的全部设备，返回删除数量
pub async fn delete_all_target_devices(
    State(state): State<AppState>,
    Path(path): Path<TargetPath>,
) -> Response {
    if let Err(response) = load_target(&state, &path.target_id).await {
        return response;
    }
    if let Some(response) = ensure_target_idle(&state, &path.target_id).await {
        return response;
    }
    match state
        .stores
        .target_devices
        .delete_all_target_devices(&path.target_id)
        .await
    {
        Ok(deleted) => ok(deleted),
        Err(err) => storage_error(err),
    }
}
