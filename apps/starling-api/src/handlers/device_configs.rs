//! 设备配置 handlers
//!
//! - GET /simulation/{id}/deviceConfig - 列出设备配置
//! - PUT /simulation/{id}/deviceConfig - 创建或更新设备配置（ID 取自请求体，缺省时生成）
//! - DELETE /simulation/{id}/deviceConfig - 删除模拟的全部设备配置
//! - GET/PUT/DELETE /simulation/{id}/deviceConfig/{configId}
//!
//! 运行中的模拟在首次用到某模型时读取其配置，之后的修改在下次启动生效。

use crate::AppState;
use crate::utils::{
    bad_request_error, device_config_to_dto, normalize_optional, normalize_required,
    not_found_error, ok, resolve_id, storage_error,
};
use api_contract::{DeviceConfigDto, UpsertDeviceConfigRequest};
use axum::{
    Json,
    extract::{Path, State},
    response::Response,
};
use starling_storage::DeviceConfigRecord;
use uuid::Uuid;

#[derive(serde::Deserialize)]
pub struct ConfigListPath {
    simulation_id: String,
}

#[derive(serde::Deserialize)]
pub struct ConfigPath {
    simulation_id: String,
    config_id: String,
}

/// 模拟存在时返回 None，否则返回错误响应
async fn require_simulation(state: &AppState, simulation_id: &str) -> Option<Response> {
    match state.stores.simulations.find_simulation(simulation_id).await {
        Ok(Some(_)) => None,
        Ok(None) => Some(not_found_error("simulation not found")),
        Err(err) => Some(storage_error(err)),
    }
}

/// 列出设备配置
pub async fn list_device_configs(
    State(state): State<AppState>,
    Path(path): Path<ConfigListPath>,
) -> Response {
    if let Some(response) = require_simulation(&state, &path.simulation_id).await {
        return response;
    }
    match state
        .stores
        .device_configs
        .list_device_configs(&path.simulation_id)
        .await
    {
        Ok(configs) => {
            let data: Vec<DeviceConfigDto> =
                configs.into_iter().map(device_config_to_dto).collect();
            ok(data)
        }
        Err(err) => storage_error(err),
    }
}

/// 获取设备配置
pub async fn get_device_config(
    State(state): State<AppState>,
    Path(path): Path<ConfigPath>,
) -> Response {
    match state
        .stores
        .device_configs
        .find_device_config(&path.simulation_id, &path.config_id)
        .await
    {
        Ok(Some(config)) => ok(device_config_to_dto(config)),
        Ok(None) => not_found_error("device config not found"),
        Err(err) => storage_error(err),
    }
}

/// 创建或更新设备配置；请求体未给出 ID 时生成新 ID
pub async fn create_device_config(
    State(state): State<AppState>,
    Path(path): Path<ConfigListPath>,
    Json(mut req): Json<UpsertDeviceConfigRequest>,
) -> Response {
    let config_id = match normalize_optional(req.id.take(), "id") {
        Ok(value) => value.unwrap_or_else(|| Uuid::new_v4().to_string()),
        Err(response) => return response,
    };
    save_device_config(&state, &path.simulation_id, config_id, req).await
}

/// 创建或更新设备配置
pub async fn upsert_device_config(
    State(state): State<AppState>,
    Path(path): Path<ConfigPath>,
    Json(mut req): Json<UpsertDeviceConfigRequest>,
) -> Response {
    let config_id = match resolve_id(Some(&path.config_id), req.id.take(), "id") {
        Ok(value) => value,
        Err(response) => return response,
    };
    save_device_config(&state, &path.simulation_id, config_id, req).await
}

async fn save_device_config(
    state: &AppState,
    simulation_id: &str,
    config_id: String,
    req: UpsertDeviceConfigRequest,
) -> Response {
    let model_id = match normalize_required(req.model_id, "modelId") {
        Ok(value) => value,
        Err(response) => return response,
    };
    if req.telemetry_interval_ms == Some(0) || req.reported_properties_interval_ms == Some(0) {
        return bad_request_error("intervals must be positive");
    }
    if let Some(response) = require_simulation(state, simulation_id).await {
        return response;
    }
    match state.stores.models.find_model(&model_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found_error(format!("model not found: {}", model_id)),
        Err(err) => return storage_error(err),
    }
    let defaults = DeviceConfigRecord::defaults_for(simulation_id, &model_id);
    let record = DeviceConfigRecord {
        id: config_id,
        simulation_id: simulation_id.to_string(),
        model_id,
        telemetry_interval_ms: req
            .telemetry_interval_ms
            .unwrap_or(defaults.telemetry_interval_ms),
        reported_properties_interval_ms: req
            .reported_properties_interval_ms
            .unwrap_or(defaults.reported_properties_interval_ms),
        features: req.features,
    };
    match state
        .stores
        .device_configs
        .upsert_device_config(simulation_id, record)
        .await
    {
        Ok(config) => ok(device_config_to_dto(config)),
        Err(err) => storage_error(err),
    }
}

/// 删除设备配置
pub async fn delete_device_config(
    State(state): State<AppState>,
    Path(path): Path<ConfigPath>,
) -> Response {
    match state
        .stores
        .device_configs
        .delete_device_config(&path.simulation_id, &path.config_id)
        .await
    {
        Ok(true) => ok(()),
        Ok(false) => not_found_error("device config not found"),
        Err(err) => storage_error(err),
    }
}

/// 删除模拟的全部设备配置，返回删除数量
pub async fn delete_all_device_configs(
    State(state): State<AppState>,
    Path(path): Path<ConfigListPath>,
) -> Response {
    if let Some(response) = require_simulation(&state, &path.simulation_id).await {
        return response;
    }
    let configs = match state
        .stores
        .device_configs
        .list_device_configs(&path.simulation_id)
        .await
    {
        Ok(configs) => configs,
        Err(err) => return storage_error(err),
    };
    let mut deleted = 0usize;
    for config in configs {
        match state
            .stores
            .device_configs
            .delete_device_config(&path.simulation_id, &config.id)
            .await
        {
            Ok(true) => deleted += 1,
            Ok(false) => {}
            Err(err) => return storage_error(err),
        }
    }
    ok(deleted)
}
