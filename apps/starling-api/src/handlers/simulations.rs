//! 模拟 handlers
//!
//! 提供模拟资源与生命周期接口：
//! - GET /simulation - 列出模拟
//! - GET /simulation/{id} - 获取模拟详情（含设备配置）
//! - PUT /simulation, PUT /simulation/{id} - 创建或更新模拟（集合级请求的 ID 在请求体中）
//! - DELETE /simulation/{id} - 删除模拟（运行中拒绝）
//! - POST /simulation/{id}/start, /stop - 启动/停止
//! - GET /simulation/{id}/devices - 设备运行状态
//! - POST /simulation/{id}/provision/{modelId}/{numDevices} - 批量开通
//! - DELETE /simulation/{id}/provision[/{modelId}/{numDevices}] - 批量删除
//!
//! 批量接口只返回受理的设备 ID，设备进度通过 /devices 轮询。

use crate::AppState;
use crate::utils::{
    conflict_error, device_config_to_dto, device_status_to_dto, normalize_optional,
    normalize_required, not_found_error, ok, parse_device_count, resolve_id, simulation_error,
    simulation_to_dto, storage_error,
};
use api_contract::{
    DeviceBatchDto, DeviceStatusDto, SimulationDetailDto, SimulationDto, UpsertSimulationRequest,
};
use axum::{
    Json,
    extract::{Path, State},
    response::Response,
};
use starling_simulation::Batch;
use starling_storage::SimulationRecord;
use tracing::info;

#[derive(serde::Deserialize)]
pub struct SimulationPath {
    simulation_id: String,
}

#[derive(serde::Deserialize)]
pub struct ProvisionPath {
    simulation_id: String,
    model_id: String,
    num_devices: String,
}

/// 列出模拟
pub async fn list_simulations(State(state): State<AppState>) -> Response {
    match state.stores.simulations.list_simulations().await {
        Ok(records) => {
            let data: Vec<SimulationDto> = records.into_iter().map(simulation_to_dto).collect();
            ok(data)
        }
        Err(err) => storage_error(err),
    }
}

/// 获取模拟详情
pub async fn get_simulation(
    State(state): State<AppState>,
    Path(path): Path<SimulationPath>,
) -> Response {
    let record = match state
        .stores
        .simulations
        .find_simulation(&path.simulation_id)
        .await
    {
        Ok(Some(record)) => record,
        Ok(None) => return not_found_error("simulation not found"),
        Err(err) => return storage_error(err),
    };
    match state
        .stores
        .device_configs
        .list_device_configs(&path.simulation_id)
        .await
    {
        Ok(configs) => ok(SimulationDetailDto {
            simulation: simulation_to_dto(record),
            device_configs: configs.into_iter().map(device_config_to_dto).collect(),
        }),
        Err(err) => storage_error(err),
    }
}

/// 创建或更新模拟（ID 取自路径）
pub async fn upsert_simulation(
    State(state): State<AppState>,
    Path(path): Path<SimulationPath>,
    Json(req): Json<UpsertSimulationRequest>,
) -> Response {
    save_simulation(&state, Some(&path.simulation_id), req).await
}

/// 创建或更新模拟（ID 取自请求体）
pub async fn put_simulation(
    State(state): State<AppState>,
    Json(req): Json<UpsertSimulationRequest>,
) -> Response {
    save_simulation(&state, None, req).await
}

/// 状态与最近错误保持存储中的值，只能通过生命周期接口修改。
async fn save_simulation(
    state: &AppState,
    path_id: Option<&str>,
    req: UpsertSimulationRequest,
) -> Response {
    let simulation_id = match resolve_id(path_id, req.id, "id") {
        Ok(value) => value,
        Err(response) => return response,
    };
    let target_id = match normalize_required(req.target_id, "targetId") {
        Ok(value) => value,
        Err(response) => return response,
    };
    let name = match normalize_optional(req.name, "name") {
        Ok(value) => value,
        Err(response) => return response,
    };
    if state.controller.has_runner(&simulation_id) {
        return conflict_error(format!(
            "simulation {} is running and cannot be modified",
            simulation_id
        ));
    }
    match state.stores.targets.find_target(&target_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found_error(format!("target not found: {}", target_id)),
        Err(err) => return storage_error(err),
    }
    let existing = match state.stores.simulations.find_simulation(&simulation_id).await {
        Ok(existing) => existing,
        Err(err) => return storage_error(err),
    };
    let record = SimulationRecord {
        name: name
            .or_else(|| existing.as_ref().map(|record| record.name.clone()))
            .unwrap_or_else(|| simulation_id.clone()),
        id: simulation_id,
        target_id,
        status: existing
            .as_ref()
            .map(|record| record.status)
            .unwrap_or_default(),
        last_error: existing.and_then(|record| record.last_error),
        settings: req.settings,
    };
    match state.stores.simulations.upsert_simulation(record).await {
        Ok(record) => ok(simulation_to_dto(record)),
        Err(err) => storage_error(err),
    }
}

/// 删除模拟
pub async fn delete_simulation(
    State(state): State<AppState>,
    Path(path): Path<SimulationPath>,
) -> Response {
    match state
        .controller
        .delete_simulation(&path.simulation_id)
        .await
    {
        Ok(()) => ok(()),
        Err(err) => simulation_error(err),
    }
}

/// 启动模拟
pub async fn start_simulation(
    State(state): State<AppState>,
    Path(path): Path<SimulationPath>,
) -> Response {
    match state
        .controller
        .start_simulation(&path.simulation_id)
        .await
    {
        Ok(record) => ok(simulation_to_dto(record)),
        Err(err) => simulation_error(err),
    }
}

/// 停止模拟；全部设备退出后返回
pub async fn stop_simulation(
    State(state): State<AppState>,
    Path(path): Path<SimulationPath>,
) -> Response {
    match state.controller.stop_simulation(&path.simulation_id).await {
        Ok(record) => ok(simulation_to_dto(record)),
        Err(err) => simulation_error(err),
    }
}

/// 设备运行状态
pub async fn list_device_statuses(
    State(state): State<AppState>,
    Path(path): Path<SimulationPath>,
) -> Response {
    match state.controller.device_statuses(&path.simulation_id).await {
        Ok(statuses) => {
            let data: Vec<DeviceStatusDto> =
                statuses.into_iter().map(device_status_to_dto).collect();
            ok(data)
        }
        Err(err) => simulation_error(err),
    }
}

/// 批量开通
pub async fn provision_devices(
    State(state): State<AppState>,
    Path(path): Path<ProvisionPath>,
) -> Response {
    let count = match parse_device_count(&path.num_devices) {
        Ok(count) => count,
        Err(response) => return response,
    };
    match state
        .controller
        .provision_devices(&path.simulation_id, &path.model_id, count)
        .await
    {
        Ok(batch) => accepted(path.simulation_id, Some(path.model_id), batch, "provision"),
        Err(err) => simulation_error(err),
    }
}

/// 删除某模型下最多 N 个设备
pub async fn delete_devices(
    State(state): State<AppState>,
    Path(path): Path<ProvisionPath>,
) -> Response {
    let count = match parse_device_count(&path.num_devices) {
        Ok(count) => count,
        Err(response) => return response,
    };
    match state
        .controller
        .delete_devices(&path.simulation_id, &path.model_id, count)
        .await
    {
        Ok(batch) => accepted(path.simulation_id, Some(path.model_id), batch, "delete"),
        Err(err) => simulation_error(err),
    }
}

/// 删除模拟的全部设备
pub async fn delete_all_devices(
    State(state): State<AppState>,
    Path(path): Path<SimulationPath>,
) -> Response {
    match state
        .controller
        .delete_all_devices(&path.simulation_id)
        .await
    {
        Ok(batch) => accepted(path.simulation_id, None, batch, "delete"),
        Err(err) => simulation_error(err),
    }
}

fn accepted(
    simulation_id: String,
    model_id: Option<String>,
    batch: Batch,
    operation: &'static str,
) -> Response {
    info!(
        target: "starling.api",
        simulation_id = %simulation_id,
        operation = operation,
        devices = batch.device_ids.len(),
        "device_batch_accepted"
    );
    ok(DeviceBatchDto {
        simulation_id,
        model_id,
        device_ids: batch.device_ids,
    })
}
