//! HTTP 响应辅助函数和 DTO 转换
//!
//! 提供统一的错误响应构造函数和 DTO 转换函数：
//! - 错误响应：bad_request_error, not_found_error, conflict_error, storage_error, simulation_error
//! - DTO 转换：simulation_to_dto, device_config_to_dto, target_to_dto, target_device_to_dto,
//!   model_to_dto, device_status_to_dto
//!
//! 错误码与状态码对应：
//! - 400 INVALID.REQUEST
//! - 404 RESOURCE.NOT_FOUND
//! - 409 SIMULATION.CONFLICT
//! - 500 INTERNAL.ERROR

use api_contract::{
    ApiResponse, DeviceConfigDto, DeviceStatusDto, ModelDto, SimulationDto, TargetDeviceDto,
    TargetDto,
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use starling_simulation::{DeviceStatus, SimulationError};
use starling_storage::{
    DeviceConfigRecord, DeviceModelRecord, SimulationRecord, StorageError, TargetDeviceRecord,
    TargetRecord,
};

/// 成功响应
pub fn ok<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

/// 错误请求响应
pub fn bad_request_error(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::<()>::error("INVALID.REQUEST", message.into())),
    )
        .into_response()
}

/// 资源未找到错误响应
pub fn not_found_error(message: impl Into<String>) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::<()>::error("RESOURCE.NOT_FOUND", message.into())),
    )
        .into_response()
}

/// 生命周期冲突响应
pub fn conflict_error(message: impl Into<String>) -> Response {
    (
        StatusCode::CONFLICT,
        Json(ApiResponse::<()>::error("SIMULATION.CONFLICT", message.into())),
    )
        .into_response()
}

/// 存储错误响应
pub fn storage_error(err: StorageError) -> Response {
    let message = err.to_string();
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::<()>::error("INTERNAL.ERROR", message)),
    )
        .into_response()
}

/// 模拟引擎错误响应
pub fn simulation_error(err: SimulationError) -> Response {
    let message = err.to_string();
    match err {
        SimulationError::NotFound { .. } => not_found_error(message),
        SimulationError::NotRunning(_) | SimulationError::AlreadyRunning(_) => {
            conflict_error(message)
        }
        SimulationError::Invalid(_) => bad_request_error(message),
        SimulationError::Storage(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::<()>::error("INTERNAL.ERROR", message)),
        )
            .into_response(),
    }
}

/// SimulationRecord 转 SimulationDto
pub fn simulation_to_dto(record: SimulationRecord) -> SimulationDto {
    SimulationDto {
        id: record.id,
        name: record.name,
        target_id: record.target_id,
        status: record.status.as_str().to_string(),
        last_error: record.last_error,
        settings: record.settings,
    }
}

/// DeviceConfigRecord 转 DeviceConfigDto
pub fn device_config_to_dto(record: DeviceConfigRecord) -> DeviceConfigDto {
    DeviceConfigDto {
        id: record.id,
        simulation_id: record.simulation_id,
        model_id: record.model_id,
        telemetry_interval_ms: record.telemetry_interval_ms,
        reported_properties_interval_ms: record.reported_properties_interval_ms,
        features: record.features,
    }
}

/// TargetRecord 转 TargetDto
pub fn target_to_dto(record: TargetRecord) -> TargetDto {
    TargetDto {
        id: record.id,
        name: record.name,
        provisioning_endpoint: record.endpoints.provisioning_endpoint,
        data_endpoint: record.endpoints.data_endpoint,
        id_scope: record.endpoints.id_scope,
        has_shared_access_key: record.endpoints.shared_access_key.is_some(),
        model_ids: record.model_ids,
    }
}

/// TargetDeviceRecord 转 TargetDeviceDto
pub fn target_device_to_dto(record: TargetDeviceRecord) -> TargetDeviceDto {
    TargetDeviceDto {
        registered: record.credentials.is_some(),
        device_id: record.device_id,
        target_id: record.target_id,
        simulation_id: record.simulation_id,
        model_id: record.model_id,
        created_at_ms: record.created_at_ms,
    }
}

/// DeviceModelRecord 转 ModelDto
pub fn model_to_dto(record: DeviceModelRecord) -> ModelDto {
    ModelDto {
        telemetry_count: record.capability.telemetry_count(),
        id: record.id,
        name: record.name,
        components: record.capability.components,
    }
}

/// DeviceStatus 转 DeviceStatusDto
pub fn device_status_to_dto(status: DeviceStatus) -> DeviceStatusDto {
    DeviceStatusDto {
        device_id: status.device_id,
        model_id: status.model_id,
        state: status.state.as_str().to_string(),
        attempts: status.attempts,
        last_error: status.last_error,
        updated_at_ms: status.updated_at_ms,
    }
}
