//! 稳定的 DTO 与 API 响应契约。

use domain::{Component, DeviceCredentials, FeatureOverrides, SettingsOverride};
use serde::{Deserialize, Serialize};

/// 标准 API 响应封装。
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

/// 失败响应的错误体。
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// 模拟创建/更新请求体。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertSimulationRequest {
    /// 集合级 PUT 时必填；带路径 ID 时可省略，给出则须一致。
    pub id: Option<String>,
    pub name: Option<String>,
    pub target_id: String,
    /// 覆盖进程级默认参数。
    pub settings: Option<SettingsOverride>,
}

/// 模拟返回结构。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationDto {
    pub id: String,
    pub name: String,
    pub target_id: String,
    pub status: String,
    pub last_error: Option<String>,
    pub settings: Option<SettingsOverride>,
}

/// 模拟详情：附带设备配置。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationDetailDto {
    #[serde(flatten)]
    pub simulation: SimulationDto,
    pub device_configs: Vec<DeviceConfigDto>,
}

/// 设备配置创建/更新请求体；间隔缺省时取默认值。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertDeviceConfigRequest {
    /// 集合级 PUT 缺省时生成新 ID。
    pub id: Option<String>,
    pub model_id: String,
    pub telemetry_interval_ms: Option<u64>,
    pub reported_properties_interval_ms: Option<u64>,
    pub features: Option<FeatureOverrides>,
}

/// 设备配置返回结构。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfigDto {
    pub id: String,
    pub simulation_id: String,
    pub model_id: String,
    pub telemetry_interval_ms: u64,
    pub reported_properties_interval_ms: u64,
    pub features: Option<FeatureOverrides>,
}

/// 目标平台创建/更新请求体。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertTargetRequest {
    pub id: Option<String>,
    pub name: Option<String>,
    pub provisioning_endpoint: String,
    pub data_endpoint: String,
    pub id_scope: Option<String>,
    pub shared_access_key: Option<String>,
    pub model_ids: Option<Vec<String>>,
}

/// 目标平台返回结构；共享密钥不回显。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDto {
    pub id: String,
    pub name: String,
    pub provisioning_endpoint: String,
    pub data_endpoint: String,
    pub id_scope: Option<String>,
    pub has_shared_access_key: bool,
    pub model_ids: Vec<String>,
}

/// 目标关联模型请求体。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetModelsRequest {
    pub model_ids: Vec<String>,
}

/// 目标设备创建/更新请求体。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertTargetDeviceRequest {
    pub device_id: Option<String>,
    pub simulation_id: Option<String>,
    pub model_id: Option<String>,
    pub credentials: Option<DeviceCredentials>,
}

/// 目标设备返回结构；凭据只报告是否存在。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDeviceDto {
    pub device_id: String,
    pub target_id: String,
    pub simulation_id: String,
    pub model_id: String,
    pub registered: bool,
    pub created_at_ms: i64,
}

/// 设备模型创建/更新请求体。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertModelRequest {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub components: Vec<Component>,
}

/// 设备模型返回结构。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDto {
    pub id: String,
    pub name: String,
    pub components: Vec<Component>,
    pub telemetry_count: usize,
}

/// 批量开通/删除的受理结果；各设备进度通过设备状态接口轮询。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceBatchDto {
    pub simulation_id: String,
    pub model_id: Option<String>,
    pub device_ids: Vec<String>,
}

/// 单个设备的运行状态。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatusDto {
    pub device_id: String,
    pub model_id: String,
    pub state: String,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub updated_at_ms: i64,
}

/// 计数器快照。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshotDto {
    pub registrations: u64,
    pub registration_failures: u64,
    pub connections: u64,
    pub connection_failures: u64,
    pub telemetry_messages: u64,
    pub telemetry_data_points: u64,
    pub telemetry_failures: u64,
    pub reported_properties: u64,
    pub twin_update_acks: u64,
    pub command_acks: u64,
    pub send_failures: u64,
    pub deletions: u64,
    pub deletion_failures: u64,
    pub retries: u64,
    pub connection_losses: u64,
    pub running_simulations: usize,
}
