//! 数据模型
//!
//! 定义所有存储相关的记录：
//! - 模拟：SimulationRecord
//! - 目标平台：TargetRecord
//! - 目标设备：TargetDeviceRecord
//! - 设备模型：DeviceModelRecord
//! - 设备配置：DeviceConfigRecord

use domain::{
    CapabilityModel, DeviceCredentials, FeatureOverrides, SettingsOverride, SimulationSettings,
    SimulationStatus,
    TargetEndpoints,
};
use serde::{Deserialize, Serialize};

/// 模拟记录。
///
/// `status` 与 `last_error` 只由 Controller 修改。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub target_id: String,
    #[serde(default)]
    pub status: SimulationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// 逐字段覆盖进程级默认参数；未给出的字段使用配置中的默认值。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<SettingsOverride>,
}

impl SimulationRecord {
    pub fn effective_settings(&self, defaults: &SimulationSettings) -> SimulationSettings {
        match &self.settings {
            Some(overrides) => overrides.apply(defaults),
            None => defaults.clone().sanitized(),
        }
    }
}

/// 目标平台记录。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub endpoints: TargetEndpoints,
    /// 关联到该目标的设备模型。
    #[serde(default)]
    pub model_ids: Vec<String>,
}

/// 已在目标平台注册的设备。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDeviceRecord {
    pub device_id: String,
    pub target_id: String,
    #[serde(default)]
    pub simulation_id: String,
    #[serde(default)]
    pub model_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<DeviceCredentials>,
    #[serde(default)]
    pub created_at_ms: i64,
}

/// 设备模型记录。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceModelRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub capability: CapabilityModel,
}

/// 模拟内某一设备模型的行为参数。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfigRecord {
    pub id: String,
    #[serde(default)]
    pub simulation_id: String,
    pub model_id: String,
    #[serde(default = "default_telemetry_interval_ms")]
    pub telemetry_interval_ms: u64,
    #[serde(default = "default_reported_properties_interval_ms")]
    pub reported_properties_interval_ms: u64,
    /// 逐项覆盖模拟级的行为开关。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<FeatureOverrides>,
}

impl DeviceConfigRecord {
    /// 未配置时使用的默认行为参数。
    pub fn defaults_for(simulation_id: &str, model_id: &str) -> Self {
        Self {
            id: format!("{}-default", model_id),
            simulation_id: simulation_id.to_string(),
            model_id: model_id.to_string(),
            telemetry_interval_ms: default_telemetry_interval_ms(),
            reported_properties_interval_ms: default_reported_properties_interval_ms(),
            features: None,
        }
    }
}

fn default_telemetry_interval_ms() -> u64 {
    60_000
}

fn default_reported_properties_interval_ms() -> u64 {
    300_000
}
