pub mod data;
pub mod device_id;
pub mod model;
pub mod settings;
pub mod target;

pub use data::{GeoPoint, PayloadMap, PayloadValue, TelemetryMessage, payload_to_json};
pub use device_id::{
    allocate_device_ids, device_id_prefix, format_device_id, max_device_suffix, parse_device_suffix,
    simulation_device_prefix,
};
pub use model::{CapabilityModel, Component, PropertyField, SchemaKind, TelemetryField};
pub use settings::{
    FeatureFlags, FeatureOverrides, SettingsOverride, SimulationSettings, SimulationStatus,
};
pub use target::{DeviceCredentials, TargetEndpoints};

/// 当前时间戳（毫秒）。
pub fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
