use api_contract::{
    DeviceBatchDto, SimulationDetailDto, SimulationDto, TargetDto, UpsertDeviceConfigRequest,
    UpsertModelRequest, UpsertSimulationRequest,
};
use serde_json::Value;

#[test]
fn simulation_detail_flattens_simulation_fields() {
    let detail = SimulationDetailDto {
        simulation: SimulationDto {
            id: "sim-1".to_string(),
            name: "load".to_string(),
            target_id: "hub".to_string(),
            status: "running".to_string(),
            last_error: None,
            settings: None,
        },
        device_configs: Vec::new(),
    };
    let value = serde_json::to_value(detail).expect("serialize");
    assert_eq!(value.get("id"), Some(&Value::from("sim-1")));
    assert_eq!(value.get("targetId"), Some(&Value::from("hub")));
    assert!(value.get("deviceConfigs").is_some());
    assert!(value.get("simulation").is_none());
    assert!(value.get("target_id").is_none());
}

#[test]
fn simulation_request_accepts_partial_settings() {
    let payload = r#"{"targetId":"hub","settings":{"maxConcurrentRegistrations":4}}"#;
    let req: UpsertSimulationRequest = serde_json::from_str(payload).expect("parse");
    assert_eq!(req.target_id, "hub");
    assert!(req.name.is_none());
    let settings = req.settings.expect("settings");
    assert_eq!(settings.max_concurrent_registrations, Some(4));
    // 未给出的字段留空，启动时取进程级默认值
    assert!(settings.max_operation_attempts.is_none());
    assert!(settings.features.enable_telemetry.is_none());
}

#[test]
fn device_config_request_leaves_intervals_optional() {
    let payload = r#"{"modelId":"thermo","features":{"enableTelemetry":false}}"#;
    let req: UpsertDeviceConfigRequest = serde_json::from_str(payload).expect("parse");
    assert_eq!(req.model_id, "thermo");
    assert!(req.telemetry_interval_ms.is_none());
    let features = req.features.expect("features");
    assert_eq!(features.enable_telemetry, Some(false));
    assert!(features.enable_command_acks.is_none());
}

#[test]
fn model_request_reads_components() {
    let payload = r#"{"name":"Thermostat","components":[{"name":"env","telemetry":[{"name":"temp","schema":"double"}]}]}"#;
    let req: UpsertModelRequest = serde_json::from_str(payload).expect("parse");
    assert_eq!(req.components.len(), 1);
    assert_eq!(req.components[0].telemetry[0].name, "temp");
}

#[test]
fn target_dto_never_carries_the_key() {
    let dto = TargetDto {
        id: "hub".to_string(),
        name: "hub".to_string(),
        provisioning_endpoint: "mqtt://dps:1883".to_string(),
        data_endpoint: "mqtt://hub:1883".to_string(),
        id_scope: None,
        has_shared_access_key: true,
        model_ids: vec!["thermo".to_string()],
    };
    let value = serde_json::to_value(dto).expect("serialize");
    assert_eq!(value.get("hasSharedAccessKey"), Some(&Value::Bool(true)));
    assert!(value.get("sharedAccessKey").is_none());
}

#[test]
fn batch_lists_device_ids() {
    let dto = DeviceBatchDto {
        simulation_id: "sim-1".to_string(),
        model_id: Some("thermo".to_string()),
        device_ids: vec!["sim-1-hub-thermo-0001".to_string()],
    };
    let value = serde_json::to_value(dto).expect("serialize");
    assert_eq!(value["deviceIds"][0], "sim-1-hub-thermo-0001");
    assert_eq!(value["modelId"], "thermo");
}
