use domain::{CapabilityModel, SimulationStatus, TargetEndpoints};
use starling_storage::{
    DeviceConfigRecord, DeviceModelRecord, SimulationRecord, Stores, TargetDeviceRecord,
    TargetRecord,
};

fn device(target_id: &str, device_id: &str) -> TargetDeviceRecord {
    TargetDeviceRecord {
        device_id: device_id.to_string(),
        target_id: target_id.to_string(),
        simulation_id: "sim".to_string(),
        model_id: "m".to_string(),
        credentials: None,
        created_at_ms: 0,
    }
}

#[tokio::test]
async fn simulation_upsert_and_find() {
    let stores = Stores::in_memory();
    let record = SimulationRecord {
        id: "sim-1".to_string(),
        name: "demo".to_string(),
        target_id: "tgt".to_string(),
        status: SimulationStatus::Stopped,
        last_error: None,
        settings: None,
    };
    stores
        .simulations
        .upsert_simulation(record.clone())
        .await
        .expect("upsert");

    let mut updated = record.clone();
    updated.status = SimulationStatus::Running;
    stores
        .simulations
        .upsert_simulation(updated)
        .await
        .expect("update");

    let found = stores
        .simulations
        .find_simulation("sim-1")
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(found.status, SimulationStatus::Running);
    assert_eq!(stores.simulations.list_simulations().await.expect("list").len(), 1);
    assert!(stores.simulations.delete_simulation("sim-1").await.expect("delete"));
    assert!(!stores.simulations.delete_simulation("sim-1").await.expect("delete"));
}

#[tokio::test]
async fn blank_ids_are_rejected() {
    let stores = Stores::in_memory();
    let result = stores
        .targets
        .upsert_target(TargetRecord {
            id: " ".to_string(),
            name: String::new(),
            endpoints: TargetEndpoints::default(),
            model_ids: Vec::new(),
        })
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn target_devices_are_scoped_by_target() {
    let stores = Stores::in_memory();
    let store = &stores.target_devices;
    store.upsert_target_device(device("t1", "a")).await.expect("a");
    store.upsert_target_device(device("t1", "b")).await.expect("b");
    store.upsert_target_device(device("t2", "a")).await.expect("a2");

    assert_eq!(store.list_target_devices("t1").await.expect("list").len(), 2);
    assert!(store.find_target_device("t2", "b").await.expect("find").is_none());
    assert!(store.delete_target_device("t1", "a").await.expect("delete"));
    assert!(store.find_target_device("t2", "a").await.expect("find").is_some());
    assert_eq!(store.delete_all_target_devices("t1").await.expect("all"), 1);
    assert!(store.list_target_devices("t1").await.expect("list").is_empty());
}

#[tokio::test]
async fn device_config_inherits_simulation_scope() {
    let stores = Stores::in_memory();
    let mut record = DeviceConfigRecord::defaults_for("", "thermostat");
    record.id = "cfg-1".to_string();
    let saved = stores
        .device_configs
        .upsert_device_config("sim-1", record.clone())
        .await
        .expect("upsert");
    assert_eq!(saved.simulation_id, "sim-1");
    assert_eq!(saved.telemetry_interval_ms, 60_000);

    record.simulation_id = "sim-2".to_string();
    assert!(
        stores
            .device_configs
            .upsert_device_config("sim-1", record)
            .await
            .is_err()
    );
    assert!(
        stores
            .device_configs
            .list_device_configs("sim-2")
            .await
            .expect("list")
            .is_empty()
    );
}

#[tokio::test]
async fn model_with_unnamed_field_is_rejected() {
    let stores = Stores::in_memory();
    let capability: CapabilityModel = serde_json::from_value(serde_json::json!({
        "components": [{ "name": "main", "telemetry": [{ "name": "", "schema": "double" }] }]
    }))
    .expect("model");
    let result = stores
        .models
        .upsert_model(DeviceModelRecord {
            id: "m".to_string(),
            name: "m".to_string(),
            capability,
        })
        .await;
    assert!(result.is_err());
}

#[test]
fn device_model_record_flattens_capability() {
    let record: DeviceModelRecord = serde_json::from_value(serde_json::json!({
        "id": "thermostat",
        "components": [{ "componentName": "main", "telemetry": [{ "name": "temp", "schema": "double" }] }]
    }))
    .expect("record");
    assert_eq!(record.capability.telemetry_count(), 1);
    assert_eq!(record.capability.components[0].name, "main");
}
