use domain::{CapabilityModel, SimulationStatus, TargetEndpoints};
use starling_storage::{
    DeviceConfigRecord, DeviceModelRecord, SimulationRecord, Stores, TargetDeviceRecord,
    TargetRecord,
};

fn device(device_id: &str) -> TargetDeviceRecord {
    TargetDeviceRecord {
        device_id: device_id.to_string(),
        target_id: "tgt".to_string(),
        simulation_id: "sim".to_string(),
        model_id: "m".to_string(),
        credentials: None,
        created_at_ms: 0,
    }
}

#[tokio::test]
async fn records_survive_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    {
        let stores = Stores::open_dir(dir.path()).await.expect("open");
        stores
            .simulations
            .upsert_simulation(SimulationRecord {
                id: "sim".to_string(),
                name: "demo".to_string(),
                target_id: "tgt".to_string(),
                status: SimulationStatus::Running,
                last_error: None,
                settings: None,
            })
            .await
            .expect("simulation");
        stores
            .targets
            .upsert_target(TargetRecord {
                id: "tgt".to_string(),
                name: "hub".to_string(),
                endpoints: TargetEndpoints::default(),
                model_ids: vec!["m".to_string()],
            })
            .await
            .expect("target");
        stores
            .models
            .upsert_model(DeviceModelRecord {
                id: "m".to_string(),
                name: "meter".to_string(),
                capability: CapabilityModel::default(),
            })
            .await
            .expect("model");
        for id in ["d1", "d2", "d3"] {
            stores
                .target_devices
                .upsert_target_device(device(id))
                .await
                .expect("device");
        }
        assert!(
            stores
                .target_devices
                .delete_target_device("tgt", "d2")
                .await
                .expect("delete")
        );
        stores
            .device_configs
            .upsert_device_config(
                "sim",
                DeviceConfigRecord {
                    id: "cfg".to_string(),
                    simulation_id: String::new(),
                    model_id: "m".to_string(),
                    telemetry_interval_ms: 1_000,
                    reported_properties_interval_ms: 60_000,
                    features: None,
                },
            )
            .await
            .expect("config");
    }

    let stores = Stores::open_dir(dir.path()).await.expect("reopen");
    let simulation = stores
        .simulations
        .find_simulation("sim")
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(simulation.status, SimulationStatus::Running);
    assert_eq!(
        stores.targets.find_target("tgt").await.expect("find").map(|t| t.model_ids),
        Some(vec!["m".to_string()])
    );
    assert_eq!(stores.models.list_models().await.expect("list").len(), 1);
    let ids: Vec<String> = stores
        .target_devices
        .list_target_devices("tgt")
        .await
        .expect("list")
        .into_iter()
        .map(|record| record.device_id)
        .collect();
    assert_eq!(ids, vec!["d1".to_string(), "d3".to_string()]);
    let config = stores
        .device_configs
        .find_device_config("sim", "cfg")
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(config.simulation_id, "sim");
    assert_eq!(
        stores
            .target_devices
            .delete_all_target_devices("tgt")
            .await
            .expect("delete all"),
        2
    );
}

#[tokio::test]
async fn rejected_writes_leave_the_file_untouched() {
    let dir = tempfile::tempdir().expect("tempdir");
    let stores = Stores::open_dir(dir.path()).await.expect("open");
    stores
        .target_devices
        .upsert_target_device(device("d1"))
        .await
        .expect("device");
    assert!(
        stores
            .target_devices
            .upsert_target_device(device("a/b"))
            .await
            .is_err()
    );
    let result = stores
        .device_configs
        .upsert_device_config(
            "sim",
            DeviceConfigRecord {
                id: "cfg".to_string(),
                simulation_id: "other".to_string(),
                model_id: "m".to_string(),
                telemetry_interval_ms: 1_000,
                reported_properties_interval_ms: 60_000,
                features: None,
            },
        )
        .await;
    assert!(result.is_err());

    let reopened = Stores::open_dir(dir.path()).await.expect("reopen");
    assert_eq!(
        reopened
            .target_devices
            .list_target_devices("tgt")
            .await
            .expect("list")
            .len(),
        1
    );
    assert!(
        reopened
            .device_configs
            .list_device_configs("sim")
            .await
            .expect("list")
            .is_empty()
    );
}

#[tokio::test]
async fn corrupt_file_fails_to_open() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("simulations.json"), b"{not json").expect("write");
    assert!(Stores::open_dir(dir.path()).await.is_err());
}
