use domain::{
    SimulationSettings, SimulationStatus, device_id_prefix, max_device_suffix,
    simulation_device_prefix,
};

#[test]
fn simulation_prefix_covers_all_model_prefixes() {
    let sim_prefix = simulation_device_prefix("sim-1", "target-1");
    let model_prefix = device_id_prefix("sim-1", "target-1", "model-1");
    assert!(model_prefix.starts_with(&sim_prefix));
    assert_eq!(max_device_suffix(&model_prefix, ["sim-1-target-1-model-1-0042"]), 42);
}

#[test]
fn simulation_status_serializes_lowercase() {
    let json = serde_json::to_string(&SimulationStatus::Running).expect("json");
    assert_eq!(json, "\"running\"");
    let settings = SimulationSettings::default();
    assert_eq!(settings.max_concurrent_connections, 100);
    assert_eq!(settings.connection_timeout().as_millis(), 30_000);
}
