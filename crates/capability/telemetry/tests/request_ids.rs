use starling_telemetry::{metrics, new_request_ids, record_telemetry};

#[test]
fn request_ids_non_empty() {
    let ids = new_request_ids();
    assert!(!ids.request_id.is_empty());
    assert!(!ids.trace_id.is_empty());
    assert_ne!(ids.request_id, ids.trace_id);
}

#[test]
fn telemetry_counts_messages_and_points() {
    let before = metrics().snapshot();
    record_telemetry(4);
    let after = metrics().snapshot();
    assert!(after.telemetry_messages >= before.telemetry_messages + 1);
    assert!(after.telemetry_data_points >= before.telemetry_data_points + 4);
}
