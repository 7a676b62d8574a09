//! 健康检查与指标快照。
//!
//! - GET /health
//! - GET /metrics

use api_contract::{ApiResponse, MetricsSnapshotDto};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use starling_telemetry::metrics;

use crate::AppState;

/// 健康检查，返回 `{"ok": true}`；只反映进程存活。
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

pub async fn get_metrics(State(state): State<AppState>) -> Response {
    let snapshot = metrics().snapshot();
    (
        StatusCode::OK,
        Json(ApiResponse::success(MetricsSnapshotDto {
            registrations: snapshot.registrations,
            registration_failures: snapshot.registration_failures,
            connections: snapshot.connections,
            connection_failures: snapshot.connection_failures,
            telemetry_messages: snapshot.telemetry_messages,
            telemetry_data_points: snapshot.telemetry_data_points,
            telemetry_failures: snapshot.telemetry_failures,
            reported_properties: snapshot.reported_properties,
            twin_update_acks: snapshot.twin_update_acks,
            command_acks: snapshot.command_acks,
            send_failures: snapshot.send_failures,
            deletions: snapshot.deletions,
            deletion_failures: snapshot.deletion_failures,
            retries: snapshot.retries,
            connection_losses: snapshot.connection_losses,
            running_simulations: state.controller.running_simulations(),
        })),
    )
        .into_response()
}
