//! 追踪、请求 ID 生成与进程级计数器。

use serde::Serialize;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 请求级追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 计数器快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
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
}

/// 进程级计数器。
pub struct TelemetryMetrics {
    registrations: AtomicU64,
    registration_failures: AtomicU64,
    connections: AtomicU64,
    connection_failures: AtomicU64,
    telemetry_messages: AtomicU64,
    telemetry_data_points: AtomicU64,
    telemetry_failures: AtomicU64,
    reported_properties: AtomicU64,
    twin_update_acks: AtomicU64,
    command_acks: AtomicU64,
    send_failures: AtomicU64,
    deletions: AtomicU64,
    deletion_failures: AtomicU64,
    retries: AtomicU64,
    connection_losses: AtomicU64,
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            registrations: AtomicU64::new(0),
            registration_failures: AtomicU64::new(0),
            connections: AtomicU64::new(0),
            connection_failures: AtomicU64::new(0),
            telemetry_messages: AtomicU64::new(0),
            telemetry_data_points: AtomicU64::new(0),
            telemetry_failures: AtomicU64::new(0),
            reported_properties: AtomicU64::new(0),
            twin_update_acks: AtomicU64::new(0),
            command_acks: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            deletions: AtomicU64::new(0),
            deletion_failures: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            connection_losses: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            registrations: self.registrations.load(Ordering::Relaxed),
            registration_failures: self.registration_failures.load(Ordering::Relaxed),
            connections: self.connections.load(Ordering::Relaxed),
            connection_failures: self.connection_failures.load(Ordering::Relaxed),
            telemetry_messages: self.telemetry_messages.load(Ordering::Relaxed),
            telemetry_data_points: self.telemetry_data_points.load(Ordering::Relaxed),
            telemetry_failures: self.telemetry_failures.load(Ordering::Relaxed),
            reported_properties: self.reported_properties.load(Ordering::Relaxed),
            twin_update_acks: self.twin_update_acks.load(Ordering::Relaxed),
            command_acks: self.command_acks.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            deletions: self.deletions.load(Ordering::Relaxed),
            deletion_failures: self.deletion_failures.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            connection_losses: self.connection_losses.load(Ordering::Relaxed),
        }
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局计数器实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}

/// 记录设备注册成功。
pub fn record_registration() {
    metrics().registrations.fetch_add(1, Ordering::Relaxed);
}

/// 记录设备注册最终失败。
pub fn record_registration_failure() {
    metrics()
        .registration_failures
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录设备连接成功。
pub fn record_connection() {
    metrics().connections.fetch_add(1, Ordering::Relaxed);
}

/// 记录设备连接最终失败。
pub fn record_connection_failure() {
    metrics()
        .connection_failures
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录一条遥测消息及其数据点数。
pub fn record_telemetry(data_points: usize) {
    let metrics = metrics();
    metrics.telemetry_messages.fetch_add(1, Ordering::Relaxed);
    metrics
        .telemetry_data_points
        .fetch_add(data_points as u64, Ordering::Relaxed);
}

/// 记录遥测发送失败。
pub fn record_telemetry_failure() {
    metrics().telemetry_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录 reported 属性上报。
pub fn record_reported_properties() {
    metrics()
        .reported_properties
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录孪生更新应答。
pub fn record_twin_update_ack() {
    metrics().twin_update_acks.fetch_add(1, Ordering::Relaxed);
}

/// 记录命令应答。
pub fn record_command_ack() {
    metrics().command_acks.fetch_add(1, Ordering::Relaxed);
}

/// 记录 reported/孪生应答/命令应答发送失败。
pub fn record_send_failure() {
    metrics().send_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录设备删除成功。
pub fn record_deletion() {
    metrics().deletions.fetch_add(1, Ordering::Relaxed);
}

/// 记录设备删除最终失败。
pub fn record_deletion_failure() {
    metrics().deletion_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录一次重试。
pub fn record_retry() {
    metrics().retries.fetch_add(1, Ordering::Relaxed);
}

/// 记录已连接设备丢失连接。
pub fn record_connection_loss() {
    metrics().connection_losses.fetch_add(1, Ordering::Relaxed);
}
