//! 进程内 Loopback 平台
//!
//! 不访问网络，所有注册、连接与消息都保存在内存中：
//! - 设备注册表（注册/删除）
//! - 按操作注入的失败（接下来 N 次调用返回指定错误）
//! - 可选的固定延迟，用于观察并发
//! - 每类操作的在途数量高水位与调用计数
//! - 向已连接设备注入 desired 更新与命令

use crate::error::ProtocolError;
use crate::types::{CommandAck, DeviceSession, InboundEvent, TwinPatch};
use crate::{DeviceConnection, DeviceProtocol};
use async_trait::async_trait;
use domain::{DeviceCredentials, TargetEndpoints, TelemetryMessage};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

const EVENT_CHANNEL_CAPACITY: usize = 32;

/// 可观测、可注入故障的操作类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopbackOp {
    Register,
    Connect,
    Telemetry,
    ReportedProperties,
    CommandAck,
    Delete,
}

const ALL_OPS: [LoopbackOp; 6] = [
    LoopbackOp::Register,
    LoopbackOp::Connect,
    LoopbackOp::Telemetry,
    LoopbackOp::ReportedProperties,
    LoopbackOp::CommandAck,
    LoopbackOp::Delete,
];

#[derive(Default)]
struct OpStats {
    calls: AtomicU64,
    in_flight: AtomicUsize,
    high_water: AtomicUsize,
}

struct Fault {
    remaining: u32,
    error: ProtocolError,
}

#[derive(Default)]
struct LoopbackState {
    latency: Duration,
    registry: Mutex<HashSet<String>>,
    faults: Mutex<HashMap<LoopbackOp, Fault>>,
    stats: HashMap<LoopbackOp, OpStats>,
    sessions: Mutex<HashMap<String, mpsc::Sender<InboundEvent>>>,
    telemetry_data_points: AtomicU64,
    reported: Mutex<Vec<(String, TwinPatch)>>,
    command_acks: Mutex<Vec<(String, CommandAck)>>,
}

/// 在途计数守卫，析构时递减。
struct InFlight<'a> {
    stats: Option<&'a OpStats>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(stats) = self.stats {
            stats.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl LoopbackState {
    fn enter(&self, op: LoopbackOp) -> InFlight<'_> {
        let stats = self.stats.get(&op);
        if let Some(stats) = stats {
            stats.calls.fetch_add(1, Ordering::SeqCst);
            let now = stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            stats.high_water.fetch_max(now, Ordering::SeqCst);
        }
        InFlight { stats }
    }

    /// 取出一次注入的失败。
    fn take_fault(&self, op: LoopbackOp) -> Option<ProtocolError> {
        let mut faults = self.faults.lock().ok()?;
        let fault = faults.get_mut(&op)?;
        let error = fault.error.clone();
        fault.remaining = fault.remaining.saturating_sub(1);
        if fault.remaining == 0 {
            faults.remove(&op);
        }
        Some(error)
    }

    /// 公共前置：计数、延迟、故障注入。
    async fn call(&self, op: LoopbackOp) -> Result<InFlight<'_>, ProtocolError> {
        let guard = self.enter(op);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match self.take_fault(op) {
            Some(error) => Err(error),
            None => Ok(guard),
        }
    }
}

/// 进程内平台。
///
/// 克隆共享同一份状态，测试中可一边交给 Controller、一边观察。
#[derive(Clone)]
pub struct LoopbackProtocol {
    state: Arc<LoopbackState>,
}

impl Default for LoopbackProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackProtocol {
    pub fn new() -> Self {
        Self::with_latency(Duration::ZERO)
    }

    /// 每次调用前等待 `latency`。
    pub fn with_latency(latency: Duration) -> Self {
        let stats = ALL_OPS
            .iter()
            .map(|op| (*op, OpStats::default()))
            .collect();
        Self {
            state: Arc::new(LoopbackState {
                latency,
                stats,
                ..LoopbackState::default()
            }),
        }
    }

    /// 让 `op` 接下来的 `times` 次调用返回 `error`。
    pub fn fail_next(&self, op: LoopbackOp, times: u32, error: ProtocolError) {
        if times == 0 {
            return;
        }
        if let Ok(mut faults) = self.state.faults.lock() {
            faults.insert(
                op,
                Fault {
                    remaining: times,
                    error,
                },
            );
        }
    }

    /// 清除全部注入的失败。
    pub fn clear_faults(&self) {
        if let Ok(mut faults) = self.state.faults.lock() {
            faults.clear();
        }
    }

    pub fn calls(&self, op: LoopbackOp) -> u64 {
        self.state
            .stats
            .get(&op)
            .map(|s| s.calls.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// 全部操作的调用总数。
    pub fn total_calls(&self) -> u64 {
        ALL_OPS.iter().map(|op| self.calls(*op)).sum()
    }

    pub fn in_flight(&self, op: LoopbackOp) -> usize {
        self.state
            .stats
            .get(&op)
            .map(|s| s.in_flight.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// 同时在途的最大调用数。
    pub fn high_water(&self, op: LoopbackOp) -> usize {
        self.state
            .stats
            .get(&op)
            .map(|s| s.high_water.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    pub fn is_registered(&self, device_id: &str) -> bool {
        self.state
            .registry
            .lock()
            .map(|registry| registry.contains(device_id))
            .unwrap_or(false)
    }

    pub fn registered_devices(&self) -> Vec<String> {
        let mut devices: Vec<String> = self
            .state
            .registry
            .lock()
            .map(|registry| registry.iter().cloned().collect())
            .unwrap_or_default();
        devices.sort();
        devices
    }

    /// 当前持有会话的设备数。
    pub fn connected_devices(&self) -> usize {
        self.state
            .sessions
            .lock()
            .map(|sessions| sessions.len())
            .unwrap_or(0)
    }

    pub fn is_connected(&self, device_id: &str) -> bool {
        self.state
            .sessions
            .lock()
            .map(|sessions| sessions.contains_key(device_id))
            .unwrap_or(false)
    }

    pub fn telemetry_data_points(&self) -> u64 {
        self.state.telemetry_data_points.load(Ordering::SeqCst)
    }

    /// 已收到的 reported 上报（含孪生应答），按到达顺序。
    pub fn reported(&self, device_id: &str) -> Vec<TwinPatch> {
        self.state
            .reported
            .lock()
            .map(|items| {
                items
                    .iter()
                    .filter(|(id, _)| id == device_id)
                    .map(|(_, patch)| patch.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn command_acks(&self, device_id: &str) -> Vec<CommandAck> {
        self.state
            .command_acks
            .lock()
            .map(|items| {
                items
                    .iter()
                    .filter(|(id, _)| id == device_id)
                    .map(|(_, ack)| ack.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 向已连接设备投递入站事件；设备未连接时返回 false。
    pub async fn inject(&self, device_id: &str, event: InboundEvent) -> bool {
        let sender = self
            .state
            .sessions
            .lock()
            .ok()
            .and_then(|sessions| sessions.get(device_id).cloned());
        match sender {
            Some(sender) => sender.send(event).await.is_ok(),
            None => false,
        }
    }

    /// 模拟连接丢失：关闭设备的入站通道。
    pub fn drop_session(&self, device_id: &str) -> bool {
        self.state
            .sessions
            .lock()
            .map(|mut sessions| sessions.remove(device_id).is_some())
            .unwrap_or(false)
    }
}

#[async_trait]
impl DeviceProtocol for LoopbackProtocol {
    async fn register(
        &self,
        target: &TargetEndpoints,
        device_id: &str,
        _model_id: &str,
    ) -> Result<DeviceCredentials, ProtocolError> {
        let _guard = self.state.call(LoopbackOp::Register).await?;
        let mut registry = self
            .state
            .registry
            .lock()
            .map_err(|_| ProtocolError::Connection("registry lock failed".to_string()))?;
        registry.insert(device_id.to_string());
        Ok(DeviceCredentials {
            device_id: device_id.to_string(),
            endpoint: target.data_endpoint.clone(),
            secret: Some(format!("loopback-{}", device_id)),
        })
    }

    async fn connect(
        &self,
        _target: &TargetEndpoints,
        credentials: &DeviceCredentials,
    ) -> Result<DeviceSession, ProtocolError> {
        let _guard = self.state.call(LoopbackOp::Connect).await?;
        if !self.is_registered(&credentials.device_id) {
            return Err(ProtocolError::Rejected(format!(
                "device {} is not registered",
                credentials.device_id
            )));
        }
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        self.state
            .sessions
            .lock()
            .map_err(|_| ProtocolError::Connection("session lock failed".to_string()))?
            .insert(credentials.device_id.clone(), tx);
        Ok(DeviceSession {
            connection: Box::new(LoopbackConnection {
                state: self.state.clone(),
                device_id: credentials.device_id.clone(),
                closed: false,
            }),
            events: rx,
        })
    }

    async fn delete(&self, _target: &TargetEndpoints, device_id: &str) -> Result<(), ProtocolError> {
        let _guard = self.state.call(LoopbackOp::Delete).await?;
        let removed = self
            .state
            .registry
            .lock()
            .map_err(|_| ProtocolError::Connection("registry lock failed".to_string()))?
            .remove(device_id);
        if removed {
            Ok(())
        } else {
            Err(ProtocolError::NotFound(device_id.to_string()))
        }
    }
}

struct LoopbackConnection {
    state: Arc<LoopbackState>,
    device_id: String,
    closed: bool,
}

impl LoopbackConnection {
    fn ensure_open(&self) -> Result<(), ProtocolError> {
        if self.closed {
            return Err(ProtocolError::ChannelClosed);
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceConnection for LoopbackConnection {
    async fn send_telemetry(&mut self, message: &TelemetryMessage) -> Result<(), ProtocolError> {
        self.ensure_open()?;
        let _guard = self.state.call(LoopbackOp::Telemetry).await?;
        message.body_bytes()?;
        self.state
            .telemetry_data_points
            .fetch_add(message.data_point_count as u64, Ordering::SeqCst);
        Ok(())
    }

    async fn send_reported_properties(&mut self, patch: &TwinPatch) -> Result<(), ProtocolError> {
        self.ensure_open()?;
        let _guard = self.state.call(LoopbackOp::ReportedProperties).await?;
        if let Ok(mut reported) = self.state.reported.lock() {
            reported.push((self.device_id.clone(), patch.clone()));
        }
        Ok(())
    }

    async fn send_command_ack(&mut self, ack: &CommandAck) -> Result<(), ProtocolError> {
        self.ensure_open()?;
        let _guard = self.state.call(LoopbackOp::CommandAck).await?;
        if let Ok(mut acks) = self.state.command_acks.lock() {
            acks.push((self.device_id.clone(), ack.clone()));
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ProtocolError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Ok(mut sessions) = self.state.sessions.lock() {
            sessions.remove(&self.device_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DesiredPropertiesUpdate;

    fn target() -> TargetEndpoints {
        TargetEndpoints {
            provisioning_endpoint: "loopback://dps".to_string(),
            data_endpoint: "loopback://hub".to_string(),
            ..TargetEndpoints::default()
        }
    }

    #[tokio::test]
    async fn injected_faults_are_consumed_in_order() {
        let protocol = LoopbackProtocol::new();
        protocol.fail_next(
            LoopbackOp::Register,
            2,
            ProtocolError::Throttled("busy".to_string()),
        );
        assert!(protocol.register(&target(), "d1", "m").await.is_err());
        assert!(protocol.register(&target(), "d1", "m").await.is_err());
        let credentials = protocol.register(&target(), "d1", "m").await.expect("register");
        assert_eq!(credentials.endpoint, "loopback://hub");
        assert_eq!(protocol.calls(LoopbackOp::Register), 3);
        assert!(protocol.is_registered("d1"));
    }

    #[tokio::test]
    async fn connect_requires_registration() {
        let protocol = LoopbackProtocol::new();
        let credentials = DeviceCredentials {
            device_id: "ghost".to_string(),
            endpoint: String::new(),
            secret: None,
        };
        let err = protocol.connect(&target(), &credentials).await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn session_receives_injected_events_until_dropped() {
        let protocol = LoopbackProtocol::new();
        let credentials = protocol.register(&target(), "d1", "m").await.expect("register");
        let mut session = protocol.connect(&target(), &credentials).await.expect("connect");

        let mut patch = TwinPatch::new();
        patch.insert("$version".to_string(), serde_json::json!(4));
        let event = InboundEvent::DesiredProperties(DesiredPropertiesUpdate::new(patch));
        assert!(protocol.inject("d1", event.clone()).await);
        assert_eq!(session.events.recv().await, Some(event));

        assert!(protocol.drop_session("d1"));
        assert_eq!(session.events.recv().await, None);
    }

    #[tokio::test]
    async fn sends_after_disconnect_fail() {
        let protocol = LoopbackProtocol::new();
        let credentials = protocol.register(&target(), "d1", "m").await.expect("register");
        let mut session = protocol.connect(&target(), &credentials).await.expect("connect");
        session.connection.disconnect().await.expect("disconnect");
        assert!(!protocol.is_connected("d1"));
        let err = session
            .connection
            .send_reported_properties(&TwinPatch::new())
            .await
            .unwrap_err();
        assert_eq!(err, ProtocolError::ChannelClosed);
    }

    #[tokio::test]
    async fn delete_unknown_device_is_not_found() {
        let protocol = LoopbackProtocol::new();
        let err = protocol.delete(&target(), "missing").await.unwrap_err();
        assert_eq!(err, ProtocolError::NotFound("missing".to_string()));
    }
}
