//! DeviceAgent：单个模拟设备的生命周期。
//!
//! ```text
//! Unregistered → Registering → Registered → Connecting → Connected → Active
//!                                                                      │
//!                                         Stopped ← Disconnecting ←────┘
//! Deleting → Deleted          任一进行中状态 → Failed（重试耗尽或永久失败）
//! ```
//!
//! 连接句柄由 Agent 独占；Agent 结束前一定先断开连接。

use crate::data_generator::DataGenerator;
use crate::error::DeviceError;
use crate::gate::{ConcurrencyGates, GateError};
use crate::retry::RetryPolicy;
use crate::status::{DeviceState, StatusBoard};
use chrono::Utc;
use domain::{
    CapabilityModel, DeviceCredentials, FeatureFlags, SimulationSettings, TargetEndpoints,
    payload_to_json,
};
use serde::Serialize;
use starling_protocol::{
    DeviceConnection, DeviceProtocol, DeviceSession, InboundEvent, ProtocolError,
};
use starling_storage::{DeviceConfigRecord, DeviceModelRecord, Stores, TargetDeviceRecord};
use starling_telemetry::{
    record_command_ack, record_connection, record_connection_failure, record_connection_loss,
    record_deletion, record_deletion_failure, record_registration, record_registration_failure,
    record_reported_properties, record_send_failure, record_telemetry, record_telemetry_failure,
    record_twin_update_ack,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 一个模拟内所有设备任务共享的只读上下文。
pub(crate) struct AgentContext {
    pub simulation_id: String,
    pub target_id: String,
    pub target: TargetEndpoints,
    pub settings: SimulationSettings,
    pub protocol: Arc<dyn DeviceProtocol>,
    pub stores: Stores,
    pub gates: ConcurrencyGates,
    pub board: StatusBoard,
}

/// 设备模型与该模型在模拟内的行为参数。
#[derive(Debug, Clone)]
pub struct DeviceProfile {
    pub model_id: String,
    pub model: Arc<CapabilityModel>,
    pub telemetry_interval: Duration,
    pub reported_properties_interval: Duration,
    pub features: FeatureFlags,
}

impl DeviceProfile {
    /// 设备配置中给出的开关逐项覆盖模拟级开关；间隔至少 1ms。
    pub fn new(
        model: &DeviceModelRecord,
        config: &DeviceConfigRecord,
        simulation_features: FeatureFlags,
    ) -> Self {
        Self {
            model_id: model.id.clone(),
            model: Arc::new(model.capability.clone()),
            telemetry_interval: Duration::from_millis(config.telemetry_interval_ms.max(1)),
            reported_properties_interval: Duration::from_millis(
                config.reported_properties_interval_ms.max(1),
            ),
            features: config
                .features
                .map(|overrides| overrides.apply(simulation_features))
                .unwrap_or(simulation_features),
        }
    }
}

/// 单个设备在一次批量操作中的结果。
///
/// 开通批次在设备进入 Active（或提前终止）时产出；删除批次在删除结束时产出。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceOutcome {
    pub device_id: String,
    pub state: DeviceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub(crate) type OutcomeSender = mpsc::UnboundedSender<DeviceOutcome>;

pub(crate) struct DeviceAgent {
    ctx: Arc<AgentContext>,
    device_id: String,
    profile: Arc<DeviceProfile>,
    credentials: Option<DeviceCredentials>,
    cancel: CancellationToken,
    generator: DataGenerator,
    reporter: Option<OutcomeSender>,
}

impl DeviceAgent {
    /// 看板行需已由 Runner 预留（无凭据为 Unregistered，有凭据为 Registered）。
    pub fn new(
        ctx: Arc<AgentContext>,
        device_id: String,
        profile: Arc<DeviceProfile>,
        credentials: Option<DeviceCredentials>,
        cancel: CancellationToken,
        reporter: Option<OutcomeSender>,
    ) -> Self {
        let generator = DataGenerator::new(profile.model.clone());
        Self {
            ctx,
            device_id,
            profile,
            credentials,
            cancel,
            generator,
            reporter,
        }
    }

    pub async fn run(mut self) -> DeviceOutcome {
        let credentials = match self.credentials.take() {
            Some(credentials) => credentials,
            None => match self.register().await {
                Ok(credentials) => credentials,
                Err(err) => {
                    record_registration_failure();
                    return self.abort("register", err);
                }
            },
        };

        let session = match self.connect(&credentials).await {
            Ok(session) => session,
            Err(err) => {
                record_connection_failure();
                return self.abort("connect", err);
            }
        };

        self.drive(session).await
    }

    async fn register(&self) -> Result<DeviceCredentials, DeviceError> {
        let ctx: &AgentContext = &self.ctx;
        let device_id: &str = &self.device_id;
        let model_id: &str = &self.profile.model_id;
        ctx.board.transition(device_id, DeviceState::Registering);

        let token = ctx
            .gates
            .registration
            .acquire(&self.cancel, None)
            .await
            .map_err(gate_error)?;
        let credentials = RetryPolicy::registration(&ctx.settings)
            .run("register", device_id, &self.cancel, move |attempt| {
                ctx.board.set_attempts(device_id, attempt);
                ctx.protocol.register(&ctx.target, device_id, model_id)
            })
            .await?;
        token.release();

        ctx.stores
            .target_devices
            .upsert_target_device(TargetDeviceRecord {
                device_id: device_id.to_string(),
                target_id: ctx.target_id.clone(),
                simulation_id: ctx.simulation_id.clone(),
                model_id: model_id.to_string(),
                credentials: Some(credentials.clone()),
                created_at_ms: domain::now_epoch_ms(),
            })
            .await?;
        ctx.board.transition(device_id, DeviceState::Registered);
        record_registration();
        debug!(
            target: "starling.simulation",
            simulation_id = %ctx.simulation_id,
            device_id = %device_id,
            "device_registered"
        );
        Ok(credentials)
    }

    async fn connect(&self, credentials: &DeviceCredentials) -> Result<DeviceSession, DeviceError> {
        let ctx: &AgentContext = &self.ctx;
        let device_id: &str = &self.device_id;
        ctx.board.transition(device_id, DeviceState::Connecting);

        let token = ctx
            .gates
            .connection
            .acquire(&self.cancel, None)
            .await
            .map_err(gate_error)?;
        let session = RetryPolicy::connection(&ctx.settings)
            .run("connect", device_id, &self.cancel, move |attempt| {
                ctx.board.set_attempts(device_id, attempt);
                ctx.protocol.connect(&ctx.target, credentials)
            })
            .await?;
        token.release();

        ctx.board.transition(device_id, DeviceState::Connected);
        record_connection();
        Ok(session)
    }

    /// 连接建立后的收发循环，直到取消或连接丢失。
    async fn drive(&mut self, session: DeviceSession) -> DeviceOutcome {
        let DeviceSession {
            mut connection,
            mut events,
        } = session;
        self.ctx
            .board
            .transition(&self.device_id, DeviceState::Active);
        self.report(DeviceState::Active, None);

        let features = self.profile.features;
        let cancel = self.cancel.clone();
        let mut telemetry_tick = tokio::time::interval(self.profile.telemetry_interval);
        telemetry_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut reported_tick = tokio::time::interval(self.profile.reported_properties_interval);
        reported_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let connection_lost = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break false,
                event = events.recv() => match event {
                    Some(event) => self.handle_event(connection.as_mut(), event).await,
                    None => break true,
                },
                _ = telemetry_tick.tick(), if features.enable_telemetry => {
                    self.send_telemetry(connection.as_mut()).await;
                }
                _ = reported_tick.tick(), if features.enable_reported_props => {
                    self.send_reported_properties(connection.as_mut()).await;
                }
            }
        };

        self.ctx
            .board
            .transition(&self.device_id, DeviceState::Disconnecting);
        let limit = self.ctx.settings.connection_timeout();
        match tokio::time::timeout(limit, connection.disconnect()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(
                target: "starling.simulation",
                device_id = %self.device_id,
                error = %err,
                "device_disconnect_failed"
            ),
            Err(_) => warn!(
                target: "starling.simulation",
                device_id = %self.device_id,
                "device_disconnect_timeout"
            ),
        }
        drop(connection);
        drop(events);

        if connection_lost {
            record_connection_loss();
            warn!(
                target: "starling.simulation",
                simulation_id = %self.ctx.simulation_id,
                device_id = %self.device_id,
                "device_connection_lost"
            );
            let error = "connection lost".to_string();
            self.ctx
                .board
                .fail(&self.device_id, DeviceState::Failed, error.clone());
            self.outcome(DeviceState::Failed, Some(error))
        } else {
            self.ctx
                .board
                .transition(&self.device_id, DeviceState::Stopped);
            self.outcome(DeviceState::Stopped, None)
        }
    }

    async fn send_telemetry(&mut self, connection: &mut dyn DeviceConnection) {
        let Ok(token) = self.ctx.gates.telemetry.acquire(&self.cancel, None).await else {
            return;
        };
        let message = self.generator.telemetry_message(&self.device_id, Utc::now());
        let limit = self.ctx.settings.telemetry_timeout();
        let result = bounded(&self.cancel, limit, connection.send_telemetry(&message)).await;
        token.release();
        match result {
            Some(Ok(())) => record_telemetry(message.data_point_count),
            Some(Err(err)) => {
                record_telemetry_failure();
                self.log_send_failure("telemetry", &err);
            }
            None => {}
        }
    }

    async fn send_reported_properties(&mut self, connection: &mut dyn DeviceConnection) {
        let Ok(token) = self.ctx.gates.twin_update.acquire(&self.cancel, None).await else {
            return;
        };
        let patch = payload_to_json(&self.generator.reported_properties());
        let limit = self.ctx.settings.twin_update_timeout();
        let result = bounded(
            &self.cancel,
            limit,
            connection.send_reported_properties(&patch),
        )
        .await;
        token.release();
        match result {
            Some(Ok(())) => record_reported_properties(),
            Some(Err(err)) => {
                record_send_failure();
                self.log_send_failure("reported_properties", &err);
            }
            None => {}
        }
    }

    async fn handle_event(&mut self, connection: &mut dyn DeviceConnection, event: InboundEvent) {
        let features = self.profile.features;
        match event {
            InboundEvent::DesiredProperties(update) => {
                if !features.enable_twin_update_acks {
                    debug!(
                        target: "starling.simulation",
                        device_id = %self.device_id,
                        "twin_update_ack_disabled"
                    );
                    return;
                }
                let Ok(token) = self.ctx.gates.twin_update.acquire(&self.cancel, None).await
                else {
                    return;
                };
                let ack = self.generator.twin_update_ack(&update);
                let limit = self.ctx.settings.twin_update_timeout();
                let result =
                    bounded(&self.cancel, limit, connection.send_reported_properties(&ack)).await;
                token.release();
                match result {
                    Some(Ok(())) => record_twin_update_ack(),
                    Some(Err(err)) => {
                        record_send_failure();
                        self.log_send_failure("twin_update_ack", &err);
                    }
                    None => {}
                }
            }
            InboundEvent::Command(command) => {
                if !features.enable_command_acks {
                    debug!(
                        target: "starling.simulation",
                        device_id = %self.device_id,
                        request_id = %command.request_id,
                        "command_ack_disabled"
                    );
                    return;
                }
                let ack = self.generator.command_ack(&command);
                let limit = self.ctx.settings.command_timeout();
                match bounded(&self.cancel, limit, connection.send_command_ack(&ack)).await {
                    Some(Ok(())) => record_command_ack(),
                    Some(Err(err)) => {
                        record_send_failure();
                        self.log_send_failure("command_ack", &err);
                    }
                    None => {}
                }
            }
        }
    }

    fn log_send_failure(&self, kind: &'static str, err: &ProtocolError) {
        warn!(
            target: "starling.simulation",
            simulation_id = %self.ctx.simulation_id,
            device_id = %self.device_id,
            kind = kind,
            error = %err,
            "device_send_failed"
        );
    }

    /// 注册或连接阶段提前结束。取消进入 Stopped，其它错误进入 Failed。
    fn abort(&mut self, phase: &'static str, err: DeviceError) -> DeviceOutcome {
        if err == DeviceError::Cancelled {
            self.ctx
                .board
                .transition(&self.device_id, DeviceState::Stopped);
            return self.outcome(DeviceState::Stopped, None);
        }
        warn!(
            target: "starling.simulation",
            simulation_id = %self.ctx.simulation_id,
            device_id = %self.device_id,
            phase = phase,
            error = %err,
            "device_failed"
        );
        let error = err.to_string();
        self.ctx
            .board
            .fail(&self.device_id, DeviceState::Failed, error.clone());
        self.outcome(DeviceState::Failed, Some(error))
    }

    /// 构造结果；若开通批次仍在等待，顺带上报。
    fn outcome(&mut self, state: DeviceState, error: Option<String>) -> DeviceOutcome {
        self.report(state, error.clone());
        DeviceOutcome {
            device_id: self.device_id.clone(),
            state,
            error,
        }
    }

    /// 每个 Agent 最多上报一次。
    fn report(&mut self, state: DeviceState, error: Option<String>) {
        if let Some(reporter) = self.reporter.take() {
            let _ = reporter.send(DeviceOutcome {
                device_id: self.device_id.clone(),
                state,
                error,
            });
        }
    }
}

/// 在取消信号与超时约束下执行一次发送；取消时返回 None。
async fn bounded<F>(
    cancel: &CancellationToken,
    limit: Duration,
    send: F,
) -> Option<Result<(), ProtocolError>>
where
    F: Future<Output = Result<(), ProtocolError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        result = tokio::time::timeout(limit, send) => Some(result.unwrap_or_else(|_| {
            Err(ProtocolError::Timeout(format!("send exceeded {}ms", limit.as_millis())))
        })),
    }
}

fn gate_error(err: GateError) -> DeviceError {
    match err {
        GateError::Cancelled(_) | GateError::Closed(_) => DeviceError::Cancelled,
        GateError::DeadlineExceeded(_) => DeviceError::DeadlineExceeded,
    }
}

/// 删除一个已持久化的设备：平台侧删除（可重试）后移除目标设备记录。
///
/// 调用前该设备的 Agent 必须已经结束。平台返回 NotFound 视为已删除。
pub(crate) async fn delete_device(
    ctx: Arc<AgentContext>,
    record: TargetDeviceRecord,
    cancel: CancellationToken,
) -> DeviceOutcome {
    let device_id = record.device_id.as_str();
    if !ctx
        .board
        .begin(device_id, &record.model_id, DeviceState::Deleting)
    {
        return DeviceOutcome {
            device_id: record.device_id.clone(),
            state: ctx.board.state(device_id).unwrap_or(DeviceState::Deleting),
            error: Some("device is busy".to_string()),
        };
    }

    let result = remove_device(&ctx, device_id, &cancel).await;
    match result {
        Ok(()) => {
            ctx.board.transition(device_id, DeviceState::Deleted);
            record_deletion();
            info!(
                target: "starling.simulation",
                simulation_id = %ctx.simulation_id,
                device_id = %device_id,
                "device_deleted"
            );
            DeviceOutcome {
                device_id: record.device_id.clone(),
                state: DeviceState::Deleted,
                error: None,
            }
        }
        Err(err) => {
            record_deletion_failure();
            warn!(
                target: "starling.simulation",
                simulation_id = %ctx.simulation_id,
                device_id = %device_id,
                error = %err,
                "device_delete_failed"
            );
            let error = err.to_string();
            ctx.board
                .fail(device_id, DeviceState::Failed, error.clone());
            DeviceOutcome {
                device_id: record.device_id.clone(),
                state: DeviceState::Failed,
                error: Some(error),
            }
        }
    }
}

async fn remove_device(
    ctx: &AgentContext,
    device_id: &str,
    cancel: &CancellationToken,
) -> Result<(), DeviceError> {
    let token = ctx
        .gates
        .deletion
        .acquire(cancel, None)
        .await
        .map_err(gate_error)?;
    RetryPolicy::deletion(&ctx.settings)
        .run("delete", device_id, cancel, move |attempt| {
            ctx.board.set_attempts(device_id, attempt);
            async move {
                match ctx.protocol.delete(&ctx.target, device_id).await {
                    Err(ProtocolError::NotFound(_)) => Ok(()),
                    other => other,
                }
            }
        })
        .await?;
    token.release();

    ctx.stores
        .target_devices
        .delete_target_device(&ctx.target_id, device_id)
        .await?;
    Ok(())
}
