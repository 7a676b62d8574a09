//! # 设备协议能力模块
//!
//! 模拟设备与目标平台之间的交互边界：
//! - **注册**：向注册服务申请凭据
//! - **连接**：建立数据面连接，得到独占的 [`DeviceConnection`] 与入站事件流
//! - **删除**：从平台移除设备
//!
//! ## 实现
//!
//! - [`LoopbackProtocol`]：进程内平台，用于空跑与测试（故障注入、并发高水位）
//! - [`MqttProtocol`]：基于 rumqttc 的 MQTT 数据面
//!
//! ## MQTT Topic 约定
//!
//! ```text
//! {prefix}/{deviceId}/telemetry                  设备 → 平台
//! {prefix}/{deviceId}/reported                   设备 → 平台
//! {prefix}/{deviceId}/commands/{requestId}/ack   设备 → 平台
//! {prefix}/{deviceId}/desired                    平台 → 设备
//! {prefix}/{deviceId}/commands/{requestId}       平台 → 设备
//! ```

mod error;
mod loopback;
mod mqtt;
mod types;

pub use error::ProtocolError;
pub use loopback::{LoopbackOp, LoopbackProtocol};
pub use mqtt::{MqttProtocol, MqttProtocolConfig};
pub use types::*;

use async_trait::async_trait;
use domain::{DeviceCredentials, TargetEndpoints, TelemetryMessage};

/// 目标平台协议。
#[async_trait]
pub trait DeviceProtocol: Send + Sync {
    /// 注册设备，返回连接凭据。
    async fn register(
        &self,
        target: &TargetEndpoints,
        device_id: &str,
        model_id: &str,
    ) -> Result<DeviceCredentials, ProtocolError>;

    /// 建立设备连接。
    async fn connect(
        &self,
        target: &TargetEndpoints,
        credentials: &DeviceCredentials,
    ) -> Result<DeviceSession, ProtocolError>;

    /// 从平台删除设备；设备不存在时返回 [`ProtocolError::NotFound`]。
    async fn delete(&self, target: &TargetEndpoints, device_id: &str)
    -> Result<(), ProtocolError>;
}

/// 单个设备的数据面连接，由设备独占持有。
#[async_trait]
pub trait DeviceConnection: Send {
    async fn send_telemetry(&mut self, message: &TelemetryMessage) -> Result<(), ProtocolError>;

    async fn send_reported_properties(&mut self, patch: &TwinPatch) -> Result<(), ProtocolError>;

    async fn send_command_ack(&mut self, ack: &CommandAck) -> Result<(), ProtocolError>;

    /// 关闭连接；之后的发送返回 [`ProtocolError::ChannelClosed`]。
    async fn disconnect(&mut self) -> Result<(), ProtocolError>;
}
