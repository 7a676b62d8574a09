//! 协议相关类型定义

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::DeviceConnection;

/// 孪生文档片段（desired 更新或 reported 上报）。
pub type TwinPatch = serde_json::Map<String, Value>;

/// 平台下发的 desired 属性更新。
///
/// 保留原始 JSON，其中 `$version` 为 desired 版本号。
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredPropertiesUpdate {
    pub properties: TwinPatch,
}

impl DesiredPropertiesUpdate {
    pub fn new(properties: TwinPatch) -> Self {
        Self { properties }
    }

    /// desired 版本号；缺失或非整数时为 None。
    pub fn version(&self) -> Option<i64> {
        self.properties.get("$version").and_then(Value::as_i64)
    }
}

/// 平台下发的命令（C2D 消息或直接方法）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCommand {
    pub request_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub payload: Value,
}

/// 设备对命令的应答。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandAck {
    pub request_id: String,
    pub status: u16,
    #[serde(default)]
    pub payload: Value,
}

/// 连接上的入站事件。
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    DesiredProperties(DesiredPropertiesUpdate),
    Command(DeviceCommand),
}

/// 一次成功连接的结果：独占的连接句柄 + 入站事件接收端。
///
/// 接收端关闭表示连接已丢失。
pub struct DeviceSession {
    pub connection: Box<dyn DeviceConnection>,
    pub events: mpsc::Receiver<InboundEvent>,
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession").finish_non_exhaustive()
    }
}
