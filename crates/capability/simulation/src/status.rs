//! 设备运行状态机与状态看板。

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tracing::warn;

/// 单个模拟设备的状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceState {
    Unregistered,
    Registering,
    Registered,
    Connecting,
    Connected,
    Active,
    Disconnecting,
    Stopped,
    Deleting,
    Deleted,
    Failed,
}

impl DeviceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceState::Unregistered => "unregistered",
            DeviceState::Registering => "registering",
            DeviceState::Registered => "registered",
            DeviceState::Connecting => "connecting",
            DeviceState::Connected => "connected",
            DeviceState::Active => "active",
            DeviceState::Disconnecting => "disconnecting",
            DeviceState::Stopped => "stopped",
            DeviceState::Deleting => "deleting",
            DeviceState::Deleted => "deleted",
            DeviceState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeviceState::Stopped | DeviceState::Deleted | DeviceState::Failed
        )
    }

    /// 合法迁移。取消可让尚未连接的设备直接进入 Stopped。
    pub fn can_transition_to(&self, next: DeviceState) -> bool {
        use DeviceState::*;
        matches!(
            (self, next),
            (Unregistered, Registering | Stopped)
                | (Registering, Registered | Failed | Stopped)
                | (Registered, Connecting | Stopped)
                | (Connecting, Connected | Failed | Stopped)
                | (Connected, Active | Disconnecting)
                | (Active, Disconnecting)
                | (Disconnecting, Stopped | Failed)
                | (Deleting, Deleted | Failed)
        )
    }
}

/// 看板上的一行。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    pub device_id: String,
    pub model_id: String,
    pub state: DeviceState,
    /// 当前阶段已用的尝试次数。
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub updated_at_ms: i64,
}

/// 一个模拟内全部设备的状态快照来源。
///
/// 每行只由持有该设备的任务更新；Runner 只负责预留新行。
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    rows: Arc<RwLock<BTreeMap<String, DeviceStatus>>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以 `state` 开始一段新的生命周期。
    ///
    /// 已有非终止行时拒绝（同一设备不会同时被两个任务持有）。
    pub fn begin(&self, device_id: &str, model_id: &str, state: DeviceState) -> bool {
        let Ok(mut rows) = self.rows.write() else {
            return false;
        };
        if rows
            .get(device_id)
            .is_some_and(|row| !row.state.is_terminal())
        {
            return false;
        }
        rows.insert(
            device_id.to_string(),
            DeviceStatus {
                device_id: device_id.to_string(),
                model_id: model_id.to_string(),
                state,
                attempts: 0,
                last_error: None,
                updated_at_ms: domain::now_epoch_ms(),
            },
        );
        true
    }

    /// 迁移状态；非法迁移被忽略并记录告警。
    pub fn transition(&self, device_id: &str, next: DeviceState) -> bool {
        let Ok(mut rows) = self.rows.write() else {
            return false;
        };
        let Some(row) = rows.get_mut(device_id) else {
            return false;
        };
        if !row.state.can_transition_to(next) {
            warn!(
                target: "starling.simulation",
                device_id = %device_id,
                from = row.state.as_str(),
                to = next.as_str(),
                "device_transition_rejected"
            );
            return false;
        }
        row.state = next;
        row.attempts = 0;
        row.updated_at_ms = domain::now_epoch_ms();
        true
    }

    /// 迁移到失败/停止等状态并记录原因。
    pub fn fail(&self, device_id: &str, next: DeviceState, error: impl Into<String>) -> bool {
        let error = error.into();
        if !self.transition(device_id, next) {
            return false;
        }
        if let Ok(mut rows) = self.rows.write()
            && let Some(row) = rows.get_mut(device_id)
        {
            row.last_error = Some(error);
        }
        true
    }

    pub fn set_attempts(&self, device_id: &str, attempts: u32) {
        if let Ok(mut rows) = self.rows.write()
            && let Some(row) = rows.get_mut(device_id)
        {
            row.attempts = attempts;
        }
    }

    pub fn get(&self, device_id: &str) -> Option<DeviceStatus> {
        self.rows
            .read()
            .ok()
            .and_then(|rows| rows.get(device_id).cloned())
    }

    pub fn state(&self, device_id: &str) -> Option<DeviceState> {
        self.get(device_id).map(|row| row.state)
    }

    /// 按设备 ID 排序的快照。
    pub fn snapshot(&self) -> Vec<DeviceStatus> {
        self.rows
            .read()
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// 尚未进入终止状态的设备 ID；其中可能包含还没有持久化记录的预留 ID。
    pub fn in_flight_ids(&self) -> Vec<String> {
        self.rows
            .read()
            .map(|rows| {
                rows.values()
                    .filter(|row| !row.state.is_terminal())
                    .map(|row| row.device_id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 尚未进入终止状态的设备数。
    pub fn live_count(&self) -> usize {
        self.rows
            .read()
            .map(|rows| rows.values().filter(|row| !row.state.is_terminal()).count())
            .unwrap_or(0)
    }
}
