//! 模拟运行参数与模拟生命周期状态。

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 模拟生命周期状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulationStatus {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
    Error,
}

impl SimulationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimulationStatus::Stopped => "stopped",
            SimulationStatus::Starting => "starting",
            SimulationStatus::Running => "running",
            SimulationStatus::Stopping => "stopping",
            SimulationStatus::Error => "error",
        }
    }

    /// 进程重启后无 Runner 支撑的“活动”状态。
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SimulationStatus::Starting | SimulationStatus::Running | SimulationStatus::Stopping
        )
    }
}

/// 设备行为开关。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeatureFlags {
    pub enable_telemetry: bool,
    pub enable_reported_props: bool,
    pub enable_twin_update_acks: bool,
    pub enable_command_acks: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_telemetry: true,
            enable_reported_props: true,
            enable_twin_update_acks: true,
            enable_command_acks: true,
        }
    }
}

/// 单个模拟的超时、并发、重试与开关参数。
///
/// 超时单位均为毫秒。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimulationSettings {
    pub connection_timeout_ms: u64,
    pub telemetry_timeout_ms: u64,
    pub twin_update_timeout_ms: u64,
    pub command_timeout_ms: u64,
    pub registration_attempt_timeout_ms: u64,
    pub max_concurrent_connections: usize,
    pub max_concurrent_telemetry_sends: usize,
    pub max_concurrent_twin_updates: usize,
    pub max_concurrent_registrations: usize,
    pub max_concurrent_deletes: usize,
    pub max_registration_attempts: u32,
    /// 连接、删除等其它可重试操作的尝试上限。
    pub max_operation_attempts: u32,
    pub retry_backoff_ms: u64,
    pub retry_backoff_max_ms: u64,
    #[serde(flatten)]
    pub features: FeatureFlags,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            connection_timeout_ms: 30_000,
            telemetry_timeout_ms: 30_000,
            twin_update_timeout_ms: 30_000,
            command_timeout_ms: 30_000,
            registration_attempt_timeout_ms: 30_000,
            max_concurrent_connections: 100,
            max_concurrent_telemetry_sends: 100,
            max_concurrent_twin_updates: 10,
            max_concurrent_registrations: 10,
            max_concurrent_deletes: 10,
            max_registration_attempts: 10,
            max_operation_attempts: 3,
            retry_backoff_ms: 250,
            retry_backoff_max_ms: 8_000,
            features: FeatureFlags::default(),
        }
    }
}

impl SimulationSettings {
    /// 修正非法取值：并发上限与尝试次数至少为 1，退避上限不小于基数。
    pub fn sanitized(mut self) -> Self {
        self.max_concurrent_connections = self.max_concurrent_connections.max(1);
        self.max_concurrent_telemetry_sends = self.max_concurrent_telemetry_sends.max(1);
        self.max_concurrent_twin_updates = self.max_concurrent_twin_updates.max(1);
        self.max_concurrent_registrations = self.max_concurrent_registrations.max(1);
        self.max_concurrent_deletes = self.max_concurrent_deletes.max(1);
        self.max_registration_attempts = self.max_registration_attempts.max(1);
        self.max_operation_attempts = self.max_operation_attempts.max(1);
        if self.retry_backoff_max_ms < self.retry_backoff_ms {
            self.retry_backoff_max_ms = self.retry_backoff_ms;
        }
        self
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn telemetry_timeout(&self) -> Duration {
        Duration::from_millis(self.telemetry_timeout_ms)
    }

    pub fn twin_update_timeout(&self) -> Duration {
        Duration::from_millis(self.twin_update_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn registration_attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.registration_attempt_timeout_ms)
    }
}

/// 对行为开关的部分覆盖；未给出的开关沿用下层取值。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_telemetry: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_reported_props: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_twin_update_acks: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_command_acks: Option<bool>,
}

impl FeatureOverrides {
    pub fn apply(&self, base: FeatureFlags) -> FeatureFlags {
        FeatureFlags {
            enable_telemetry: self.enable_telemetry.unwrap_or(base.enable_telemetry),
            enable_reported_props: self
                .enable_reported_props
                .unwrap_or(base.enable_reported_props),
            enable_twin_update_acks: self
                .enable_twin_update_acks
                .unwrap_or(base.enable_twin_update_acks),
            enable_command_acks: self.enable_command_acks.unwrap_or(base.enable_command_acks),
        }
    }
}

impl From<FeatureFlags> for FeatureOverrides {
    fn from(flags: FeatureFlags) -> Self {
        Self {
            enable_telemetry: Some(flags.enable_telemetry),
            enable_reported_props: Some(flags.enable_reported_props),
            enable_twin_update_acks: Some(flags.enable_twin_update_acks),
            enable_command_acks: Some(flags.enable_command_acks),
        }
    }
}

/// 模拟级的部分参数覆盖。
///
/// 只保存客户端给出的字段；其余字段在启动时取进程级默认值（`STARLING_*`）。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twin_update_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_attempt_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_connections: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_telemetry_sends: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_twin_updates: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_registrations: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_deletes: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_registration_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_operation_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_backoff_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_backoff_max_ms: Option<u64>,
    #[serde(flatten)]
    pub features: FeatureOverrides,
}

impl SettingsOverride {
    /// 逐字段覆盖 `base`，结果经过 `sanitized`。
    pub fn apply(&self, base: &SimulationSettings) -> SimulationSettings {
        SimulationSettings {
            connection_timeout_ms: self
                .connection_timeout_ms
                .unwrap_or(base.connection_timeout_ms),
            telemetry_timeout_ms: self.telemetry_timeout_ms.unwrap_or(base.telemetry_timeout_ms),
            twin_update_timeout_ms: self
                .twin_update_timeout_ms
                .unwrap_or(base.twin_update_timeout_ms),
            command_timeout_ms: self.command_timeout_ms.unwrap_or(base.command_timeout_ms),
            registration_attempt_timeout_ms: self
                .registration_attempt_timeout_ms
                .unwrap_or(base.registration_attempt_timeout_ms),
            max_concurrent_connections: self
                .max_concurrent_connections
                .unwrap_or(base.max_concurrent_connections),
            max_concurrent_telemetry_sends: self
                .max_concurrent_telemetry_sends
                .unwrap_or(base.max_concurrent_telemetry_sends),
            max_concurrent_twin_updates: self
                .max_concurrent_twin_updates
                .unwrap_or(base.max_concurrent_twin_updates),
            max_concurrent_registrations: self
                .max_concurrent_registrations
                .unwrap_or(base.max_concurrent_registrations),
            max_concurrent_deletes: self
                .max_concurrent_deletes
                .unwrap_or(base.max_concurrent_deletes),
            max_registration_attempts: self
                .max_registration_attempts
                .unwrap_or(base.max_registration_attempts),
            max_operation_attempts: self
                .max_operation_attempts
                .unwrap_or(base.max_operation_attempts),
            retry_backoff_ms: self.retry_backoff_ms.unwrap_or(base.retry_backoff_ms),
            retry_backoff_max_ms: self.retry_backoff_max_ms.unwrap_or(base.retry_backoff_max_ms),
            features: self.features.apply(base.features),
        }
        .sanitized()
    }
}

impl From<SimulationSettings> for SettingsOverride {
    fn from(settings: SimulationSettings) -> Self {
        Self {
            connection_timeout_ms: Some(settings.connection_timeout_ms),
            telemetry_timeout_ms: Some(settings.telemetry_timeout_ms),
            twin_update_timeout_ms: Some(settings.twin_update_timeout_ms),
            command_timeout_ms: Some(settings.command_timeout_ms),
            registration_attempt_timeout_ms: Some(settings.registration_attempt_timeout_ms),
            max_concurrent_connections: Some(settings.max_concurrent_connections),
            max_concurrent_telemetry_sends: Some(settings.max_concurrent_telemetry_sends),
            max_concurrent_twin_updates: Some(settings.max_concurrent_twin_updates),
            max_concurrent_registrations: Some(settings.max_concurrent_registrations),
            max_concurrent_deletes: Some(settings.max_concurrent_deletes),
            max_registration_attempts: Some(settings.max_registration_attempts),
            max_operation_attempts: Some(settings.max_operation_attempts),
            retry_backoff_ms: Some(settings.retry_backoff_ms),
            retry_backoff_max_ms: Some(settings.retry_backoff_max_ms),
            features: settings.features.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_settings_fill_defaults() {
        let settings: SimulationSettings =
            serde_json::from_str(r#"{"maxConcurrentRegistrations":3,"enableTelemetry":false}"#)
                .expect("settings");
        assert_eq!(settings.max_concurrent_registrations, 3);
        assert_eq!(settings.max_registration_attempts, 10);
        assert!(!settings.features.enable_telemetry);
        assert!(settings.features.enable_command_acks);
    }

    #[test]
    fn partial_override_keeps_process_defaults() {
        let base = SimulationSettings {
            max_concurrent_deletes: 4,
            features: FeatureFlags {
                enable_telemetry: false,
                ..FeatureFlags::default()
            },
            ..SimulationSettings::default()
        };
        let patch: SettingsOverride = serde_json::from_str(
            r#"{"maxConcurrentConnections":5,"enableCommandAcks":false}"#,
        )
        .expect("override");
        let merged = patch.apply(&base);
        assert_eq!(merged.max_concurrent_connections, 5);
        assert_eq!(merged.max_concurrent_deletes, 4);
        assert!(!merged.features.enable_telemetry);
        assert!(!merged.features.enable_command_acks);
        assert!(merged.features.enable_reported_props);
        // 只回写给出的字段
        assert_eq!(
            serde_json::to_value(&patch).expect("json"),
            serde_json::json!({"maxConcurrentConnections":5,"enableCommandAcks":false})
        );
    }

    #[test]
    fn feature_overrides_fall_back_per_flag() {
        let base = FeatureFlags {
            enable_twin_update_acks: false,
            ..FeatureFlags::default()
        };
        let flags = FeatureOverrides {
            enable_telemetry: Some(false),
            ..FeatureOverrides::default()
        }
        .apply(base);
        assert!(!flags.enable_telemetry);
        assert!(!flags.enable_twin_update_acks);
        assert!(flags.enable_command_acks);
    }

    #[test]
    fn sanitized_clamps_zero_limits() {
        let settings = SimulationSettings {
            max_concurrent_deletes: 0,
            max_registration_attempts: 0,
            retry_backoff_ms: 500,
            retry_backoff_max_ms: 100,
            ..SimulationSettings::default()
        }
        .sanitized();
        assert_eq!(settings.max_concurrent_deletes, 1);
        assert_eq!(settings.max_registration_attempts, 1);
        assert_eq!(settings.retry_backoff_max_ms, 500);
    }

    #[test]
    fn active_statuses() {
        assert!(SimulationStatus::Running.is_active());
        assert!(SimulationStatus::Starting.is_active());
        assert!(SimulationStatus::Stopping.is_active());
        assert!(!SimulationStatus::Stopped.is_active());
        assert!(!SimulationStatus::Error.is_active());
    }
}
