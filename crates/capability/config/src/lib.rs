//! 应用运行配置加载。

use domain::{FeatureFlags, SimulationSettings};
use std::env;
use std::path::PathBuf;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 设备协议实现选择。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolKind {
    /// 进程内平台，不产生网络流量。
    Loopback,
    Mqtt,
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_addr: String,
    pub protocol: ProtocolKind,
    pub mqtt_topic_prefix: String,
    pub mqtt_keep_alive_seconds: u64,
    /// 设置后使用该目录下的 JSON 文件存储，否则使用内存存储。
    pub data_dir: Option<PathBuf>,
    /// 模拟未覆盖时使用的默认参数。
    pub simulation_defaults: SimulationSettings,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_addr =
            env::var("STARLING_HTTP_ADDR").unwrap_or_else(|_| "127.0.0.1:6001".to_string());
        let protocol = read_protocol("STARLING_PROTOCOL")?;
        let mqtt_topic_prefix =
            env::var("STARLING_MQTT_TOPIC_PREFIX").unwrap_or_else(|_| "starling".to_string());
        let mqtt_keep_alive_seconds =
            read_u64_with_default("STARLING_MQTT_KEEP_ALIVE_SECONDS", 30)?;
        let data_dir = env::var("STARLING_DATA_DIR")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);

        let defaults = SimulationSettings::default();
        let features = FeatureFlags {
            enable_telemetry: read_bool_with_default(
                "STARLING_ENABLE_TELEMETRY",
                defaults.features.enable_telemetry,
            ),
            enable_reported_props: read_bool_with_default(
                "STARLING_ENABLE_REPORTED_PROPS",
                defaults.features.enable_reported_props,
            ),
            enable_twin_update_acks: read_bool_with_default(
                "STARLING_ENABLE_TWIN_UPDATE_ACKS",
                defaults.features.enable_twin_update_acks,
            ),
            enable_command_acks: read_bool_with_default(
                "STARLING_ENABLE_COMMAND_ACKS",
                defaults.features.enable_command_acks,
            ),
        };
        let simulation_defaults = SimulationSettings {
            connection_timeout_ms: read_u64_with_default(
                "STARLING_CONNECTION_TIMEOUT_MS",
                defaults.connection_timeout_ms,
            )?,
            telemetry_timeout_ms: read_u64_with_default(
                "STARLING_TELEMETRY_TIMEOUT_MS",
                defaults.telemetry_timeout_ms,
            )?,
            twin_update_timeout_ms: read_u64_with_default(
                "STARLING_TWIN_UPDATE_TIMEOUT_MS",
                defaults.twin_update_timeout_ms,
            )?,
            command_timeout_ms: read_u64_with_default(
                "STARLING_COMMAND_TIMEOUT_MS",
                defaults.command_timeout_ms,
            )?,
            registration_attempt_timeout_ms: read_u64_with_default(
                "STARLING_REGISTRATION_ATTEMPT_TIMEOUT_MS",
                defaults.registration_attempt_timeout_ms,
            )?,
            max_concurrent_connections: read_usize_with_default(
                "STARLING_MAX_CONCURRENT_CONNECTIONS",
                defaults.max_concurrent_connections,
            )?,
            max_concurrent_telemetry_sends: read_usize_with_default(
                "STARLING_MAX_CONCURRENT_TELEMETRY_SENDS",
                defaults.max_concurrent_telemetry_sends,
            )?,
            max_concurrent_twin_updates: read_usize_with_default(
                "STARLING_MAX_CONCURRENT_TWIN_UPDATES",
                defaults.max_concurrent_twin_updates,
            )?,
            max_concurrent_registrations: read_usize_with_default(
                "STARLING_MAX_CONCURRENT_REGISTRATIONS",
                defaults.max_concurrent_registrations,
            )?,
            max_concurrent_deletes: read_usize_with_default(
                "STARLING_MAX_CONCURRENT_DELETES",
                defaults.max_concurrent_deletes,
            )?,
            max_registration_attempts: read_u32_with_default(
                "STARLING_MAX_REGISTRATION_ATTEMPTS",
                defaults.max_registration_attempts,
            )?,
            max_operation_attempts: read_u32_with_default(
                "STARLING_MAX_OPERATION_ATTEMPTS",
                defaults.max_operation_attempts,
            )?,
            retry_backoff_ms: read_u64_with_default(
                "STARLING_RETRY_BACKOFF_MS",
                defaults.retry_backoff_ms,
            )?,
            retry_backoff_max_ms: read_u64_with_default(
                "STARLING_RETRY_BACKOFF_MAX_MS",
                defaults.retry_backoff_max_ms,
            )?,
            features,
        }
        .sanitized();

        Ok(Self {
            http_addr,
            protocol,
            mqtt_topic_prefix,
            mqtt_keep_alive_seconds,
            data_dir,
            simulation_defaults,
        })
    }
}

fn read_protocol(key: &str) -> Result<ProtocolKind, ConfigError> {
    let value = match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => return Ok(ProtocolKind::Loopback),
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "loopback" => Ok(ProtocolKind::Loopback),
        "mqtt" => Ok(ProtocolKind::Mqtt),
        _ => Err(ConfigError::Invalid(key.to_string(), value)),
    }
}

fn read_u32_with_default(key: &str, default: u32) -> Result<u32, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u32>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_usize_with_default(key: &str, default: usize) -> Result<usize, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<usize>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
