//! 模拟引擎错误类型

use starling_protocol::ProtocolError;
use starling_storage::StorageError;

/// Controller / Runner 级错误。
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("simulation {0} is not running")]
    NotRunning(String),
    #[error("simulation {0} is already running")]
    AlreadyRunning(String),
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl SimulationError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        SimulationError::NotFound {
            kind,
            id: id.into(),
        }
    }
}

impl From<StorageError> for SimulationError {
    fn from(err: StorageError) -> Self {
        SimulationError::Storage(err.to_string())
    }
}

/// 单个设备操作的最终结果错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    /// 不可重试的失败，未消耗剩余尝试次数
    #[error("permanent failure: {0}")]
    Permanent(ProtocolError),
    #[error("gave up after {attempts} attempts: {last}")]
    RetryExhausted { attempts: u32, last: ProtocolError },
    #[error("cancelled")]
    Cancelled,
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<StorageError> for DeviceError {
    fn from(err: StorageError) -> Self {
        DeviceError::Storage(err.to_string())
    }
}
