//! # Starling Storage 模块
//!
//! 模拟器的存储抽象层。核心层只依赖 `traits.rs` 中的接口，
//! 提供进程内的内存实现与按目录保存的 JSON 文件实现。
//!
//! ## 架构设计
//!
//! 1. **接口抽象层** (`traits.rs`)：定义所有资源存储的异步 Trait 接口
//! 2. **数据模型层** (`models.rs`)：模拟、目标、目标设备、设备模型、设备配置
//! 3. **错误处理层** (`error.rs`)：统一的存储错误类型
//! 4. **验证辅助层** (`validation.rs`)：ID 与作用域校验
//! 5. **实现层** (`in_memory/`)：`RwLock<HashMap>` 内存实现
//! 6. **实现层** (`json_file/`)：每类资源一个 JSON 文件，重启后保留
//!
//! ## 作用域
//!
//! - 目标设备按 `target_id` 划分，设备 ID 只在目标内唯一
//! - 设备配置按 `simulation_id` 划分
//! - 单条记录的写入由存储实现串行化，调用方无需额外加锁
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use starling_storage::{Stores, TargetDeviceStore};
//!
//! let stores = Stores::in_memory();
//! let devices = stores.target_devices.list_target_devices("target-1").await?;
//! ```

pub mod error;
pub mod in_memory;
pub mod json_file;
pub mod models;
pub mod traits;
pub mod validation;

pub use error::*;
pub use models::*;
pub use traits::*;
pub use validation::*;

pub use in_memory::{
    InMemoryDeviceConfigStore, InMemoryDeviceModelStore, InMemorySimulationStore,
    InMemoryTargetDeviceStore, InMemoryTargetStore,
};
pub use json_file::{
    JsonDeviceConfigStore, JsonDeviceModelStore, JsonSimulationStore, JsonTargetDeviceStore,
    JsonTargetStore,
};

use std::path::Path;
use std::sync::Arc;

/// 全部存储句柄。
///
/// Controller 与 HTTP 层共享同一组实例。
#[derive(Clone)]
pub struct Stores {
    pub simulations: Arc<dyn SimulationStore>,
    pub targets: Arc<dyn TargetStore>,
    pub target_devices: Arc<dyn TargetDeviceStore>,
    pub models: Arc<dyn DeviceModelStore>,
    pub device_configs: Arc<dyn DeviceConfigStore>,
}

impl Stores {
    /// 创建一组空的内存存储。
    pub fn in_memory() -> Self {
        Self {
            simulations: Arc::new(InMemorySimulationStore::new()),
            targets: Arc::new(InMemoryTargetStore::new()),
            target_devices: Arc::new(InMemoryTargetDeviceStore::new()),
            models: Arc::new(InMemoryDeviceModelStore::new()),
            device_configs: Arc::new(InMemoryDeviceConfigStore::new()),
        }
    }

    /// 打开（必要时创建）目录下的 JSON 文件存储。
    pub async fn open_dir(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        Ok(Self {
            simulations: Arc::new(JsonSimulationStore::open(dir).await?),
            targets: Arc::new(JsonTargetStore::open(dir).await?),
            target_devices: Arc::new(JsonTargetDeviceStore::open(dir).await?),
            models: Arc::new(JsonDeviceModelStore::open(dir).await?),
            device_configs: Arc::new(JsonDeviceConfigStore::open(dir).await?),
        })
    }
}
