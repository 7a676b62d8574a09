//! 内存存储实现模块
//!
//! 进程内唯一的存储后端，重启后数据丢失。
//!
//! 包含以下实现：
//! - SimulationStore: InMemorySimulationStore
//! - TargetStore: InMemoryTargetStore
//! - TargetDeviceStore: InMemoryTargetDeviceStore
//! - DeviceModelStore: InMemoryDeviceModelStore
//! - DeviceConfigStore: InMemoryDeviceConfigStore

pub mod device_config;
pub mod device_model;
pub mod simulation;
pub mod target;
pub mod target_device;

pub use device_config::*;
pub use device_model::*;
pub use simulation::*;
pub use target::*;
pub use target_device::*;
