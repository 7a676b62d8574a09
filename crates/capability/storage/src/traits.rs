//! 存储接口 Trait 定义
//!
//! 定义所有资源存储的异步接口：
//! - SimulationStore：模拟存储
//! - TargetStore：目标平台存储
//! - TargetDeviceStore：目标设备存储（按目标划分）
//! - DeviceModelStore：设备模型存储
//! - DeviceConfigStore：设备配置存储（按模拟划分）
//!
//! 设计原则：
//! - 所有接口返回 StorageError
//! - 单实体操作在实现内部串行化，核心层不额外加锁
//! - 使用 async_trait 支持动态分发

use crate::error::StorageError;
use crate::models::{
    DeviceConfigRecord, DeviceModelRecord, SimulationRecord, TargetDeviceRecord, TargetRecord,
};
use async_trait::async_trait;

/// 模拟存储接口
#[async_trait]
pub trait SimulationStore: Send + Sync {
    /// 列出所有模拟
    async fn list_simulations(&self) -> Result<Vec<SimulationRecord>, StorageError>;

    /// 查找指定模拟
    async fn find_simulation(
        &self,
        simulation_id: &str,
    ) -> Result<Option<SimulationRecord>, StorageError>;

    /// 创建或更新模拟
    async fn upsert_simulation(
        &self,
        record: SimulationRecord,
    ) -> Result<SimulationRecord, StorageError>;

    /// 删除模拟
    async fn delete_simulation(&self, simulation_id: &str) -> Result<bool, StorageError>;
}

/// 目标平台存储接口
#[async_trait]
pub trait TargetStore: Send + Sync {
    async fn list_targets(&self) -> Result<Vec<TargetRecord>, StorageError>;

    async fn find_target(&self, target_id: &str) -> Result<Option<TargetRecord>, StorageError>;

    async fn upsert_target(&self, record: TargetRecord) -> Result<TargetRecord, StorageError>;

    async fn delete_target(&self, target_id: &str) -> Result<bool, StorageError>;
}

/// 目标设备存储接口
///
/// 所有操作都限定在单个目标内。
#[async_trait]
pub trait TargetDeviceStore: Send + Sync {
    /// 列出目标下的所有设备
    async fn list_target_devices(
        &self,
        target_id: &str,
    ) -> Result<Vec<TargetDeviceRecord>, StorageError>;

    /// 查找指定设备
    async fn find_target_device(
        &self,
        target_id: &str,
        device_id: &str,
    ) -> Result<Option<TargetDeviceRecord>, StorageError>;

    /// 创建或更新设备
    async fn upsert_target_device(
        &self,
        record: TargetDeviceRecord,
    ) -> Result<TargetDeviceRecord, StorageError>;

    /// 删除指定设备
    async fn delete_target_device(
        &self,
        target_id: &str,
        device_id: &str,
    ) -> Result<bool, StorageError>;

    /// 删除目标下所有设备，返回删除数量
    async fn delete_all_target_devices(&self, target_id: &str) -> Result<usize, StorageError>;
}

/// 设备模型存储接口
#[async_trait]
pub trait DeviceModelStore: Send + Sync {
    async fn list_models(&self) -> Result<Vec<DeviceModelRecord>, StorageError>;

    async fn find_model(&self, model_id: &str) -> Result<Option<DeviceModelRecord>, StorageError>;

    async fn upsert_model(
        &self,
        record: DeviceModelRecord,
    ) -> Result<DeviceModelRecord, StorageError>;

    async fn delete_model(&self, model_id: &str) -> Result<bool, StorageError>;
}

/// 设备配置存储接口
///
/// 所有操作都限定在单个模拟内。
#[async_trait]
pub trait DeviceConfigStore: Send + Sync {
    async fn list_device_configs(
        &self,
        simulation_id: &str,
    ) -> Result<Vec<DeviceConfigRecord>, StorageError>;

    async fn find_device_config(
        &self,
        simulation_id: &str,
        config_id: &str,
    ) -> Result<Option<DeviceConfigRecord>, StorageError>;

    async fn upsert_device_config(
        &self,
        simulation_id: &str,
        record: DeviceConfigRecord,
    ) -> Result<DeviceConfigRecord, StorageError>;

    async fn delete_device_config(
        &self,
        simulation_id: &str,
        config_id: &str,
    ) -> Result<bool, StorageError>;
}
