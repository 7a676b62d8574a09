//! 设备配置内存存储实现

use crate::error::StorageError;
use crate::models::DeviceConfigRecord;
use crate::traits::DeviceConfigStore;
use crate::validation::{ensure_id, ensure_scope};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

/// 设备配置内存存储
///
/// 以模拟 ID 分桶，配置 ID 在模拟内唯一。
#[derive(Default)]
pub struct InMemoryDeviceConfigStore {
    configs: RwLock<HashMap<String, BTreeMap<String, DeviceConfigRecord>>>,
}

impl InMemoryDeviceConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl DeviceConfigStore for InMemoryDeviceConfigStore {
    async fn list_device_configs(
        &self,
        simulation_id: &str,
    ) -> Result<Vec<DeviceConfigRecord>, StorageError> {
        let items = self
            .configs
            .read()
            .map_err(|_| StorageError::new("lock failed"))?
            .get(simulation_id)
            .map(|bucket| bucket.values().cloned().collect())
            .unwrap_or_default();
        Ok(items)
    }

    async fn find_device_config(
        &self,
        simulation_id: &str,
        config_id: &str,
    ) -> Result<Option<DeviceConfigRecord>, StorageError> {
        let item = self.configs.read().ok().and_then(|map| {
            map.get(simulation_id)
                .and_then(|bucket| bucket.get(config_id).cloned())
        });
        Ok(item)
    }

    async fn upsert_device_config(
        &self,
        simulation_id: &str,
        mut record: DeviceConfigRecord,
    ) -> Result<DeviceConfigRecord, StorageError> {
        ensure_id("simulation", simulation_id)?;
        ensure_id("device config", &record.id)?;
        ensure_id("model", &record.model_id)?;
        if record.simulation_id.is_empty() {
            record.simulation_id = simulation_id.to_string();
        }
        ensure_scope("device config", simulation_id, &record.simulation_id)?;
        let mut map = self
            .configs
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        map.entry(simulation_id.to_string())
            .or_default()
            .insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn delete_device_config(
        &self,
        simulation_id: &str,
        config_id: &str,
    ) -> Result<bool, StorageError> {
        let mut map = self
            .configs
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let removed = map
            .get_mut(simulation_id)
            .map(|bucket| bucket.remove(config_id).is_some())
            .unwrap_or(false);
        Ok(removed)
    }
}
