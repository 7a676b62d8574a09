//! 设备配置文件存储实现

use super::table::JsonTable;
use crate::error::StorageError;
use crate::models::DeviceConfigRecord;
use crate::traits::DeviceConfigStore;
use crate::validation::{ensure_id, ensure_scope};
use std::collections::BTreeMap;
use std::path::Path;

/// 设备配置文件存储（`device_configs.json`），以模拟 ID 分桶。
pub struct JsonDeviceConfigStore {
    table: JsonTable<BTreeMap<String, DeviceConfigRecord>>,
}

impl JsonDeviceConfigStore {
    pub async fn open(dir: &Path) -> Result<Self, StorageError> {
        Ok(Self {
            table: JsonTable::open(dir, "device_configs").await?,
        })
    }
}

#[async_trait::async_trait]
impl DeviceConfigStore for JsonDeviceConfigStore {
    async fn list_device_configs(
        &self,
        simulation_id: &str,
    ) -> Result<Vec<DeviceConfigRecord>, StorageError> {
        let items = self
            .table
            .read(|rows| {
                rows.get(simulation_id)
                    .map(|bucket| bucket.values().cloned().collect())
                    .unwrap_or_default()
            })
            .await;
        Ok(items)
    }

    async fn find_device_config(
        &self,
        simulation_id: &str,
        config_id: &str,
    ) -> Result<Option<DeviceConfigRecord>, StorageError> {
        let item = self
            .table
            .read(|rows| {
                rows.get(simulation_id)
                    .and_then(|bucket| bucket.get(config_id).cloned())
            })
            .await;
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
        let stored = record.clone();
        self.table
            .write(|rows| {
                rows.entry(simulation_id.to_string())
                    .or_default()
                    .insert(stored.id.clone(), stored);
            })
            .await?;
        Ok(record)
    }

    async fn delete_device_config(
        &self,
        simulation_id: &str,
        config_id: &str,
    ) -> Result<bool, StorageError> {
        self.table
            .write(|rows| {
                rows.get_mut(simulation_id)
                    .map(|bucket| bucket.remove(config_id).is_some())
                    .unwrap_or(false)
            })
            .await
    }
}
