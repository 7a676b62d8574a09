//! 目标设备文件存储实现
//!
//! 文件内按 `target_id` 分桶，与内存实现的作用域一致。

use super::table::JsonTable;
use crate::error::StorageError;
use crate::models::TargetDeviceRecord;
use crate::traits::TargetDeviceStore;
use crate::validation::ensure_id;
use std::collections::BTreeMap;
use std::path::Path;

/// 目标设备文件存储（`target_devices.json`）
pub struct JsonTargetDeviceStore {
    table: JsonTable<BTreeMap<String, TargetDeviceRecord>>,
}

impl JsonTargetDeviceStore {
    pub async fn open(dir: &Path) -> Result<Self, StorageError> {
        Ok(Self {
            table: JsonTable::open(dir, "target_devices").await?,
        })
    }
}

#[async_trait::async_trait]
impl TargetDeviceStore for JsonTargetDeviceStore {
    async fn list_target_devices(
        &self,
        target_id: &str,
    ) -> Result<Vec<TargetDeviceRecord>, StorageError> {
        let items = self
            .table
            .read(|rows| {
                rows.get(target_id)
                    .map(|bucket| bucket.values().cloned().collect())
                    .unwrap_or_default()
            })
            .await;
        Ok(items)
    }

    async fn find_target_device(
        &self,
        target_id: &str,
        device_id: &str,
    ) -> Result<Option<TargetDeviceRecord>, StorageError> {
        let item = self
            .table
            .read(|rows| rows.get(target_id).and_then(|b| b.get(device_id).cloned()))
            .await;
        Ok(item)
    }

    async fn upsert_target_device(
        &self,
        record: TargetDeviceRecord,
    ) -> Result<TargetDeviceRecord, StorageError> {
        ensure_id("target", &record.target_id)?;
        ensure_id("device", &record.device_id)?;
        let stored = record.clone();
        self.table
            .write(|rows| {
                rows.entry(stored.target_id.clone())
                    .or_default()
                    .insert(stored.device_id.clone(), stored);
            })
            .await?;
        Ok(record)
    }

    async fn delete_target_device(
        &self,
        target_id: &str,
        device_id: &str,
    ) -> Result<bool, StorageError> {
        self.table
            .write(|rows| {
                rows.get_mut(target_id)
                    .map(|bucket| bucket.remove(device_id).is_some())
                    .unwrap_or(false)
            })
            .await
    }

    async fn delete_all_target_devices(&self, target_id: &str) -> Result<usize, StorageError> {
        self.table
            .write(|rows| rows.remove(target_id).map(|bucket| bucket.len()).unwrap_or(0))
            .await
    }
}
