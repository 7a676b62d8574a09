//! 设备模型文件存储实现

use super::table::JsonTable;
use crate::error::StorageError;
use crate::models::DeviceModelRecord;
use crate::traits::DeviceModelStore;
use crate::validation::ensure_id;
use std::path::Path;

/// 设备模型文件存储（`models.json`）
pub struct JsonDeviceModelStore {
    table: JsonTable<DeviceModelRecord>,
}

impl JsonDeviceModelStore {
    pub async fn open(dir: &Path) -> Result<Self, StorageError> {
        Ok(Self {
            table: JsonTable::open(dir, "models").await?,
        })
    }
}

#[async_trait::async_trait]
impl DeviceModelStore for JsonDeviceModelStore {
    async fn list_models(&self) -> Result<Vec<DeviceModelRecord>, StorageError> {
        Ok(self.table.read(|rows| rows.values().cloned().collect()).await)
    }

    async fn find_model(&self, model_id: &str) -> Result<Option<DeviceModelRecord>, StorageError> {
        Ok(self.table.read(|rows| rows.get(model_id).cloned()).await)
    }

    async fn upsert_model(
        &self,
        record: DeviceModelRecord,
    ) -> Result<DeviceModelRecord, StorageError> {
        ensure_id("model", &record.id)?;
        record.capability.validate().map_err(StorageError::new)?;
        let stored = record.clone();
        self.table
            .write(|rows| rows.insert(stored.id.clone(), stored))
            .await?;
        Ok(record)
    }

    async fn delete_model(&self, model_id: &str) -> Result<bool, StorageError> {
        self.table
            .write(|rows| rows.remove(model_id).is_some())
            .await
    }
}
