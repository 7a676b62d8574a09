//! 设备模型内存存储实现

use crate::error::StorageError;
use crate::models::DeviceModelRecord;
use crate::traits::DeviceModelStore;
use crate::validation::ensure_id;
use std::collections::HashMap;
use std::sync::RwLock;

/// 设备模型内存存储
#[derive(Default)]
pub struct InMemoryDeviceModelStore {
    models: RwLock<HashMap<String, DeviceModelRecord>>,
}

impl InMemoryDeviceModelStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl DeviceModelStore for InMemoryDeviceModelStore {
    async fn list_models(&self) -> Result<Vec<DeviceModelRecord>, StorageError> {
        let mut items: Vec<DeviceModelRecord> = self
            .models
            .read()
            .map(|map| map.values().cloned().collect())
            .unwrap_or_default();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    async fn find_model(&self, model_id: &str) -> Result<Option<DeviceModelRecord>, StorageError> {
        let item = self
            .models
            .read()
            .ok()
            .and_then(|map| map.get(model_id).cloned());
        Ok(item)
    }

    async fn upsert_model(
        &self,
        record: DeviceModelRecord,
    ) -> Result<DeviceModelRecord, StorageError> {
        ensure_id("model", &record.id)?;
        record.capability.validate().map_err(StorageError::new)?;
        let mut map = self
            .models
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        map.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn delete_model(&self, model_id: &str) -> Result<bool, StorageError> {
        let mut map = self
            .models
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(map.remove(model_id).is_some())
    }
}
