//! 目标设备内存存储实现
//!
//! 设备按 `target_id` 分桶保存；同一目标内的写入由写锁串行化。

use crate::error::StorageError;
use crate::models::TargetDeviceRecord;
use crate::traits::TargetDeviceStore;
use crate::validation::ensure_id;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

/// 目标设备内存存储
#[derive(Default)]
pub struct InMemoryTargetDeviceStore {
    devices: RwLock<HashMap<String, BTreeMap<String, TargetDeviceRecord>>>,
}

impl InMemoryTargetDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl TargetDeviceStore for InMemoryTargetDeviceStore {
    async fn list_target_devices(
        &self,
        target_id: &str,
    ) -> Result<Vec<TargetDeviceRecord>, StorageError> {
        let items = self
            .devices
            .read()
            .map_err(|_| StorageError::new("lock failed"))?
            .get(target_id)
            .map(|bucket| bucket.values().cloned().collect())
            .unwrap_or_default();
        Ok(items)
    }

    async fn find_target_device(
        &self,
        target_id: &str,
        device_id: &str,
    ) -> Result<Option<TargetDeviceRecord>, StorageError> {
        let item = self
            .devices
            .read()
            .ok()
            .and_then(|map| map.get(target_id).and_then(|b| b.get(device_id).cloned()));
        Ok(item)
    }

    async fn upsert_target_device(
        &self,
        record: TargetDeviceRecord,
    ) -> Result<TargetDeviceRecord, StorageError> {
        ensure_id("target", &record.target_id)?;
        ensure_id("device", &record.device_id)?;
        let mut map = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        map.entry(record.target_id.clone())
            .or_default()
            .insert(record.device_id.clone(), record.clone());
        Ok(record)
    }

    async fn delete_target_device(
        &self,
        target_id: &str,
        device_id: &str,
    ) -> Result<bool, StorageError> {
        let mut map = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let removed = map
            .get_mut(target_id)
            .map(|bucket| bucket.remove(device_id).is_some())
            .unwrap_or(false);
        Ok(removed)
    }

    async fn delete_all_target_devices(&self, target_id: &str) -> Result<usize, StorageError> {
        let mut map = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(map.remove(target_id).map(|bucket| bucket.len()).unwrap_or(0))
    }
}
