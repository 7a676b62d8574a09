//! 目标平台内存存储实现

use crate::error::StorageError;
use crate::models::TargetRecord;
use crate::traits::TargetStore;
use crate::validation::ensure_id;
use std::collections::HashMap;
use std::sync::RwLock;

/// 目标平台内存存储
#[derive(Default)]
pub struct InMemoryTargetStore {
    targets: RwLock<HashMap<String, TargetRecord>>,
}

impl InMemoryTargetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl TargetStore for InMemoryTargetStore {
    async fn list_targets(&self) -> Result<Vec<TargetRecord>, StorageError> {
        let mut items: Vec<TargetRecord> = self
            .targets
            .read()
            .map(|map| map.values().cloned().collect())
            .unwrap_or_default();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    async fn find_target(&self, target_id: &str) -> Result<Option<TargetRecord>, StorageError> {
        let item = self
            .targets
            .read()
            .ok()
            .and_then(|map| map.get(target_id).cloned());
        Ok(item)
    }

    async fn upsert_target(&self, record: TargetRecord) -> Result<TargetRecord, StorageError> {
        ensure_id("target", &record.id)?;
        let mut map = self
            .targets
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        map.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn delete_target(&self, target_id: &str) -> Result<bool, StorageError> {
        let mut map = self
            .targets
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(map.remove(target_id).is_some())
    }
}
