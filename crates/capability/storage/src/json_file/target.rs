//! 目标平台文件存储实现

use super::table::JsonTable;
use crate::error::StorageError;
use crate::models::TargetRecord;
use crate::traits::TargetStore;
use crate::validation::ensure_id;
use std::path::Path;

/// 目标平台文件存储（`targets.json`）
pub struct JsonTargetStore {
    table: JsonTable<TargetRecord>,
}

impl JsonTargetStore {
    pub async fn open(dir: &Path) -> Result<Self, StorageError> {
        Ok(Self {
            table: JsonTable::open(dir, "targets").await?,
        })
    }
}

#[async_trait::async_trait]
impl TargetStore for JsonTargetStore {
    async fn list_targets(&self) -> Result<Vec<TargetRecord>, StorageError> {
        Ok(self.table.read(|rows| rows.values().cloned().collect()).await)
    }

    async fn find_target(&self, target_id: &str) -> Result<Option<TargetRecord>, StorageError> {
        Ok(self.table.read(|rows| rows.get(target_id).cloned()).await)
    }

    async fn upsert_target(&self, record: TargetRecord) -> Result<TargetRecord, StorageError> {
        ensure_id("target", &record.id)?;
        let stored = record.clone();
        self.table
            .write(|rows| rows.insert(stored.id.clone(), stored))
            .await?;
        Ok(record)
    }

    async fn delete_target(&self, target_id: &str) -> Result<bool, StorageError> {
        self.table
            .write(|rows| rows.remove(target_id).is_some())
            .await
    }
}
