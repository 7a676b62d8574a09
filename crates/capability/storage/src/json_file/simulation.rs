//! 模拟文件存储实现

use super::table::JsonTable;
use crate::error::StorageError;
use crate::models::SimulationRecord;
use crate::traits::SimulationStore;
use crate::validation::ensure_id;
use std::path::Path;

/// 模拟文件存储（`simulations.json`）
pub struct JsonSimulationStore {
    table: JsonTable<SimulationRecord>,
}

impl JsonSimulationStore {
    pub async fn open(dir: &Path) -> Result<Self, StorageError> {
        Ok(Self {
            table: JsonTable::open(dir, "simulations").await?,
        })
    }
}

#[async_trait::async_trait]
impl SimulationStore for JsonSimulationStore {
    async fn list_simulations(&self) -> Result<Vec<SimulationRecord>, StorageError> {
        Ok(self.table.read(|rows| rows.values().cloned().collect()).await)
    }

    async fn find_simulation(
        &self,
        simulation_id: &str,
    ) -> Result<Option<SimulationRecord>, StorageError> {
        Ok(self.table.read(|rows| rows.get(simulation_id).cloned()).await)
    }

    async fn upsert_simulation(
        &self,
        record: SimulationRecord,
    ) -> Result<SimulationRecord, StorageError> {
        ensure_id("simulation", &record.id)?;
        ensure_id("target", &record.target_id)?;
        let stored = record.clone();
        self.table
            .write(|rows| rows.insert(stored.id.clone(), stored))
            .await?;
        Ok(record)
    }

    async fn delete_simulation(&self, simulation_id: &str) -> Result<bool, StorageError> {
        self.table
            .write(|rows| rows.remove(simulation_id).is_some())
            .await
    }
}
