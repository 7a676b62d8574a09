//! 模拟内存存储实现

use crate::error::StorageError;
use crate::models::SimulationRecord;
use crate::traits::SimulationStore;
use crate::validation::ensure_id;
use std::collections::HashMap;
use std::sync::RwLock;

/// 模拟内存存储
///
/// 使用 RwLock + HashMap 提供线程安全的内存存储。
#[derive(Default)]
pub struct InMemorySimulationStore {
    simulations: RwLock<HashMap<String, SimulationRecord>>,
}

impl InMemorySimulationStore {
    /// 创建新的模拟存储
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SimulationStore for InMemorySimulationStore {
    async fn list_simulations(&self) -> Result<Vec<SimulationRecord>, StorageError> {
        let mut items: Vec<SimulationRecord> = self
            .simulations
            .read()
            .map(|map| map.values().cloned().collect())
            .unwrap_or_default();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    async fn find_simulation(
        &self,
        simulation_id: &str,
    ) -> Result<Option<SimulationRecord>, StorageError> {
        let item = self
            .simulations
            .read()
            .ok()
            .and_then(|map| map.get(simulation_id).cloned());
        Ok(item)
    }

    async fn upsert_simulation(
        &self,
        record: SimulationRecord,
    ) -> Result<SimulationRecord, StorageError> {
        ensure_id("simulation", &record.id)?;
        ensure_id("target", &record.target_id)?;
        let mut map = self
            .simulations
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        map.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn delete_simulation(&self, simulation_id: &str) -> Result<bool, StorageError> {
        let mut map = self
            .simulations
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(map.remove(simulation_id).is_some())
    }
}
