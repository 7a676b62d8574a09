//! Controller：模拟生命周期编排。
//!
//! ```text
//! Stopped → Starting → Running → Stopping → Stopped
//!              │
//!              └→ Error（目标缺失、加载失败，原因写入 last_error）
//! ```
//!
//! 状态只由 Controller 写回存储；Running 仅在 Runner 已登记时成立。

use crate::error::SimulationError;
use crate::runner::{Batch, SimulationRunner};
use crate::status::DeviceStatus;
use domain::{SimulationSettings, SimulationStatus};
use starling_protocol::DeviceProtocol;
use starling_storage::{SimulationRecord, StorageError, Stores};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

enum RunnerSlot {
    /// 启动或停止进行中，其它生命周期调用视为冲突
    Transitioning,
    Running(Arc<SimulationRunner>),
}

pub struct Controller {
    stores: Stores,
    protocol: Arc<dyn DeviceProtocol>,
    defaults: SimulationSettings,
    root: CancellationToken,
    runners: Mutex<HashMap<String, RunnerSlot>>,
}

impl Controller {
    pub fn new(
        stores: Stores,
        protocol: Arc<dyn DeviceProtocol>,
        defaults: SimulationSettings,
    ) -> Self {
        Self {
            stores,
            protocol,
            defaults: defaults.sanitized(),
            root: CancellationToken::new(),
            runners: Mutex::new(HashMap::new()),
        }
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn defaults(&self) -> &SimulationSettings {
        &self.defaults
    }

    pub fn is_running(&self, simulation_id: &str) -> bool {
        self.runners
            .lock()
            .map(|runners| matches!(runners.get(simulation_id), Some(RunnerSlot::Running(_))))
            .unwrap_or(false)
    }

    pub fn running_simulations(&self) -> usize {
        self.runners
            .lock()
            .map(|runners| {
                runners
                    .values()
                    .filter(|slot| matches!(slot, RunnerSlot::Running(_)))
                    .count()
            })
            .unwrap_or(0)
    }

    /// 是否登记了 Runner（含启动/停止中）。
    pub fn has_runner(&self, simulation_id: &str) -> bool {
        self.runners
            .lock()
            .map(|runners| runners.contains_key(simulation_id))
            .unwrap_or(false)
    }

    pub async fn start_simulation(
        &self,
        simulation_id: &str,
    ) -> Result<SimulationRecord, SimulationError> {
        let mut record = self
            .stores
            .simulations
            .find_simulation(simulation_id)
            .await?
            .ok_or_else(|| SimulationError::not_found("simulation", simulation_id))?;
        self.claim(simulation_id)?;

        let runner = match self.launch(&mut record).await {
            Ok(runner) => runner,
            Err(err) => {
                self.release(simulation_id);
                warn!(
                    target: "starling.simulation",
                    simulation_id = %simulation_id,
                    error = %err,
                    "simulation_start_failed"
                );
                record.status = SimulationStatus::Error;
                record.last_error = Some(err.to_string());
                if let Err(store_err) = self.stores.simulations.upsert_simulation(record).await {
                    warn!(
                        target: "starling.simulation",
                        simulation_id = %simulation_id,
                        error = %store_err,
                        "simulation_status_persist_failed"
                    );
                }
                return Err(err);
            }
        };

        record.status = SimulationStatus::Running;
        record.last_error = None;
        let record = match self.stores.simulations.upsert_simulation(record).await {
            Ok(record) => record,
            Err(err) => {
                runner.stop().await;
                self.release(simulation_id);
                return Err(err.into());
            }
        };
        if let Ok(mut runners) = self.runners.lock() {
            runners.insert(simulation_id.to_string(), RunnerSlot::Running(runner));
        }
        info!(
            target: "starling.simulation",
            simulation_id = %simulation_id,
            "simulation_started"
        );
        Ok(record)
    }

    async fn launch(
        &self,
        record: &mut SimulationRecord,
    ) -> Result<Arc<SimulationRunner>, SimulationError> {
        record.status = SimulationStatus::Starting;
        record.last_error = None;
        *record = self
            .stores
            .simulations
            .upsert_simulation(record.clone())
            .await?;

        let target = self
            .stores
            .targets
            .find_target(&record.target_id)
            .await?
            .ok_or_else(|| SimulationError::not_found("target", &record.target_id))?;
        let settings = record.effective_settings(&self.defaults);
        let runner = Arc::new(SimulationRunner::new(
            record,
            target,
            settings,
            self.protocol.clone(),
            self.stores.clone(),
            &self.root,
        ));

        let loaded = match runner.load_profiles().await {
            Ok(_) => runner.start().await,
            Err(err) => Err(err),
        };
        if let Err(err) = loaded {
            runner.stop().await;
            return Err(err);
        }
        Ok(runner)
    }

    pub async fn stop_simulation(
        &self,
        simulation_id: &str,
    ) -> Result<SimulationRecord, SimulationError> {
        let runner = {
            let mut runners = self
                .runners
                .lock()
                .map_err(|_| SimulationError::Storage("runner registry lock failed".into()))?;
            match runners.get(simulation_id) {
                Some(RunnerSlot::Running(runner)) => {
                    let runner = runner.clone();
                    runners.insert(simulation_id.to_string(), RunnerSlot::Transitioning);
                    runner
                }
                Some(RunnerSlot::Transitioning) => {
                    return Err(SimulationError::AlreadyRunning(simulation_id.to_string()));
                }
                None => return Err(SimulationError::NotRunning(simulation_id.to_string())),
            }
        };

        self.persist_status(simulation_id, SimulationStatus::Stopping)
            .await;
        runner.stop().await;
        self.release(simulation_id);
        let record = self
            .persist_status(simulation_id, SimulationStatus::Stopped)
            .await
            .ok_or_else(|| SimulationError::not_found("simulation", simulation_id))?;
        info!(
            target: "starling.simulation",
            simulation_id = %simulation_id,
            "simulation_stopped"
        );
        Ok(record)
    }

    pub async fn provision_devices(
        &self,
        simulation_id: &str,
        model_id: &str,
        count: usize,
    ) -> Result<Batch, SimulationError> {
        if count == 0 {
            return Err(SimulationError::Invalid(
                "device count must be positive".into(),
            ));
        }
        let runner = self.runner(simulation_id)?;
        runner.provision(model_id, count).await
    }

    pub async fn delete_devices(
        &self,
        simulation_id: &str,
        model_id: &str,
        count: usize,
    ) -> Result<Batch, SimulationError> {
        let runner = self.runner(simulation_id)?;
        if self.stores.models.find_model(model_id).await?.is_none() {
            return Err(SimulationError::not_found("model", model_id));
        }
        runner.delete(model_id, count).await
    }

    pub async fn delete_all_devices(&self, simulation_id: &str) -> Result<Batch, SimulationError> {
        let runner = self.runner(simulation_id)?;
        runner.delete_all().await
    }

    /// 删除模拟及其设备配置；运行中拒绝。
    pub async fn delete_simulation(&self, simulation_id: &str) -> Result<(), SimulationError> {
        if self.has_runner(simulation_id) {
            return Err(SimulationError::AlreadyRunning(simulation_id.to_string()));
        }
        if self
            .stores
            .simulations
            .find_simulation(simulation_id)
            .await?
            .is_none()
        {
            return Err(SimulationError::not_found("simulation", simulation_id));
        }
        for config in self
            .stores
            .device_configs
            .list_device_configs(simulation_id)
            .await?
        {
            self.stores
                .device_configs
                .delete_device_config(simulation_id, &config.id)
                .await?;
        }
        self.stores
            .simulations
            .delete_simulation(simulation_id)
            .await?;
        info!(
            target: "starling.simulation",
            simulation_id = %simulation_id,
            "simulation_deleted"
        );
        Ok(())
    }

    /// 运行中返回看板快照；已停止的模拟返回空列表。
    pub async fn device_statuses(
        &self,
        simulation_id: &str,
    ) -> Result<Vec<DeviceStatus>, SimulationError> {
        if let Ok(runner) = self.runner(simulation_id) {
            return Ok(runner.device_statuses());
        }
        match self
            .stores
            .simulations
            .find_simulation(simulation_id)
            .await?
        {
            Some(_) => Ok(Vec::new()),
            None => Err(SimulationError::not_found("simulation", simulation_id)),
        }
    }

    /// 进程启动时调用：把残留的 Running/Starting/Stopping 状态改回 Stopped。
    pub async fn reset_simulation_status(&self) -> Result<usize, SimulationError> {
        let mut reset = 0;
        for mut record in self.stores.simulations.list_simulations().await? {
            if !record.status.is_active() {
                continue;
            }
            let previous = record.status;
            record.status = SimulationStatus::Stopped;
            let id = record.id.clone();
            self.stores.simulations.upsert_simulation(record).await?;
            reset += 1;
            info!(
                target: "starling.simulation",
                simulation_id = %id,
                previous = previous.as_str(),
                "simulation_status_reset"
            );
        }
        Ok(reset)
    }

    /// 停止全部 Runner，全部退出后返回。
    pub async fn shutdown(&self) {
        self.root.cancel();
        let runners: Vec<(String, Arc<SimulationRunner>)> = match self.runners.lock() {
            Ok(mut runners) => runners
                .drain()
                .filter_map(|(id, slot)| match slot {
                    RunnerSlot::Running(runner) => Some((id, runner)),
                    RunnerSlot::Transitioning => None,
                })
                .collect(),
            Err(_) => Vec::new(),
        };
        for (id, runner) in runners {
            runner.stop().await;
            self.persist_status(&id, SimulationStatus::Stopped).await;
        }
        info!(target: "starling.simulation", "controller_shutdown");
    }

    fn runner(&self, simulation_id: &str) -> Result<Arc<SimulationRunner>, SimulationError> {
        let runners = self
            .runners
            .lock()
            .map_err(|_| SimulationError::Storage("runner registry lock failed".into()))?;
        match runners.get(simulation_id) {
            Some(RunnerSlot::Running(runner)) => Ok(runner.clone()),
            _ => Err(SimulationError::NotRunning(simulation_id.to_string())),
        }
    }

    fn claim(&self, simulation_id: &str) -> Result<(), SimulationError> {
        let mut runners = self
            .runners
            .lock()
            .map_err(|_| SimulationError::Storage("runner registry lock failed".into()))?;
        if runners.contains_key(simulation_id) {
            return Err(SimulationError::AlreadyRunning(simulation_id.to_string()));
        }
        runners.insert(simulation_id.to_string(), RunnerSlot::Transitioning);
        Ok(())
    }

    fn release(&self, simulation_id: &str) {
        if let Ok(mut runners) = self.runners.lock() {
            runners.remove(simulation_id);
        }
    }

    /// 写回状态；失败只记录日志。
    async fn persist_status(
        &self,
        simulation_id: &str,
        status: SimulationStatus,
    ) -> Option<SimulationRecord> {
        let result = self.write_status(simulation_id, status).await;
        match result {
            Ok(record) => record,
            Err(err) => {
                warn!(
                    target: "starling.simulation",
                    simulation_id = %simulation_id,
                    status = status.as_str(),
                    error = %err,
                    "simulation_status_persist_failed"
                );
                None
            }
        }
    }

    async fn write_status(
        &self,
        simulation_id: &str,
        status: SimulationStatus,
    ) -> Result<Option<SimulationRecord>, StorageError> {
        let Some(mut record) = self
            .stores
            .simulations
            .find_simulation(simulation_id)
            .await?
        else {
            return Ok(None);
        };
        record.status = status;
        if status != SimulationStatus::Error {
            record.last_error = None;
        }
        self.stores
            .simulations
            .upsert_simulation(record)
            .await
            .map(Some)
    }
}
