//! SimulationRunner：一个运行中模拟的设备任务组。
//!
//! Runner 持有闸门、任务组、取消令牌与状态看板。每个设备一个任务；
//! 设备 ID 在分配锁内一次性算好再扇出。

use crate::agent::{AgentContext, DeviceAgent, DeviceOutcome, DeviceProfile, delete_device};
use crate::error::SimulationError;
use crate::gate::ConcurrencyGates;
use crate::status::{DeviceState, DeviceStatus, StatusBoard};
use domain::{
    FeatureFlags, SimulationSettings, allocate_device_ids, device_id_prefix, max_device_suffix,
    parse_device_suffix, simulation_device_prefix,
};
use serde::Serialize;
use starling_protocol::DeviceProtocol;
use starling_storage::{
    DeviceConfigRecord, SimulationRecord, Stores, TargetDeviceRecord, TargetRecord,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

struct AgentHandle {
    cancel: CancellationToken,
    join: JoinHandle<DeviceOutcome>,
}

/// 一次批量开通或删除的结果。
///
/// `device_ids` 在请求返回时已确定；各设备结果通过 `next_outcome` 逐个到达。
#[derive(Debug)]
pub struct Batch {
    pub device_ids: Vec<String>,
    outcomes: mpsc::UnboundedReceiver<DeviceOutcome>,
}

impl Batch {
    fn new(device_ids: Vec<String>, outcomes: mpsc::UnboundedReceiver<DeviceOutcome>) -> Self {
        Self {
            device_ids,
            outcomes,
        }
    }

    /// 全部设备都已产出结果后返回 None。
    pub async fn next_outcome(&mut self) -> Option<DeviceOutcome> {
        self.outcomes.recv().await
    }

    /// 等待所有设备的结果。
    pub async fn report(mut self) -> BatchReport {
        let mut outcomes = Vec::with_capacity(self.device_ids.len());
        while let Some(outcome) = self.outcomes.recv().await {
            outcomes.push(outcome);
        }
        outcomes.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        BatchReport {
            device_ids: self.device_ids,
            outcomes,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub device_ids: Vec<String>,
    pub outcomes: Vec<DeviceOutcome>,
}

impl BatchReport {
    pub fn count(&self, state: DeviceState) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.state == state)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.count(DeviceState::Failed)
    }
}

pub struct SimulationRunner {
    ctx: Arc<AgentContext>,
    simulation_features: FeatureFlags,
    profiles: RwLock<HashMap<String, Arc<DeviceProfile>>>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    allocation: tokio::sync::Mutex<()>,
    agents: Mutex<HashMap<String, AgentHandle>>,
}

impl SimulationRunner {
    /// `parent` 取消时整个模拟随之取消。
    pub fn new(
        simulation: &SimulationRecord,
        target: TargetRecord,
        settings: SimulationSettings,
        protocol: Arc<dyn DeviceProtocol>,
        stores: Stores,
        parent: &CancellationToken,
    ) -> Self {
        let simulation_features = settings.features;
        let ctx = AgentContext {
            simulation_id: simulation.id.clone(),
            target_id: target.id.clone(),
            target: target.endpoints,
            gates: ConcurrencyGates::from_settings(&settings),
            settings,
            protocol,
            stores,
            board: StatusBoard::new(),
        };
        Self {
            ctx: Arc::new(ctx),
            simulation_features,
            profiles: RwLock::new(HashMap::new()),
            cancel: parent.child_token(),
            tracker: TaskTracker::new(),
            allocation: tokio::sync::Mutex::new(()),
            agents: Mutex::new(HashMap::new()),
        }
    }

    pub fn simulation_id(&self) -> &str {
        &self.ctx.simulation_id
    }

    pub fn target_id(&self) -> &str {
        &self.ctx.target_id
    }

    pub fn settings(&self) -> &SimulationSettings {
        &self.ctx.settings
    }

    pub fn gates(&self) -> &ConcurrencyGates {
        &self.ctx.gates
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 预加载模拟内已配置的设备模型。
    pub async fn load_profiles(&self) -> Result<usize, SimulationError> {
        let configs = self
            .ctx
            .stores
            .device_configs
            .list_device_configs(&self.ctx.simulation_id)
            .await?;
        let mut loaded = 0;
        for config in configs {
            if self.cached_profile(&config.model_id).is_some() {
                continue;
            }
            match self.profile(&config.model_id).await {
                Ok(_) => loaded += 1,
                Err(SimulationError::NotFound { .. }) => warn!(
                    target: "starling.simulation",
                    simulation_id = %self.ctx.simulation_id,
                    model_id = %config.model_id,
                    "device_config_model_missing"
                ),
                Err(err) => return Err(err),
            }
        }
        Ok(loaded)
    }

    fn cached_profile(&self, model_id: &str) -> Option<Arc<DeviceProfile>> {
        self.profiles
            .read()
            .ok()
            .and_then(|profiles| profiles.get(model_id).cloned())
    }

    /// 模型 + 设备配置；模拟内未配置该模型时使用默认间隔。
    pub async fn profile(&self, model_id: &str) -> Result<Arc<DeviceProfile>, SimulationError> {
        if let Some(profile) = self.cached_profile(model_id) {
            return Ok(profile);
        }
        let model = self
            .ctx
            .stores
            .models
            .find_model(model_id)
            .await?
            .ok_or_else(|| SimulationError::not_found("model", model_id))?;
        let config = self
            .ctx
            .stores
            .device_configs
            .list_device_configs(&self.ctx.simulation_id)
            .await?
            .into_iter()
            .find(|config| config.model_id == model_id)
            .unwrap_or_else(|| DeviceConfigRecord::defaults_for(&self.ctx.simulation_id, model_id));
        let profile = Arc::new(DeviceProfile::new(&model, &config, self.simulation_features));
        if let Ok(mut profiles) = self.profiles.write() {
            profiles.insert(model_id.to_string(), profile.clone());
        }
        Ok(profile)
    }

    /// 为模拟已持久化的设备启动 Agent，返回启动数量。
    pub async fn start(&self) -> Result<usize, SimulationError> {
        let _guard = self.allocation.lock().await;
        let devices = self.owned_devices().await?;
        let mut started = 0;
        for record in devices {
            let profile = match self.profile(&record.model_id).await {
                Ok(profile) => profile,
                Err(SimulationError::NotFound { .. }) => {
                    warn!(
                        target: "starling.simulation",
                        simulation_id = %self.ctx.simulation_id,
                        device_id = %record.device_id,
                        model_id = %record.model_id,
                        "device_model_missing"
                    );
                    continue;
                }
                Err(err) => return Err(err),
            };
            let initial = if record.credentials.is_some() {
                DeviceState::Registered
            } else {
                DeviceState::Unregistered
            };
            if !self
                .ctx
                .board
                .begin(&record.device_id, &record.model_id, initial)
            {
                continue;
            }
            self.spawn_agent(record.device_id, profile, record.credentials, None);
            started += 1;
        }
        info!(
            target: "starling.simulation",
            simulation_id = %self.ctx.simulation_id,
            devices = started,
            "simulation_runner_started"
        );
        Ok(started)
    }

    /// 分配 `count` 个新设备 ID 并为每个设备启动 Agent。
    pub async fn provision(&self, model_id: &str, count: usize) -> Result<Batch, SimulationError> {
        self.ensure_running()?;
        let profile = self.profile(model_id).await?;

        let _guard = self.allocation.lock().await;
        let prefix = device_id_prefix(&self.ctx.simulation_id, &self.ctx.target_id, model_id);
        let persisted = self
            .ctx
            .stores
            .target_devices
            .list_target_devices(&self.ctx.target_id)
            .await?;
        // 已终止的看板行不算占用，编号只由持久化记录与在途预留决定
        let reserved = self.ctx.board.in_flight_ids();
        let max_existing = max_device_suffix(
            &prefix,
            persisted
                .iter()
                .map(|record| record.device_id.as_str())
                .chain(reserved.iter().map(String::as_str)),
        );
        let mut device_ids = allocate_device_ids(&prefix, max_existing, count);

        let (tx, rx) = mpsc::unbounded_channel();
        device_ids.retain(|device_id| {
            if !self
                .ctx
                .board
                .begin(device_id, model_id, DeviceState::Unregistered)
            {
                warn!(
                    target: "starling.simulation",
                    simulation_id = %self.ctx.simulation_id,
                    device_id = %device_id,
                    "device_id_already_owned"
                );
                return false;
            }
            self.spawn_agent(device_id.clone(), profile.clone(), None, Some(tx.clone()));
            true
        });
        info!(
            target: "starling.simulation",
            simulation_id = %self.ctx.simulation_id,
            model_id = %model_id,
            count = count,
            first_device_id = device_ids.first().map(String::as_str).unwrap_or(""),
            "devices_provisioning"
        );
        Ok(Batch::new(device_ids, rx))
    }

    /// 删除模型下后缀最大的 `count` 个设备。
    pub async fn delete(&self, model_id: &str, count: usize) -> Result<Batch, SimulationError> {
        self.ensure_running()?;
        let _guard = self.allocation.lock().await;
        let prefix = device_id_prefix(&self.ctx.simulation_id, &self.ctx.target_id, model_id);
        let mut devices: Vec<(u32, TargetDeviceRecord)> = self
            .owned_devices()
            .await?
            .into_iter()
            .filter_map(|record| {
                parse_device_suffix(&prefix, &record.device_id).map(|suffix| (suffix, record))
            })
            .collect();
        devices.sort_by(|a, b| b.0.cmp(&a.0));
        let selected = devices
            .into_iter()
            .map(|(_, record)| record)
            .take(count)
            .collect();
        Ok(self.delete_records(selected).await)
    }

    /// 删除模拟拥有的全部设备。
    pub async fn delete_all(&self) -> Result<Batch, SimulationError> {
        self.ensure_running()?;
        let _guard = self.allocation.lock().await;
        let devices = self.owned_devices().await?;
        Ok(self.delete_records(devices).await)
    }

    /// 取消全部设备任务并等待它们退出。
    pub async fn stop(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        if let Ok(mut agents) = self.agents.lock() {
            agents.clear();
        }
        info!(
            target: "starling.simulation",
            simulation_id = %self.ctx.simulation_id,
            "simulation_runner_stopped"
        );
    }

    pub fn device_statuses(&self) -> Vec<DeviceStatus> {
        self.ctx.board.snapshot()
    }

    pub fn live_devices(&self) -> usize {
        self.ctx.board.live_count()
    }

    fn ensure_running(&self) -> Result<(), SimulationError> {
        if self.cancel.is_cancelled() {
            return Err(SimulationError::NotRunning(self.ctx.simulation_id.clone()));
        }
        Ok(())
    }

    /// 本模拟在目标上持久化的设备，排除正在删除的。
    async fn owned_devices(&self) -> Result<Vec<TargetDeviceRecord>, SimulationError> {
        let prefix = simulation_device_prefix(&self.ctx.simulation_id, &self.ctx.target_id);
        let devices = self
            .ctx
            .stores
            .target_devices
            .list_target_devices(&self.ctx.target_id)
            .await?;
        Ok(devices
            .into_iter()
            .filter(|record| record.device_id.starts_with(&prefix))
            .filter(|record| self.ctx.board.state(&record.device_id) != Some(DeviceState::Deleting))
            .collect())
    }

    fn spawn_agent(
        &self,
        device_id: String,
        profile: Arc<DeviceProfile>,
        credentials: Option<domain::DeviceCredentials>,
        reporter: Option<mpsc::UnboundedSender<DeviceOutcome>>,
    ) {
        let cancel = self.cancel.child_token();
        let agent = DeviceAgent::new(
            self.ctx.clone(),
            device_id.clone(),
            profile,
            credentials,
            cancel.clone(),
            reporter,
        );
        let join = self.tracker.spawn(agent.run());
        if let Ok(mut agents) = self.agents.lock() {
            agents.retain(|_, handle| !handle.join.is_finished());
            agents.insert(device_id, AgentHandle { cancel, join });
        }
    }

    /// 先停掉仍在运行的 Agent，再为每个设备独立发起删除。
    async fn delete_records(&self, records: Vec<TargetDeviceRecord>) -> Batch {
        let live: Vec<AgentHandle> = match self.agents.lock() {
            Ok(mut agents) => records
                .iter()
                .filter_map(|record| agents.remove(&record.device_id))
                .collect(),
            Err(_) => Vec::new(),
        };
        for handle in &live {
            handle.cancel.cancel();
        }
        for handle in live {
            if let Err(err) = handle.join.await {
                warn!(
                    target: "starling.simulation",
                    simulation_id = %self.ctx.simulation_id,
                    error = %err,
                    "device_agent_join_failed"
                );
            }
        }

        let device_ids = records
            .iter()
            .map(|record| record.device_id.clone())
            .collect();
        let (tx, rx) = mpsc::unbounded_channel();
        for record in records {
            let ctx = self.ctx.clone();
            let cancel = self.cancel.child_token();
            let tx = tx.clone();
            self.tracker.spawn(async move {
                let outcome = delete_device(ctx, record, cancel).await;
                let _ = tx.send(outcome.clone());
                outcome
            });
        }
        Batch::new(device_ids, rx)
    }
}
