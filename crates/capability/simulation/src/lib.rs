//! # Starling Simulation 模块
//!
//! 模拟控制与设备集群引擎。
//!
//! ## 分层
//!
//! 1. **Controller** (`controller.rs`)：模拟生命周期，按模拟 ID 登记 Runner
//! 2. **SimulationRunner** (`runner.rs`)：单个模拟的任务组、闸门、取消令牌与状态看板
//! 3. **DeviceAgent** (`agent.rs`)：单设备状态机，注册 → 连接 → 收发循环 → 断开
//! 4. **RetryPolicy** (`retry.rs`)：带超时、退避与取消的有界重试
//! 5. **ConcurrencyGate** (`gate.rs`)：按操作类型的并发准入
//! 6. **DataGenerator** (`data_generator.rs`)：按能力模型合成载荷
//!
//! ## 取消
//!
//! Controller 持有进程级令牌，每个 Runner 持有其子令牌，每个设备任务再持有 Runner
//! 的子令牌。`SimulationRunner::stop` 在全部设备任务退出后才返回。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let controller = Controller::new(stores, protocol, settings);
//! controller.start_simulation("sim-1").await?;
//! let batch = controller.provision_devices("sim-1", "thermostat", 100).await?;
//! let report = batch.report().await;
//! controller.shutdown().await;
//! ```

pub mod agent;
pub mod controller;
pub mod data_generator;
pub mod error;
pub mod gate;
pub mod retry;
pub mod runner;
pub mod status;

pub use agent::{DeviceOutcome, DeviceProfile};
pub use controller::Controller;
pub use data_generator::{DataGenerator, TELEMETRY_CONTENT_TYPE};
pub use error::{DeviceError, SimulationError};
pub use gate::{ConcurrencyGate, ConcurrencyGates, GateError, GateToken};
pub use retry::RetryPolicy;
pub use runner::{Batch, BatchReport, SimulationRunner};
pub use status::{DeviceState, DeviceStatus, StatusBoard};
