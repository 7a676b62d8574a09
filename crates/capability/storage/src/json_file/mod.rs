//! JSON 文件存储实现模块
//!
//! 每类资源一个文件（`simulations.json`、`targets.json` 等），重启后数据保留。
//! 读操作只访问内存副本；写操作在表级写锁内落盘。

mod table;

pub mod device_config;
pub mod device_model;
pub mod simulation;
pub mod target;
pub mod target_device;

pub use device_config::*;
pub use device_model::*;
pub use simulation::*;
pub use target::*;
pub use target_device::*;
