//! Handlers 模块

pub mod device_configs;
pub mod metrics;
pub mod models;
pub mod simulations;
pub mod targets;

pub use device_configs::*;
pub use metrics::*;
pub use models::*;
pub use simulations::*;
pub use targets::*;
