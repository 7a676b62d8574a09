//! Starling 管理 API 服务。
//!
//! 启动顺序：加载 .env → 读取配置 → 初始化日志 → 构建存储（设置 STARLING_DATA_DIR 时为文件存储）、协议与 Controller →
//! 复位残留的模拟状态 → 提供 HTTP 服务。Ctrl-C 后先停止接收请求，
//! 再等待 Controller 停止全部模拟后退出。

mod handlers;
mod middleware;
mod routes;
mod utils;

use starling_config::{AppConfig, ProtocolKind};
use starling_protocol::{DeviceProtocol, LoopbackProtocol, MqttProtocol, MqttProtocolConfig};
use starling_simulation::Controller;
use starling_storage::Stores;
use starling_telemetry::init_tracing;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// 所有 handler 共享的状态。
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<Controller>,
    pub stores: Stores,
}

impl AppState {
    pub fn new(controller: Arc<Controller>) -> Self {
        let stores = controller.stores().clone();
        Self { controller, stores }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 从环境变量加载运行配置
    let config = AppConfig::from_env()?;
    // 初始化结构化日志
    init_tracing();

    let protocol: Arc<dyn DeviceProtocol> = match config.protocol {
        ProtocolKind::Loopback => Arc::new(LoopbackProtocol::new()),
        ProtocolKind::Mqtt => Arc::new(MqttProtocol::new(MqttProtocolConfig {
            topic_prefix: config.mqtt_topic_prefix.clone(),
            keep_alive: Duration::from_secs(config.mqtt_keep_alive_seconds),
        })),
    };
    let stores = match &config.data_dir {
        Some(dir) => {
            info!(target: "starling.api", data_dir = %dir.display(), "storage_opened");
            Stores::open_dir(dir).await?
        }
        None => Stores::in_memory(),
    };
    let controller = Arc::new(Controller::new(
        stores,
        protocol,
        config.simulation_defaults.clone(),
    ));
    let reset = controller.reset_simulation_status().await?;
    if reset > 0 {
        info!(target: "starling.api", simulations = reset, "simulation_status_reset");
    }

    let app = routes::create_app(AppState::new(controller.clone()));
    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!(
        target: "starling.api",
        addr = %config.http_addr,
        protocol = ?config.protocol,
        "http_server_started"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    controller.shutdown().await;
    info!(target: "starling.api", "http_server_stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(target: "starling.api", error = %err, "shutdown_signal_failed");
        std::future::pending::<()>().await;
    }
}
