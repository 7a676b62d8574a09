//! MQTT 数据面实现
//!
//! 每个模拟设备一条独立的 MQTT 连接（client id = deviceId）。
//! 注册阶段不访问网络：凭据由 Target 的数据面地址与共享密钥派生。

use crate::error::ProtocolError;
use crate::types::{
    CommandAck, DesiredPropertiesUpdate, DeviceCommand, DeviceSession, InboundEvent, TwinPatch,
};
use crate::{DeviceConnection, DeviceProtocol};
use async_trait::async_trait;
use domain::{DeviceCredentials, TargetEndpoints, TelemetryMessage};
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const DEFAULT_MQTT_PORT: u16 = 1883;
const CLIENT_CHANNEL_CAPACITY: usize = 10;
const EVENT_CHANNEL_CAPACITY: usize = 32;
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

/// MQTT 协议配置。
#[derive(Debug, Clone)]
pub struct MqttProtocolConfig {
    pub topic_prefix: String,
    pub keep_alive: Duration,
}

impl Default for MqttProtocolConfig {
    fn default() -> Self {
        Self {
            topic_prefix: "starling".to_string(),
            keep_alive: Duration::from_secs(30),
        }
    }
}

/// MQTT 协议实现。
#[derive(Debug, Clone)]
pub struct MqttProtocol {
    config: MqttProtocolConfig,
}

impl MqttProtocol {
    pub fn new(config: MqttProtocolConfig) -> Self {
        Self { config }
    }

    fn prefix(&self) -> &str {
        self.config.topic_prefix.trim_end_matches('/')
    }
}

#[async_trait]
impl DeviceProtocol for MqttProtocol {
    async fn register(
        &self,
        target: &TargetEndpoints,
        device_id: &str,
        _model_id: &str,
    ) -> Result<DeviceCredentials, ProtocolError> {
        // 提前校验地址，格式错误属于永久失败
        parse_endpoint(&target.data_endpoint)?;
        Ok(DeviceCredentials {
            device_id: device_id.to_string(),
            endpoint: target.data_endpoint.clone(),
            secret: target.shared_access_key.clone(),
        })
    }

    async fn connect(
        &self,
        _target: &TargetEndpoints,
        credentials: &DeviceCredentials,
    ) -> Result<DeviceSession, ProtocolError> {
        let (host, port) = parse_endpoint(&credentials.endpoint)?;
        let device_id = credentials.device_id.clone();
        let mut options = MqttOptions::new(device_id.clone(), host, port);
        options.set_keep_alive(self.config.keep_alive.max(Duration::from_secs(5)));
        if let Some(secret) = credentials.secret.clone() {
            options.set_credentials(device_id.clone(), secret);
        }
        let (client, mut eventloop) = AsyncClient::new(options, CLIENT_CHANNEL_CAPACITY);

        let device_prefix = format!("{}/{}", self.prefix(), device_id);
        client
            .subscribe(format!("{}/desired", device_prefix), QoS::AtLeastOnce)
            .await
            .map_err(|err| ProtocolError::Connection(err.to_string()))?;
        client
            .subscribe(format!("{}/commands/+", device_prefix), QoS::AtLeastOnce)
            .await
            .map_err(|err| ProtocolError::Connection(err.to_string()))?;

        wait_for_connack(&mut eventloop).await?;
        info!(
            target: "starling.protocol",
            device_id = %device_id,
            endpoint = %credentials.endpoint,
            "mqtt_connected"
        );

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let forwarder = tokio::spawn(forward_events(eventloop, device_prefix.clone(), tx));
        Ok(DeviceSession {
            connection: Box::new(MqttConnection {
                client,
                device_prefix,
                forwarder: Some(forwarder),
            }),
            events: rx,
        })
    }

    async fn delete(&self, _target: &TargetEndpoints, device_id: &str) -> Result<(), ProtocolError> {
        // MQTT 数据面没有设备注册表
        debug!(target: "starling.protocol", device_id = %device_id, "mqtt_delete_noop");
        Ok(())
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), ProtocolError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return match ack.code {
                    ConnectReturnCode::Success => Ok(()),
                    code => Err(ProtocolError::Rejected(format!("{:?}", code))),
                };
            }
            Ok(_) => continue,
            Err(rumqttc::ConnectionError::ConnectionRefused(code)) => {
                return Err(ProtocolError::Rejected(format!("{:?}", code)));
            }
            Err(err) => return Err(ProtocolError::Connection(err.to_string())),
        }
    }
}

/// 持续驱动事件循环，把 desired/命令推送转发给设备。
///
/// 连接出错或接收端被丢弃时退出；退出即关闭入站通道。
async fn forward_events(
    mut eventloop: EventLoop,
    device_prefix: String,
    tx: mpsc::Sender<InboundEvent>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let event = match parse_inbound(&device_prefix, &publish.topic, &publish.payload) {
                    Ok(Some(event)) => event,
                    Ok(None) => continue,
                    Err(err) => {
                        warn!(
                            target: "starling.protocol",
                            topic = %publish.topic,
                            error = %err,
                            "mqtt_inbound_invalid"
                        );
                        continue;
                    }
                };
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            Ok(Event::Outgoing(rumqttc::Outgoing::Disconnect)) => return,
            Ok(_) => {}
            Err(err) => {
                warn!(
                    target: "starling.protocol",
                    topic_prefix = %device_prefix,
                    error = %err,
                    "mqtt_connection_lost"
                );
                return;
            }
        }
    }
}

#[derive(serde::Deserialize)]
struct CommandEnvelope {
    #[serde(default)]
    name: String,
    #[serde(default)]
    payload: serde_json::Value,
}

/// 解析入站 topic；不属于该设备的 topic 返回 Ok(None)。
fn parse_inbound(
    device_prefix: &str,
    topic: &str,
    payload: &[u8],
) -> Result<Option<InboundEvent>, ProtocolError> {
    let Some(rest) = topic
        .strip_prefix(device_prefix)
        .and_then(|rest| rest.strip_prefix('/'))
    else {
        return Ok(None);
    };
    if rest == "desired" {
        let properties: TwinPatch = serde_json::from_slice(payload)?;
        return Ok(Some(InboundEvent::DesiredProperties(
            DesiredPropertiesUpdate::new(properties),
        )));
    }
    if let Some(request_id) = rest.strip_prefix("commands/") {
        if request_id.is_empty() || request_id.contains('/') {
            return Ok(None);
        }
        let envelope: CommandEnvelope = if payload.is_empty() {
            CommandEnvelope {
                name: String::new(),
                payload: serde_json::Value::Null,
            }
        } else {
            serde_json::from_slice(payload)?
        };
        return Ok(Some(InboundEvent::Command(DeviceCommand {
            request_id: request_id.to_string(),
            name: envelope.name,
            payload: envelope.payload,
        })));
    }
    Ok(None)
}

/// 解析 `host:port`，允许 `mqtt://` / `tcp://` 前缀，缺省端口 1883。
pub(crate) fn parse_endpoint(endpoint: &str) -> Result<(String, u16), ProtocolError> {
    let trimmed = endpoint.trim();
    let address = trimmed
        .strip_prefix("mqtt://")
        .or_else(|| trimmed.strip_prefix("tcp://"))
        .unwrap_or(trimmed)
        .trim_end_matches('/');
    if address.is_empty() {
        return Err(ProtocolError::InvalidConfig(format!(
            "empty mqtt endpoint: {:?}",
            endpoint
        )));
    }
    match address.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            let port = port
                .parse::<u16>()
                .map_err(|_| ProtocolError::InvalidConfig(format!("invalid port: {}", endpoint)))?;
            Ok((host.to_string(), port))
        }
        Some(_) => Err(ProtocolError::InvalidConfig(format!(
            "missing host: {}",
            endpoint
        ))),
        None => Ok((address.to_string(), DEFAULT_MQTT_PORT)),
    }
}

struct MqttConnection {
    client: AsyncClient,
    device_prefix: String,
    forwarder: Option<JoinHandle<()>>,
}

impl MqttConnection {
    async fn publish(&self, suffix: &str, payload: Vec<u8>) -> Result<(), ProtocolError> {
        if self.forwarder.as_ref().is_none_or(|task| task.is_finished()) {
            return Err(ProtocolError::ChannelClosed);
        }
        let topic = format!("{}/{}", self.device_prefix, suffix);
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|err| ProtocolError::Connection(err.to_string()))
    }
}

#[async_trait]
impl DeviceConnection for MqttConnection {
    async fn send_telemetry(&mut self, message: &TelemetryMessage) -> Result<(), ProtocolError> {
        let payload = message.body_bytes()?;
        self.publish("telemetry", payload).await
    }

    async fn send_reported_properties(&mut self, patch: &TwinPatch) -> Result<(), ProtocolError> {
        let payload = serde_json::to_vec(patch)?;
        self.publish("reported", payload).await
    }

    async fn send_command_ack(&mut self, ack: &CommandAck) -> Result<(), ProtocolError> {
        let payload = serde_json::to_vec(ack)?;
        self.publish(&format!("commands/{}/ack", ack.request_id), payload)
            .await
    }

    async fn disconnect(&mut self) -> Result<(), ProtocolError> {
        let Some(mut forwarder) = self.forwarder.take() else {
            return Ok(());
        };
        let result = self
            .client
            .disconnect()
            .await
            .map_err(|err| ProtocolError::Connection(err.to_string()));
        if tokio::time::timeout(DISCONNECT_GRACE, &mut forwarder)
            .await
            .is_err()
        {
            forwarder.abort();
        }
        result
    }
}

impl Drop for MqttConnection {
    fn drop(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }
}
