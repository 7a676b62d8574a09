//! 按能力模型合成遥测、reported 属性与应答载荷。
//!
//! 生成器属于单个设备；除地理坐标游标外没有其它状态。

use chrono::{DateTime, SecondsFormat, Utc};
use domain::{CapabilityModel, GeoPoint, PayloadMap, PayloadValue, SchemaKind, TelemetryMessage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{Value, json};
use starling_protocol::{CommandAck, DesiredPropertiesUpdate, DeviceCommand, TwinPatch};
use std::sync::Arc;

pub const TELEMETRY_CONTENT_TYPE: &str = "application/json";

const STRING_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzACBDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const STRING_LENGTH: usize = 10;

/// 华盛顿州 Redmond 附近的一条闭合路线。
const GEO_ROUTE: [(f64, f64); 21] = [
    (47.645804, -122.132337),
    (47.644799, -122.132291),
    (47.643975, -122.132302),
    (47.642746, -122.132366),
    (47.641264, -122.132409),
    (47.639768, -122.132430),
    (47.637844, -122.132393),
    (47.635111, -122.132479),
    (47.633202, -122.132382),
    (47.633354, -122.131191),
    (47.634540, -122.129163),
    (47.636325, -122.126081),
    (47.638046, -122.123120),
    (47.641111, -122.119204),
    (47.644017, -122.115642),
    (47.645990, -122.114258),
    (47.646069, -122.117938),
    (47.646069, -122.120921),
    (47.646105, -122.125888),
    (47.646047, -122.129568),
    (47.646069, -122.132164),
];

/// 单设备数据合成器。
pub struct DataGenerator {
    model: Arc<CapabilityModel>,
    next_geo_point: usize,
    rng: StdRng,
}

impl DataGenerator {
    pub fn new(model: Arc<CapabilityModel>) -> Self {
        Self {
            model,
            next_geo_point: 0,
            rng: StdRng::from_entropy(),
        }
    }

    /// 固定种子，便于复现。
    pub fn with_seed(model: Arc<CapabilityModel>, seed: u64) -> Self {
        Self {
            model,
            next_geo_point: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// 覆盖全部组件遥测字段的一条消息。
    pub fn telemetry_message(&mut self, device_id: &str, created_at: DateTime<Utc>) -> TelemetryMessage {
        let model = self.model.clone();
        let mut body = PayloadMap::new();
        let mut data_point_count = 0;
        for field in model.telemetry_fields() {
            let value = self.value_for(field.schema);
            body.insert(field.name.clone(), value);
            data_point_count += 1;
        }
        TelemetryMessage {
            device_id: device_id.to_string(),
            body,
            correlation_id: uuid::Uuid::new_v4().to_string(),
            message_id: uuid::Uuid::new_v4().to_string(),
            created_at,
            data_point_count,
            content_type: TELEMETRY_CONTENT_TYPE,
        }
    }

    /// 设备自有（不可写）属性的快照。
    pub fn reported_properties(&mut self) -> PayloadMap {
        let model = self.model.clone();
        let mut reported = PayloadMap::new();
        for field in model.reported_fields() {
            let value = self.value_for(field.schema);
            reported.insert(field.name.clone(), value);
        }
        reported
    }

    /// 对 desired 更新的 reported 应答。
    ///
    /// 普通键包装为 `{value, ac, ad, av}`；带 `__t` 标记的对象是组件，
    /// 内部每个键各自包装，外层写回 `__t: "c"`。`$version` 不回显。
    pub fn twin_update_ack(&self, update: &DesiredPropertiesUpdate) -> TwinPatch {
        let version = update.version().unwrap_or(0);
        let mut reported = TwinPatch::new();
        for (key, value) in &update.properties {
            if key == "$version" {
                continue;
            }
            let ack = match value {
                Value::Object(inner) if inner.contains_key("__t") => {
                    let mut component = TwinPatch::new();
                    component.insert("__t".to_string(), json!("c"));
                    for (inner_key, inner_value) in inner {
                        if inner_key == "__t" {
                            continue;
                        }
                        component.insert(inner_key.clone(), ack_entry(inner_value, version));
                    }
                    Value::Object(component)
                }
                _ => ack_entry(value, version),
            };
            reported.insert(key.clone(), ack);
        }
        reported
    }

    /// 命令应答：状态 200、空载荷、回显 request id。
    // TODO: 按能力模型中的命令定义生成响应载荷（模型目前不声明命令 schema）。
    pub fn command_ack(&self, command: &DeviceCommand) -> CommandAck {
        CommandAck {
            request_id: command.request_id.clone(),
            status: 200,
            payload: json!({}),
        }
    }

    fn value_for(&mut self, schema: SchemaKind) -> PayloadValue {
        match schema {
            SchemaKind::Boolean => PayloadValue::Boolean(self.rng.gen_bool(0.5)),
            SchemaKind::Integer => PayloadValue::Integer(self.rng.gen_range(0..100)),
            SchemaKind::Long => PayloadValue::Long(self.rng.gen_range(0..1000)),
            SchemaKind::Float => PayloadValue::Float(self.rng.gen_range(0.0..100.0)),
            SchemaKind::Double => PayloadValue::Double(self.rng.gen_range(0.0..100.0)),
            SchemaKind::String => PayloadValue::String(self.random_string(STRING_LENGTH)),
            SchemaKind::Date => PayloadValue::Date(Utc::now().format("%Y-%m-%d").to_string()),
            SchemaKind::DateTime => PayloadValue::DateTime(rfc3339_now()),
            SchemaKind::Time => PayloadValue::Time(rfc3339_now()),
            SchemaKind::Duration => PayloadValue::Duration(format!(
                "P0Y0M0DT{}H{}M{}S",
                self.rng.gen_range(0..12),
                self.rng.gen_range(0..60),
                self.rng.gen_range(0..60)
            )),
            SchemaKind::GeoPoint => PayloadValue::GeoPoint(self.next_geo_point()),
        }
    }

    /// 游标先前进再取点，首个点为路线第二个坐标。
    fn next_geo_point(&mut self) -> GeoPoint {
        self.next_geo_point = (self.next_geo_point + 1) % GEO_ROUTE.len();
        let (lat, lon) = GEO_ROUTE[self.next_geo_point];
        GeoPoint { lat, lon, alt: 0.0 }
    }

    fn random_string(&mut self, length: usize) -> String {
        (0..length)
            .map(|_| STRING_CHARSET[self.rng.gen_range(0..STRING_CHARSET.len())] as char)
            .collect()
    }
}

fn ack_entry(value: &Value, version: i64) -> Value {
    json!({
        "value": value,
        "ac": 200,
        "ad": "completed",
        "av": version,
    })
}

fn rfc3339_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
