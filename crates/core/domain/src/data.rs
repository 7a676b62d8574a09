use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// 地理坐标点。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
}

/// 合成的字段值，每种 schema 对应一个变体。
///
/// 序列化为不带标签的普通 JSON 值。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PayloadValue {
    Boolean(bool),
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Date(String),
    DateTime(String),
    Time(String),
    Duration(String),
    GeoPoint(GeoPoint),
}

impl PayloadValue {
    pub fn schema(&self) -> crate::SchemaKind {
        use crate::SchemaKind;
        match self {
            PayloadValue::Boolean(_) => SchemaKind::Boolean,
            PayloadValue::Integer(_) => SchemaKind::Integer,
            PayloadValue::Long(_) => SchemaKind::Long,
            PayloadValue::Float(_) => SchemaKind::Float,
            PayloadValue::Double(_) => SchemaKind::Double,
            PayloadValue::String(_) => SchemaKind::String,
            PayloadValue::Date(_) => SchemaKind::Date,
            PayloadValue::DateTime(_) => SchemaKind::DateTime,
            PayloadValue::Time(_) => SchemaKind::Time,
            PayloadValue::Duration(_) => SchemaKind::Duration,
            PayloadValue::GeoPoint(_) => SchemaKind::GeoPoint,
        }
    }
}

/// 字段名 → 合成值。
pub type PayloadMap = BTreeMap<String, PayloadValue>;

/// 转换为 JSON 对象（孪生上报等需要动态 JSON 的场景）。
pub fn payload_to_json(payload: &PayloadMap) -> serde_json::Map<String, serde_json::Value> {
    payload
        .iter()
        .map(|(name, value)| {
            let json = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
            (name.clone(), json)
        })
        .collect()
}

/// 一条出站遥测消息（发送后不保留）。
#[derive(Debug, Clone)]
pub struct TelemetryMessage {
    pub device_id: String,
    pub body: PayloadMap,
    pub correlation_id: String,
    pub message_id: String,
    pub created_at: DateTime<Utc>,
    pub data_point_count: usize,
    pub content_type: &'static str,
}

impl TelemetryMessage {
    /// 消息体的 JSON 编码。
    pub fn body_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_values_serialize_without_tags() {
        let mut payload = PayloadMap::new();
        payload.insert("on".to_string(), PayloadValue::Boolean(true));
        payload.insert("count".to_string(), PayloadValue::Integer(7));
        payload.insert(
            "loc".to_string(),
            PayloadValue::GeoPoint(GeoPoint {
                lat: 1.5,
                lon: -2.5,
                alt: 0.0,
            }),
        );
        let json = serde_json::Value::Object(payload_to_json(&payload));
        assert_eq!(
            json,
            serde_json::json!({"on": true, "count": 7, "loc": {"lat": 1.5, "lon": -2.5, "alt": 0.0}})
        );
    }
}
