//! 设备能力模型（Capability Model）。
//!
//! 一个模型由有序的 Component 组成，每个 Component 声明若干遥测字段与属性字段。
//! 字段的 schema 决定数据合成规则。

use serde::{Deserialize, Serialize};

/// 字段的数据模式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaKind {
    Boolean,
    Date,
    #[serde(alias = "dateTime")]
    DateTime,
    Double,
    Duration,
    Float,
    #[serde(alias = "geoPoint")]
    GeoPoint,
    Integer,
    Long,
    String,
    Time,
}

impl SchemaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaKind::Boolean => "boolean",
            SchemaKind::Date => "date",
            SchemaKind::DateTime => "datetime",
            SchemaKind::Double => "double",
            SchemaKind::Duration => "duration",
            SchemaKind::Float => "float",
            SchemaKind::GeoPoint => "geopoint",
            SchemaKind::Integer => "integer",
            SchemaKind::Long => "long",
            SchemaKind::String => "string",
            SchemaKind::Time => "time",
        }
    }
}

/// 遥测字段。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryField {
    pub name: String,
    pub schema: SchemaKind,
}

/// 属性字段；`writable = false` 表示设备自有（上报）属性。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyField {
    pub name: String,
    pub schema: SchemaKind,
    #[serde(default)]
    pub writable: bool,
}

/// 能力模型中的组件。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    #[serde(alias = "componentName")]
    pub name: String,
    #[serde(default)]
    pub telemetry: Vec<TelemetryField>,
    #[serde(default)]
    pub properties: Vec<PropertyField>,
}

/// 能力模型。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityModel {
    #[serde(default)]
    pub components: Vec<Component>,
}

impl CapabilityModel {
    /// 按组件顺序展开的全部遥测字段。
    pub fn telemetry_fields(&self) -> impl Iterator<Item = &TelemetryField> {
        self.components
            .iter()
            .flat_map(|component| component.telemetry.iter())
    }

    /// 设备自有（不可写）属性字段。
    pub fn reported_fields(&self) -> impl Iterator<Item = &PropertyField> {
        self.components
            .iter()
            .flat_map(|component| component.properties.iter())
            .filter(|prop| !prop.writable)
    }

    pub fn telemetry_count(&self) -> usize {
        self.telemetry_fields().count()
    }

    /// 校验字段名非空。
    pub fn validate(&self) -> Result<(), String> {
        for component in &self.components {
            if let Some(field) = component.telemetry.iter().find(|f| f.name.trim().is_empty()) {
                return Err(format!(
                    "component {} has telemetry field with empty name ({})",
                    component.name,
                    field.schema.as_str()
                ));
            }
            if let Some(prop) = component.properties.iter().find(|p| p.name.trim().is_empty()) {
                return Err(format!(
                    "component {} has property with empty name ({})",
                    component.name,
                    prop.schema.as_str()
                ));
            }
        }
        Ok(())
    }
}
