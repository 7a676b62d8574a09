//! 目标平台的连接参数与设备凭据。

use serde::{Deserialize, Serialize};

/// 目标平台端点：注册服务 + 数据面。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetEndpoints {
    pub provisioning_endpoint: String,
    pub data_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_access_key: Option<String>,
}

/// 注册成功后分配给设备的连接凭据。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCredentials {
    pub device_id: String,
    /// 设备应连接的数据面地址。
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}
