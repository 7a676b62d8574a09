//! 输入验证辅助函数
//!
//! 提供统一的输入验证函数：
//! - normalize_required：验证必填字段，去除空格并检查非空
//! - normalize_optional：验证可选字段，如果提供则去除空格并检查非空
//! - parse_device_count：解析路径中的设备数量
//!
//! 失败返回 bad_request_error 响应

use crate::utils::response::bad_request_error;
use axum::response::Response;

/// 单次批量操作的设备数上限。
pub const MAX_BATCH_DEVICES: usize = 100_000;

/// 验证必填字段，去除空格并检查非空
pub fn normalize_required(value: String, field: &str) -> Result<String, Response> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(bad_request_error(format!("{field} required")));
    }
    Ok(trimmed.to_string())
}

/// 验证可选字段，如果提供则去除空格并检查非空
pub fn normalize_optional(value: Option<String>, field: &str) -> Result<Option<String>, Response> {
    match value {
        Some(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Err(bad_request_error(format!("{field} required")));
            }
            Ok(Some(trimmed.to_string()))
        }
        None => Ok(None),
    }
}

/// 确定资源 ID：路径中的 ID 优先，请求体中的 ID 须与之一致；集合级请求只取请求体
pub fn resolve_id(
    path_id: Option<&str>,
    body_id: Option<String>,
    field: &str,
) -> Result<String, Response> {
    let body_id = normalize_optional(body_id, field)?;
    match (path_id, body_id) {
        (Some(path_id), Some(body_id)) if body_id != path_id => Err(bad_request_error(format!(
            "{field} {body_id} does not match path {path_id}"
        ))),
        (Some(path_id), _) => Ok(path_id.to_string()),
        (None, Some(body_id)) => Ok(body_id),
        (None, None) => Err(bad_request_error(format!("{field} required"))),
    }
}

/// 解析设备数量：正整数且不超过上限
pub fn parse_device_count(value: &str) -> Result<usize, Response> {
    match value.trim().parse::<usize>() {
        Ok(0) => Err(bad_request_error("numDevices must be positive")),
        Ok(count) if count > MAX_BATCH_DEVICES => Err(bad_request_error(format!(
            "numDevices must not exceed {MAX_BATCH_DEVICES}"
        ))),
        Ok(count) => Ok(count),
        Err(_) => Err(bad_request_error("numDevices must be a number")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn device_count_rejects_zero_and_garbage() {
        assert_eq!(parse_device_count("25").ok(), Some(25));
        for bad in ["0", "-1", "ten", "100001"] {
            let response = parse_device_count(bad).expect_err(bad);
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn required_fields_are_trimmed() {
        assert_eq!(
            normalize_required("  hub ".to_string(), "targetId").ok(),
            Some("hub".to_string())
        );
        assert!(normalize_required("   ".to_string(), "targetId").is_err());
        assert_eq!(normalize_optional(None, "name").ok(), Some(None));
    }

    #[test]
    fn ids_come_from_path_or_body() {
        assert_eq!(resolve_id(Some("sim1"), None, "id").ok(), Some("sim1".to_string()));
        assert_eq!(
            resolve_id(Some("sim1"), Some(" sim1 ".to_string()), "id").ok(),
            Some("sim1".to_string())
        );
        assert_eq!(
            resolve_id(None, Some("sim2".to_string()), "id").ok(),
            Some("sim2".to_string())
        );
        let response = resolve_id(Some("sim1"), Some("sim2".to_string()), "id").expect_err("mismatch");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(resolve_id(None, None, "id").is_err());
    }
}
