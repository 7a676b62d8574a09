//! 验证辅助函数
//!
//! - ensure_id：验证实体 ID 非空且不含路径分隔符
//! - ensure_scope：验证记录归属与作用域一致（设备配置 → 模拟，目标设备 → 目标）

use crate::error::StorageError;

/// 验证实体 ID
pub fn ensure_id(kind: &str, id: &str) -> Result<(), StorageError> {
    if id.trim().is_empty() {
        return Err(StorageError::new(format!("{} id required", kind)));
    }
    if id.contains('/') {
        return Err(StorageError::new(format!("{} id must not contain '/'", kind)));
    }
    Ok(())
}

/// 验证作用域
pub fn ensure_scope(kind: &str, expected: &str, actual: &str) -> Result<(), StorageError> {
    if expected != actual {
        return Err(StorageError::new(format!(
            "{} scope mismatch: expected {}, got {}",
            kind, expected, actual
        )));
    }
    Ok(())
}
