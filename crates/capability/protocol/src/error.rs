//! 协议错误类型定义

/// 协议通信错误
///
/// 分为可重试（瞬时）与不可重试（永久）两类，见 [`ProtocolError::is_transient`]。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// 连接被拒绝或中断
    #[error("connection error: {0}")]
    Connection(String),

    /// 超时错误
    #[error("timeout: {0}")]
    Timeout(String),

    /// 平台限流
    #[error("throttled: {0}")]
    Throttled(String),

    /// 通道关闭
    #[error("channel closed")]
    ChannelClosed,

    /// 平台拒绝（凭据无效等）
    #[error("rejected: {0}")]
    Rejected(String),

    /// 配置错误（端点格式等）
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// 平台上不存在该设备
    #[error("not found: {0}")]
    NotFound(String),

    /// 消息编码失败
    #[error("encode error: {0}")]
    Encode(String),
}

impl ProtocolError {
    /// 是否值得重试。
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProtocolError::Connection(_)
                | ProtocolError::Timeout(_)
                | ProtocolError::Throttled(_)
                | ProtocolError::ChannelClosed
        )
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::Encode(err.to_string())
    }
}
