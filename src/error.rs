//! 同步核心错误类型
//!
//! 这些错误只在模块内部流转，面向 UI 的操作会在边界处转换成日志 + 结果枚举。

use thiserror::Error;

/// 同步错误
#[derive(Error, Debug)]
pub enum SyncError {
    /// 服务端限流（HTTP 429）
    #[error("Rate limited by server")]
    Throttled,

    /// 缺少或无效的会话凭证
    #[error("Unauthorized")]
    Unauthorized,

    /// 其它非 2xx 响应
    #[error("Unexpected HTTP status: {0}")]
    Status(u16),

    /// HTTP 传输错误
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket 错误
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// 无效的接口地址
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// 无效的请求头（token 含非法字符等）
    #[error("Invalid header value: {0}")]
    InvalidHeader(String),

    /// JSON 序列化错误
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// 是否为限流错误
    pub fn is_throttled(&self) -> bool {
        matches!(self, SyncError::Throttled)
    }
}

/// 同步结果类型
pub type SyncResult<T> = Result<T, SyncError>;
