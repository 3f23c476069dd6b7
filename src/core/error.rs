//! 错误类型与失败分类
//!
//! 与 RetryPolicy 配合：远端调用返回 ServiceError，按 FailureKind 决定立即重试 / 延迟重试 / 重建会话 / 放弃。

use thiserror::Error;

/// 远端对话服务调用失败（建立会话或提交一轮）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// HTTP 429
    #[error("Rate limited by dialogue service")]
    RateLimited,

    /// 5xx
    #[error("Dialogue service error (status {status})")]
    Server { status: u16 },

    /// 其它非 2xx（如 400 / 404）
    #[error("Request rejected (status {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed response: {0}")]
    Decode(String),
}

/// 失败分类：RetryPolicy 的输入
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RateLimited,
    ServerError,
    Unknown,
}

impl ServiceError {
    /// 按状态码分类；超时与连接失败视为服务端瞬时故障
    pub fn kind(&self) -> FailureKind {
        match self {
            ServiceError::RateLimited => FailureKind::RateLimited,
            ServiceError::Server { .. } | ServiceError::Timeout | ServiceError::Transport(_) => {
                FailureKind::ServerError
            }
            ServiceError::Rejected { .. } | ServiceError::Decode(_) => FailureKind::Unknown,
        }
    }

    /// 由非 2xx 状态码构造
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        match status {
            429 => ServiceError::RateLimited,
            s if s >= 500 => ServiceError::Server { status: s },
            s => ServiceError::Rejected {
                status: s,
                body: body.into(),
            },
        }
    }
}

/// 编排器对视图层暴露的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    /// 输入为空（trim 后），不会触达网络
    #[error("Message is empty")]
    Validation,

    #[error("Conversation orchestrator has stopped")]
    Closed,
}
