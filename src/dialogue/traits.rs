//! 对话服务抽象与请求/响应载荷
//!
//! 远端调用一律返回 Result<_, ServiceError>，由 RetryPolicy 消费，不依赖异常式控制流。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::ServiceError;
use crate::scenario::{PersonaProfile, ScenarioDescriptor};

/// POST /session 请求体
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub scenario_id: String,
    pub persona_id: String,
    pub locale: String,
    pub allow_auto_end: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario: Option<ScenarioDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona: Option<PersonaProfile>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreated {
    pub session_id: String,
}

/// POST /session/{sessionId}/turns 请求体
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    pub allow_auto_end: bool,
}

/// 一轮回复；兼容旧字段名 npcReply / conversationCompleteReason
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnReply {
    #[serde(alias = "npcReply")]
    pub reply: String,
    #[serde(default)]
    pub conversation_complete: bool,
    #[serde(default, alias = "conversationCompleteReason")]
    pub completion_reason: Option<String>,
}

impl TurnReply {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            conversation_complete: false,
            completion_reason: None,
        }
    }

    pub fn completing(reply: impl Into<String>, reason: Option<&str>) -> Self {
        Self {
            reply: reply.into(),
            conversation_complete: true,
            completion_reason: reason.map(String::from),
        }
    }
}

/// 对话服务 trait：建立会话与提交一轮
#[async_trait]
pub trait DialogueService: Send + Sync {
    async fn create_session(&self, request: &SessionRequest) -> Result<SessionCreated, ServiceError>;

    async fn send_turn(&self, session_id: &str, request: &TurnRequest) -> Result<TurnReply, ServiceError>;
}
