//! 状态定义：Turn / PendingTurn / ConversationSnapshot 与视图投影 ConversationView
//!
//! 视图层只持有轻量的 ConversationView；完整状态由状态机维护，每次迁移后写成 ConversationSnapshot。

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 会话键：同一 (场景, 角色) 同一时刻只有一个活动对话
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    pub scenario_id: String,
    pub persona_id: String,
}

impl ConversationKey {
    pub fn new(scenario_id: impl Into<String>, persona_id: impl Into<String>) -> Self {
        Self {
            scenario_id: scenario_id.into(),
            persona_id: persona_id.into(),
        }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scenario_id, self.persona_id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

/// 单条对话；追加后不可变
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn agent(content: impl Into<String>) -> Self {
        Self {
            role: Role::Agent,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// PendingTurn 所处阶段：Queued（等会话 Ready）→ Sent → RetryScheduled / EstablishScheduled → ...
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingPhase {
    #[default]
    Queued,
    Sent,
    /// 限流退避中，到期后重发
    RetryScheduled,
    /// 等待重建会话的退避到期
    EstablishScheduled,
}

/// 已接受但尚未得到 Agent 回复的轮次；任意时刻至多一个
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTurn {
    pub content: String,
    pub retry_count: u32,
    #[serde(default)]
    pub phase: PendingPhase,
}

impl PendingTurn {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            retry_count: 0,
            phase: PendingPhase::Queued,
        }
    }
}

/// 会话状态：Uninitialized → Establishing → Ready，Establishing → Failed，Failed → Establishing（仅当有待发轮次）
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Uninitialized,
    Establishing,
    Ready,
    Failed,
}

/// 可序列化的编排器状态，视图销毁重建后由此恢复
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSnapshot {
    pub session_id: Option<String>,
    pub history: Vec<Turn>,
    pub conversation_complete: bool,
    #[serde(default)]
    pub completion_reason: Option<String>,
    pub session_ready: bool,
    /// 旧快照没有此字段，按 session_ready 推断
    #[serde(default)]
    pub session_status: SessionStatus,
    pub loading: bool,
    pub pending_turn: Option<PendingTurn>,
    pub pending_retry_count: u32,
}

/// 视图看到的只读投影
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ConversationView {
    pub history: Vec<Turn>,
    pub loading: bool,
    pub session_ready: bool,
    pub session_status: SessionStatus,
    pub conversation_complete: bool,
    pub completion_reason: Option<String>,
    /// 会话失败或对话结束时提示可以重新开始
    pub restart_available: bool,
}

impl ConversationView {
    /// 会话未就绪或对话已结束时，视图必须禁用输入
    pub fn input_enabled(&self) -> bool {
        self.session_ready && !self.conversation_complete && !self.loading
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let snapshot = ConversationSnapshot {
            session_id: Some("abc".into()),
            pending_turn: Some(PendingTurn::new("hi")),
            loading: true,
            ..Default::default()
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["sessionId"], "abc");
        assert_eq!(json["pendingTurn"]["retryCount"], 0);
        assert_eq!(json["conversationComplete"], false);
        assert_eq!(json["sessionStatus"], "uninitialized");

        let back: ConversationSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_snapshot_without_status_still_loads() {
        let json = serde_json::json!({
            "sessionId": "abc",
            "history": [],
            "conversationComplete": false,
            "sessionReady": true,
            "loading": false,
            "pendingTurn": null,
            "pendingRetryCount": 0
        });
        let snapshot: ConversationSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(snapshot.session_status, SessionStatus::Uninitialized);
        assert!(snapshot.session_ready);
    }

    #[test]
    fn test_input_disabled_until_ready_and_after_complete() {
        let mut view = ConversationView::default();
        assert!(!view.input_enabled());
        view.session_ready = true;
        assert!(view.input_enabled());
        view.conversation_complete = true;
        assert!(!view.input_enabled());
    }

    #[test]
    fn test_key_display() {
        let key = ConversationKey::new("outside-bar-girl", "friend-girl-01");
        assert_eq!(key.to_string(), "outside-bar-girl:friend-girl-01");
    }
}
