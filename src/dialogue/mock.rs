//! Mock 对话服务（离线运行与测试用，无需远端）
//!
//! 可按顺序预置会话/轮次的结果与延迟；队列为空时建立会话返回随机 id，轮次回显用户消息。

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::core::ServiceError;
use crate::dialogue::{DialogueService, SessionCreated, SessionRequest, TurnReply, TurnRequest};

struct Scripted<T> {
    delay: Duration,
    result: Result<T, ServiceError>,
}

/// 预置脚本的 Mock 服务；计数器记录实际发生的调用
#[derive(Default)]
pub struct MockDialogueService {
    persona_name: Option<String>,
    latency: Duration,
    sessions: Mutex<VecDeque<Scripted<SessionCreated>>>,
    turns: Mutex<VecDeque<Scripted<TurnReply>>>,
    /// 脚本耗尽后每轮都返回此错误
    sticky_turn_error: Option<ServiceError>,
    session_calls: AtomicUsize,
    turn_calls: AtomicUsize,
    sent: Mutex<Vec<(String, String)>>,
    /// session_id -> 建立会话时请求中的角色名
    personas: Mutex<HashMap<String, String>>,
}

impl MockDialogueService {
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求未携带角色资料时回显使用的角色名
    pub fn with_persona_name(mut self, name: impl Into<String>) -> Self {
        self.persona_name = Some(name.into());
        self
    }

    /// 未单独指定延迟的调用使用的默认延迟
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_session(self, result: Result<SessionCreated, ServiceError>) -> Self {
        let delay = self.latency;
        self.with_session_after(delay, result)
    }

    pub fn with_session_after(self, delay: Duration, result: Result<SessionCreated, ServiceError>) -> Self {
        lock(&self.sessions).push_back(Scripted { delay, result });
        self
    }

    pub fn with_turn(self, result: Result<TurnReply, ServiceError>) -> Self {
        let delay = self.latency;
        self.with_turn_after(delay, result)
    }

    pub fn with_turn_after(self, delay: Duration, result: Result<TurnReply, ServiceError>) -> Self {
        lock(&self.turns).push_back(Scripted { delay, result });
        self
    }

    pub fn with_failing_turns(mut self, err: ServiceError) -> Self {
        self.sticky_turn_error = Some(err);
        self
    }

    pub fn session_calls(&self) -> usize {
        self.session_calls.load(Ordering::SeqCst)
    }

    pub fn turn_calls(&self) -> usize {
        self.turn_calls.load(Ordering::SeqCst)
    }

    /// 已收到的 (session_id, message)
    pub fn sent_messages(&self) -> Vec<(String, String)> {
        lock(&self.sent).clone()
    }

    fn echo(&self, session_id: &str, message: &str) -> TurnReply {
        let name = lock(&self.personas)
            .get(session_id)
            .cloned()
            .or_else(|| self.persona_name.clone())
            .unwrap_or_else(|| "Partner".to_string());
        TurnReply::new(format!("{name}: I hear you. \"{message}\""))
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl DialogueService for MockDialogueService {
    async fn create_session(&self, request: &SessionRequest) -> Result<SessionCreated, ServiceError> {
        self.session_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = lock(&self.sessions).pop_front();
        let (delay, result) = match scripted {
            Some(s) => (s.delay, s.result),
            None => (
                self.latency,
                Ok(SessionCreated {
                    session_id: uuid::Uuid::new_v4().to_string(),
                }),
            ),
        };
        if let (Ok(created), Some(persona)) = (&result, &request.persona) {
            lock(&self.personas).insert(created.session_id.clone(), persona.name.clone());
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        result
    }

    async fn send_turn(&self, session_id: &str, request: &TurnRequest) -> Result<TurnReply, ServiceError> {
        self.turn_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.sent).push((session_id.to_string(), request.message.clone()));
        let scripted = lock(&self.turns).pop_front();
        let (delay, result) = match scripted {
            Some(s) => (s.delay, s.result),
            None => match &self.sticky_turn_error {
                Some(err) => (self.latency, Err(err.clone())),
                None => (self.latency, Ok(self.echo(session_id, &request.message))),
            },
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        result
    }
}
