//! 对话状态机：纯状态迁移
//!
//! 组合 StalenessGuard / SessionCoordinator / TurnSubmitter / RetryPolicy。
//! 每个输入（用户意图、远端完成、定时器到期）同步地改写状态并返回需要执行的 Effect，
//! 网络调用与定时器由 orchestrator 执行后再以事件形式喂回。不做任何 IO，便于确定性测试。

use std::sync::Arc;
use std::time::Duration;

use crate::core::session::EstablishOutcome;
use crate::core::{
    ConversationKey, ConversationSnapshot, ConversationView, EstablishToken, FailureKind,
    PendingPhase, RetryDecision, RetryPolicy, ServiceError, SessionCoordinator, SessionStatus,
    StalenessGuard, SubmitIgnored, Turn, TurnSubmitter, TurnToken,
};
use crate::dialogue::{SessionCreated, SessionRequest, TurnReply, TurnRequest};
use crate::locale::{FixedLocale, LocaleResolver};
use crate::scenario::{PersonaProfile, ScenarioDescriptor, ScenarioTemplate};

/// 状态机要求执行的副作用
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// 调用 POST /session
    Establish {
        token: EstablishToken,
        request: SessionRequest,
    },
    /// 调用 POST /session/{id}/turns
    SendTurn {
        token: TurnToken,
        session_id: String,
        request: TurnRequest,
    },
    /// 延迟后触发 on_turn_retry_due
    ScheduleTurnRetry { token: TurnToken, delay: Duration },
    /// 延迟后触发 on_establish_retry_due
    ScheduleEstablish {
        token: EstablishToken,
        delay: Duration,
    },
}

/// 状态机的静态配置
#[derive(Clone)]
pub struct MachineSettings {
    pub key: ConversationKey,
    pub scenario: Option<ScenarioDescriptor>,
    pub persona: Option<PersonaProfile>,
    pub allow_auto_end: bool,
    pub policy: RetryPolicy,
    pub locale: Arc<dyn LocaleResolver>,
}

impl MachineSettings {
    pub fn new(key: ConversationKey) -> Self {
        Self {
            key,
            scenario: None,
            persona: None,
            allow_auto_end: true,
            policy: RetryPolicy::default(),
            locale: Arc::new(FixedLocale::default()),
        }
    }

    pub fn from_template(template: &ScenarioTemplate) -> Self {
        Self {
            scenario: Some(template.scenario.clone()),
            persona: Some(template.persona.clone()),
            ..Self::new(template.key())
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_locale(mut self, locale: Arc<dyn LocaleResolver>) -> Self {
        self.locale = locale;
        self
    }

    pub fn with_allow_auto_end(mut self, allow: bool) -> Self {
        self.allow_auto_end = allow;
        self
    }
}

pub struct ConversationMachine {
    settings: MachineSettings,
    guard: StalenessGuard,
    session: SessionCoordinator,
    turns: TurnSubmitter,
    history: Vec<Turn>,
    complete: bool,
    completion_reason: Option<String>,
    /// 最近一次建立会话时解析出的语言，随每轮请求发送
    locale: Option<String>,
}

impl ConversationMachine {
    pub fn new(settings: MachineSettings) -> Self {
        Self {
            settings,
            guard: StalenessGuard::new(),
            session: SessionCoordinator::new(),
            turns: TurnSubmitter::new(),
            history: Vec::new(),
            complete: false,
            completion_reason: None,
            locale: None,
        }
    }

    pub fn key(&self) -> &ConversationKey {
        &self.settings.key
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn session_status(&self) -> SessionStatus {
        self.session.status()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.id()
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn is_loading(&self) -> bool {
        self.turns.has_pending()
    }

    /// 与新建时等价（无会话、无历史、无待发轮次）
    pub fn is_pristine(&self) -> bool {
        self.history.is_empty()
            && !self.turns.has_pending()
            && !self.complete
            && self.session.status() == SessionStatus::Uninitialized
    }

    /// 显式建立会话（无待发轮次）。失败后不会自愈，等待 restart 或新的提交
    pub fn start(&mut self) -> Vec<Effect> {
        if self.complete {
            return Vec::new();
        }
        let raw = self
            .turns
            .pending()
            .map(|p| p.content.clone())
            .unwrap_or_default();
        self.establish(&raw).into_iter().collect()
    }

    /// 用户提交一条消息。空输入、已有待发轮次、对话已结束时均为 no-op
    pub fn submit(&mut self, text: &str) -> Result<Vec<Effect>, SubmitIgnored> {
        if self.complete {
            tracing::debug!(key = %self.settings.key, "Submit ignored: conversation complete");
            return Err(SubmitIgnored::ConversationComplete);
        }
        let content = self.turns.accept(text).map_err(|reason| {
            tracing::debug!(key = %self.settings.key, ?reason, "Submit ignored");
            reason
        })?;

        // 乐观追加 User 轮次；重试不会再追加
        self.history.push(Turn::user(content.clone()));

        if self.session.is_ready() {
            Ok(self.dispatch_pending().into_iter().collect())
        } else {
            Ok(self.establish(&content).into_iter().collect())
        }
    }

    /// 清空会话、历史与待发轮次，推进全部令牌，使旧对话的在途结果永远无法写入新对话
    pub fn restart(&mut self) {
        tracing::info!(key = %self.settings.key, "Conversation restarted");
        self.guard.advance_all();
        self.session.reset();
        self.turns.clear();
        self.history.clear();
        self.complete = false;
        self.completion_reason = None;
        self.locale = None;
    }

    pub fn on_establish_finished(
        &mut self,
        token: EstablishToken,
        result: Result<SessionCreated, ServiceError>,
    ) -> Vec<Effect> {
        match self.session.complete(&self.guard, token, result) {
            EstablishOutcome::Stale => {
                tracing::debug!(key = %self.settings.key, token = token.value(), "Discarded stale session result");
                Vec::new()
            }
            EstablishOutcome::Ready(session_id) => {
                tracing::info!(key = %self.settings.key, %session_id, "Session ready");
                // 建立期间排队的轮次立即发出
                self.dispatch_pending().into_iter().collect()
            }
            EstablishOutcome::Failed(err) => {
                let kind = err.kind();
                match self.settings.policy.decide(kind, self.turns.retry_count()) {
                    RetryDecision::Idle => {
                        tracing::warn!(key = %self.settings.key, error = %err, "Session establish failed");
                        Vec::new()
                    }
                    RetryDecision::Retry { delay, retry_count } => {
                        tracing::warn!(
                            key = %self.settings.key,
                            error = %err,
                            retry_count,
                            delay_ms = delay.as_millis() as u64,
                            "Session establish rate limited, retry scheduled"
                        );
                        // 到期后 on_turn_retry_due 发现会话未就绪，会先重新建立
                        self.turns.schedule_retry(retry_count);
                        vec![Effect::ScheduleTurnRetry {
                            token: self.guard.current_turn(),
                            delay,
                        }]
                    }
                    RetryDecision::Reestablish { delay, retry_count } => {
                        tracing::warn!(
                            key = %self.settings.key,
                            error = %err,
                            retry_count,
                            delay_ms = delay.as_millis() as u64,
                            "Session establish failed, retry scheduled"
                        );
                        self.turns.schedule_establish(retry_count);
                        vec![Effect::ScheduleEstablish {
                            token: self.guard.current_establish(),
                            delay,
                        }]
                    }
                    RetryDecision::Abandon { message, .. } => {
                        tracing::warn!(key = %self.settings.key, error = %err, "Session establish abandoned");
                        self.abandon(message);
                        Vec::new()
                    }
                }
            }
        }
    }

    pub fn on_turn_finished(
        &mut self,
        token: TurnToken,
        session_id: &str,
        result: Result<TurnReply, ServiceError>,
    ) -> Vec<Effect> {
        if !self.turns.settle(&self.guard, token) {
            tracing::debug!(key = %self.settings.key, token = token.value(), "Discarded stale turn result");
            return Vec::new();
        }
        // 会话已被替换：结果作废，待发轮次回到队列，在当前会话上重发或等会话就绪
        if self.session.id() != Some(session_id) {
            tracing::debug!(key = %self.settings.key, %session_id, "Discarded turn result for invalidated session");
            let retry_count = self.turns.retry_count().unwrap_or(0);
            self.turns.requeue(retry_count);
            return if self.session.is_ready() {
                self.dispatch_pending().into_iter().collect()
            } else {
                let raw = self.pending_content();
                self.establish(&raw).into_iter().collect()
            };
        }

        match result {
            Ok(reply) => {
                self.history.push(Turn::agent(reply.reply));
                if reply.conversation_complete {
                    tracing::info!(
                        key = %self.settings.key,
                        reason = reply.completion_reason.as_deref().unwrap_or("natural conclusion"),
                        "Conversation complete"
                    );
                    self.complete = true;
                    self.completion_reason = reply.completion_reason;
                }
                self.turns.clear();
                Vec::new()
            }
            Err(err) => match self.settings.policy.decide(err.kind(), self.turns.retry_count()) {
                RetryDecision::Retry { delay, retry_count } => {
                    tracing::warn!(
                        key = %self.settings.key,
                        error = %err,
                        retry_count,
                        delay_ms = delay.as_millis() as u64,
                        "Turn failed, retry scheduled"
                    );
                    self.turns.schedule_retry(retry_count);
                    vec![Effect::ScheduleTurnRetry {
                        token: self.guard.current_turn(),
                        delay,
                    }]
                }
                RetryDecision::Reestablish { delay, retry_count } => {
                    tracing::warn!(
                        key = %self.settings.key,
                        error = %err,
                        retry_count,
                        delay_ms = delay.as_millis() as u64,
                        "Turn failed, re-establishing session"
                    );
                    self.turns.schedule_establish(retry_count);
                    self.session.invalidate();
                    vec![Effect::ScheduleEstablish {
                        token: self.guard.current_establish(),
                        delay,
                    }]
                }
                RetryDecision::Abandon { message, fail_session } => {
                    tracing::warn!(key = %self.settings.key, error = %err, "Turn abandoned");
                    if fail_session {
                        self.session.fail();
                    }
                    self.abandon(message);
                    Vec::new()
                }
                RetryDecision::Idle => Vec::new(),
            },
        }
    }

    /// 限流重试到期：restart 之后或待发轮次已清空时什么也不做
    pub fn on_turn_retry_due(&mut self, token: TurnToken) -> Vec<Effect> {
        if !self.guard.is_current_turn(token) || !self.turns.is_retry_scheduled() {
            return Vec::new();
        }
        if self.session.is_ready() {
            self.dispatch_pending().into_iter().collect()
        } else {
            let raw = self.pending_content();
            let retry_count = self.turns.retry_count().unwrap_or(0);
            self.turns.requeue(retry_count);
            self.establish(&raw).into_iter().collect()
        }
    }

    /// 重建会话到期：仅在仍有待发轮次时重新建立
    pub fn on_establish_retry_due(&mut self, token: EstablishToken) -> Vec<Effect> {
        if !self.guard.is_current_establish(token) || !self.turns.is_establish_scheduled() {
            return Vec::new();
        }
        if self.session.is_ready() {
            return self.dispatch_pending().into_iter().collect();
        }
        let raw = self.pending_content();
        let retry_count = self.turns.retry_count().unwrap_or(0);
        self.turns.requeue(retry_count);
        self.establish(&raw).into_iter().collect()
    }

    /// 从快照恢复（视图或编排器重建后重新绑定到已有对话）
    pub fn restore(&mut self, snapshot: ConversationSnapshot) {
        self.guard.advance_all();
        self.history = snapshot.history;
        self.complete = snapshot.conversation_complete;
        self.completion_reason = snapshot.completion_reason;
        let status = if snapshot.session_ready {
            SessionStatus::Ready
        } else {
            snapshot.session_status
        };
        self.session.restore(snapshot.session_id, status);
        let pending = if self.complete {
            None
        } else {
            snapshot.pending_turn.map(|mut p| {
                p.retry_count = p.retry_count.max(snapshot.pending_retry_count);
                p
            })
        };
        self.turns.restore(pending);
    }

    /// 恢复后续发待发轮次：旧实例的在途请求结果不会送达新实例。
    /// 退避中的轮次按已记录的重试次数重新计时，不提前发出
    pub fn resume(&mut self) -> Vec<Effect> {
        let Some(phase) = self.turns.phase() else {
            return Vec::new();
        };
        let retry_count = self.turns.retry_count().unwrap_or(0);
        tracing::info!(key = %self.settings.key, ?phase, retry_count, "Resuming pending turn");
        match phase {
            PendingPhase::RetryScheduled => {
                return vec![Effect::ScheduleTurnRetry {
                    token: self.guard.current_turn(),
                    delay: self.settings.policy.backoff(FailureKind::RateLimited, retry_count),
                }];
            }
            PendingPhase::EstablishScheduled => {
                return vec![Effect::ScheduleEstablish {
                    token: self.guard.current_establish(),
                    delay: self.settings.policy.backoff(FailureKind::ServerError, retry_count),
                }];
            }
            PendingPhase::Queued | PendingPhase::Sent => {}
        }
        if self.session.is_ready() {
            self.dispatch_pending().into_iter().collect()
        } else {
            let raw = self.pending_content();
            self.establish(&raw).into_iter().collect()
        }
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        let pending = self.turns.pending().cloned();
        ConversationSnapshot {
            session_id: self.session.id().map(String::from),
            history: self.history.clone(),
            conversation_complete: self.complete,
            completion_reason: self.completion_reason.clone(),
            session_ready: self.session.is_ready(),
            session_status: self.session.status(),
            loading: pending.is_some(),
            pending_retry_count: pending.as_ref().map(|p| p.retry_count).unwrap_or(0),
            pending_turn: pending,
        }
    }

    pub fn view(&self) -> ConversationView {
        ConversationView {
            history: self.history.clone(),
            loading: self.turns.has_pending(),
            session_ready: self.session.is_ready(),
            session_status: self.session.status(),
            conversation_complete: self.complete,
            completion_reason: self.completion_reason.clone(),
            restart_available: self.complete || self.session.status() == SessionStatus::Failed,
        }
    }

    fn pending_content(&self) -> String {
        self.turns
            .pending()
            .map(|p| p.content.clone())
            .unwrap_or_default()
    }

    fn establish(&mut self, raw_text: &str) -> Option<Effect> {
        let token = self.session.begin(&mut self.guard)?;
        let locale = self.settings.locale.resolve(raw_text);
        tracing::info!(key = %self.settings.key, %locale, "Establishing session");
        self.locale = Some(locale.clone());
        Some(Effect::Establish {
            token,
            request: SessionRequest {
                scenario_id: self.settings.key.scenario_id.clone(),
                persona_id: self.settings.key.persona_id.clone(),
                locale,
                allow_auto_end: self.settings.allow_auto_end,
                scenario: self.settings.scenario.clone(),
                persona: self.settings.persona.clone(),
            },
        })
    }

    fn dispatch_pending(&mut self) -> Option<Effect> {
        let session_id = self.session.id()?.to_string();
        let (token, message) = self.turns.dispatch(&mut self.guard)?;
        Some(Effect::SendTurn {
            token,
            session_id,
            request: TurnRequest {
                message,
                locale: self.locale.clone(),
                allow_auto_end: self.settings.allow_auto_end,
            },
        })
    }

    /// 放弃当前轮次：追加一条兜底 Agent 消息并结束 loading
    fn abandon(&mut self, message: String) {
        self.history.push(Turn::agent(message));
        self.turns.clear();
    }
}
