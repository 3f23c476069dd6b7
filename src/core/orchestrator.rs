//! 对话编排器：主控循环
//!
//! 单一控制任务持有 ConversationMachine，消费两类事件：视图层命令（Submit/Start/Restart）
//! 与远端完成/定时器到期。远端调用与定时器在独立任务中执行，完成后带着令牌回送事件；
//! 过期令牌由状态机丢弃，因此无需锁，也不取消在途请求。每次迁移后写快照并推送视图状态。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::{
    ConversationKey, ConversationMachine, ConversationView, Effect, EstablishToken,
    MachineSettings, OrchestratorError, ServiceError, SessionStatus, StateSnapshotStore, TurnToken,
};
use crate::dialogue::{DialogueService, SessionCreated, TurnReply};

/// 从视图层发往编排器的用户命令
#[derive(Debug, Clone)]
pub enum Command {
    /// 提交用户输入
    Submit(String),
    /// 显式建立会话
    Start,
    /// 清空对话并重新开始
    Restart,
}

#[derive(Debug)]
enum Event {
    Command(Command),
    EstablishFinished {
        token: EstablishToken,
        result: Result<SessionCreated, ServiceError>,
    },
    TurnFinished {
        token: TurnToken,
        session_id: String,
        result: Result<TurnReply, ServiceError>,
    },
    TurnRetryDue(TurnToken),
    EstablishRetryDue(EstablishToken),
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// 单次远端调用超时；None 表示一直等待
    pub request_timeout: Option<Duration>,
    /// 新建与 restart 后立即建立会话
    pub auto_start: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(30)),
            auto_start: true,
        }
    }
}

impl OrchestratorSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            request_timeout: cfg.service.request_timeout(),
            auto_start: cfg.conversation.auto_start,
        }
    }
}

pub struct ConversationOrchestrator {
    machine: ConversationMachine,
    service: Arc<dyn DialogueService>,
    store: StateSnapshotStore,
    settings: OrchestratorSettings,
    events_tx: mpsc::UnboundedSender<Event>,
    state_tx: watch::Sender<ConversationView>,
    cancel: CancellationToken,
}

impl ConversationOrchestrator {
    /// 绑定到一个对话键并启动控制任务。
    /// 存储中已有该键的快照时恢复并续发待发轮次；否则从空对话开始。
    pub fn spawn(
        machine_settings: MachineSettings,
        service: Arc<dyn DialogueService>,
        store: StateSnapshotStore,
        settings: OrchestratorSettings,
    ) -> ConversationHandle {
        let mut machine = ConversationMachine::new(machine_settings);
        let key = machine.key().clone();

        let effects = match store.load(&key) {
            Some(snapshot) => {
                tracing::info!(%key, turns = snapshot.history.len(), "Re-attached to existing conversation");
                machine.restore(snapshot);
                let effects = machine.resume();
                // 空闲的失败会话不自愈，等待 restart
                if effects.is_empty()
                    && settings.auto_start
                    && machine.session_status() != SessionStatus::Failed
                {
                    machine.start()
                } else {
                    effects
                }
            }
            None if settings.auto_start => machine.start(),
            None => Vec::new(),
        };

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(machine.view());
        let cancel = CancellationToken::new();

        let orchestrator = Self {
            machine,
            service,
            store,
            settings,
            events_tx: events_tx.clone(),
            state_tx,
            cancel: cancel.clone(),
        };
        orchestrator.execute(effects);
        orchestrator.commit();

        let task = tokio::spawn(orchestrator.run(events_rx));

        ConversationHandle {
            key,
            events: events_tx,
            state: state_rx,
            cancel,
            task: Some(task),
        }
    }

    async fn run(mut self, mut events_rx: mpsc::UnboundedReceiver<Event>) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                Some(event) = events_rx.recv() => self.handle(event),
            }
        }
        // 在途请求不取消，其结果随本任务结束而丢弃；快照保留待发轮次，重新绑定时续发
        self.commit();
        tracing::info!(key = %self.machine.key(), "Conversation detached");
    }

    fn handle(&mut self, event: Event) {
        let effects = match event {
            Event::Command(Command::Submit(text)) => self.machine.submit(&text).unwrap_or_default(),
            Event::Command(Command::Start) => self.machine.start(),
            Event::Command(Command::Restart) => {
                self.machine.restart();
                self.store.clear(self.machine.key());
                if self.settings.auto_start {
                    self.machine.start()
                } else {
                    Vec::new()
                }
            }
            Event::EstablishFinished { token, result } => {
                self.machine.on_establish_finished(token, result)
            }
            Event::TurnFinished {
                token,
                session_id,
                result,
            } => self.machine.on_turn_finished(token, &session_id, result),
            Event::TurnRetryDue(token) => self.machine.on_turn_retry_due(token),
            Event::EstablishRetryDue(token) => self.machine.on_establish_retry_due(token),
        };
        self.execute(effects);
        self.commit();
    }

    fn execute(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Establish { token, request } => {
                    let service = self.service.clone();
                    let tx = self.events_tx.clone();
                    let limit = self.settings.request_timeout;
                    tokio::spawn(async move {
                        let result = with_timeout(limit, service.create_session(&request)).await;
                        let _ = tx.send(Event::EstablishFinished { token, result });
                    });
                }
                Effect::SendTurn {
                    token,
                    session_id,
                    request,
                } => {
                    let service = self.service.clone();
                    let tx = self.events_tx.clone();
                    let limit = self.settings.request_timeout;
                    tokio::spawn(async move {
                        let result = with_timeout(limit, service.send_turn(&session_id, &request)).await;
                        let _ = tx.send(Event::TurnFinished {
                            token,
                            session_id,
                            result,
                        });
                    });
                }
                Effect::ScheduleTurnRetry { token, delay } => {
                    self.schedule(delay, Event::TurnRetryDue(token));
                }
                Effect::ScheduleEstablish { token, delay } => {
                    self.schedule(delay, Event::EstablishRetryDue(token));
                }
            }
        }
    }

    /// 定时器而非忙等；到期事件仍要经过状态机的令牌与待发轮次检查
    fn schedule(&self, delay: Duration, event: Event) {
        let tx = self.events_tx.clone();
        let cancel = self.cancel.child_token();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(event);
                }
            }
        });
    }

    /// 写快照并推送视图；与新建等价的状态不占用存储条目
    fn commit(&self) {
        let key = self.machine.key();
        if self.machine.is_pristine() {
            self.store.clear(key);
        } else {
            self.store.save(key, self.machine.snapshot());
        }
        self.state_tx.send_replace(self.machine.view());
    }
}

async fn with_timeout<T, F>(limit: Option<Duration>, fut: F) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .unwrap_or_else(|_| Err(ServiceError::Timeout)),
        None => fut.await,
    }
}

/// 视图层持有的句柄：发送意图、读取只读状态。丢弃句柄即结束控制任务。
pub struct ConversationHandle {
    key: ConversationKey,
    events: mpsc::UnboundedSender<Event>,
    state: watch::Receiver<ConversationView>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ConversationHandle {
    pub fn key(&self) -> &ConversationKey {
        &self.key
    }

    /// 空输入在本地拒绝，不会触达网络
    pub fn submit(&self, text: &str) -> Result<(), OrchestratorError> {
        if text.trim().is_empty() {
            return Err(OrchestratorError::Validation);
        }
        self.send(Command::Submit(text.to_string()))
    }

    pub fn start(&self) -> Result<(), OrchestratorError> {
        self.send(Command::Start)
    }

    pub fn restart(&self) -> Result<(), OrchestratorError> {
        self.send(Command::Restart)
    }

    fn send(&self, command: Command) -> Result<(), OrchestratorError> {
        self.events
            .send(Event::Command(command))
            .map_err(|_| OrchestratorError::Closed)
    }

    /// 当前视图状态
    pub fn view(&self) -> ConversationView {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConversationView> {
        self.state.clone()
    }

    /// 等待视图满足条件
    pub async fn wait_until<F>(&self, mut predicate: F) -> Result<ConversationView, OrchestratorError>
    where
        F: FnMut(&ConversationView) -> bool,
    {
        let mut rx = self.state.clone();
        let view = rx
            .wait_for(|v| predicate(v))
            .await
            .map_err(|_| OrchestratorError::Closed)?;
        Ok(view.clone())
    }

    /// 结束控制任务并等待最后一次快照写入
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(key = %self.key, "Orchestrator task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for ConversationHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
