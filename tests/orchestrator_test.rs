//! 编排器端到端测试：真实控制任务 + Mock 对话服务，tokio 暂停时钟下运行

use std::sync::Arc;
use std::time::Duration;

use parley::core::retry::{APOLOGY_MESSAGE, RATE_LIMITED_MESSAGE};
use parley::core::{
    ConversationHandle, ConversationKey, ConversationOrchestrator, ConversationView,
    MachineSettings, OrchestratorError, OrchestratorSettings, Role, ServiceError, SessionStatus,
    StateSnapshotStore,
};
use parley::dialogue::{MockDialogueService, SessionCreated, TurnReply};

fn key() -> ConversationKey {
    ConversationKey::new("outside-bar-girl", "friend-girl-01")
}

fn spawn_with(
    mock: &Arc<MockDialogueService>,
    store: &StateSnapshotStore,
    settings: OrchestratorSettings,
) -> ConversationHandle {
    ConversationOrchestrator::spawn(
        MachineSettings::new(key()),
        mock.clone(),
        store.clone(),
        settings,
    )
}

fn spawn(mock: &Arc<MockDialogueService>, store: &StateSnapshotStore) -> ConversationHandle {
    spawn_with(mock, store, OrchestratorSettings::default())
}

async fn wait<F>(handle: &ConversationHandle, predicate: F) -> ConversationView
where
    F: FnMut(&ConversationView) -> bool,
{
    tokio::time::timeout(Duration::from_secs(120), handle.wait_until(predicate))
        .await
        .expect("timed out waiting for view")
        .expect("orchestrator closed")
}

fn ready(v: &ConversationView) -> bool {
    v.session_ready && !v.loading
}

fn user_turns(view: &ConversationView) -> usize {
    view.history.iter().filter(|t| t.role == Role::User).count()
}

#[tokio::test(start_paused = true)]
async fn test_hello_bye_restart_scenario() {
    let mock = Arc::new(
        MockDialogueService::new()
            .with_session(Ok(SessionCreated { session_id: "s-1".into() }))
            .with_turn(Ok(TurnReply::new("Hi there")))
            .with_turn(Ok(TurnReply::completing("See you", Some("Natural conclusion")))),
    );
    let store = StateSnapshotStore::new();
    let handle = spawn(&mock, &store);

    wait(&handle, ready).await;
    handle.submit("Hello").unwrap();
    let view = wait(&handle, |v| v.history.len() == 2 && !v.loading).await;
    assert_eq!(view.history[1].content, "Hi there");

    handle.submit("Bye").unwrap();
    let view = wait(&handle, |v| v.conversation_complete).await;
    assert_eq!(view.history.len(), 4);
    assert_eq!(view.completion_reason.as_deref(), Some("Natural conclusion"));
    assert!(!view.input_enabled());
    assert!(view.restart_available);

    // 已结束的对话不再接受输入
    handle.submit("Wait").unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.view().history.len(), 4);
    assert_eq!(mock.turn_calls(), 2);

    handle.restart().unwrap();
    let view = wait(&handle, |v| v.history.is_empty() && v.session_ready).await;
    assert!(!view.conversation_complete);
    assert_eq!(mock.session_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_double_submit_sends_once() {
    let mock = Arc::new(MockDialogueService::new().with_latency(Duration::from_millis(100)));
    let store = StateSnapshotStore::new();
    let handle = spawn(&mock, &store);

    wait(&handle, ready).await;
    handle.submit("Hello").unwrap();
    handle.submit("Hello").unwrap();
    let view = wait(&handle, |v| v.history.len() == 2 && !v.loading).await;

    assert_eq!(mock.turn_calls(), 1);
    assert_eq!(user_turns(&view), 1);
}

#[tokio::test(start_paused = true)]
async fn test_blank_submit_rejected_locally() {
    let mock = Arc::new(MockDialogueService::new());
    let store = StateSnapshotStore::new();
    let handle = spawn(&mock, &store);

    wait(&handle, ready).await;
    assert_eq!(handle.submit("   "), Err(OrchestratorError::Validation));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(mock.turn_calls(), 0);
    assert!(handle.view().history.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_late_reply_after_restart_is_discarded() {
    let mock = Arc::new(
        MockDialogueService::new().with_turn_after(Duration::from_millis(500), Ok(TurnReply::new("too late"))),
    );
    let store = StateSnapshotStore::new();
    let handle = spawn(&mock, &store);

    wait(&handle, ready).await;
    handle.submit("Hello").unwrap();
    wait(&handle, |v| v.loading).await;

    handle.restart().unwrap();
    wait(&handle, |v| v.history.is_empty() && v.session_ready).await;

    tokio::time::sleep(Duration::from_secs(2)).await;
    let view = handle.view();
    assert!(view.history.is_empty());
    assert!(!view.loading);
    assert_eq!(mock.turn_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_retries_are_bounded() {
    let mock = Arc::new(MockDialogueService::new().with_failing_turns(ServiceError::RateLimited));
    let store = StateSnapshotStore::new();
    let handle = spawn(&mock, &store);

    wait(&handle, ready).await;
    let started = tokio::time::Instant::now();
    handle.submit("Hello").unwrap();
    let view = wait(&handle, |v| v.history.len() == 2 && !v.loading).await;

    // 首发 + 3 次重试，退避 800 + 1600 + 2400 ms
    assert_eq!(mock.turn_calls(), 4);
    assert!(started.elapsed() >= Duration::from_millis(4800));
    assert_eq!(view.history[1].content, RATE_LIMITED_MESSAGE);
    assert_eq!(user_turns(&view), 1);
    assert!(view.session_ready);

    // 同一会话上重试
    let sessions: Vec<_> = mock.sent_messages().into_iter().map(|(s, _)| s).collect();
    assert!(sessions.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test(start_paused = true)]
async fn test_server_error_reestablishes_session() {
    let mock = Arc::new(
        MockDialogueService::new()
            .with_persona_name("Maya")
            .with_session(Ok(SessionCreated { session_id: "s-1".into() }))
            .with_session(Ok(SessionCreated { session_id: "s-2".into() }))
            .with_turn(Err(ServiceError::Server { status: 500 })),
    );
    let store = StateSnapshotStore::new();
    let handle = spawn(&mock, &store);

    wait(&handle, ready).await;
    handle.submit("Hello").unwrap();
    let view = wait(&handle, |v| v.history.len() == 2 && !v.loading).await;

    assert_eq!(mock.session_calls(), 2);
    assert_eq!(
        mock.sent_messages(),
        vec![
            ("s-1".to_string(), "Hello".to_string()),
            ("s-2".to_string(), "Hello".to_string()),
        ]
    );
    assert!(view.history[1].content.starts_with("Maya:"));
    assert_eq!(user_turns(&view), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_failure_is_not_retried() {
    let mock = Arc::new(MockDialogueService::new().with_turn(Err(ServiceError::Rejected {
        status: 400,
        body: "bad request".into(),
    })));
    let store = StateSnapshotStore::new();
    let handle = spawn(&mock, &store);

    wait(&handle, ready).await;
    handle.submit("Hello").unwrap();
    let view = wait(&handle, |v| v.history.len() == 2 && !v.loading).await;

    assert_eq!(mock.turn_calls(), 1);
    assert_eq!(view.history[1].content, APOLOGY_MESSAGE);
    assert!(view.input_enabled());
}

#[tokio::test(start_paused = true)]
async fn test_slow_turn_times_out_and_recovers() {
    let mock = Arc::new(
        MockDialogueService::new().with_turn_after(Duration::from_secs(5), Ok(TurnReply::new("slow"))),
    );
    let store = StateSnapshotStore::new();
    let handle = spawn_with(
        &mock,
        &store,
        OrchestratorSettings {
            request_timeout: Some(Duration::from_secs(1)),
            auto_start: true,
        },
    );

    wait(&handle, ready).await;
    handle.submit("Hello").unwrap();
    let view = wait(&handle, |v| v.history.len() == 2 && !v.loading).await;

    // 超时按服务端错误处理：重建会话后续发
    assert_eq!(mock.session_calls(), 2);
    assert_eq!(mock.turn_calls(), 2);
    assert!(view.history[1].content.starts_with("Partner:"));
}

#[tokio::test(start_paused = true)]
async fn test_establish_failure_waits_for_restart() {
    let mock = Arc::new(MockDialogueService::new().with_session(Err(ServiceError::Server { status: 503 })));
    let store = StateSnapshotStore::new();
    let handle = spawn(&mock, &store);

    let view = wait(&handle, |v| v.session_status == SessionStatus::Failed).await;
    assert!(view.restart_available);
    assert!(!view.input_enabled());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(mock.session_calls(), 1);

    handle.restart().unwrap();
    wait(&handle, ready).await;
    assert_eq!(mock.session_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_reattach_restores_conversation() {
    let mock = Arc::new(MockDialogueService::new());
    let store = StateSnapshotStore::new();

    let handle = spawn(&mock, &store);
    wait(&handle, ready).await;
    handle.submit("Hello").unwrap();
    let before = wait(&handle, |v| v.history.len() == 2 && !v.loading).await;
    handle.shutdown().await;
    assert_eq!(store.len(), 1);

    let handle = spawn(&mock, &store);
    let after = wait(&handle, ready).await;
    assert_eq!(after.history, before.history);
    // 已就绪的会话直接复用
    assert_eq!(mock.session_calls(), 1);

    handle.submit("Again").unwrap();
    wait(&handle, |v| v.history.len() == 4 && !v.loading).await;
    let sessions: Vec<_> = mock.sent_messages().into_iter().map(|(s, _)| s).collect();
    assert_eq!(sessions[0], sessions[1]);
}

#[tokio::test(start_paused = true)]
async fn test_reattach_resends_in_flight_turn() {
    let mock = Arc::new(
        MockDialogueService::new().with_turn_after(Duration::from_secs(1), Ok(TurnReply::new("lost"))),
    );
    let store = StateSnapshotStore::new();

    let handle = spawn(&mock, &store);
    wait(&handle, ready).await;
    handle.submit("Hello").unwrap();
    wait(&handle, |v| v.loading).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    handle.shutdown().await;

    let snapshot = store.load(&key()).unwrap();
    assert!(snapshot.loading);
    assert_eq!(snapshot.pending_turn.as_ref().map(|p| p.content.as_str()), Some("Hello"));

    let handle = spawn(&mock, &store);
    let view = wait(&handle, |v| v.history.len() == 2 && !v.loading).await;
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(mock.turn_calls(), 2);
    assert_eq!(user_turns(&view), 1);
    assert_eq!(handle.view().history.len(), 2);
    assert!(view.history[1].content.starts_with("Partner:"));
}

#[tokio::test(start_paused = true)]
async fn test_restart_clears_stored_snapshot() {
    let mock = Arc::new(MockDialogueService::new());
    let store = StateSnapshotStore::new();
    let handle = spawn_with(
        &mock,
        &store,
        OrchestratorSettings {
            request_timeout: None,
            auto_start: false,
        },
    );

    // 未建立会话前不占用存储
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(store.is_empty());
    assert_eq!(handle.view().session_status, SessionStatus::Uninitialized);

    handle.start().unwrap();
    wait(&handle, ready).await;
    handle.submit("Hello").unwrap();
    wait(&handle, |v| v.history.len() == 2 && !v.loading).await;
    assert_eq!(store.len(), 1);

    handle.restart().unwrap();
    wait(&handle, |v| v.history.is_empty()).await;
    assert!(store.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_reattach_keeps_failed_session_failed() {
    let mock = Arc::new(MockDialogueService::new().with_session(Err(ServiceError::Server { status: 503 })));
    let store = StateSnapshotStore::new();

    let handle = spawn(&mock, &store);
    wait(&handle, |v| v.session_status == SessionStatus::Failed).await;
    handle.shutdown().await;

    let handle = spawn(&mock, &store);
    tokio::time::sleep(Duration::from_secs(2)).await;
    let view = handle.view();
    assert_eq!(view.session_status, SessionStatus::Failed);
    assert!(view.restart_available);
    assert!(!view.input_enabled());
    assert_eq!(mock.session_calls(), 1);

    handle.restart().unwrap();
    wait(&handle, ready).await;
    assert_eq!(mock.session_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_reattach_waits_out_rate_limit_backoff() {
    let mock = Arc::new(MockDialogueService::new().with_turn(Err(ServiceError::RateLimited)));
    let store = StateSnapshotStore::new();

    let handle = spawn(&mock, &store);
    wait(&handle, ready).await;
    handle.submit("Hello").unwrap();
    wait(&handle, |v| v.loading).await;
    // 让首发失败、退避定时器挂起
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(mock.turn_calls(), 1);
    handle.shutdown().await;

    let reattached = tokio::time::Instant::now();
    let handle = spawn(&mock, &store);
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(mock.turn_calls(), 1);

    let view = wait(&handle, |v| v.history.len() == 2 && !v.loading).await;
    assert!(reattached.elapsed() >= Duration::from_millis(800));
    assert_eq!(mock.turn_calls(), 2);
    assert_eq!(user_turns(&view), 1);
}
