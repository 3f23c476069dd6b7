//! 核心编排层：错误分类、过期守卫、重试策略、会话协调、轮次提交、状态快照与主控循环

pub mod builder;
pub mod error;
pub mod machine;
pub mod orchestrator;
pub mod retry;
pub mod session;
pub mod snapshot;
pub mod staleness;
pub mod state;
pub mod turn;

pub use builder::{create_conversation_builder, create_service_from_config, ConversationBuilder};
pub use error::{FailureKind, OrchestratorError, ServiceError};
pub use machine::{ConversationMachine, Effect, MachineSettings};
pub use orchestrator::{ConversationHandle, ConversationOrchestrator, OrchestratorSettings};
pub use retry::{RetryDecision, RetryPolicy};
pub use session::SessionCoordinator;
pub use snapshot::StateSnapshotStore;
pub use staleness::{EstablishToken, StalenessGuard, TurnToken};
pub use state::{
    ConversationKey, ConversationSnapshot, ConversationView, PendingPhase, PendingTurn, Role,
    SessionStatus, Turn,
};
pub use turn::{SubmitIgnored, TurnSubmitter};
