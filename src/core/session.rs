//! 会话协调：会话 id 与 Uninitialized → Establishing → Ready / Failed 状态
//!
//! 建立前从 StalenessGuard 领取令牌；完成时令牌已过期（期间发生了新的建立或 restart）则整体丢弃，不改任何状态。

use crate::core::{EstablishToken, ServiceError, SessionStatus, StalenessGuard};
use crate::dialogue::SessionCreated;

/// 一次建立调用完成后的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EstablishOutcome {
    /// 令牌过期，结果已丢弃
    Stale,
    Ready(String),
    Failed(ServiceError),
}

#[derive(Debug, Default)]
pub struct SessionCoordinator {
    id: Option<String>,
    status: SessionStatus,
    in_flight: Option<EstablishToken>,
}

impl SessionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_ready(&self) -> bool {
        self.status == SessionStatus::Ready && self.id.is_some()
    }

    pub fn is_establishing(&self) -> bool {
        self.in_flight.is_some()
    }

    /// 开始一次建立；已有在途建立或会话已就绪时返回 None
    pub fn begin(&mut self, guard: &mut StalenessGuard) -> Option<EstablishToken> {
        if self.in_flight.is_some() || self.is_ready() {
            return None;
        }
        let token = guard.issue_establish();
        self.status = SessionStatus::Establishing;
        self.in_flight = Some(token);
        Some(token)
    }

    pub fn complete(
        &mut self,
        guard: &StalenessGuard,
        token: EstablishToken,
        result: Result<SessionCreated, ServiceError>,
    ) -> EstablishOutcome {
        if !guard.is_current_establish(token) || self.in_flight != Some(token) {
            return EstablishOutcome::Stale;
        }
        self.in_flight = None;
        match result {
            Ok(created) => {
                self.id = Some(created.session_id.clone());
                self.status = SessionStatus::Ready;
                EstablishOutcome::Ready(created.session_id)
            }
            Err(err) => {
                self.id = None;
                self.status = SessionStatus::Failed;
                EstablishOutcome::Failed(err)
            }
        }
    }

    /// 作废当前会话（服务端错误后重建前调用）
    pub fn invalidate(&mut self) {
        self.id = None;
        self.status = SessionStatus::Uninitialized;
        self.in_flight = None;
    }

    /// 不可恢复的错误：销毁会话并转 Failed
    pub fn fail(&mut self) {
        self.id = None;
        self.status = SessionStatus::Failed;
        self.in_flight = None;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// 从快照恢复；只有带 id 的 Ready 才视为就绪，Failed 保持 Failed，
    /// Establishing 的在途请求属于旧实例，回到 Uninitialized
    pub fn restore(&mut self, id: Option<String>, status: SessionStatus) {
        self.in_flight = None;
        match (id, status) {
            (Some(id), SessionStatus::Ready) => {
                self.id = Some(id);
                self.status = SessionStatus::Ready;
            }
            (_, SessionStatus::Failed) => {
                self.id = None;
                self.status = SessionStatus::Failed;
            }
            _ => {
                self.id = None;
                self.status = SessionStatus::Uninitialized;
            }
        }
    }
}
