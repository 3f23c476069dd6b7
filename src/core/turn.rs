//! 轮次提交：唯一的在途/排队轮次（PendingTurn）
//!
//! 已有 PendingTurn 时再次提交是 no-op，防止快速重复操作造成双发。

use crate::core::{PendingPhase, PendingTurn, StalenessGuard, TurnToken};

/// submit 被忽略的原因（均为 no-op，不触达网络）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitIgnored {
    /// trim 后为空
    Empty,
    /// 已有 PendingTurn
    AlreadyPending,
    /// 对话已结束，需 restart
    ConversationComplete,
}

#[derive(Debug, Default)]
pub struct TurnSubmitter {
    pending: Option<PendingTurn>,
    in_flight: Option<TurnToken>,
}

impl TurnSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Option<&PendingTurn> {
        self.pending.as_ref()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn retry_count(&self) -> Option<u32> {
        self.pending.as_ref().map(|p| p.retry_count)
    }

    /// 接受一条用户输入，返回 trim 后的内容
    pub fn accept(&mut self, text: &str) -> Result<String, SubmitIgnored> {
        let content = text.trim();
        if content.is_empty() {
            return Err(SubmitIgnored::Empty);
        }
        if self.pending.is_some() {
            return Err(SubmitIgnored::AlreadyPending);
        }
        self.pending = Some(PendingTurn::new(content));
        Ok(content.to_string())
    }

    /// 发出待发轮次：领取新令牌，阶段转 Sent
    pub fn dispatch(&mut self, guard: &mut StalenessGuard) -> Option<(TurnToken, String)> {
        let pending = self.pending.as_mut()?;
        let token = guard.issue_turn();
        pending.phase = PendingPhase::Sent;
        self.in_flight = Some(token);
        Some((token, pending.content.clone()))
    }

    /// 完成回调是否对应当前在途请求；是则清除在途标记
    pub fn settle(&mut self, guard: &StalenessGuard, token: TurnToken) -> bool {
        if !guard.is_current_turn(token) || self.in_flight != Some(token) {
            return false;
        }
        self.in_flight = None;
        true
    }

    pub fn schedule_retry(&mut self, retry_count: u32) {
        if let Some(pending) = self.pending.as_mut() {
            pending.retry_count = retry_count;
            pending.phase = PendingPhase::RetryScheduled;
        }
    }

    /// 等待重建会话的退避
    pub fn schedule_establish(&mut self, retry_count: u32) {
        if let Some(pending) = self.pending.as_mut() {
            pending.retry_count = retry_count;
            pending.phase = PendingPhase::EstablishScheduled;
        }
    }

    /// 回到排队状态，等会话 Ready 后再发
    pub fn requeue(&mut self, retry_count: u32) {
        if let Some(pending) = self.pending.as_mut() {
            pending.retry_count = retry_count;
            pending.phase = PendingPhase::Queued;
        }
    }

    pub fn is_retry_scheduled(&self) -> bool {
        matches!(
            self.pending.as_ref().map(|p| p.phase),
            Some(PendingPhase::RetryScheduled)
        )
    }

    pub fn is_establish_scheduled(&self) -> bool {
        matches!(
            self.pending.as_ref().map(|p| p.phase),
            Some(PendingPhase::EstablishScheduled)
        )
    }

    pub fn phase(&self) -> Option<PendingPhase> {
        self.pending.as_ref().map(|p| p.phase)
    }

    pub fn clear(&mut self) -> Option<PendingTurn> {
        self.in_flight = None;
        self.pending.take()
    }

    /// Sent 回到 Queued（旧实例的在途请求不会再回来）；退避中的阶段保留，由 resume 重新计时
    pub fn restore(&mut self, pending: Option<PendingTurn>) {
        self.in_flight = None;
        self.pending = pending.map(|mut p| {
            if p.phase == PendingPhase::Sent {
                p.phase = PendingPhase::Queued;
            }
            p
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_accept_is_ignored() {
        let mut turns = TurnSubmitter::new();
        assert_eq!(turns.accept("  x  "), Ok("x".to_string()));
        assert_eq!(turns.accept("x"), Err(SubmitIgnored::AlreadyPending));
        assert_eq!(turns.pending().unwrap().content, "x");
    }

    #[test]
    fn test_empty_input_rejected() {
        let mut turns = TurnSubmitter::new();
        assert_eq!(turns.accept("   \n"), Err(SubmitIgnored::Empty));
        assert!(!turns.has_pending());
    }

    #[test]
    fn test_settle_rejects_superseded_token() {
        let mut guard = StalenessGuard::new();
        let mut turns = TurnSubmitter::new();
        turns.accept("hello").unwrap();
        let (first, _) = turns.dispatch(&mut guard).unwrap();
        let (second, content) = turns.dispatch(&mut guard).unwrap();
        assert_eq!(content, "hello");
        assert!(!turns.settle(&guard, first));
        assert!(turns.settle(&guard, second));
        assert!(!turns.settle(&guard, second));
    }

    #[test]
    fn test_restore_requeues() {
        let mut turns = TurnSubmitter::new();
        let mut pending = PendingTurn::new("again");
        pending.phase = PendingPhase::Sent;
        pending.retry_count = 2;
        turns.restore(Some(pending));
        let restored = turns.pending().unwrap();
        assert_eq!(restored.phase, PendingPhase::Queued);
        assert_eq!(restored.retry_count, 2);
    }

    #[test]
    fn test_restore_keeps_backoff_phase() {
        let mut turns = TurnSubmitter::new();
        let mut pending = PendingTurn::new("again");
        pending.phase = PendingPhase::RetryScheduled;
        pending.retry_count = 1;
        turns.restore(Some(pending));
        assert!(turns.is_retry_scheduled());

        let mut pending = PendingTurn::new("again");
        pending.phase = PendingPhase::EstablishScheduled;
        turns.restore(Some(pending));
        assert!(turns.is_establish_scheduled());
    }
}
