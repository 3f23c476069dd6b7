//! 过期响应守卫
//!
//! 两个独立的单调计数器：会话建立 / 轮次提交。每次异步调用发出时捕获当前值，
//! 完成时仅当捕获值仍等于最新值才应用结果；restart 同时推进两个计数器。

/// 会话建立尝试的令牌
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EstablishToken(u64);

/// 轮次提交尝试的令牌
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TurnToken(u64);

impl EstablishToken {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl TurnToken {
    pub fn value(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
pub struct StalenessGuard {
    establish: u64,
    turn: u64,
}

impl StalenessGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue_establish(&mut self) -> EstablishToken {
        self.establish += 1;
        EstablishToken(self.establish)
    }

    pub fn issue_turn(&mut self) -> TurnToken {
        self.turn += 1;
        TurnToken(self.turn)
    }

    /// 当前有效的建立令牌（用于给延迟任务打标记，不推进计数器）
    pub fn current_establish(&self) -> EstablishToken {
        EstablishToken(self.establish)
    }

    pub fn current_turn(&self) -> TurnToken {
        TurnToken(self.turn)
    }

    pub fn is_current_establish(&self, token: EstablishToken) -> bool {
        token.0 == self.establish
    }

    pub fn is_current_turn(&self, token: TurnToken) -> bool {
        token.0 == self.turn
    }

    /// 使所有在途调用失效
    pub fn advance_all(&mut self) {
        self.establish += 1;
        self.turn += 1;
    }
}
