//! 重试策略
//!
//! 根据 FailureKind 与当前 PendingTurn 的重试次数返回 RetryDecision，
//! 由状态机决定是延迟重发、作废会话后重建，还是放弃并追加兜底消息。

use std::time::Duration;

use crate::config::RetrySection;
use crate::core::FailureKind;

/// 限流重试耗尽时的兜底回复
pub const RATE_LIMITED_MESSAGE: &str =
    "Sorry, I'm getting a lot of messages right now. Could you send that again?";
/// 服务端错误重试耗尽时的兜底回复
pub const CONNECTION_FAILED_MESSAGE: &str =
    "Sorry, there was an error connecting to the conversation system. Please restart the conversation.";
/// 未知错误的兜底回复
pub const APOLOGY_MESSAGE: &str = "Sorry, I had trouble understanding that. Could you try again?";

/// 策略给出的下一步
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// 延迟后以同一内容重试同一操作（不追加新的 User 轮次）
    Retry { delay: Duration, retry_count: u32 },
    /// 作废当前会话，延迟后重建；Ready 后续发仍在排队的 PendingTurn
    Reestablish { delay: Duration, retry_count: u32 },
    /// 放弃：追加兜底 Agent 消息并清空 PendingTurn；fail_session 时会话转 Failed
    Abandon { message: String, fail_session: bool },
    /// 没有待发送的轮次，无需重试
    Idle,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    rate_limited_base: Duration,
    server_error_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            rate_limited_base: Duration::from_millis(800),
            server_error_base: Duration::from_millis(400),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, rate_limited_base: Duration, server_error_base: Duration) -> Self {
        Self {
            max_retries,
            rate_limited_base,
            server_error_base,
        }
    }

    pub fn from_config(cfg: &RetrySection) -> Self {
        Self::new(
            cfg.max_retries,
            Duration::from_millis(cfg.rate_limited_base_ms),
            Duration::from_millis(cfg.server_error_base_ms),
        )
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// 第 retry_count 次重试前的等待：基数 × 次数，溢出时取 Duration::MAX
    pub fn backoff(&self, kind: FailureKind, retry_count: u32) -> Duration {
        let base = match kind {
            FailureKind::RateLimited => self.rate_limited_base,
            FailureKind::ServerError => self.server_error_base,
            FailureKind::Unknown => return Duration::ZERO,
        };
        base.checked_mul(retry_count).unwrap_or(Duration::MAX)
    }

    /// pending_retry_count 为 None 表示当前没有 PendingTurn
    pub fn decide(&self, kind: FailureKind, pending_retry_count: Option<u32>) -> RetryDecision {
        let Some(current) = pending_retry_count else {
            return RetryDecision::Idle;
        };
        let retry_count = current.saturating_add(1);
        match kind {
            FailureKind::RateLimited => {
                if retry_count > self.max_retries {
                    RetryDecision::Abandon {
                        message: RATE_LIMITED_MESSAGE.to_string(),
                        fail_session: false,
                    }
                } else {
                    RetryDecision::Retry {
                        delay: self.backoff(kind, retry_count),
                        retry_count,
                    }
                }
            }
            FailureKind::ServerError => {
                if retry_count > self.max_retries {
                    RetryDecision::Abandon {
                        message: CONNECTION_FAILED_MESSAGE.to_string(),
                        fail_session: true,
                    }
                } else {
                    RetryDecision::Reestablish {
                        delay: self.backoff(kind, retry_count),
                        retry_count,
                    }
                }
            }
            // 错误类别本身不提供「重试会成功」的依据
            FailureKind::Unknown => RetryDecision::Abandon {
                message: APOLOGY_MESSAGE.to_string(),
                fail_session: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_backoff_is_linear() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(FailureKind::RateLimited, Some(0)),
            RetryDecision::Retry {
                delay: Duration::from_millis(800),
                retry_count: 1
            }
        );
        assert_eq!(
            policy.decide(FailureKind::RateLimited, Some(2)),
            RetryDecision::Retry {
                delay: Duration::from_millis(2400),
                retry_count: 3
            }
        );
    }

    #[test]
    fn test_rate_limited_abandons_after_three_retries() {
        let policy = RetryPolicy::default();
        match policy.decide(FailureKind::RateLimited, Some(3)) {
            RetryDecision::Abandon { message, fail_session } => {
                assert_eq!(message, RATE_LIMITED_MESSAGE);
                assert!(!fail_session);
            }
            other => panic!("Expected Abandon, got {other:?}"),
        }
    }

    #[test]
    fn test_server_error_reestablishes_then_fails_session() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(FailureKind::ServerError, Some(1)),
            RetryDecision::Reestablish {
                delay: Duration::from_millis(800),
                retry_count: 2
            }
        );
        match policy.decide(FailureKind::ServerError, Some(3)) {
            RetryDecision::Abandon { fail_session, .. } => assert!(fail_session),
            other => panic!("Expected Abandon, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_abandons_immediately() {
        let policy = RetryPolicy::default();
        assert!(matches!(
            policy.decide(FailureKind::Unknown, Some(0)),
            RetryDecision::Abandon { fail_session: false, .. }
        ));
    }

    #[test]
    fn test_huge_configured_delay_saturates() {
        let policy = RetryPolicy::new(u32::MAX, Duration::from_secs(u64::MAX), Duration::from_millis(400));
        assert_eq!(
            policy.decide(FailureKind::RateLimited, Some(1)),
            RetryDecision::Retry {
                delay: Duration::MAX,
                retry_count: 2
            }
        );
        assert_eq!(policy.backoff(FailureKind::ServerError, 3), Duration::from_millis(1200));
        assert_eq!(policy.backoff(FailureKind::Unknown, 3), Duration::ZERO);
    }

    #[test]
    fn test_no_pending_turn_is_idle() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.decide(FailureKind::RateLimited, None), RetryDecision::Idle);
        assert_eq!(policy.decide(FailureKind::ServerError, None), RetryDecision::Idle);
    }
}
