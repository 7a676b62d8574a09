//! 有界重试：每次尝试限时、可取消，瞬时失败按指数退避重试。

use crate::error::DeviceError;
use domain::SimulationSettings;
use starling_protocol::ProtocolError;
use starling_telemetry::record_retry;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// 单个操作的重试参数。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, attempt_timeout: Duration, settings: &SimulationSettings) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            attempt_timeout,
            backoff_base: Duration::from_millis(settings.retry_backoff_ms),
            backoff_max: Duration::from_millis(settings.retry_backoff_max_ms),
        }
    }

    /// 注册：`registrationAttemptTimeout` × `maxRegistrationAttempts`。
    pub fn registration(settings: &SimulationSettings) -> Self {
        Self::new(
            settings.max_registration_attempts,
            settings.registration_attempt_timeout(),
            settings,
        )
    }

    /// 连接：`connectionTimeout` × `maxOperationAttempts`。
    pub fn connection(settings: &SimulationSettings) -> Self {
        Self::new(
            settings.max_operation_attempts,
            settings.connection_timeout(),
            settings,
        )
    }

    /// 删除与注册走同一注册服务，沿用注册单次超时。
    pub fn deletion(settings: &SimulationSettings) -> Self {
        Self::new(
            settings.max_operation_attempts,
            settings.registration_attempt_timeout(),
            settings,
        )
    }

    /// 第 `attempt` 次失败后的等待：`base * 2^(attempt-1)`，不超过上限。
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.backoff_base
            .saturating_mul(factor)
            .min(self.backoff_max)
    }

    /// 执行 `work(attempt)`，`attempt` 从 1 开始。
    ///
    /// 超时视为瞬时失败；永久失败立即返回；取消同时中断进行中的尝试与退避等待。
    pub async fn run<T, F, Fut>(
        &self,
        operation: &'static str,
        device_id: &str,
        cancel: &CancellationToken,
        mut work: F,
    ) -> Result<T, DeviceError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ProtocolError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DeviceError::Cancelled),
                outcome = tokio::time::timeout(self.attempt_timeout, work(attempt)) => outcome,
            };
            let err = match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) => err,
                Err(_) => ProtocolError::Timeout(format!(
                    "{} attempt {} exceeded {}ms",
                    operation,
                    attempt,
                    self.attempt_timeout.as_millis()
                )),
            };
            if !err.is_transient() {
                return Err(DeviceError::Permanent(err));
            }
            if attempt >= max_attempts {
                return Err(DeviceError::RetryExhausted {
                    attempts: attempt,
                    last: err,
                });
            }

            let delay = self.backoff(attempt);
            record_retry();
            debug!(
                target: "starling.simulation",
                device_id = %device_id,
                operation = operation,
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retry_scheduled"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DeviceError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            attempt_timeout: Duration::from_millis(100),
            backoff_base: Duration::from_millis(10),
            backoff_max: Duration::from_millis(40),
        }
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let policy = policy(10);
        assert_eq!(policy.backoff(1), Duration::from_millis(10));
        assert_eq!(policy.backoff(2), Duration::from_millis(20));
        assert_eq!(policy.backoff(3), Duration::from_millis(40));
        assert_eq!(policy.backoff(4), Duration::from_millis(40));
        assert_eq!(policy.backoff(64), Duration::from_millis(40));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();
        let counter = calls.clone();
        let result = policy(3)
            .run("register", "d1", &cancel, move |attempt| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(ProtocolError::Throttled("busy".to_string()))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;
        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_reports_attempts_and_last_error() {
        let cancel = CancellationToken::new();
        let result: Result<(), _> = policy(2)
            .run("connect", "d1", &cancel, |_| async {
                Err(ProtocolError::Connection("refused".to_string()))
            })
            .await;
        assert_eq!(
            result,
            Err(DeviceError::RetryExhausted {
                attempts: 2,
                last: ProtocolError::Connection("refused".to_string()),
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_count_as_transient() {
        let cancel = CancellationToken::new();
        let result: Result<(), _> = policy(2)
            .run("connect", "d1", &cancel, |_| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        match result {
            Err(DeviceError::RetryExhausted { attempts, last }) => {
                assert_eq!(attempts, 2);
                assert!(matches!(last, ProtocolError::Timeout(_)));
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_stops_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();
        let counter = calls.clone();
        let result: Result<(), _> = policy(5)
            .run("register", "d1", &cancel, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(ProtocolError::Rejected("bad key".to_string())) }
            })
            .await;
        assert_eq!(
            result,
            Err(DeviceError::Permanent(ProtocolError::Rejected(
                "bad key".to_string()
            )))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let mut policy = policy(5);
        policy.backoff_base = Duration::from_secs(60);
        policy.backoff_max = Duration::from_secs(60);
        let task = tokio::spawn(async move {
            policy
                .run("register", "d1", &cancel, |_| async {
                    Err::<(), _>(ProtocolError::Timeout("slow".to_string()))
                })
                .await
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
        assert_eq!(task.await.expect("join"), Err(DeviceError::Cancelled));
    }
}
