//! 按操作类型划分的并发闸门。
//!
//! 每类操作（注册、连接、遥测、孪生更新、删除）各有独立的信号量。
//! 令牌析构即释放；等待者按 FIFO 获得许可。

use domain::SimulationSettings;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// 闸门获取失败。
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("cancelled while waiting for {0} gate")]
    Cancelled(&'static str),
    #[error("deadline exceeded while waiting for {0} gate")]
    DeadlineExceeded(&'static str),
    #[error("{0} gate closed")]
    Closed(&'static str),
}

/// 固定容量的计数闸门。
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    kind: &'static str,
    capacity: usize,
    semaphore: Arc<Semaphore>,
}

impl ConcurrencyGate {
    /// 容量 0 按 1 处理。
    pub fn new(kind: &'static str, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            kind,
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 当前已发出的令牌数。
    pub fn in_use(&self) -> usize {
        self.capacity
            .saturating_sub(self.semaphore.available_permits())
    }

    /// 等待一个令牌。
    ///
    /// 只挂起当前任务；取消信号或截止时间先到则返回错误。
    pub async fn acquire(
        &self,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<GateToken, GateError> {
        if cancel.is_cancelled() {
            return Err(GateError::Cancelled(self.kind));
        }
        let acquire = self.semaphore.clone().acquire_owned();
        let permit = match deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(GateError::Cancelled(self.kind)),
                result = tokio::time::timeout_at(deadline, acquire) => match result {
                    Ok(Ok(permit)) => permit,
                    Ok(Err(_)) => return Err(GateError::Closed(self.kind)),
                    Err(_) => return Err(GateError::DeadlineExceeded(self.kind)),
                },
            },
            None => tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(GateError::Cancelled(self.kind)),
                result = acquire => result.map_err(|_| GateError::Closed(self.kind))?,
            },
        };
        Ok(GateToken {
            kind: self.kind,
            _permit: permit,
        })
    }
}

/// 闸门令牌，析构时归还许可。
#[derive(Debug)]
pub struct GateToken {
    kind: &'static str,
    _permit: OwnedSemaphorePermit,
}

impl GateToken {
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// 显式归还。
    pub fn release(self) {}
}

/// 一个模拟的全部闸门。
#[derive(Debug, Clone)]
pub struct ConcurrencyGates {
    pub registration: ConcurrencyGate,
    pub connection: ConcurrencyGate,
    pub telemetry: ConcurrencyGate,
    pub twin_update: ConcurrencyGate,
    pub deletion: ConcurrencyGate,
}

impl ConcurrencyGates {
    pub fn from_settings(settings: &SimulationSettings) -> Self {
        Self {
            registration: ConcurrencyGate::new(
                "registration",
                settings.max_concurrent_registrations,
            ),
            connection: ConcurrencyGate::new("connection", settings.max_concurrent_connections),
            telemetry: ConcurrencyGate::new("telemetry", settings.max_concurrent_telemetry_sends),
            twin_update: ConcurrencyGate::new("twin_update", settings.max_concurrent_twin_updates),
            deletion: ConcurrencyGate::new("deletion", settings.max_concurrent_deletes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn zero_capacity_is_clamped() {
        let gate = ConcurrencyGate::new("registration", 0);
        assert_eq!(gate.capacity(), 1);
    }

    #[tokio::test]
    async fn token_drop_releases_capacity() {
        let gate = ConcurrencyGate::new("connection", 2);
        let cancel = CancellationToken::new();
        let first = gate.acquire(&cancel, None).await.expect("first");
        let second = gate.acquire(&cancel, None).await.expect("second");
        assert_eq!(gate.in_use(), 2);
        drop(first);
        assert_eq!(gate.in_use(), 1);
        second.release();
        assert_eq!(gate.in_use(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_acquire_honours_deadline() {
        let gate = ConcurrencyGate::new("deletion", 1);
        let cancel = CancellationToken::new();
        let _held = gate.acquire(&cancel, None).await.expect("held");
        let deadline = Instant::now() + Duration::from_millis(50);
        let err = gate.acquire(&cancel, Some(deadline)).await.unwrap_err();
        assert_eq!(err, GateError::DeadlineExceeded("deletion"));
    }

    #[tokio::test]
    async fn waiting_acquire_is_cancelled() {
        let gate = ConcurrencyGate::new("telemetry", 1);
        let cancel = CancellationToken::new();
        let _held = gate.acquire(&cancel, None).await.expect("held");
        let waiter = {
            let gate = gate.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { gate.acquire(&cancel, None).await.map(|_| ()) })
        };
        tokio::task::yield_now().await;
        cancel.cancel();
        let result = waiter.await.expect("join");
        assert_eq!(result, Err(GateError::Cancelled("telemetry")));
    }
}
