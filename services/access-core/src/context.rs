//! 调用上下文：操作人 + 取消信号

use std::future::Future;

use tokio_util::sync::CancellationToken;
use uas_common::ActorId;

use crate::error::{AccessError, AccessResult};

/// 调用上下文
///
/// 每个公开操作都接收一个上下文。取消只在提交前生效，
/// 提交后的缓存失效等收尾工作不受影响。
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    performed_by: Option<ActorId>,
    cancel: CancellationToken,
}

impl OperationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_actor(mut self, actor: ActorId) -> Self {
        self.performed_by = Some(actor);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// 写入 EditedBy 的操作人，未指定时为系统
    pub fn actor(&self) -> ActorId {
        self.performed_by.unwrap_or_default()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn ensure_active(&self) -> AccessResult<()> {
        if self.is_cancelled() {
            return Err(AccessError::Cancelled);
        }
        Ok(())
    }

    /// 在取消信号下执行 future
    ///
    /// 优先检查取消；若取消先到达，future 被丢弃，返回 `Cancelled`。
    pub async fn run<F, T>(&self, fut: F) -> AccessResult<T>
    where
        F: Future<Output = AccessResult<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(AccessError::Cancelled),
            result = fut => result,
        }
    }

    /// 校验在取消信号下执行，写入一旦开始就执行到底
    ///
    /// `prepare` 完成后再检查一次取消；`write` 不参与 `select!`，
    /// 已开始的提交不会被丢弃。
    pub async fn commit<P, T, C, W, Fut>(&self, prepare: C, write: W) -> AccessResult<T>
    where
        C: Future<Output = AccessResult<P>>,
        W: FnOnce(P) -> Fut,
        Fut: Future<Output = AccessResult<T>>,
    {
        let prepared = self.run(prepare).await?;
        self.ensure_active()?;
        write(prepared).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use uuid::Uuid;

    #[test]
    fn test_actor_defaults_to_system() {
        let ctx = OperationContext::new();
        assert_eq!(ctx.actor(), ActorId::system());

        let actor = ActorId::from_uuid(Uuid::new_v4());
        assert_eq!(OperationContext::new().with_actor(actor).actor(), actor);
    }

    #[tokio::test]
    async fn test_run_returns_cancelled_before_work() {
        let token = CancellationToken::new();
        token.cancel();
        let ctx = OperationContext::new().with_cancellation(token);

        let result = ctx.run(async { Ok::<_, AccessError>(1) }).await;
        assert!(matches!(result, Err(AccessError::Cancelled)));
    }

    #[tokio::test]
    async fn test_run_interrupts_pending_work() {
        let token = CancellationToken::new();
        let ctx = OperationContext::new().with_cancellation(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, AccessError>(())
            })
            .await;
        canceller.await.unwrap();
        assert!(matches!(result, Err(AccessError::Cancelled)));
    }

    #[tokio::test]
    async fn test_commit_skips_write_when_cancelled_during_prepare() {
        let token = CancellationToken::new();
        let ctx = OperationContext::new().with_cancellation(token.clone());
        let flag = AtomicBool::new(false);
        let wrote = &flag;

        let result = ctx
            .commit(
                async {
                    token.cancel();
                    Ok::<_, AccessError>(())
                },
                move |_| async move {
                    wrote.store(true, Ordering::SeqCst);
                    Ok::<_, AccessError>(())
                },
            )
            .await;
        assert!(matches!(result, Err(AccessError::Cancelled)));
        assert!(!flag.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_commit_finishes_started_write() {
        let token = CancellationToken::new();
        let ctx = OperationContext::new().with_cancellation(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let result = ctx
            .commit(async { Ok::<_, AccessError>(7) }, |n| async move {
                tokio::time::sleep(Duration::from_millis(80)).await;
                Ok::<_, AccessError>(n * 2)
            })
            .await;
        canceller.await.unwrap();
        assert_eq!(result.unwrap(), 14);
    }
}
