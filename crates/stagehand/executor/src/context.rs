use std::sync::Arc;

use stagehand_types::{FallbackAction, PlanId, StageId};
use tokio::sync::watch;

use crate::ExecutionError;

/// Cooperative cancellation flag shared by a plan and its executors.
///
/// Clones observe the same flag. Cancelling is idempotent.
#[derive(Clone, Debug)]
pub struct CancellationToken {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once the token is cancelled
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            if receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything an executor may consult while running one partition
#[derive(Clone, Debug)]
pub struct ExecutionContext {
    pub plan_id: PlanId,
    pub stage_id: StageId,
    /// 1-based attempt number
    pub attempt: u32,
    pub dry_run: bool,
    pub non_idempotent: bool,
    /// Fallbacks in force for degraded channels, by channel name
    pub fallbacks: Vec<(String, FallbackAction)>,
    pub cancel: CancellationToken,
}

impl ExecutionContext {
    pub fn new(plan_id: PlanId, stage_id: StageId) -> Self {
        Self {
            plan_id,
            stage_id,
            attempt: 1,
            dry_run: false,
            non_idempotent: false,
            fallbacks: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_non_idempotent(mut self, non_idempotent: bool) -> Self {
        self.non_idempotent = non_idempotent;
        self
    }

    pub fn with_fallbacks(mut self, fallbacks: Vec<(String, FallbackAction)>) -> Self {
        self.fallbacks = fallbacks;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn for_attempt(&self, attempt: u32) -> Self {
        let mut ctx = self.clone();
        ctx.attempt = attempt;
        ctx
    }

    pub fn has_fallback(&self, action: FallbackAction) -> bool {
        self.fallbacks.iter().any(|(_, a)| *a == action)
    }

    /// Safe checkpoint: errors with `Cancelled` once the plan is cancelled
    pub fn checkpoint(&self) -> Result<(), ExecutionError> {
        if self.cancel.is_cancelled() {
            Err(ExecutionError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn clones_share_cancellation() {
        let token = CancellationToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());

        let waiter = tokio::spawn(async move { observer.cancelled().await });
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_resolves_immediately_when_already_set() {
        let token = CancellationToken::new();
        token.cancel();
        token.cancel();
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .unwrap();
    }

    #[test]
    fn checkpoint_reports_cancellation() {
        let ctx = ExecutionContext::new(PlanId::new("p"), StageId::new("s"));
        assert!(ctx.checkpoint().is_ok());
        ctx.cancel.cancel();
        assert_eq!(ctx.checkpoint(), Err(ExecutionError::Cancelled));
    }

    #[test]
    fn fallback_lookup() {
        let ctx = ExecutionContext::new(PlanId::new("p"), StageId::new("s"))
            .with_fallbacks(vec![("federation".into(), FallbackAction::LocalOnly)]);
        assert!(ctx.has_fallback(FallbackAction::LocalOnly));
        assert!(!ctx.has_fallback(FallbackAction::UseCachedState));
    }
}
