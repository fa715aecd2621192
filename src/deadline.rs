use log::warn;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Default budget for a whole provisioning run
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(45 * 60);

/// Longest budget a run accepts
pub const MAX_DEADLINE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// One cancellable deadline shared by every stage of a run.
///
/// Clones of [`Deadline::token`] are handed to clients and branch tasks;
/// when the timer fires they all observe cancellation at once.
#[derive(Debug)]
pub struct Deadline {
    token: CancellationToken,
    expires_at: Instant,
    timer: JoinHandle<()>,
}

impl Deadline {
    /// Start the clock. Must be called inside a tokio runtime. Budgets
    /// above [`MAX_DEADLINE`] are clamped to it.
    pub fn start(budget: Duration) -> Self {
        let token = CancellationToken::new();
        let budget = budget.min(MAX_DEADLINE);
        let now = Instant::now();
        let expires_at = now.checked_add(budget).unwrap_or(now);

        let expiry = token.clone();
        let timer = tokio::spawn(async move {
            tokio::select! {
                _ = expiry.cancelled() => {}
                _ = tokio::time::sleep_until(expires_at) => {
                    warn!("Deadline of {:?} expired, cancelling outstanding work", budget);
                    expiry.cancel();
                }
            }
        });

        Self {
            token,
            expires_at,
            timer,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_expired(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    /// Expire early
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl Drop for Deadline {
    fn drop(&mut self) {
        self.timer.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_expires_after_budget() {
        let deadline = Deadline::start(Duration::from_millis(10));
        assert!(!deadline.is_expired());

        tokio::time::timeout(Duration::from_secs(5), deadline.token().cancelled())
            .await
            .unwrap();

        assert!(deadline.is_expired());
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_manual_cancel_reaches_clones() {
        let deadline = Deadline::start(DEFAULT_DEADLINE);
        let child = deadline.token().clone();

        deadline.cancel();

        assert!(child.is_cancelled());
        assert!(deadline.remaining() > Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_huge_budget_is_clamped() {
        let deadline = Deadline::start(Duration::from_secs(u64::MAX / 60 * 60));

        assert!(!deadline.is_expired());
        assert!(deadline.remaining() <= MAX_DEADLINE);
        assert!(deadline.remaining() > MAX_DEADLINE - Duration::from_secs(60));
    }
}
