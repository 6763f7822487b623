//! Deadline/cancellation scope bounding one render.
//!
//! A [`RenderScope`] couples a fixed deadline with a [`CancellationToken`].
//! Every process and blocking operation of a render waits on
//! [`RenderScope::done`], so whichever fires first stops all of them at once.
//!
//! The scope also remembers *why* it ended. Processes cannot tell a timeout
//! from a cancellation (both get killed), but the classifier can: the first
//! observed cause is recorded and never changes afterwards.

use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a scope ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeEnd {
    Expired,
    Cancelled,
}

/// Time bound and cancellation signal for one render call.
#[derive(Debug, Clone)]
pub struct RenderScope {
    token: CancellationToken,
    deadline: Instant,
    timeout: Duration,
    ended: Arc<OnceCell<ScopeEnd>>,
}

impl RenderScope {
    /// A scope that is not tied to any caller: only the deadline or an
    /// explicit [`cancel`](Self::cancel) ends it.
    pub fn detached(timeout: Duration) -> Self {
        Self::with_token(CancellationToken::new(), timeout)
    }

    /// A scope that also ends when `parent` is cancelled, e.g. when the
    /// inbound request that asked for the render goes away.
    pub fn child_of(parent: &CancellationToken, timeout: Duration) -> Self {
        Self::with_token(parent.child_token(), timeout)
    }

    fn with_token(token: CancellationToken, timeout: Duration) -> Self {
        Self {
            token,
            deadline: Instant::now() + timeout,
            timeout,
            ended: Default::default(),
        }
    }

    /// The configured duration, used in the timeout message.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Token cancelled when the caller withdraws the request.
    ///
    /// Only explicit cancellation trips it; reaching the deadline does not.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Withdraw the request.
    pub fn cancel(&self) {
        // A deadline that already passed wins over a late cancel.
        if self.end().is_none() {
            let _ = self.ended.set(ScopeEnd::Cancelled);
        }
        self.token.cancel();
    }

    /// Resolves once the deadline passes or the token is cancelled.
    ///
    /// Cancel-safe; any number of tasks may wait on it concurrently.
    pub async fn done(&self) {
        tokio::select! {
            biased;
            _ = tokio::time::sleep_until(self.deadline) => {
                let _ = self.ended.set(ScopeEnd::Expired);
            }
            _ = self.token.cancelled() => {
                let _ = self.ended.set(ScopeEnd::Cancelled);
            }
        }
    }

    /// `None` while the scope is live, otherwise why it ended.
    ///
    /// Stable: once this returns `Some`, every later call returns the same.
    pub fn end(&self) -> Option<ScopeEnd> {
        if let Some(end) = self.ended.get() {
            return Some(*end);
        }
        let observed = if Instant::now() >= self.deadline {
            ScopeEnd::Expired
        } else if self.token.is_cancelled() {
            ScopeEnd::Cancelled
        } else {
            return None;
        };
        Some(*self.ended.get_or_init(|| observed))
    }

    pub fn is_live(&self) -> bool {
        self.end().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn live_until_deadline() {
        let scope = RenderScope::detached(Duration::from_millis(50));
        assert!(scope.is_live());
        scope.done().await;
        assert_eq!(scope.end(), Some(ScopeEnd::Expired));
        assert!(!scope.token().is_cancelled());
    }

    #[tokio::test]
    async fn explicit_cancel() {
        let scope = RenderScope::detached(Duration::from_secs(10));
        scope.cancel();
        scope.done().await;
        assert_eq!(scope.end(), Some(ScopeEnd::Cancelled));
    }

    #[tokio::test]
    async fn parent_cancellation_propagates() {
        let parent = CancellationToken::new();
        let scope = RenderScope::child_of(&parent, Duration::from_secs(10));
        parent.cancel();
        scope.done().await;
        assert_eq!(scope.end(), Some(ScopeEnd::Cancelled));
    }

    #[tokio::test]
    async fn cancel_after_deadline_still_reports_expiry() {
        let scope = RenderScope::detached(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(30)).await;
        scope.cancel();
        assert_eq!(scope.end(), Some(ScopeEnd::Expired));
    }

    #[tokio::test]
    async fn first_cause_sticks() {
        let scope = RenderScope::detached(Duration::from_millis(20));
        scope.cancel();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(scope.end(), Some(ScopeEnd::Cancelled));
        assert_eq!(scope.end(), Some(ScopeEnd::Cancelled));
    }

    #[tokio::test]
    async fn clones_share_state() {
        let scope = RenderScope::detached(Duration::from_secs(10));
        let other = scope.clone();
        other.cancel();
        assert_eq!(scope.end(), Some(ScopeEnd::Cancelled));
    }
}
