//! Outcome classification: one stable, user-presentable message per failure.
//!
//! The same rules apply no matter how the message is delivered (inline
//! answer bound to an HTTP request, chat reply, CLI stderr):
//!
//! * scope expired → "Render timeout exceeded (10s)"
//! * scope cancelled → "Render job has been canceled"
//! * upstream → the converter's own text
//! * internal → a generic sentence; the detail goes to the log only
//!
//! A scope that has ended dominates whatever error was raised while it
//! ended: a killed converter or a closed artifact file are consequences of
//! the timeout, not causes worth reporting.

use crate::error::RenderError;
use crate::scope::{RenderScope, ScopeEnd};
use std::time::Duration;
use tracing::{debug, error};

/// The error a finished scope stands for.
pub fn from_scope_end(end: ScopeEnd, timeout: Duration) -> RenderError {
    match end {
        ScopeEnd::Expired => RenderError::Timeout { timeout },
        ScopeEnd::Cancelled => RenderError::Cancelled,
    }
}

/// Combine a raw error with the current scope state.
pub fn settle(err: RenderError, scope: &RenderScope) -> RenderError {
    let Some(end) = scope.end() else {
        return err;
    };
    let settled = from_scope_end(end, scope.timeout());
    if settled != err {
        debug!("Superseded by {}: {}", settled.kind(), err);
    }
    settled
}

/// Classify `err` and return the message to show the requester.
///
/// `context` names the failing step in the log line (e.g. `"render"`,
/// `"dump jpeg"`).
pub fn user_message(err: RenderError, scope: &RenderScope, context: &str) -> String {
    let settled = settle(err, scope);
    if let RenderError::Internal(detail) = &settled {
        error!("{}: {}", context, detail);
    }
    settled.user_message()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::INTERNAL_ERROR_MESSAGE;

    #[tokio::test]
    async fn live_scope_passes_errors_through() {
        let scope = RenderScope::detached(Duration::from_secs(10));
        let err = RenderError::Upstream("Missing open brace for subscript".into());
        assert_eq!(settle(err.clone(), &scope), err);
    }

    #[tokio::test]
    async fn expired_scope_masks_internal_error() {
        let scope = RenderScope::detached(Duration::ZERO);
        let msg = user_message(
            RenderError::Internal("encode jpeg: Broken pipe".into()),
            &scope,
            "dump jpeg",
        );
        assert_eq!(msg, "Render timeout exceeded (0ms)");
    }

    #[tokio::test]
    async fn timeout_message_names_configured_value() {
        let scope = RenderScope::detached(Duration::from_secs(10));
        let err = from_scope_end(ScopeEnd::Expired, scope.timeout());
        assert_eq!(err.user_message(), "Render timeout exceeded (10s)");
    }

    #[tokio::test]
    async fn cancelled_scope_message() {
        let scope = RenderScope::detached(Duration::from_secs(10));
        scope.cancel();
        let msg = user_message(RenderError::Internal("x".into()), &scope, "render");
        assert_eq!(msg, "Render job has been canceled");
    }

    #[tokio::test]
    async fn internal_detail_stays_in_the_log() {
        let scope = RenderScope::detached(Duration::from_secs(10));
        let msg = user_message(
            RenderError::Internal("wait on second-stage: exit status: 1".into()),
            &scope,
            "render",
        );
        assert_eq!(msg, INTERNAL_ERROR_MESSAGE);
    }
}
