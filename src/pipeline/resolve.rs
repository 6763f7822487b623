//! Outcome resolution: turn [`Collected`] into exactly one [`RenderOutcome`].
//!
//! ## Precedence
//!
//! First matching rule wins:
//!
//! 1. scope ended → `Timeout` / `Cancelled`
//! 2. tex2svg stderr non-empty → `Upstream` (trimmed stderr)
//! 3. tex2svg exit failure → `Internal("wait on first-stage: …")`
//! 4. rsvg stderr non-empty → `Upstream` (trimmed stderr)
//! 5. rsvg exit failure → `Internal("wait on second-stage: …")`
//! 6. PNG decode failure → `Internal("decode image: …")`
//! 7. `Ok(image)`
//!
//! The scope comes first because killed processes produce noise on every
//! other channel. tex2svg stderr is checked before its exit status because
//! tex2svg reports TeX errors on stderr and still exits 0.
//!
//! rsvg stderr has no known trigger in practice but is kept as an upstream
//! signal all the same.

use super::collect::Collected;
use crate::classify;
use crate::error::{RenderError, RenderOutcome};
use crate::scope::RenderScope;

/// Resolve the outcome of a finished process pair.
///
/// Pure with respect to `collected`: calling it twice on the same state
/// yields the same outcome.
pub fn resolve(collected: &Collected, scope: &RenderScope) -> RenderOutcome {
    if let Some(end) = scope.end() {
        return Err(classify::from_scope_end(end, scope.timeout()));
    }

    if !collected.first_diagnostics.is_empty() {
        return Err(RenderError::Upstream(trimmed(&collected.first_diagnostics)));
    }
    if let Err(e) = &collected.first_wait {
        return Err(RenderError::Internal(format!("wait on first-stage: {e}")));
    }

    if !collected.second_diagnostics.is_empty() {
        return Err(RenderError::Upstream(trimmed(&collected.second_diagnostics)));
    }
    if let Err(e) = &collected.second_wait {
        return Err(RenderError::Internal(format!("wait on second-stage: {e}")));
    }

    match &collected.image {
        Ok(image) => Ok(image.clone()),
        Err(e) => Err(RenderError::Internal(format!("decode image: {e}"))),
    }
}

fn trimmed(diagnostics: &[u8]) -> String {
    String::from_utf8_lossy(diagnostics).trim().to_string()
}
