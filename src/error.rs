//! Error types for the math2img library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`SetupError`] — **Fatal**: the renderer cannot be constructed at all
//!   (a converter binary is missing, the artifact directory cannot be
//!   created, the configuration is invalid). Happens once, at startup.
//!
//! * [`RenderError`] — **Per request**: one formula failed to render. The
//!   process keeps serving other requests; the error is classified and
//!   reported back to whoever asked for the formula.
//!
//! A render produces exactly one [`RenderOutcome`]: either the decoded image
//! or one of the four [`RenderError`] kinds.

use image::DynamicImage;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// The terminal result of one render call.
pub type RenderOutcome = Result<DynamicImage, RenderError>;

/// Generic sentence shown to end users for [`RenderError::Internal`].
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// Fatal errors raised while setting the renderer up.
#[derive(Debug, Error)]
pub enum SetupError {
    /// A converter binary could not be resolved on `PATH`.
    #[error("{name} not found\nInstall it and make sure it is on PATH, or pass its path explicitly.")]
    ConverterNotFound { name: String },

    /// The directory holding transient artifacts could not be created.
    #[error("Failed to create artifact directory: {source}")]
    ArtifactDir {
        #[source]
        source: std::io::Error,
    },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Why a single render did not produce an image.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    /// A converter rejected the formula or the intermediate SVG. The text is
    /// the converter's trimmed diagnostic output and is meant for the user.
    #[error("{0}")]
    Upstream(String),

    /// The render deadline elapsed before the converters finished.
    #[error("Render timeout exceeded ({})", format_duration(*timeout))]
    Timeout { timeout: Duration },

    /// The caller withdrew the request.
    #[error("Render job has been canceled")]
    Cancelled,

    /// Process, pipe or codec failure unrelated to the formula.
    #[error("{0}")]
    Internal(String),
}

/// Discriminant of a [`RenderOutcome`], handy for logging and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Image,
    Upstream,
    Timeout,
    Cancelled,
    Internal,
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutcomeKind::Image => "image",
            OutcomeKind::Upstream => "upstream",
            OutcomeKind::Timeout => "timeout",
            OutcomeKind::Cancelled => "cancelled",
            OutcomeKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

impl RenderError {
    /// Which outcome kind this error represents.
    pub fn kind(&self) -> OutcomeKind {
        match self {
            RenderError::Upstream(_) => OutcomeKind::Upstream,
            RenderError::Timeout { .. } => OutcomeKind::Timeout,
            RenderError::Cancelled => OutcomeKind::Cancelled,
            RenderError::Internal(_) => OutcomeKind::Internal,
        }
    }

    /// The sentence an end user gets to see.
    ///
    /// Converter diagnostics are shown verbatim, timeouts and cancellations
    /// use fixed sentences, and internal failures never leak their detail.
    pub fn user_message(&self) -> String {
        match self {
            RenderError::Internal(_) => INTERNAL_ERROR_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

/// Kind of any outcome, image included.
pub fn outcome_kind(outcome: &RenderOutcome) -> OutcomeKind {
    match outcome {
        Ok(_) => OutcomeKind::Image,
        Err(e) => e.kind(),
    }
}

/// `10s`, `1500ms`: whole seconds when possible, milliseconds otherwise.
pub(crate) fn format_duration(d: Duration) -> String {
    if d.subsec_millis() == 0 && d.as_secs() > 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}ms", d.as_millis())
    }
}
