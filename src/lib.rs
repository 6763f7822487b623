//! # math2img
//!
//! Render TeX formulae to bitmap images by chaining two external
//! converters: `tex2svg` (MathJax) turns the formula into SVG and
//! `rsvg-convert` (librsvg) rasterises that SVG to PNG.
//!
//! ## Why shell out?
//!
//! MathJax is the reference TeX-math typesetter and librsvg is the
//! reference SVG rasteriser. Re-implementing either would be a project of
//! its own; driving them as processes gets pixel-identical output for the
//! cost of careful process plumbing, which is what this crate is about.
//!
//! ## Pipeline Overview
//!
//! ```text
//! formula
//!  │
//!  ├─ 1. Launch   tex2svg <formula>  ──pipe──▶  rsvg-convert --format png …
//!  ├─ 2. Collect  decode PNG while waiting on both processes; capture stderr
//!  ├─ 3. Resolve  scope > tex2svg stderr > tex2svg exit > rsvg stderr
//!  │              > rsvg exit > decode  (first match wins)
//!  ├─ 4. Persist  optional: JPEG artifact with cancel + 90 s deletion
//!  └─ 5. Classify user-facing message for every failure kind
//! ```
//!
//! Every step runs under one [`RenderScope`] (10 s by default). When it
//! ends, both converters are killed and the outcome is `Timeout` or
//! `Cancelled`, whatever else went wrong on the way.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use math2img::{RenderConfig, Renderer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Fails at startup if tex2svg or rsvg-convert is not on PATH
//!     let renderer = Renderer::new(RenderConfig::from_env()?);
//!     let scope = renderer.scope();
//!     match renderer.render("E = mc^2", &scope).await {
//!         Ok(image) => println!("{}x{}", image.width(), image.height()),
//!         Err(e) => eprintln!("{}", e.user_message()),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `math2img` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod artifact;
pub mod bot;
pub mod classify;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod render;
pub mod scope;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use artifact::{Artifact, ArtifactStore};
pub use bot::{BotCommand, InlineResult};
pub use config::{ConverterPaths, RasterParams, RenderConfig, RenderConfigBuilder};
pub use error::{OutcomeKind, RenderError, RenderOutcome, SetupError};
pub use render::{RenderReport, Renderer};
pub use scope::{RenderScope, ScopeEnd};
pub use tokio_util::sync::CancellationToken;
