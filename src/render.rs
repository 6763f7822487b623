//! Render entry points.
//!
//! [`Renderer::render`] is the core operation: formula in, one
//! [`RenderOutcome`] out, bounded by a [`RenderScope`]. The other methods
//! compose it with the artifact store or a plain output file for the
//! transports built on top.

use crate::artifact::{Artifact, ArtifactStore};
use crate::classify;
use crate::config::RenderConfig;
use crate::error::{outcome_kind, RenderError, RenderOutcome};
use crate::pipeline::{collect, launch, resolve};
use crate::scope::RenderScope;
use image::{DynamicImage, ImageFormat};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Summary of a render written to disk.
#[derive(Debug, Clone, Serialize)]
pub struct RenderReport {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub elapsed_ms: u64,
}

/// Renders formulae with one fixed set of converters.
///
/// Cheap to clone; clones share the configuration.
///
/// # Example
/// ```rust,no_run
/// use math2img::{RenderConfig, Renderer};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let renderer = Renderer::new(RenderConfig::from_env()?);
/// let scope = renderer.scope();
/// let image = renderer.render("E = mc^2", &scope).await?;
/// println!("{}x{}", image.width(), image.height());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Renderer {
    config: Arc<RenderConfig>,
}

impl Renderer {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// A fresh scope with the configured timeout, not tied to any caller.
    pub fn scope(&self) -> RenderScope {
        RenderScope::detached(self.config.timeout)
    }

    /// A fresh scope that also ends when `parent` is cancelled.
    pub fn scope_for(&self, parent: &CancellationToken) -> RenderScope {
        RenderScope::child_of(parent, self.config.timeout)
    }

    /// Render `formula` to a bitmap.
    ///
    /// The formula is handed to tex2svg unvalidated; rejecting it is
    /// tex2svg's job and comes back as [`RenderError::Upstream`].
    pub async fn render(&self, formula: &str, scope: &RenderScope) -> RenderOutcome {
        let start = Instant::now();

        if let Some(end) = scope.end() {
            return Err(classify::from_scope_end(end, scope.timeout()));
        }

        let pair = launch::spawn_pair(&self.config.converters, self.config.raster(), formula)
            .await
            .map_err(|e| classify::settle(e, scope))?;
        debug!(pids = ?pair.pids(), "Converters running");

        let collected = collect::collect(pair, scope).await;
        let outcome = resolve::resolve(&collected, scope);

        debug!(
            kind = %outcome_kind(&outcome),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Render finished"
        );
        outcome
    }

    /// Render and persist the image as a transient artifact keyed by `id`.
    ///
    /// The artifact's cancellation trigger is the scope's token, so a
    /// caller withdrawing the request also removes the file. The encode is
    /// bounded by the scope deadline like every other step.
    pub async fn render_to_artifact(
        &self,
        id: &str,
        formula: &str,
        scope: &RenderScope,
        store: &ArtifactStore,
    ) -> Result<Artifact, RenderError> {
        let image = self.render(formula, scope).await?;
        let artifact = store
            .persist_until(id, &image, scope.token(), Some(scope.deadline()))
            .await
            .map_err(|e| classify::settle(e, scope))?;
        info!(
            "Rendered {} → {} ({}x{})",
            id,
            artifact.path().display(),
            artifact.width(),
            artifact.height()
        );
        Ok(artifact)
    }

    /// Render and write the image to `output_path` (PNG or JPEG, chosen
    /// by extension).
    ///
    /// Uses atomic write (temp file + rename) to prevent partial files.
    pub async fn render_to_file(
        &self,
        formula: &str,
        output_path: impl AsRef<Path>,
        scope: &RenderScope,
    ) -> Result<RenderReport, RenderError> {
        let start = Instant::now();
        let path = output_path.as_ref().to_path_buf();
        let format = output_format(&path)?;

        let image = self.render(formula, scope).await?;
        let (width, height) = (image.width(), image.height());

        let target = path.clone();
        tokio::task::spawn_blocking(move || save_atomic(&image, &target, format))
            .await
            .map_err(|e| RenderError::Internal(format!("save task panicked: {e}")))?
            .map_err(|e| classify::settle(e, scope))?;

        Ok(RenderReport {
            path,
            width,
            height,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }
}

fn output_format(path: &Path) -> Result<ImageFormat, RenderError> {
    match ImageFormat::from_path(path) {
        Ok(f @ (ImageFormat::Png | ImageFormat::Jpeg)) => Ok(f),
        _ => Err(RenderError::Internal(format!(
            "unsupported output format for '{}' (use .png or .jpg)",
            path.display()
        ))),
    }
}

fn save_atomic(image: &DynamicImage, path: &Path, format: ImageFormat) -> Result<(), RenderError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| RenderError::Internal(format!("create output dir: {e}")))?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let result = match format {
        // JPEG has no alpha channel.
        ImageFormat::Jpeg => {
            DynamicImage::ImageRgb8(image.to_rgb8()).save_with_format(&tmp_path, format)
        }
        _ => image.save_with_format(&tmp_path, format),
    };
    if let Err(e) = result {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(RenderError::Internal(format!("write output: {e}")));
    }

    std::fs::rename(&tmp_path, path)
        .map_err(|e| RenderError::Internal(format!("rename output: {e}")))
}
