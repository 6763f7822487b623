//! Configuration types for formula rendering.
//!
//! Everything the renderer needs is resolved once at startup into a
//! [`RenderConfig`] and passed by reference into every render call. There is
//! no process-wide mutable state: two renderers with different converter
//! binaries can live side by side (the integration tests rely on this).

use crate::error::SetupError;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Default render deadline, measured from request start.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default lifetime of a transient artifact before it is deleted.
pub const DEFAULT_ARTIFACT_GRACE: Duration = Duration::from_secs(90);

/// Locations of the two chained converters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConverterPaths {
    /// First stage: formula → SVG (`tex2svg`, from mathjax-node-cli).
    pub tex2svg: PathBuf,
    /// Second stage: SVG → PNG (`rsvg-convert` from librsvg).
    pub rsvg: PathBuf,
}

impl ConverterPaths {
    pub fn new(tex2svg: impl Into<PathBuf>, rsvg: impl Into<PathBuf>) -> Self {
        Self {
            tex2svg: tex2svg.into(),
            rsvg: rsvg.into(),
        }
    }

    /// Resolve both converters from `PATH`.
    ///
    /// The second stage is looked up as `rsvg-convert` first, then as the
    /// older `rsvg` name. Failure here is a startup error, never a
    /// per-request one.
    pub fn discover() -> Result<Self, SetupError> {
        Self::discover_with(None, None)
    }

    /// Like [`discover`](Self::discover), but explicit paths win and are
    /// used as given.
    pub fn discover_with(
        tex2svg: Option<PathBuf>,
        rsvg: Option<PathBuf>,
    ) -> Result<Self, SetupError> {
        let tex2svg = match tex2svg {
            Some(path) => path,
            None => which::which("tex2svg").map_err(|_| SetupError::ConverterNotFound {
                name: "tex2svg".into(),
            })?,
        };
        info!("tex2svg found at {}", tex2svg.display());

        let rsvg = match rsvg {
            Some(path) => path,
            None => which::which("rsvg-convert")
                .or_else(|_| which::which("rsvg"))
                .map_err(|_| SetupError::ConverterNotFound {
                    name: "rsvg (rsvg-convert)".into(),
                })?,
        };
        info!("rsvg found at {}", rsvg.display());

        Ok(Self { tex2svg, rsvg })
    }
}

/// Fixed parameters handed to the second-stage converter.
///
/// Constants, not tunable: `--format png --zoom 3.0 --background-color
/// white`. The collector decodes PNG only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterParams {
    format: &'static str,
    /// MathJax SVGs are sized in `ex` units and come out tiny at 1.0.
    zoom: &'static str,
    /// The SVG itself is transparent.
    background: &'static str,
}

impl Default for RasterParams {
    fn default() -> Self {
        Self {
            format: "png",
            zoom: "3.0",
            background: "white",
        }
    }
}

impl RasterParams {
    /// Arguments for the second stage, reading the SVG from its stdin.
    pub fn to_args(&self) -> Vec<String> {
        [
            "--format",
            self.format,
            "--zoom",
            self.zoom,
            "--background-color",
            self.background,
            "/dev/stdin",
        ]
        .map(String::from)
        .to_vec()
    }
}

/// Process-level rendering configuration.
///
/// Built via [`RenderConfig::builder()`]; the builder starts from the
/// defaults and only needs the converter locations.
///
/// # Example
/// ```rust
/// use math2img::{ConverterPaths, RenderConfig};
/// use std::time::Duration;
///
/// let config = RenderConfig::builder(ConverterPaths::new("/usr/bin/tex2svg", "/usr/bin/rsvg-convert"))
///     .timeout(Duration::from_secs(5))
///     .build()
///     .unwrap();
/// assert_eq!(config.timeout, Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub converters: ConverterPaths,

    /// Deadline for one render, from request start. Default: 10 s.
    pub timeout: Duration,

    /// How long a transient artifact stays on disk. Default: 90 s.
    ///
    /// Long enough for a chat service to fetch the image from the URL we
    /// hand it; short enough that the directory never grows unbounded.
    pub artifact_grace: Duration,

    raster: RasterParams,
}

impl RenderConfig {
    /// Create a builder seeded with defaults and the given converters.
    pub fn builder(converters: ConverterPaths) -> RenderConfigBuilder {
        RenderConfigBuilder {
            config: RenderConfig {
                converters,
                timeout: DEFAULT_TIMEOUT,
                artifact_grace: DEFAULT_ARTIFACT_GRACE,
                raster: RasterParams::default(),
            },
        }
    }

    /// Second-stage parameters; always the defaults.
    pub fn raster(&self) -> &RasterParams {
        &self.raster
    }

    /// Discover converters on `PATH` and use every default.
    pub fn from_env() -> Result<Self, SetupError> {
        Self::builder(ConverterPaths::discover()?).build()
    }
}

/// Builder for [`RenderConfig`].
#[derive(Debug)]
pub struct RenderConfigBuilder {
    config: RenderConfig,
}

impl RenderConfigBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn artifact_grace(mut self, grace: Duration) -> Self {
        self.config.artifact_grace = grace;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<RenderConfig, SetupError> {
        let c = &self.config;
        if c.timeout.is_zero() {
            return Err(SetupError::InvalidConfig("timeout must be > 0".into()));
        }
        if c.artifact_grace.is_zero() {
            return Err(SetupError::InvalidConfig(
                "artifact grace period must be > 0".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths() -> ConverterPaths {
        ConverterPaths::new("/opt/tex2svg", "/opt/rsvg-convert")
    }

    #[test]
    fn defaults() {
        let c = RenderConfig::builder(paths()).build().unwrap();
        assert_eq!(c.timeout, Duration::from_secs(10));
        assert_eq!(c.artifact_grace, Duration::from_secs(90));
        assert_eq!(c.raster(), &RasterParams::default());
    }

    #[test]
    fn raster_args() {
        let args = RasterParams::default().to_args();
        assert_eq!(
            args,
            [
                "--format",
                "png",
                "--zoom",
                "3.0",
                "--background-color",
                "white",
                "/dev/stdin"
            ]
        );
    }

    #[test]
    fn rejects_zero_timeout() {
        let err = RenderConfig::builder(paths())
            .timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, SetupError::InvalidConfig(_)));
    }

    #[test]
    fn raster_params_survive_the_builder() {
        let c = RenderConfig::builder(paths())
            .timeout(Duration::from_secs(3))
            .artifact_grace(Duration::from_secs(5))
            .build()
            .unwrap();
        assert_eq!(c.raster(), &RasterParams::default());
        assert_eq!(c.raster().to_args()[3], "3.0");
    }

    #[test]
    fn explicit_paths_skip_lookup() {
        let p = ConverterPaths::discover_with(
            Some("/opt/a/tex2svg".into()),
            Some("/opt/b/rsvg-convert".into()),
        )
        .unwrap();
        assert_eq!(p, ConverterPaths::new("/opt/a/tex2svg", "/opt/b/rsvg-convert"));
    }

    #[test]
    fn discover_agrees_with_which() {
        let expected = which::which("tex2svg").is_ok()
            && (which::which("rsvg-convert").is_ok() || which::which("rsvg").is_ok());
        assert_eq!(ConverterPaths::discover().is_ok(), expected);
    }
}
