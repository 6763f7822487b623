//! CLI binary for math2img.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `RenderConfig`, renders one formula and prints the result.

use anyhow::{Context, Result};
use clap::Parser;
use math2img::{
    classify, ConverterPaths, OutcomeKind, RenderConfig, RenderError, RenderScope, Renderer,
};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Render to out.png
  math2img 'E = mc^2'

  # JPEG output, JSON report on stdout
  math2img '\int_0^\infty e^{-x^2}\,dx' -o gauss.jpg --json

  # Use converters outside PATH
  math2img --tex2svg ~/node_modules/.bin/tex2svg 'a^2 + b^2 = c^2'

REQUIREMENTS:
  tex2svg       npm install -g mathjax-node-cli
  rsvg-convert  librsvg (apt install librsvg2-bin / brew install librsvg)

EXIT STATUS:
  0  image written
  1  internal error or startup failure
  2  the formula was rejected by a converter
  3  render timed out or was interrupted
"#;

/// Render a TeX formula to a PNG or JPEG image.
#[derive(Parser, Debug)]
#[command(
    name = "math2img",
    version,
    about = "Render a TeX formula to a PNG or JPEG image",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// TeX formula, without surrounding `$`.
    formula: String,

    /// Output image (.png or .jpg).
    #[arg(short, long, env = "MATH2IMG_OUTPUT", default_value = "out.png")]
    output: PathBuf,

    /// Path to the tex2svg binary (default: search PATH).
    #[arg(long, env = "MATH2IMG_TEX2SVG")]
    tex2svg: Option<PathBuf>,

    /// Path to the rsvg-convert binary (default: search PATH).
    #[arg(long, env = "MATH2IMG_RSVG")]
    rsvg: Option<PathBuf>,

    /// Print a JSON report instead of a summary line.
    #[arg(long, env = "MATH2IMG_JSON")]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MATH2IMG_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "MATH2IMG_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Resolve converters (fatal on failure) ────────────────────────────
    let config = build_config(&cli).context("Startup failed")?;
    let renderer = Renderer::new(config);

    // ── Render, Ctrl-C withdraws the request ─────────────────────────────
    let scope = renderer.scope();
    let interrupt = scope.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupted");
            interrupt.cancel();
        }
    });

    match renderer.render_to_file(&cli.formula, &cli.output, &scope).await {
        Ok(report) => {
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("Failed to serialise report")?
                );
            } else if !cli.quiet {
                eprintln!(
                    "{}  {}x{}  {}ms  →  {}",
                    green("✔"),
                    report.width,
                    report.height,
                    report.elapsed_ms,
                    report.path.display()
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            let (message, status) = failure(err, &scope);
            eprintln!("{} {}", red("✗"), message);
            Ok(ExitCode::from(status))
        }
    }
}

/// Map CLI args to `RenderConfig`.
fn build_config(cli: &Cli) -> Result<RenderConfig> {
    let converters = ConverterPaths::discover_with(cli.tex2svg.clone(), cli.rsvg.clone())?;
    RenderConfig::builder(converters)
        .build()
        .context("Invalid configuration")
}

/// User message and exit status, both taken from the error as settled
/// against the scope.
fn failure(err: RenderError, scope: &RenderScope) -> (String, u8) {
    let settled = classify::settle(err, scope);
    let status = exit_status(settled.kind());
    (classify::user_message(settled, scope, "render"), status)
}

fn exit_status(kind: OutcomeKind) -> u8 {
    match kind {
        OutcomeKind::Image => 0,
        OutcomeKind::Internal => 1,
        OutcomeKind::Upstream => 2,
        OutcomeKind::Timeout | OutcomeKind::Cancelled => 3,
    }
}
