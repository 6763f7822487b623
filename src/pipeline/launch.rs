//! Process pair launch: `tex2svg <formula> | rsvg-convert ... /dev/stdin`.
//!
//! The first stage's stdout file descriptor is handed straight to the second
//! stage as its stdin, so the SVG flows kernel-side from one process to the
//! other and never passes through our memory. Both diagnostic streams, and
//! the second stage's stdout, stay piped back to us for the collector.
//!
//! Both children are spawned with `kill_on_drop`, so a render future that is
//! dropped half-way cannot leak converters.

use crate::config::{ConverterPaths, RasterParams};
use crate::error::RenderError;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// The two running converters of one render.
#[derive(Debug)]
pub struct ProcessPair {
    pub first: Child,
    pub second: Child,
}

impl ProcessPair {
    /// OS pids of `(first, second)`, `None` once a child has been reaped.
    pub fn pids(&self) -> (Option<u32>, Option<u32>) {
        (self.first.id(), self.second.id())
    }
}

/// Start both converters and connect them.
///
/// On any failure the already-started first stage is killed and reaped
/// before returning, so no partial pair outlives this call.
pub async fn spawn_pair(
    converters: &ConverterPaths,
    raster: &RasterParams,
    formula: &str,
) -> Result<ProcessPair, RenderError> {
    let mut first = Command::new(&converters.tex2svg)
        .arg(formula)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| RenderError::Internal(format!("start tex2svg: {e}")))?;
    debug!(pid = ?first.id(), "tex2svg started");

    let svg: Stdio = match first.stdout.take().map(TryInto::<Stdio>::try_into) {
        Some(Ok(stdio)) => stdio,
        Some(Err(e)) => {
            terminate(&mut first).await;
            return Err(RenderError::Internal(format!(
                "create stdout pipe on tex2svg: {e}"
            )));
        }
        None => {
            terminate(&mut first).await;
            return Err(RenderError::Internal(
                "create stdout pipe on tex2svg: stdout was not captured".into(),
            ));
        }
    };

    // The Command is a temporary, so our copy of the pipe's read end is
    // closed as soon as the second stage owns it.
    let second = Command::new(&converters.rsvg)
        .args(raster.to_args())
        .stdin(svg)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    match second {
        Ok(second) => {
            debug!(pid = ?second.id(), "rsvg started");
            Ok(ProcessPair { first, second })
        }
        Err(e) => {
            terminate(&mut first).await;
            Err(RenderError::Internal(format!("start rsvg: {e}")))
        }
    }
}

/// Kill and reap a child that will not be collected normally.
async fn terminate(child: &mut Child) {
    if let Err(e) = child.kill().await {
        warn!("Failed to kill converter {:?}: {}", child.id(), e);
    }
}
