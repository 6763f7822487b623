//! Outcome collection: drain, decode and reap a running [`ProcessPair`].
//!
//! The second stage's stdout must be read while we wait on the processes,
//! never after: rsvg blocks once the pipe buffer fills, and a `wait()` on a
//! blocked writer never returns. Everything here therefore runs inside one
//! `tokio::join!`, and every branch is bounded by the render scope.

use super::launch::ProcessPair;
use crate::scope::RenderScope;
use image::{DynamicImage, ImageFormat};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tracing::{debug, warn};

/// Raw material for outcome resolution. Every field is filled in even when
/// others failed; precedence is decided later in [`super::resolve`].
#[derive(Debug)]
pub struct Collected {
    /// Decoded PNG, or the decode/read error text.
    pub image: Result<DynamicImage, String>,
    /// `Ok` when tex2svg exited with status 0.
    pub first_wait: Result<(), String>,
    /// `Ok` when rsvg exited with status 0.
    pub second_wait: Result<(), String>,
    /// Everything tex2svg wrote to stderr.
    pub first_diagnostics: Vec<u8>,
    /// Everything rsvg wrote to stderr.
    pub second_diagnostics: Vec<u8>,
}

/// Drive both processes to completion and gather their results.
///
/// When the scope ends first, both children are killed; the partially read
/// streams are kept as they are.
pub async fn collect(mut pair: ProcessPair, scope: &RenderScope) -> Collected {
    let first_stderr = pair.first.stderr.take();
    let second_stderr = pair.second.stderr.take();
    let png = pair.second.stdout.take();

    let decode = async {
        let stdout = png.ok_or_else(|| "rsvg stdout was not captured".to_string())?;
        read_image(stdout, scope).await
    };

    let (image, second_wait, first_wait, first_diagnostics, second_diagnostics) = tokio::join!(
        decode,
        wait_or_kill(&mut pair.second, "rsvg", scope),
        wait_or_kill(&mut pair.first, "tex2svg", scope),
        drain_diagnostics(first_stderr, "tex2svg", scope),
        drain_diagnostics(second_stderr, "rsvg", scope),
    );

    Collected {
        image,
        first_wait,
        second_wait,
        first_diagnostics,
        second_diagnostics,
    }
}

/// Wait for `child`, killing it if the scope ends first.
async fn wait_or_kill(child: &mut Child, name: &str, scope: &RenderScope) -> Result<(), String> {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = scope.done() => {
            debug!("Scope ended, killing {} ({:?})", name, child.id());
            if let Err(e) = child.start_kill() {
                debug!("{} already gone: {}", name, e);
            }
            child.wait().await
        }
    };

    match status {
        Ok(s) if s.success() => Ok(()),
        Ok(s) => Err(s.to_string()),
        Err(e) => Err(e.to_string()),
    }
}

/// Read a stream to its end, or until the scope ends.
async fn drain<R>(mut stream: R, scope: &RenderScope) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    tokio::select! {
        res = stream.read_to_end(&mut buf) => { res?; }
        _ = scope.done() => {}
    }
    Ok(buf)
}

async fn drain_diagnostics<R>(stream: Option<R>, name: &str, scope: &RenderScope) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let Some(stream) = stream else {
        return Vec::new();
    };
    match drain(stream, scope).await {
        Ok(buf) => {
            if !buf.is_empty() {
                debug!("{} wrote {} bytes to stderr", name, buf.len());
            }
            buf
        }
        Err(e) => {
            warn!("Failed to read {} stderr: {}", name, e);
            Vec::new()
        }
    }
}

/// Read the PNG and decode it, unless the scope ended while reading: the
/// bytes are then truncated and the outcome is decided by the scope anyway.
async fn read_image<R>(stdout: R, scope: &RenderScope) -> Result<DynamicImage, String>
where
    R: AsyncRead + Unpin,
{
    let bytes = drain(stdout, scope).await.map_err(|e| e.to_string())?;
    debug!("Read {} bytes of PNG from rsvg", bytes.len());
    if scope.end().is_some() {
        return Err("scope ended before the image was read".into());
    }
    decode_png(bytes).await
}

/// PNG decoding is CPU-bound, so it runs off the async worker threads.
async fn decode_png(bytes: Vec<u8>) -> Result<DynamicImage, String> {
    tokio::task::spawn_blocking(move || {
        image::load_from_memory_with_format(&bytes, ImageFormat::Png).map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| format!("decode task panicked: {e}"))?
}
