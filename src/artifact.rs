//! Transient artifacts: rendered images parked on disk for a short while.
//!
//! A chat service cannot receive our bitmap directly; it fetches it from a
//! URL we hand out. The image is therefore written to `<dir>/<id>.jpg` and
//! kept only as long as the fetch plausibly needs.
//!
//! ## Lifetime
//!
//! Two independent triggers are armed the moment the file is created, before
//! a single byte is encoded:
//!
//! * the caller's cancellation token: the open file handle stops accepting
//!   writes and the file is deleted right away;
//! * a grace timer (90 s by default): the file is deleted.
//!
//! A render deadline, when given, only closes the handle: the encode fails
//! and the partial file is left to the grace timer.
//!
//! Both share one [`Cleanup`] guard. Whichever fires first deletes the file;
//! the other finds the guard settled and does nothing. A file left half
//! written by a failed encode is still removed by the timer.

use crate::error::{RenderError, SetupError};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbImage};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// JPEG quality used for artifacts.
pub const JPEG_QUALITY: u8 = 75;

/// Directory of transient artifacts.
#[derive(Debug)]
pub struct ArtifactStore {
    dir: PathBuf,
    grace: Duration,
    /// Owned temp dir, removed with everything in it when the store drops.
    _temp: Option<TempDir>,
}

impl ArtifactStore {
    /// A private temp directory (`math2img*`) that is deleted on drop.
    pub fn temporary(grace: Duration) -> Result<Self, SetupError> {
        let temp = tempfile::Builder::new()
            .prefix("math2img")
            .tempdir()
            .map_err(|source| SetupError::ArtifactDir { source })?;
        debug!("Artifact directory: {}", temp.path().display());
        Ok(Self {
            dir: temp.path().to_path_buf(),
            grace,
            _temp: Some(temp),
        })
    }

    /// Use (and create if needed) a caller-chosen directory.
    pub fn in_dir(dir: impl Into<PathBuf>, grace: Duration) -> Result<Self, SetupError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| SetupError::ArtifactDir { source })?;
        Ok(Self {
            dir,
            grace,
            _temp: None,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// File name for request `id`: `<id>.jpg`.
    pub fn file_name(id: &str) -> Result<String, RenderError> {
        let unsafe_id = id.is_empty()
            || id == "."
            || id == ".."
            || id.contains(['/', '\\', '\0']);
        if unsafe_id {
            return Err(RenderError::Internal(format!(
                "invalid artifact id {id:?}"
            )));
        }
        Ok(format!("{id}.jpg"))
    }

    /// Write `image` as `<dir>/<id>.jpg` and arm both deletion triggers.
    ///
    /// Encoding failures surface as [`RenderError::Internal`]; the partly
    /// written file is still deleted once the grace period elapses.
    pub async fn persist(
        &self,
        id: &str,
        image: &DynamicImage,
        cancel: &CancellationToken,
    ) -> Result<Artifact, RenderError> {
        self.persist_until(id, image, cancel, None).await
    }

    /// Like [`persist`](Self::persist), but the file handle is also closed
    /// once `deadline` passes, failing an encode that runs late.
    ///
    /// Only `cancel` deletes the file early; a missed deadline leaves the
    /// partial file to the grace timer.
    pub async fn persist_until(
        &self,
        id: &str,
        image: &DynamicImage,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<Artifact, RenderError> {
        let file_name = Self::file_name(id)?;
        let path = self.dir.join(&file_name);

        let file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| RenderError::Internal(format!("create temp file: {e}")))?
            .into_std()
            .await;

        let cleanup = Arc::new(Cleanup::new(path.clone()));
        arm_cancellation(Arc::clone(&cleanup), cancel.clone());
        arm_grace_timer(Arc::clone(&cleanup), self.grace);

        let close = cancel.child_token();
        // Stops the deadline task once the encode is over, whatever its result.
        let _encode_done = close.clone().drop_guard();
        if let Some(deadline) = deadline {
            arm_deadline(close.clone(), deadline);
        }

        let writer = CancellableWriter {
            inner: BufWriter::new(file),
            cancel: close,
        };
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();

        tokio::task::spawn_blocking(move || encode_jpeg(&rgb, writer))
            .await
            .map_err(|e| RenderError::Internal(format!("encode task panicked: {e}")))?
            .map_err(|e| RenderError::Internal(format!("encode jpeg: {e}")))?;

        debug!("Artifact {} written ({}x{})", path.display(), width, height);
        Ok(Artifact {
            path,
            file_name,
            width,
            height,
            cleanup,
        })
    }
}

/// A persisted image and its deletion guard.
#[derive(Debug, Clone)]
pub struct Artifact {
    path: PathBuf,
    file_name: String,
    width: u32,
    height: u32,
    cleanup: Arc<Cleanup>,
}

impl Artifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `<id>.jpg`, the name a file server exposes it under.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Whether either trigger (or [`remove`](Self::remove)) has run.
    pub fn is_removed(&self) -> bool {
        self.cleanup.is_settled()
    }

    /// Delete now. Later triggers become no-ops.
    pub async fn remove(&self) {
        self.cleanup.remove().await;
    }
}

/// Delete-once guard shared by the deletion triggers.
#[derive(Debug)]
struct Cleanup {
    path: PathBuf,
    removed: AtomicBool,
    settled: CancellationToken,
}

impl Cleanup {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            removed: AtomicBool::new(false),
            settled: CancellationToken::new(),
        }
    }

    fn is_settled(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }

    async fn remove(&self) {
        if self.removed.swap(true, Ordering::SeqCst) {
            return;
        }
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!("Artifact removed: {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove artifact {}: {}", self.path.display(), e),
        }
        self.settled.cancel();
    }
}

fn arm_cancellation(cleanup: Arc<Cleanup>, cancel: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => cleanup.remove().await,
            // Nothing left to guard once the timer has deleted the file.
            _ = cleanup.settled.cancelled() => {}
        }
    });
}

fn arm_deadline(close: CancellationToken, deadline: Instant) {
    if Instant::now() >= deadline {
        close.cancel();
        return;
    }
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => close.cancel(),
            _ = close.cancelled() => {}
        }
    });
}

fn arm_grace_timer(cleanup: Arc<Cleanup>, grace: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        cleanup.remove().await;
    });
}

/// File writer that refuses further writes once `cancel` fires, as if the
/// handle had been closed under the encoder.
struct CancellableWriter<W> {
    inner: W,
    cancel: CancellationToken,
}

impl<W> CancellableWriter<W> {
    fn check(&self) -> io::Result<()> {
        if self.cancel.is_cancelled() {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "artifact file closed by cancellation",
            ));
        }
        Ok(())
    }
}

impl<W: Write> Write for CancellableWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check()?;
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.check()?;
        self.inner.flush()
    }
}

fn encode_jpeg<W: Write>(rgb: &RgbImage, mut writer: W) -> image::ImageResult<()> {
    let encoder = JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY);
    rgb.write_with_encoder(encoder)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn formula_like() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(30, 12, Rgba([255, 255, 255, 255])))
    }

    #[test]
    fn file_name_rejects_traversal() {
        assert_eq!(ArtifactStore::file_name("4242").unwrap(), "4242.jpg");
        for bad in ["", ".", "..", "../etc/passwd", "a/b", "a\\b"] {
            assert!(ArtifactStore::file_name(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[tokio::test]
    async fn persist_writes_readable_jpeg() {
        let store = ArtifactStore::temporary(Duration::from_secs(60)).unwrap();
        let token = CancellationToken::new();
        let artifact = store.persist("17", &formula_like(), &token).await.unwrap();

        assert_eq!(artifact.file_name(), "17.jpg");
        assert_eq!((artifact.width(), artifact.height()), (30, 12));
        let decoded = image::open(artifact.path()).expect("readable jpeg");
        assert_eq!((decoded.width(), decoded.height()), (30, 12));
        assert!(!artifact.is_removed());
    }

    #[tokio::test]
    async fn grace_timer_deletes_file() {
        let store = ArtifactStore::temporary(Duration::from_millis(100)).unwrap();
        let token = CancellationToken::new();
        let artifact = store.persist("grace", &formula_like(), &token).await.unwrap();
        assert!(artifact.path().exists());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!artifact.path().exists());
        assert!(artifact.is_removed());
    }

    #[tokio::test]
    async fn cancellation_deletes_before_grace() {
        let store = ArtifactStore::temporary(Duration::from_millis(300)).unwrap();
        let token = CancellationToken::new();
        let artifact = store.persist("cancel", &formula_like(), &token).await.unwrap();

        token.cancel();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!artifact.path().exists());

        // The timer still fires later and must be a quiet no-op.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!artifact.path().exists());
        assert!(artifact.is_removed());
    }

    #[tokio::test]
    async fn cancelled_before_encode_fails_and_cleans_up() {
        let store = ArtifactStore::temporary(Duration::from_secs(60)).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let err = store
            .persist("early", &formula_like(), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Internal(ref m) if m.starts_with("encode jpeg:")));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!store.dir().join("early.jpg").exists());
    }

    #[tokio::test]
    async fn deadline_closes_file_mid_encode() {
        let store = ArtifactStore::temporary(Duration::from_millis(300)).unwrap();
        let token = CancellationToken::new();
        let big = DynamicImage::ImageRgb8(RgbImage::from_fn(2000, 2000, |x, y| {
            image::Rgb([(x % 251) as u8, (y % 241) as u8, ((x ^ y) % 239) as u8])
        }));
        let deadline = Instant::now() + Duration::from_millis(5);

        let err = store
            .persist_until("late", &big, &token, Some(deadline))
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Internal(ref m) if m.starts_with("encode jpeg:")));
        // The caller did not withdraw the request: the file waits for the timer.
        assert!(!token.is_cancelled());
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(!store.dir().join("late.jpg").exists());
    }

    #[tokio::test]
    async fn deadline_after_encode_keeps_artifact() {
        let store = ArtifactStore::temporary(Duration::from_secs(60)).unwrap();
        let token = CancellationToken::new();
        let deadline = Instant::now() + Duration::from_secs(30);
        let artifact = store
            .persist_until("ontime", &formula_like(), &token, Some(deadline))
            .await
            .unwrap();
        assert!(artifact.path().exists());
        assert!(!artifact.is_removed());
    }

    #[tokio::test]
    async fn manual_remove_is_idempotent() {
        let store = ArtifactStore::temporary(Duration::from_secs(60)).unwrap();
        let token = CancellationToken::new();
        let artifact = store.persist("twice", &formula_like(), &token).await.unwrap();
        artifact.remove().await;
        artifact.remove().await;
        token.cancel();
        assert!(!artifact.path().exists());
    }

    #[tokio::test]
    async fn in_dir_creates_directory() {
        let parent = tempfile::tempdir().unwrap();
        let dir = parent.path().join("pop");
        let store = ArtifactStore::in_dir(&dir, Duration::from_secs(60)).unwrap();
        assert!(dir.is_dir());
        assert_eq!(store.dir(), dir.as_path());
    }

    #[test]
    fn cancellable_writer_refuses_after_cancel() {
        let token = CancellationToken::new();
        let mut w = CancellableWriter {
            inner: Vec::new(),
            cancel: token.clone(),
        };
        w.write_all(b"ok").unwrap();
        token.cancel();
        assert_eq!(
            w.write(b"more").unwrap_err().kind(),
            io::ErrorKind::BrokenPipe
        );
        assert_eq!(w.inner, b"ok");
    }
}
