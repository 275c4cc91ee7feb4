//! Best-effort live preview.
//!
//! A background thread that periodically grabs a frame from the shared source
//! and hands it to a `PreviewSink`. It never waits for the pipeline: if the source
//! is busy the tick is skipped. Frames the preview takes are not seen by the
//! pipeline, so previews trade a little frame rate for visibility.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, TryLockError};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::frame::{Frame, SNAPSHOT_JPEG_QUALITY};
use crate::ingest::FrameSource;

/// Where preview frames go.
pub trait PreviewSink: Send {
    fn show(&mut self, frame: &Frame) -> Result<()>;
}

/// Overwrites one JPEG file with the latest frame (atomically, via rename).
pub struct JpegFileSink {
    path: PathBuf,
    quality: u8,
}

impl JpegFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            quality: SNAPSHOT_JPEG_QUALITY,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreviewSink for JpegFileSink {
    fn show(&mut self, frame: &Frame) -> Result<()> {
        let bytes = frame.encode_jpeg(self.quality)?;
        let tmp = self.path.with_extension("jpg.tmp");
        std::fs::write(&tmp, bytes)
            .with_context(|| format!("write preview {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("publish preview {}", self.path.display()))?;
        Ok(())
    }
}

pub struct PreviewRenderer<K: PreviewSink> {
    source: Arc<Mutex<dyn FrameSource>>,
    sink: K,
    interval: Duration,
}

impl<K: PreviewSink + 'static> PreviewRenderer<K> {
    pub fn new(source: Arc<Mutex<dyn FrameSource>>, sink: K, interval: Duration) -> Self {
        Self {
            source,
            sink,
            interval,
        }
    }

    pub fn spawn(self) -> Result<PreviewHandle> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let rendered = Arc::new(AtomicU64::new(0));
        let shutdown_thread = shutdown.clone();
        let rendered_thread = rendered.clone();
        let join = std::thread::Builder::new()
            .name("preview".to_string())
            .spawn(move || self.render_loop(&shutdown_thread, &rendered_thread))
            .context("spawn preview thread")?;
        Ok(PreviewHandle {
            shutdown,
            rendered,
            join: Some(join),
        })
    }

    fn render_loop(mut self, shutdown: &AtomicBool, rendered: &AtomicU64) {
        // Set once a frame was shown, so an idle source at startup is not mistaken for the end.
        let mut seen_active = false;
        while !shutdown.load(Ordering::SeqCst) {
            let frame = match self.source.try_lock() {
                Ok(mut source) => {
                    if !source.is_active() {
                        if seen_active {
                            log::info!("preview: source inactive, exiting");
                            return;
                        }
                        None
                    } else {
                        seen_active = true;
                        source.read_frame().ok()
                    }
                }
                Err(TryLockError::WouldBlock) => None,
                Err(TryLockError::Poisoned(_)) => {
                    log::warn!("preview: source lock poisoned, exiting");
                    return;
                }
            };

            if let Some(frame) = frame {
                match self.sink.show(&frame) {
                    Ok(()) => {
                        rendered.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(err) => log::debug!("preview frame dropped: {:#}", err),
                }
            }
            std::thread::sleep(self.interval);
        }
    }
}

/// Cancels the preview thread.
#[derive(Debug)]
pub struct PreviewHandle {
    shutdown: Arc<AtomicBool>,
    rendered: Arc<AtomicU64>,
    join: Option<JoinHandle<()>>,
}

impl PreviewHandle {
    pub fn rendered(&self) -> u64 {
        self.rendered.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map(|j| j.is_finished()).unwrap_or(true)
    }

    /// Stop the thread and return how many frames it rendered.
    pub fn cancel(mut self) -> Result<u64> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("preview thread panicked"))?;
        }
        Ok(self.rendered())
    }
}
