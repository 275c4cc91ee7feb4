//! Replay source (`replay://<dir>`).
//!
//! Plays back PNG/JPEG stills from a directory in file-name order, one per read.
//! Once the last image has been served the source turns inactive and the
//! pipeline winds down.

use std::path::{Path, PathBuf};

use super::{FrameSource, SourceStats};
use crate::error::WatchError;
use crate::frame::Frame;

const EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

pub struct ReplaySource {
    uri: String,
    dir: PathBuf,
    queue: Vec<PathBuf>,
    cursor: usize,
    open: bool,
    frames_captured: u64,
}

impl ReplaySource {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        Self {
            uri: format!("replay://{}", dir.display()),
            dir,
            queue: Vec::new(),
            cursor: 0,
            open: false,
            frames_captured: 0,
        }
    }

    /// Images still waiting to be read.
    pub fn remaining(&self) -> usize {
        self.queue.len().saturating_sub(self.cursor)
    }

    fn scan(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_image && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl FrameSource for ReplaySource {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn open(&mut self) -> Result<(), WatchError> {
        let files = self
            .scan()
            .map_err(|err| WatchError::source_unavailable(&self.uri, err))?;
        if files.is_empty() {
            return Err(WatchError::source_unavailable(
                &self.uri,
                "directory holds no png/jpg images",
            ));
        }
        log::info!(
            "ReplaySource: {} images queued from {}",
            files.len(),
            self.dir.display()
        );
        self.queue = files;
        self.cursor = 0;
        self.open = true;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Frame, WatchError> {
        if !self.open {
            return Err(WatchError::FrameUnavailable(format!(
                "{} is not open",
                self.uri
            )));
        }
        let Some(path) = self.queue.get(self.cursor).cloned() else {
            self.open = false;
            return Err(WatchError::FrameUnavailable(format!(
                "{} exhausted",
                self.uri
            )));
        };
        self.cursor += 1;
        if self.cursor >= self.queue.len() {
            // Last image served; report inactive from here on.
            self.open = false;
        }

        let image = image::open(&path).map_err(|err| {
            WatchError::FrameUnavailable(format!("decode {}: {}", path.display(), err))
        })?;
        self.frames_captured += 1;
        Ok(Frame::new(image.into_rgb8()))
    }

    fn is_active(&self) -> bool {
        self.open
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frames_captured,
            uri: self.uri.clone(),
        }
    }
}
