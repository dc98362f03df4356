//! JSONL recorder for output frames.
//!
//! Each line is `{"recorded_at": "<rfc3339>", "frame": <OutputState>}`.
//! Files are named `frames_<local timestamp>_<sequence>.jsonl` so that
//! lexical order is creation order.

use chrono::{Local, Utc};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::TelemetryConfig;
use crate::error::Result;
use crate::mapping::output::OutputState;

const FILE_PREFIX: &str = "frames_";
const FILE_EXTENSION: &str = "jsonl";

#[derive(Serialize)]
struct FrameRecord<'a> {
    recorded_at: String,
    frame: &'a OutputState,
}

/// Rotating JSONL writer.
pub struct FrameRecorder {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    record_every_frames: u64,
    writer: Option<BufWriter<File>>,
    records_in_file: usize,
    frames_seen: u64,
    files_opened: u64,
}

impl FrameRecorder {
    /// Creates the log directory if needed. No file is opened until the
    /// first recorded frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(
        dir: impl AsRef<Path>,
        max_records_per_file: usize,
        max_files_to_keep: usize,
        record_every_frames: u64,
    ) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            max_records_per_file: max_records_per_file.max(1),
            max_files_to_keep: max_files_to_keep.max(1),
            record_every_frames: record_every_frames.max(1),
            writer: None,
            records_in_file: 0,
            frames_seen: 0,
            files_opened: 0,
        })
    }

    /// # Errors
    ///
    /// Returns an error if the log directory cannot be created.
    pub fn from_config(config: &TelemetryConfig) -> Result<Self> {
        Self::new(
            &config.log_dir,
            config.max_records_per_file,
            config.max_files_to_keep,
            config.record_every_frames,
        )
    }

    /// Records `state` if it falls on the sampling interval.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be serialized or written.
    pub fn record(&mut self, state: &OutputState) -> Result<()> {
        self.frames_seen += 1;
        if (self.frames_seen - 1) % self.record_every_frames != 0 {
            return Ok(());
        }

        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        let line = serde_json::to_string(&FrameRecord {
            recorded_at: Utc::now().to_rfc3339(),
            frame: state,
        })?;
        if let Some(writer) = self.writer.as_mut() {
            writeln!(writer, "{}", line)?;
            self.records_in_file += 1;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the buffered records cannot be written.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn rotate(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }

        let name = format!(
            "{}{}_{:04}.{}",
            FILE_PREFIX,
            Local::now().format("%Y%m%d_%H%M%S"),
            self.files_opened,
            FILE_EXTENSION
        );
        let path = self.dir.join(name);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!("Recording frames to {}", path.display());

        self.writer = Some(BufWriter::new(file));
        self.records_in_file = 0;
        self.files_opened += 1;
        self.prune();
        Ok(())
    }

    /// Deletes the oldest log files beyond the retention limit.
    fn prune(&self) {
        let mut files = match log_files(&self.dir) {
            Ok(files) => files,
            Err(e) => {
                warn!("Cannot list {}: {}", self.dir.display(), e);
                return;
            }
        };
        if files.len() <= self.max_files_to_keep {
            return;
        }
        files.sort();
        let excess = files.len() - self.max_files_to_keep;
        for path in files.into_iter().take(excess) {
            match fs::remove_file(&path) {
                Ok(()) => debug!("Removed old frame log {}", path.display()),
                Err(e) => warn!("Cannot remove {}: {}", path.display(), e),
            }
        }
    }
}

impl Drop for FrameRecorder {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!("Failed to flush frame log: {}", e);
        }
    }
}

fn log_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(FILE_PREFIX))
            && path.extension().and_then(|e| e.to_str()) == Some(FILE_EXTENSION);
        if is_log {
            files.push(path);
        }
    }
    Ok(files)
}
