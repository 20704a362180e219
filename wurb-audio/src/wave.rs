//! Rotating, time-boxed wave files named after time and place

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::{debug, info, warn};

use crate::error::{AudioError, Result};
use crate::format::RecordingFormat;

/// File name timestamp layout, e.g. `20160802T235006+0200`
pub const DATETIME_FORMAT: &str = "%Y%m%dT%H%M%S%z";

/// Supplies the time and position parts of each file name.
pub trait NameStamp: Send + Sync {
    fn datetime_string(&self) -> String;

    /// `None` falls back to the configured default position.
    fn position_string(&self) -> Option<String>;
}

/// System clock in the local time zone, no position
pub struct LocalClockStamp;

impl NameStamp for LocalClockStamp {
    fn datetime_string(&self) -> String {
        chrono::Local::now().format(DATETIME_FORMAT).to_string()
    }

    fn position_string(&self) -> Option<String> {
        None
    }
}

/// Where and how wave files are written
#[derive(Debug, Clone)]
pub struct TargetSettings {
    pub dir_path: PathBuf,
    pub filename_prefix: String,
    /// Used when the stamp has no position, e.g. `N57.66E12.64` or `No-position`
    pub default_position: String,
    pub rec_type: String,
    pub file_length: Duration,
    pub format: RecordingFormat,
}

struct OpenFile {
    path: PathBuf,
    writer: WavWriter<BufWriter<File>>,
    samples: u64,
}

/// Writes interleaved samples into a sequence of wave files of fixed length.
///
/// File boundaries are anchored to the start of the first file: each new file
/// starts exactly `file_length` after the previous one, regardless of when the
/// writer actually got around to opening it.
pub struct WaveTarget {
    settings: TargetSettings,
    stamp: Arc<dyn NameStamp>,
    open: Option<OpenFile>,
    file_start: Option<Instant>,
    carry: Vec<i16>,
    finished: Vec<PathBuf>,
}

impl WaveTarget {
    pub fn new(settings: TargetSettings, stamp: Arc<dyn NameStamp>) -> Result<Self> {
        settings.format.validate()?;
        if settings.file_length.is_zero() {
            return Err(AudioError::invalid_config("file length must be non-zero"));
        }

        Ok(Self {
            settings,
            stamp,
            open: None,
            file_start: None,
            carry: Vec::new(),
            finished: Vec::new(),
        })
    }

    pub fn settings(&self) -> &TargetSettings {
        &self.settings
    }

    /// `{prefix}_{datetime}_{position}_{rec_type}.wav`
    pub fn next_file_name(&self) -> String {
        let position = self
            .stamp
            .position_string()
            .unwrap_or_else(|| self.settings.default_position.clone());

        format!(
            "{}_{}_{}_{}.wav",
            self.settings.filename_prefix,
            self.stamp.datetime_string(),
            position,
            self.settings.rec_type
        )
    }

    /// Path of the file currently being written
    pub fn current_file(&self) -> Option<&Path> {
        self.open.as_ref().map(|f| f.path.as_path())
    }

    /// Every file closed so far, oldest first
    pub fn finished_files(&self) -> &[PathBuf] {
        &self.finished
    }

    /// Append samples, opening and closing files as the clock passes `now`.
    pub fn write(&mut self, samples: &[i16], now: Instant) -> Result<()> {
        self.carry.extend_from_slice(samples);

        let channels = self.settings.format.channels as usize;
        let whole = self.carry.len() / channels * channels;
        if whole == 0 {
            return Ok(());
        }

        if self.open.is_none() {
            self.open_file(now)?;
        }

        let file = self
            .open
            .as_mut()
            .ok_or_else(|| AudioError::Internal("no open wave file".to_string()))?;

        let mut writer = file.writer.get_i16_writer(whole as u32);
        for &sample in &self.carry[..whole] {
            writer.write_sample(sample);
        }
        writer.flush()?;
        file.samples += whole as u64;
        self.carry.drain(..whole);

        let end = self
            .file_start
            .and_then(|start| start.checked_add(self.settings.file_length));
        if end.is_some_and(|end| end < now) {
            self.close()?;
        }

        Ok(())
    }

    /// Finalise the open file, if any, and return its path.
    pub fn close(&mut self) -> Result<Option<PathBuf>> {
        let Some(file) = self.open.take() else {
            return Ok(None);
        };

        file.writer.finalize()?;
        let seconds = file.samples as f64
            / (self.settings.format.file_rate_hz as f64 * self.settings.format.channels as f64);
        info!(
            "Closed {} ({:.1}s of playback)",
            file.path.display(),
            seconds
        );

        self.finished.push(file.path.clone());
        Ok(Some(file.path))
    }

    fn open_file(&mut self, now: Instant) -> Result<()> {
        let dir = &self.settings.dir_path;
        if !dir.exists() {
            std::fs::create_dir_all(dir)?;
        }

        let path = unique_path(dir, &self.next_file_name());
        let format = &self.settings.format;
        let spec = WavSpec {
            channels: format.channels,
            sample_rate: format.file_rate_hz,
            bits_per_sample: format.bits_per_sample,
            sample_format: SampleFormat::Int,
        };
        let writer = WavWriter::create(&path, spec)?;

        self.file_start = Some(self.next_start(now));
        debug!("Opened {}", path.display());
        self.open = Some(OpenFile {
            path,
            writer,
            samples: 0,
        });
        Ok(())
    }

    fn next_start(&self, now: Instant) -> Instant {
        let length = self.settings.file_length;
        let Some(previous) = self.file_start else {
            return now;
        };

        let Some(next) = previous.checked_add(length) else {
            return now;
        };
        if next.checked_add(length).map_or(true, |after| now < after) {
            return next;
        }

        // More than one slot behind: skip to the slot containing `now`.
        let behind = now.duration_since(next).as_nanos();
        let skip = behind - behind % length.as_nanos();
        u64::try_from(skip)
            .ok()
            .and_then(|nanos| next.checked_add(Duration::from_nanos(nanos)))
            .unwrap_or(now)
    }
}

impl Drop for WaveTarget {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close wave file: {}", e);
        }
    }
}

/// `name`, or `name` with `_1`, `_2` ... before the extension if taken
fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }

    let stem = name.trim_end_matches(".wav");
    (1..)
        .map(|n| dir.join(format!("{}_{}.wav", stem, n)))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}
