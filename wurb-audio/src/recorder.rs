//! Capture and writer threads for one recording session at a time

use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::buffer::{SampleConsumer, SampleProducer, SampleQueue};
use crate::error::{AudioError, Result};
use crate::format::RecordingFormat;
use crate::source::AudioSource;
use crate::wave::{NameStamp, TargetSettings, WaveTarget};

/// How long the capture thread waits for a block before re-checking the run flag
const CAPTURE_POLL: Duration = Duration::from_millis(100);

/// Writer thread idle sleep between queue drains
const WRITER_POLL: Duration = Duration::from_millis(10);

/// Counters for one session, or accumulated over all sessions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecorderStats {
    pub samples_captured: u64,
    pub samples_dropped: u64,
    pub files_written: usize,
    pub last_file: Option<PathBuf>,
}

struct Session {
    running: Arc<AtomicBool>,
    stats: Arc<Mutex<RecorderStats>>,
    capture: JoinHandle<Result<()>>,
    writer: JoinHandle<Result<()>>,
}

/// Records from an [`AudioSource`] into rotating wave files.
///
/// `start` and `stop` may be called from any thread; a second `start` while a
/// session is running is a no-op. If either thread fails the session stops
/// on its own and `is_running` turns false.
pub struct SoundRecorder {
    source: Arc<dyn AudioSource>,
    settings: TargetSettings,
    stamp: Arc<dyn NameStamp>,
    queue_seconds: f64,
    /// Held across a whole `start` or `stop`, joins included
    lifecycle: Mutex<()>,
    session: Mutex<Option<Session>>,
    last: Mutex<RecorderStats>,
    totals: Mutex<RecorderStats>,
}

impl SoundRecorder {
    /// `queue_seconds` sizes the hand-off buffer in seconds of capture.
    pub fn new(
        source: Arc<dyn AudioSource>,
        settings: TargetSettings,
        stamp: Arc<dyn NameStamp>,
        queue_seconds: f64,
    ) -> Result<Self> {
        settings.format.validate()?;
        if queue_seconds.is_nan() || queue_seconds <= 0.0 {
            return Err(AudioError::invalid_config("queue length must be positive"));
        }

        Ok(Self {
            source,
            settings,
            stamp,
            queue_seconds,
            lifecycle: Mutex::new(()),
            session: Mutex::new(None),
            last: Mutex::new(RecorderStats::default()),
            totals: Mutex::new(RecorderStats::default()),
        })
    }

    pub fn settings(&self) -> &TargetSettings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.session
            .lock()
            .as_ref()
            .map(|s| s.running.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Start a session unless one is already running.
    pub fn start(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock();
        let mut session = self.session.lock();

        if let Some(existing) = session.as_ref() {
            if existing.running.load(Ordering::SeqCst) {
                warn!("Recorder already running");
                return Ok(());
            }
        }
        // A session that died on its own is reaped before starting over.
        if let Some(dead) = session.take() {
            self.finish_session(dead);
        }

        let capacity =
            (self.settings.format.samples_per_second() as f64 * self.queue_seconds) as usize;
        let (producer, consumer) = SampleQueue::with_capacity(capacity);
        let target = WaveTarget::new(self.settings.clone(), Arc::clone(&self.stamp))?;

        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(Mutex::new(RecorderStats::default()));

        let writer = {
            let running = Arc::clone(&running);
            let stats = Arc::clone(&stats);
            thread::Builder::new()
                .name("wurb-writer".to_string())
                .spawn(move || writer_loop(consumer, target, running, stats))
                .map_err(|e| AudioError::Internal(format!("Failed to spawn writer: {}", e)))?
        };

        let capture = {
            let capture_running = Arc::clone(&running);
            let source = Arc::clone(&self.source);
            let format = self.settings.format.clone();
            let spawned = thread::Builder::new()
                .name("wurb-capture".to_string())
                .spawn(move || capture_loop(source.as_ref(), &format, producer, capture_running));
            match spawned {
                Ok(handle) => handle,
                Err(e) => {
                    // The producer went down with the closure, so the writer drains and exits.
                    running.store(false, Ordering::SeqCst);
                    let _ = writer.join();
                    return Err(AudioError::Internal(format!(
                        "Failed to spawn capture: {}",
                        e
                    )));
                }
            }
        };

        info!(
            "Recording started from '{}' as {} into {}",
            self.source.name(),
            self.settings.rec_type,
            self.settings.dir_path.display()
        );

        *session = Some(Session {
            running,
            stats,
            capture,
            writer,
        });
        Ok(())
    }

    /// Stop the running session, wait for its files to be closed and return its counters.
    ///
    /// A `start` issued meanwhile waits until the old session is fully closed.
    pub fn stop(&self) -> RecorderStats {
        let _lifecycle = self.lifecycle.lock();
        let Some(session) = self.session.lock().take() else {
            warn!("Recorder not running");
            return RecorderStats::default();
        };

        let stats = self.finish_session(session);
        info!(
            "Recording stopped: {} files, {} samples ({} dropped)",
            stats.files_written, stats.samples_captured, stats.samples_dropped
        );
        stats
    }

    /// Live counters of the current session, or of the last one once stopped
    pub fn stats(&self) -> RecorderStats {
        match self.session.lock().as_ref() {
            Some(session) => session.stats.lock().clone(),
            None => self.last.lock().clone(),
        }
    }

    /// Counters summed over every finished session
    pub fn total_stats(&self) -> RecorderStats {
        self.totals.lock().clone()
    }

    fn finish_session(&self, session: Session) -> RecorderStats {
        session.running.store(false, Ordering::SeqCst);

        match session.capture.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Capture ended with error: {}", e),
            Err(_) => error!("Capture thread panicked"),
        }
        match session.writer.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Writer ended with error: {}", e),
            Err(_) => error!("Writer thread panicked"),
        }

        let stats = session.stats.lock().clone();
        *self.last.lock() = stats.clone();
        let mut totals = self.totals.lock();
        totals.samples_captured += stats.samples_captured;
        totals.samples_dropped += stats.samples_dropped;
        totals.files_written += stats.files_written;
        if stats.last_file.is_some() {
            totals.last_file = stats.last_file.clone();
        }
        stats
    }
}

impl Drop for SoundRecorder {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            self.finish_session(session);
        }
    }
}

fn capture_loop(
    source: &dyn AudioSource,
    format: &RecordingFormat,
    mut producer: SampleProducer,
    running: Arc<AtomicBool>,
) -> Result<()> {
    let mut stream = match source.open(format) {
        Ok(stream) => stream,
        Err(e) => {
            error!("Failed to open '{}': {}", source.name(), e);
            running.store(false, Ordering::SeqCst);
            return Err(e);
        }
    };

    let mut stream_dropped = 0;
    while running.load(Ordering::SeqCst) {
        let block = stream.next_block(CAPTURE_POLL);

        let dropped = stream.dropped();
        if dropped > stream_dropped {
            debug!("Capture stream dropped {} samples", dropped - stream_dropped);
            producer.record_dropped(dropped - stream_dropped);
            stream_dropped = dropped;
        }

        match block {
            Ok(Some(block)) => {
                let written = producer.push(&block);
                if written < block.len() {
                    warn!("Writer behind, dropped {} samples", block.len() - written);
                }
            }
            Ok(None) => {}
            Err(e) => {
                error!("Capture failed: {}", e);
                running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        }
    }

    producer.finish();
    debug!("Capture loop finished");
    Ok(())
}

fn writer_loop(
    mut consumer: SampleConsumer,
    mut target: WaveTarget,
    running: Arc<AtomicBool>,
    stats: Arc<Mutex<RecorderStats>>,
) -> Result<()> {
    let mut block = Vec::new();

    let result = loop {
        block.clear();
        consumer.drain(&mut block);

        if !block.is_empty() {
            if let Err(e) = target.write(&block, Instant::now()) {
                error!("Failed to write wave file: {}", e);
                running.store(false, Ordering::SeqCst);
                break Err(e);
            }
        }

        update_stats(&stats, &consumer, &target);

        if consumer.is_finished() {
            break Ok(());
        }
        if block.is_empty() {
            thread::sleep(WRITER_POLL);
        }
    };

    let closed = target.close();
    update_stats(&stats, &consumer, &target);
    result.and(closed.map(|_| ()))
}

fn update_stats(stats: &Mutex<RecorderStats>, consumer: &SampleConsumer, target: &WaveTarget) {
    let mut stats = stats.lock();
    stats.samples_captured = consumer.pushed() + consumer.dropped();
    stats.samples_dropped = consumer.dropped();
    stats.files_written = target.finished_files().len();
    stats.last_file = target
        .current_file()
        .map(|p| p.to_path_buf())
        .or_else(|| target.finished_files().last().cloned());
}
