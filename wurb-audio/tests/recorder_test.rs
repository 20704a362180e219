//! Recorder sessions against a synthetic source, no sound card needed

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use wurb_audio::{
    AudioError, AudioSource, CaptureStream, Channels, NameStamp, RecordingFormat, RecordingType,
    Result, SoundRecorder, TargetSettings,
};

/// Emits a ramp in 10 ms blocks, optionally failing after `fail_after` blocks
struct RampSource {
    fail_on_open: bool,
    fail_after: Option<usize>,
}

struct RampStream {
    block_len: usize,
    blocks: usize,
    fail_after: Option<usize>,
}

impl AudioSource for RampSource {
    fn name(&self) -> String {
        "ramp".to_string()
    }

    fn open(&self, format: &RecordingFormat) -> Result<Box<dyn CaptureStream>> {
        if self.fail_on_open {
            return Err(AudioError::device("no such microphone"));
        }
        Ok(Box::new(RampStream {
            block_len: format.samples_per_second() / 100,
            blocks: 0,
            fail_after: self.fail_after,
        }))
    }
}

impl CaptureStream for RampStream {
    fn next_block(&mut self, _timeout: Duration) -> Result<Option<Vec<i16>>> {
        if self.fail_after == Some(self.blocks) {
            return Err(AudioError::stream("device unplugged"));
        }
        thread::sleep(Duration::from_millis(10));
        self.blocks += 1;
        Ok(Some((0..self.block_len).map(|i| i as i16).collect()))
    }
}

/// Loses `lost_per_block` samples inside the stream for every block it delivers
struct LossySource {
    lost_per_block: u64,
}

struct LossyStream {
    block_len: usize,
    lost: u64,
    lost_per_block: u64,
}

impl AudioSource for LossySource {
    fn name(&self) -> String {
        "lossy".to_string()
    }

    fn open(&self, format: &RecordingFormat) -> Result<Box<dyn CaptureStream>> {
        Ok(Box::new(LossyStream {
            block_len: format.samples_per_second() / 100,
            lost: 0,
            lost_per_block: self.lost_per_block,
        }))
    }
}

impl CaptureStream for LossyStream {
    fn next_block(&mut self, _timeout: Duration) -> Result<Option<Vec<i16>>> {
        thread::sleep(Duration::from_millis(10));
        self.lost += self.lost_per_block;
        Ok(Some(vec![0; self.block_len]))
    }

    fn dropped(&self) -> u64 {
        self.lost
    }
}

/// Silent stream that takes `close_delay` to release the device
struct SlowCloseSource {
    close_delay: Duration,
}

struct SlowCloseStream {
    block_len: usize,
    close_delay: Duration,
}

impl AudioSource for SlowCloseSource {
    fn name(&self) -> String {
        "slow-close".to_string()
    }

    fn open(&self, format: &RecordingFormat) -> Result<Box<dyn CaptureStream>> {
        Ok(Box::new(SlowCloseStream {
            block_len: format.samples_per_second() / 100,
            close_delay: self.close_delay,
        }))
    }
}

impl CaptureStream for SlowCloseStream {
    fn next_block(&mut self, _timeout: Duration) -> Result<Option<Vec<i16>>> {
        thread::sleep(Duration::from_millis(10));
        Ok(Some(vec![0; self.block_len]))
    }
}

impl Drop for SlowCloseStream {
    fn drop(&mut self) {
        thread::sleep(self.close_delay);
    }
}

/// Distinct name per file so rotation never collides
struct CountingStamp(AtomicUsize);

impl NameStamp for CountingStamp {
    fn datetime_string(&self) -> String {
        format!("20210621T2300{:02}+0200", self.0.fetch_add(1, Ordering::SeqCst))
    }

    fn position_string(&self) -> Option<String> {
        None
    }
}

fn recorder(dir: &std::path::Path, source: RampSource, file_length: Duration) -> SoundRecorder {
    recorder_from(dir, Arc::new(source), file_length)
}

fn recorder_from(
    dir: &std::path::Path,
    source: Arc<dyn AudioSource>,
    file_length: Duration,
) -> SoundRecorder {
    let rec_type: RecordingType = "TE192".parse().unwrap();
    let settings = TargetSettings {
        dir_path: dir.to_path_buf(),
        filename_prefix: "WURB".to_string(),
        default_position: "No-position".to_string(),
        rec_type: rec_type.label().to_string(),
        file_length,
        format: RecordingFormat::new(&rec_type, Channels::Mono, 16).unwrap(),
    };
    SoundRecorder::new(
        source,
        settings,
        Arc::new(CountingStamp(AtomicUsize::new(0))),
        2.0,
    )
    .unwrap()
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

fn wav_files(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    let mut files: Vec<_> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext == "wav"))
                .collect()
        })
        .unwrap_or_default();
    files.sort();
    files
}

#[test]
fn test_session_writes_time_expanded_file() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("recordings");
    let rec = recorder(
        &dir,
        RampSource {
            fail_on_open: false,
            fail_after: None,
        },
        Duration::from_secs(60),
    );

    rec.start().unwrap();
    assert!(rec.is_running());
    thread::sleep(Duration::from_millis(200));
    let stats = rec.stop();
    assert!(!rec.is_running());

    assert_eq!(stats.files_written, 1);
    assert!(stats.samples_captured > 0);
    assert_eq!(stats.samples_dropped, 0);

    let files = wav_files(&dir);
    assert_eq!(files.len(), 1);
    let name = files[0].file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("WURB_20210621T230000+0200_No-position_TE192"));

    let reader = hound::WavReader::open(&files[0]).unwrap();
    assert_eq!(reader.spec().sample_rate, 19_200);
    assert_eq!(reader.spec().bits_per_sample, 16);
    assert_eq!(reader.len() as u64, stats.samples_captured);
}

#[test]
fn test_second_start_is_noop() {
    let tmp = tempfile::tempdir().unwrap();
    let rec = recorder(
        tmp.path(),
        RampSource {
            fail_on_open: false,
            fail_after: None,
        },
        Duration::from_secs(60),
    );

    rec.start().unwrap();
    rec.start().unwrap();
    thread::sleep(Duration::from_millis(50));
    let stats = rec.stop();
    assert_eq!(stats.files_written, 1);

    // Stopping again has nothing to report, the last session stays readable
    assert_eq!(rec.stop().files_written, 0);
    assert_eq!(rec.stats().files_written, 1);
}

#[test]
fn test_files_rotate_during_session() {
    let tmp = tempfile::tempdir().unwrap();
    let rec = recorder(
        tmp.path(),
        RampSource {
            fail_on_open: false,
            fail_after: None,
        },
        Duration::from_millis(100),
    );

    rec.start().unwrap();
    thread::sleep(Duration::from_millis(550));
    let stats = rec.stop();

    assert!(stats.files_written >= 3, "got {} files", stats.files_written);
    assert_eq!(wav_files(tmp.path()).len(), stats.files_written);
    assert_eq!(rec.total_stats().files_written, stats.files_written);
}

#[test]
fn test_open_failure_ends_session() {
    let tmp = tempfile::tempdir().unwrap();
    let rec = recorder(
        tmp.path(),
        RampSource {
            fail_on_open: true,
            fail_after: None,
        },
        Duration::from_secs(60),
    );

    rec.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || !rec.is_running()));
    assert_eq!(rec.stop().files_written, 0);
    assert!(wav_files(tmp.path()).is_empty());
}

#[test]
fn test_stream_failure_closes_file_and_allows_restart() {
    let tmp = tempfile::tempdir().unwrap();
    let rec = recorder(
        tmp.path(),
        RampSource {
            fail_on_open: false,
            fail_after: Some(5),
        },
        Duration::from_secs(60),
    );

    rec.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || !rec.is_running()));

    // Restart reaps the dead session before opening a new one
    rec.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || !rec.is_running()));
    rec.stop();

    let files = wav_files(tmp.path());
    assert_eq!(files.len(), 2);
    for file in files {
        let reader = hound::WavReader::open(&file).unwrap();
        assert_eq!(reader.len(), 5 * 1920);
    }
    assert_eq!(rec.total_stats().files_written, 2);
}

#[test]
fn test_stream_losses_reach_stats() {
    let tmp = tempfile::tempdir().unwrap();
    let rec = recorder_from(
        tmp.path(),
        Arc::new(LossySource { lost_per_block: 7 }),
        Duration::from_secs(60),
    );

    rec.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || rec.stats().samples_dropped > 0));
    let stats = rec.stop();

    assert!(stats.samples_dropped > 0);
    assert_eq!(stats.samples_dropped % 7, 0);

    // Captured counts what the device delivered, lost samples included
    let reader = hound::WavReader::open(stats.last_file.as_ref().unwrap()).unwrap();
    assert_eq!(
        reader.len() as u64 + stats.samples_dropped,
        stats.samples_captured
    );
    assert_eq!(rec.total_stats().samples_dropped, stats.samples_dropped);
}

#[test]
fn test_start_waits_for_stop_to_finish() {
    let tmp = tempfile::tempdir().unwrap();
    let rec = Arc::new(recorder_from(
        tmp.path(),
        Arc::new(SlowCloseSource {
            close_delay: Duration::from_millis(300),
        }),
        Duration::from_secs(60),
    ));

    rec.start().unwrap();
    thread::sleep(Duration::from_millis(50));

    let stopper = {
        let rec = Arc::clone(&rec);
        thread::spawn(move || {
            let stats = rec.stop();
            (stats, Instant::now())
        })
    };
    thread::sleep(Duration::from_millis(50));
    rec.start().unwrap();
    let started = Instant::now();

    let (stats, stopped) = stopper.join().unwrap();
    assert!(stopped <= started);
    assert_eq!(stats.files_written, 1);
    assert!(rec.is_running());

    let second = rec.stop();
    assert_eq!(second.files_written, 1);
    assert_ne!(second.last_file, stats.last_file);
    assert_eq!(rec.total_stats().files_written, 2);
    assert_eq!(wav_files(tmp.path()).len(), 2);
}
