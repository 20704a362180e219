//! Seams between the recorder and whatever produces samples

use std::time::Duration;

use crate::error::Result;
use crate::format::RecordingFormat;

/// Something that can be opened as a blocking stream of interleaved samples.
///
/// `open` is called on the capture thread, which is why the returned stream
/// does not have to be `Send` (cpal streams are not on every platform).
pub trait AudioSource: Send + Sync {
    /// Human readable name for logs.
    fn name(&self) -> String;

    fn open(&self, format: &RecordingFormat) -> Result<Box<dyn CaptureStream>>;
}

/// An open capture stream
pub trait CaptureStream {
    /// Wait up to `timeout` for the next block of interleaved samples.
    ///
    /// `Ok(None)` means nothing arrived in time and the caller may poll again.
    /// An error ends the recording session.
    fn next_block(&mut self, timeout: Duration) -> Result<Option<Vec<i16>>>;

    /// Samples lost inside the stream before reaching `next_block`, since open.
    fn dropped(&self) -> u64 {
        0
    }
}
