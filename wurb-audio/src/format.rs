//! Recording types and the sample format they imply

use std::fmt;
use std::str::FromStr;

use crate::error::{AudioError, Result};

/// Sampling rate used for labels that do not name an ultrasonic rate (e.g. `HET`).
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Time-expanded files are written this many times slower than captured.
pub const TIME_EXPANSION_FACTOR: u32 = 10;

/// Recording type as written in the config and in every file name.
///
/// `FSxxx` is full speed at xxx kHz, `TExxx` is the same capture written
/// with ten times time expansion so that it is audible on playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingType {
    label: String,
    capture_rate_hz: u32,
    time_expansion: bool,
}

impl RecordingType {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn capture_rate_hz(&self) -> u32 {
        self.capture_rate_hz
    }

    pub fn is_time_expansion(&self) -> bool {
        self.time_expansion
    }

    /// Rate stored in the wave header.
    pub fn file_rate_hz(&self) -> u32 {
        if self.time_expansion {
            self.capture_rate_hz / TIME_EXPANSION_FACTOR
        } else {
            self.capture_rate_hz
        }
    }
}

impl FromStr for RecordingType {
    type Err = AudioError;

    fn from_str(s: &str) -> Result<Self> {
        let label = s.trim().to_uppercase();
        if label.is_empty() {
            return Err(AudioError::invalid_config("empty recording type"));
        }

        let (time_expansion, rate_khz) = match (label.get(..2), label.get(2..)) {
            (Some("FS"), Some(rest)) => (false, rest.parse::<u32>().ok()),
            (Some("TE"), Some(rest)) => (true, rest.parse::<u32>().ok()),
            _ => (false, None),
        };

        let capture_rate_hz = match rate_khz {
            Some(khz @ (192 | 250 | 300 | 384 | 500)) => khz * 1000,
            _ => {
                return Ok(Self {
                    label,
                    capture_rate_hz: DEFAULT_SAMPLE_RATE,
                    time_expansion: false,
                })
            }
        };

        Ok(Self {
            label,
            capture_rate_hz,
            time_expansion,
        })
    }
}

impl fmt::Display for RecordingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// Mono or stereo capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channels {
    Mono,
    Stereo,
}

impl Channels {
    pub fn count(self) -> u16 {
        match self {
            Channels::Mono => 1,
            Channels::Stereo => 2,
        }
    }
}

impl FromStr for Channels {
    type Err = AudioError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "MONO" => Ok(Channels::Mono),
            "STEREO" => Ok(Channels::Stereo),
            other => Err(AudioError::invalid_config(format!(
                "unknown channel setting '{}', expected MONO or STEREO",
                other
            ))),
        }
    }
}

/// Sample format shared by the capture device and the wave files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingFormat {
    pub capture_rate_hz: u32,
    pub file_rate_hz: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl RecordingFormat {
    pub fn new(rec_type: &RecordingType, channels: Channels, bits_per_sample: u16) -> Result<Self> {
        let format = Self {
            capture_rate_hz: rec_type.capture_rate_hz(),
            file_rate_hz: rec_type.file_rate_hz(),
            channels: channels.count(),
            bits_per_sample,
        };
        format.validate()?;
        Ok(format)
    }

    /// Samples are carried as `i16` from device to file, so 16 bits is the only width.
    pub fn validate(&self) -> Result<()> {
        if self.bits_per_sample != 16 {
            return Err(AudioError::invalid_config(format!(
                "unsupported ADC resolution {} bits, only 16 is supported",
                self.bits_per_sample
            )));
        }
        if self.capture_rate_hz == 0 || self.file_rate_hz == 0 {
            return Err(AudioError::invalid_config("sample rate must be non-zero"));
        }
        if self.channels == 0 {
            return Err(AudioError::invalid_config("channel count must be non-zero"));
        }
        Ok(())
    }

    /// Interleaved samples per second at the capture rate.
    pub fn samples_per_second(&self) -> usize {
        self.capture_rate_hz as usize * self.channels as usize
    }
}
