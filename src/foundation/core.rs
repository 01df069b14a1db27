use crate::foundation::error::{ExportError, ExportResult};

/// Largest frame rate for which one frame still spans at least one nanosecond.
pub const MAX_FRAMES_PER_SECOND: u64 = 1_000_000_000;

/// 0-based index of a submitted video frame.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

impl FrameIndex {
    /// Return the index that follows `self`.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Frames-per-second represented as a rational `num/den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FrameRate {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (seconds), must be non-zero.
    pub den: u32,
}

impl FrameRate {
    /// Create a validated frame rate.
    ///
    /// Rates above [`MAX_FRAMES_PER_SECOND`] are rejected: consecutive frames would share a
    /// nanosecond timestamp.
    pub fn new(num: u32, den: u32) -> ExportResult<Self> {
        if den == 0 {
            return Err(ExportError::config("frame rate denominator must be > 0"));
        }
        if num == 0 {
            return Err(ExportError::config("frame rate numerator must be > 0"));
        }
        if u64::from(num) > MAX_FRAMES_PER_SECOND * u64::from(den) {
            return Err(ExportError::config(format!(
                "frame rate {num}/{den} exceeds {MAX_FRAMES_PER_SECOND} fps"
            )));
        }
        Ok(Self { num, den })
    }
}

/// Interleaved PCM layout of the raw audio byte stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AudioLayout {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Interleaved channel count (1 or 2).
    pub channels: u16,
    /// Bytes per sample per channel (2 for s16le).
    pub bytes_per_sample: u16,
}

impl AudioLayout {
    /// Create a validated layout.
    pub fn new(sample_rate: u32, channels: u16, bytes_per_sample: u16) -> ExportResult<Self> {
        if sample_rate == 0 {
            return Err(ExportError::config("audio sample rate must be > 0"));
        }
        if channels == 0 {
            return Err(ExportError::config("audio channel count must be > 0"));
        }
        if bytes_per_sample == 0 {
            return Err(ExportError::config("audio bytes per sample must be > 0"));
        }
        Ok(Self {
            sample_rate,
            channels,
            bytes_per_sample,
        })
    }

    /// Bytes consumed by one second of audio.
    pub fn bytes_per_second(self) -> u64 {
        u64::from(self.sample_rate) * u64::from(self.channels) * u64::from(self.bytes_per_sample)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
