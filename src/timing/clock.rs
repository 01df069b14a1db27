use crate::foundation::core::{AudioLayout, FrameIndex, FrameRate};

const NANOS_PER_SEC: u128 = 1_000_000_000;
const MICROS_PER_SEC: u128 = 1_000_000;

/// Converts frame indices and audio byte offsets into presentation timestamps.
///
/// All arithmetic is integer: `index * 1e9 * den / num` for video (nanoseconds) and
/// `offset * 1e6 / bytes_per_second` for audio (microseconds). Intermediates are widened to
/// `u128` so no product overflows, and truncation happens once per call so error never
/// accumulates across frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PresentationClock {
    rate: FrameRate,
    audio: AudioLayout,
}

impl PresentationClock {
    /// Build a clock for the given video rate and audio layout.
    pub fn new(rate: FrameRate, audio: AudioLayout) -> Self {
        Self { rate, audio }
    }

    /// Video frame rate used by [`Self::video_pts_ns`].
    pub fn frame_rate(&self) -> FrameRate {
        self.rate
    }

    /// Audio layout used by [`Self::audio_pts_us`].
    pub fn audio_layout(&self) -> AudioLayout {
        self.audio
    }

    /// Presentation time of `frame` in nanoseconds.
    pub fn video_pts_ns(&self, frame: FrameIndex) -> i64 {
        let ns = u128::from(frame.0) * NANOS_PER_SEC * u128::from(self.rate.den)
            / u128::from(self.rate.num);
        saturate_i64(ns)
    }

    /// Presentation time of the audio byte at `byte_offset` in microseconds.
    pub fn audio_pts_us(&self, byte_offset: u64) -> i64 {
        let us = u128::from(byte_offset) * MICROS_PER_SEC / u128::from(self.audio.bytes_per_second());
        saturate_i64(us)
    }
}

fn saturate_i64(v: u128) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

#[cfg(test)]
#[path = "../../tests/unit/timing/clock.rs"]
mod tests;
