use serde::{Deserialize, Serialize};

/// Native dequeue code: no output available within the timeout.
pub const INFO_TRY_AGAIN_LATER: i32 = -1;
/// Native dequeue code: the output format is now known.
pub const INFO_OUTPUT_FORMAT_CHANGED: i32 = -2;
/// Native dequeue code: the set of output buffers was replaced.
pub const INFO_OUTPUT_BUFFERS_CHANGED: i32 = -3;

/// Per-sample flags reported by an encoder or attached to a queued input chunk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SampleFlags {
    /// Buffer carries codec configuration only, not media.
    pub codec_config: bool,
    /// Last buffer of the stream.
    pub end_of_stream: bool,
    /// Buffer starts with a sync (key) frame.
    pub key_frame: bool,
}

impl SampleFlags {
    /// No flags set.
    pub const NONE: Self = Self {
        codec_config: false,
        end_of_stream: false,
        key_frame: false,
    };

    /// Only the end-of-stream flag set.
    pub const END_OF_STREAM: Self = Self {
        codec_config: false,
        end_of_stream: true,
        key_frame: false,
    };

    /// Only the codec-config flag set.
    pub const CODEC_CONFIG: Self = Self {
        codec_config: true,
        end_of_stream: false,
        key_frame: false,
    };
}

/// Metadata of one output buffer: the valid byte range, timestamp and flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferInfo {
    /// Start of the payload inside the output buffer.
    pub offset: usize,
    /// Payload length in bytes.
    pub size: usize,
    /// Presentation timestamp in microseconds.
    pub presentation_time_us: i64,
    /// Sample flags.
    pub flags: SampleFlags,
}

impl BufferInfo {
    /// Byte range of the payload inside its output buffer.
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset.saturating_add(self.size)
    }
}

/// Result of polling an encoder's output queue once.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputStatus {
    /// No output within the timeout.
    TryAgainLater,
    /// The encoder replaced its output buffer set; cached views must be refreshed.
    BuffersChanged,
    /// The encoder's output format is now known.
    FormatChanged,
    /// A compressed sample is ready in output buffer `index`.
    Sample {
        /// Output buffer index; must be released after use.
        index: usize,
        /// Payload metadata.
        info: BufferInfo,
    },
    /// A negative status code the protocol does not define.
    Unexpected(i32),
}

impl OutputStatus {
    /// Map a native dequeue return code (and the buffer info it filled) to a status.
    pub fn from_raw(code: i32, info: BufferInfo) -> Self {
        match code {
            INFO_TRY_AGAIN_LATER => Self::TryAgainLater,
            INFO_OUTPUT_FORMAT_CHANGED => Self::FormatChanged,
            INFO_OUTPUT_BUFFERS_CHANGED => Self::BuffersChanged,
            c if c < 0 => Self::Unexpected(c),
            c => Self::Sample {
                index: c as usize,
                info,
            },
        }
    }
}

/// A free audio encoder input buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputSlot {
    /// Input buffer index, passed back to `queue_input_buffer`.
    pub index: usize,
    /// Number of bytes the buffer can hold.
    pub capacity: usize,
}

#[cfg(test)]
#[path = "../../tests/unit/codec/buffer.rs"]
mod tests;
