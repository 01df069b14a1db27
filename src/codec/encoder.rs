use crate::codec::buffer::{InputSlot, OutputStatus, SampleFlags};
use crate::codec::format::MediaFormat;
use crate::foundation::error::ExportResult;
use std::time::Duration;

/// Opaque handle of the surface a video encoder reads its input from.
///
/// The rendering context binds its window surface to this handle; presenting that surface is
/// what feeds the encoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InputSurface(pub u64);

/// Output side shared by the video and audio encoders.
///
/// Contract for implementors:
/// - `dequeue_output_buffer` blocks at most `timeout`.
/// - a buffer index returned in [`OutputStatus::Sample`] stays readable through
///   `output_buffer` until `release_output_buffer` is called with it.
/// - `stop` and `release` are best-effort and must tolerate being called on an encoder that
///   never started.
pub trait EncoderOutput: Send {
    /// Poll the output queue once.
    fn dequeue_output_buffer(&mut self, timeout: Duration) -> ExportResult<OutputStatus>;

    /// Re-read the output buffer set after [`OutputStatus::BuffersChanged`].
    fn refresh_output_buffers(&mut self) {}

    /// Borrow the contents of output buffer `index`.
    fn output_buffer(&self, index: usize) -> Option<&[u8]>;

    /// Output format; valid once [`OutputStatus::FormatChanged`] has been reported.
    fn output_format(&self) -> ExportResult<MediaFormat>;

    /// Hand output buffer `index` back to the encoder.
    fn release_output_buffer(&mut self, index: usize) -> ExportResult<()>;

    /// Ask the encoder to finish the stream and eventually emit an end-of-stream buffer.
    fn signal_end_of_input_stream(&mut self) -> ExportResult<()>;

    /// Start encoding.
    fn start(&mut self) -> ExportResult<()>;

    /// Stop encoding.
    fn stop(&mut self) -> ExportResult<()>;

    /// Free native resources. The encoder must not be used afterwards.
    fn release(&mut self) -> ExportResult<()>;
}

/// Hardware video encoder with a surface-backed input.
pub trait VideoEncoder: EncoderOutput {
    /// Create the input surface; must be called after configuration and before `start`.
    fn create_input_surface(&mut self) -> ExportResult<InputSurface>;
}

/// Audio encoder with a buffer-backed input.
pub trait AudioEncoder: EncoderOutput {
    /// Wait up to `timeout` for a free input buffer.
    fn dequeue_input_buffer(&mut self, timeout: Duration) -> ExportResult<Option<InputSlot>>;

    /// Borrow input buffer `index` for filling.
    fn input_buffer_mut(&mut self, index: usize) -> Option<&mut [u8]>;

    /// Submit the first `len` bytes of input buffer `index`.
    fn queue_input_buffer(
        &mut self,
        index: usize,
        len: usize,
        presentation_time_us: i64,
        flags: SampleFlags,
    ) -> ExportResult<()>;
}
