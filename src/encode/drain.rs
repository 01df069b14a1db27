use crate::codec::buffer::{BufferInfo, OutputStatus};
use crate::codec::encoder::EncoderOutput;
use crate::foundation::error::{ExportError, ExportResult};
use crate::mux::coordinator::{MuxCoordinator, TrackRole};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// How long a drain pass keeps polling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrainMode {
    /// Return on the first "try again later". Never blocks beyond one poll timeout.
    Poll,
    /// Keep polling until an end-of-stream buffer is observed.
    UntilEndOfStream,
}

/// Counters accumulated by drain passes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainStats {
    /// Number of drain passes folded into these counters.
    pub passes: u64,
    /// Samples handed to the container writer.
    pub samples_written: u64,
    /// Payload bytes handed to the container writer.
    pub bytes_written: u64,
    /// Codec-config buffers discarded.
    pub codec_config_skipped: u64,
    /// Output buffer set refreshes.
    pub buffer_set_refreshes: u64,
    /// Undefined status codes that were logged and skipped.
    pub unexpected_statuses: u64,
    /// An output-format announcement was registered with the container.
    pub format_registered: bool,
    /// An end-of-stream buffer was observed.
    pub end_of_stream: bool,
}

impl DrainStats {
    /// Fold `other` into `self`.
    pub fn merge(&mut self, other: &DrainStats) {
        self.passes += other.passes;
        self.samples_written += other.samples_written;
        self.bytes_written += other.bytes_written;
        self.codec_config_skipped += other.codec_config_skipped;
        self.buffer_set_refreshes += other.buffer_set_refreshes;
        self.unexpected_statuses += other.unexpected_statuses;
        self.format_registered |= other.format_registered;
        self.end_of_stream |= other.end_of_stream;
    }
}

/// Run one drain pass over `encoder`'s output queue, forwarding samples to `mux` as `role`.
///
/// Outcomes per poll:
/// - try again later: return (`Poll`) or keep polling (`UntilEndOfStream`);
/// - buffers changed: refresh the cached output buffers;
/// - format changed: register the track (starting the writer once both roles are known);
/// - sample: codec-config buffers count as empty; non-empty payloads wait on the start gate,
///   are written under the role's track and the buffer is released; end-of-stream stops the
///   pass;
/// - undefined negative codes are logged and skipped.
///
/// Errors from the encoder service itself and from the container are returned.
pub fn drain_encoder(
    encoder: &mut dyn EncoderOutput,
    role: TrackRole,
    mux: &MuxCoordinator,
    mode: DrainMode,
    timeout: Duration,
) -> ExportResult<DrainStats> {
    let mut stats = DrainStats {
        passes: 1,
        ..Default::default()
    };
    trace!(%role, ?mode, "drain pass");

    encoder.refresh_output_buffers();
    loop {
        match encoder.dequeue_output_buffer(timeout)? {
            OutputStatus::TryAgainLater => {
                if mode == DrainMode::Poll {
                    break;
                }
                trace!(%role, "no output yet; awaiting end of stream");
            }
            OutputStatus::BuffersChanged => {
                encoder.refresh_output_buffers();
                stats.buffer_set_refreshes += 1;
            }
            OutputStatus::FormatChanged => {
                let format = encoder.output_format()?;
                debug!(%role, ?format, "encoder output format changed");
                mux.register_track(role, &format)?;
                stats.format_registered = true;
            }
            OutputStatus::Unexpected(code) => {
                warn!(%role, code, "unexpected status from dequeue_output_buffer");
                stats.unexpected_statuses += 1;
            }
            OutputStatus::Sample { index, mut info } => {
                if info.flags.codec_config {
                    debug!(%role, size = info.size, "ignoring codec-config buffer");
                    info.size = 0;
                    stats.codec_config_skipped += 1;
                }

                if info.size != 0 {
                    let written = forward_sample(encoder, role, mux, index, &info);
                    if let Err(e) = written {
                        if let Err(release_err) = encoder.release_output_buffer(index) {
                            warn!(%role, index, error = %release_err, "output buffer release failed");
                        }
                        return Err(e);
                    }
                    stats.samples_written += 1;
                    stats.bytes_written += info.size as u64;
                }

                encoder.release_output_buffer(index)?;

                if info.flags.end_of_stream {
                    if mode == DrainMode::Poll {
                        warn!(%role, "reached end of stream during a polling drain");
                    } else {
                        debug!(%role, "end of stream reached");
                    }
                    stats.end_of_stream = true;
                    break;
                }
            }
        }
    }
    Ok(stats)
}

fn forward_sample(
    encoder: &dyn EncoderOutput,
    role: TrackRole,
    mux: &MuxCoordinator,
    index: usize,
    info: &BufferInfo,
) -> ExportResult<()> {
    let buffer = encoder.output_buffer(index).ok_or_else(|| {
        ExportError::encoder(format!("{role} encoder reported sample in missing buffer {index}"))
    })?;
    let data = buffer.get(info.range()).ok_or_else(|| {
        ExportError::encoder(format!(
            "{role} sample range {:?} exceeds output buffer {index} of {} bytes",
            info.range(),
            buffer.len()
        ))
    })?;
    mux.write_sample(role, data, info)
}

#[cfg(test)]
#[path = "../../tests/unit/encode/drain.rs"]
mod tests;
