use crate::codec::buffer::SampleFlags;
use crate::codec::encoder::AudioEncoder;
use crate::encode::drain::{DrainMode, DrainStats, drain_encoder};
use crate::foundation::error::{ExportError, ExportResult};
use crate::mux::coordinator::{MuxCoordinator, TrackRole};
use crate::timing::clock::PresentationClock;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info};

/// Read position inside the raw audio byte stream. Only the feeder thread advances it.
#[derive(Clone, Debug, Default)]
pub struct AudioCursor {
    data: Vec<u8>,
    offset: usize,
}

impl AudioCursor {
    /// Start at the beginning of `data`.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, offset: 0 }
    }

    /// Bytes consumed so far.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Total length of the stream.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Return `true` for an empty stream.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes left to consume.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    /// Return `true` once the offset equals the stream length.
    pub fn is_exhausted(&self) -> bool {
        self.offset == self.data.len()
    }

    /// Copy as many bytes as fit into `dst` and advance. Returns the number copied.
    pub fn fill(&mut self, dst: &mut [u8]) -> usize {
        let len = self.remaining().min(dst.len());
        dst[..len].copy_from_slice(&self.data[self.offset..self.offset + len]);
        self.offset += len;
        len
    }
}

/// What the feeder thread did before it exited.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeederStats {
    /// Input chunks queued into the audio encoder.
    pub chunks_queued: u64,
    /// PCM bytes queued.
    pub bytes_queued: u64,
    /// The end-of-stream chunk was queued.
    pub end_of_stream_queued: bool,
    /// The thread stopped because abort was requested.
    pub aborted: bool,
    /// Drain passes run on the audio encoder by the feeder.
    pub drain: DrainStats,
}

/// Feeder thread result handed back on join, including ownership of the audio encoder.
pub(crate) struct FeederReport {
    pub(crate) encoder: Box<dyn AudioEncoder>,
    pub(crate) stats: FeederStats,
    pub(crate) result: ExportResult<()>,
}

enum FeedStep {
    Queued { end_of_stream: bool },
    Aborted,
}

/// Pushes raw PCM chunks into the audio encoder and drains its output after each push.
pub(crate) struct AudioFeeder {
    encoder: Box<dyn AudioEncoder>,
    cursor: AudioCursor,
    clock: PresentationClock,
    mux: Arc<MuxCoordinator>,
    abort: Arc<AtomicBool>,
    input_timeout: Duration,
    output_timeout: Duration,
    stats: FeederStats,
}

impl AudioFeeder {
    pub(crate) fn new(
        encoder: Box<dyn AudioEncoder>,
        cursor: AudioCursor,
        clock: PresentationClock,
        mux: Arc<MuxCoordinator>,
        input_timeout: Duration,
        output_timeout: Duration,
    ) -> Self {
        Self {
            encoder,
            cursor,
            clock,
            mux,
            abort: Arc::new(AtomicBool::new(false)),
            input_timeout,
            output_timeout,
            stats: FeederStats::default(),
        }
    }

    /// Shared abort flag; checked before every iteration and between input-slot polls.
    pub(crate) fn abort_flag(&self) -> Arc<AtomicBool> {
        self.abort.clone()
    }

    /// Start the feeder on its own named thread.
    ///
    /// If the thread cannot be created the encoder is dropped with the closure.
    pub(crate) fn spawn(self, name: &str) -> ExportResult<FeederHandle> {
        let abort = self.abort_flag();
        let handle = std::thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || self.run())
            .map_err(|e| ExportError::resource(format!("failed to spawn audio feeder thread: {e}")))?;
        Ok(FeederHandle { handle, abort })
    }

    /// Feed until the cursor is exhausted, abort is observed, or an error occurs.
    pub(crate) fn run(mut self) -> FeederReport {
        info!(bytes = self.cursor.len(), "audio feeder started");
        // A panic must still hand the encoder back so teardown can stop and release it.
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.feed_loop()))
            .unwrap_or_else(|_| Err(ExportError::encoder("audio feeder panicked")));
        match &result {
            Ok(()) => info!(
                chunks = self.stats.chunks_queued,
                bytes = self.stats.bytes_queued,
                aborted = self.stats.aborted,
                "audio feeder finished"
            ),
            Err(e) if e.is_abort() => debug!(error = %e, "audio feeder released by closed start gate"),
            Err(e) => {
                error!(error = %e, offset = self.cursor.offset(), "audio feeder failed");
                self.mux.close_gate(format!("audio feeder failed: {e}"));
            }
        }
        FeederReport {
            encoder: self.encoder,
            stats: self.stats,
            result,
        }
    }

    fn feed_loop(&mut self) -> ExportResult<()> {
        loop {
            if self.abort.load(Ordering::Acquire) {
                self.stats.aborted = true;
                return Ok(());
            }
            match self.feed_once()? {
                FeedStep::Aborted => {
                    self.stats.aborted = true;
                    return Ok(());
                }
                FeedStep::Queued { end_of_stream } => {
                    let drained = drain_encoder(
                        self.encoder.as_mut(),
                        TrackRole::Audio,
                        &self.mux,
                        DrainMode::Poll,
                        self.output_timeout,
                    )?;
                    self.stats.drain.merge(&drained);
                    if end_of_stream {
                        return self.await_announcement();
                    }
                }
            }
        }
    }

    /// Keep polling audio output after the last chunk until the audio track is registered.
    ///
    /// The feeder is the only audio drainer before teardown; the writer starts only once both
    /// tracks exist.
    fn await_announcement(&mut self) -> ExportResult<()> {
        while self.mux.track(TrackRole::Audio).is_none() && !self.stats.drain.end_of_stream {
            if self.mux.gate().is_closed() {
                debug!("start gate closed before the audio format was announced");
                return Ok(());
            }
            if self.abort.load(Ordering::Acquire) {
                self.stats.aborted = true;
                return Ok(());
            }
            let drained = drain_encoder(
                self.encoder.as_mut(),
                TrackRole::Audio,
                &self.mux,
                DrainMode::Poll,
                self.output_timeout,
            )?;
            self.stats.drain.merge(&drained);
        }
        Ok(())
    }

    fn feed_once(&mut self) -> ExportResult<FeedStep> {
        // Cancellable wait for a free slot: bounded polls with an abort check in between.
        let slot = loop {
            if self.abort.load(Ordering::Acquire) {
                return Ok(FeedStep::Aborted);
            }
            if let Some(slot) = self.encoder.dequeue_input_buffer(self.input_timeout)? {
                break slot;
            }
        };

        let offset = self.cursor.offset();
        let pts_us = self.clock.audio_pts_us(offset as u64);
        let buffer = self.encoder.input_buffer_mut(slot.index).ok_or_else(|| {
            ExportError::encoder(format!("audio encoder offered missing input buffer {}", slot.index))
        })?;
        let capacity = slot.capacity.min(buffer.len());
        if capacity == 0 && !self.cursor.is_exhausted() {
            return Err(ExportError::encoder(format!(
                "audio encoder offered zero-capacity input buffer {}",
                slot.index
            )));
        }

        let len = self.cursor.fill(&mut buffer[..capacity]);
        let end_of_stream = self.cursor.is_exhausted();
        let flags = if end_of_stream {
            SampleFlags::END_OF_STREAM
        } else {
            SampleFlags::NONE
        };
        self.encoder
            .queue_input_buffer(slot.index, len, pts_us, flags)?;

        self.stats.chunks_queued += 1;
        self.stats.bytes_queued += len as u64;
        self.stats.end_of_stream_queued |= end_of_stream;
        debug!(offset, len, pts_us, end_of_stream, "queued audio chunk");
        Ok(FeedStep::Queued { end_of_stream })
    }
}

/// Owning handle of a running feeder thread.
pub(crate) struct FeederHandle {
    handle: JoinHandle<FeederReport>,
    abort: Arc<AtomicBool>,
}

impl FeederHandle {
    /// Ask the feeder to stop before its next iteration or slot poll.
    pub(crate) fn request_abort(&self) {
        self.abort.store(true, Ordering::Release);
    }

    /// Wait for the thread to exit and take back the encoder.
    pub(crate) fn join(self) -> ExportResult<FeederReport> {
        self.handle
            .join()
            .map_err(|_| ExportError::encoder("audio feeder thread panicked"))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/audio_feeder.rs"]
mod tests;
