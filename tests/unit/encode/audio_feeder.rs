use super::*;
use crate::backend::MediaBackend;
use crate::backend::loopback::{LoopbackBackend, LoopbackOpts, LoopbackProbe};
use crate::codec::buffer::{InputSlot, OutputStatus};
use crate::codec::encoder::EncoderOutput;
use crate::codec::format::{AudioCodec, AudioEncoderConfig, MediaFormat};
use crate::foundation::core::{AudioLayout, FrameRate};
use crate::mux::container::{ContainerHandle, InMemoryContainer};

const T: Duration = Duration::from_millis(1);

struct Fixture {
    mux: Arc<MuxCoordinator>,
    container: ContainerHandle,
    probe: LoopbackProbe,
    feeder: AudioFeeder,
}

/// Audio encoder that reports "try again later" for its first polls and can panic on input.
struct Sluggish {
    inner: Box<dyn AudioEncoder>,
    quiet_polls: u32,
    panic_on_queue: bool,
}

impl EncoderOutput for Sluggish {
    fn dequeue_output_buffer(&mut self, timeout: Duration) -> ExportResult<OutputStatus> {
        if self.quiet_polls > 0 {
            self.quiet_polls -= 1;
            return Ok(OutputStatus::TryAgainLater);
        }
        self.inner.dequeue_output_buffer(timeout)
    }
    fn output_buffer(&self, index: usize) -> Option<&[u8]> {
        self.inner.output_buffer(index)
    }
    fn output_format(&self) -> ExportResult<MediaFormat> {
        self.inner.output_format()
    }
    fn release_output_buffer(&mut self, index: usize) -> ExportResult<()> {
        self.inner.release_output_buffer(index)
    }
    fn signal_end_of_input_stream(&mut self) -> ExportResult<()> {
        self.inner.signal_end_of_input_stream()
    }
    fn start(&mut self) -> ExportResult<()> {
        self.inner.start()
    }
    fn stop(&mut self) -> ExportResult<()> {
        self.inner.stop()
    }
    fn release(&mut self) -> ExportResult<()> {
        self.inner.release()
    }
}

impl AudioEncoder for Sluggish {
    fn dequeue_input_buffer(&mut self, timeout: Duration) -> ExportResult<Option<InputSlot>> {
        self.inner.dequeue_input_buffer(timeout)
    }
    fn input_buffer_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        self.inner.input_buffer_mut(index)
    }
    fn queue_input_buffer(
        &mut self,
        index: usize,
        len: usize,
        presentation_time_us: i64,
        flags: SampleFlags,
    ) -> ExportResult<()> {
        assert!(!self.panic_on_queue, "encoder service crashed");
        self.inner
            .queue_input_buffer(index, len, presentation_time_us, flags)
    }
}

fn fixture(pcm: Vec<u8>, opts: LoopbackOpts, video_registered: bool) -> Fixture {
    fixture_with(pcm, opts, video_registered, |encoder| encoder)
}

fn fixture_with(
    pcm: Vec<u8>,
    opts: LoopbackOpts,
    video_registered: bool,
    wrap: impl FnOnce(Box<dyn AudioEncoder>) -> Box<dyn AudioEncoder>,
) -> Fixture {
    let backend = LoopbackBackend::new(opts);
    let mut encoder = backend
        .create_audio_encoder(&AudioEncoderConfig {
            codec: AudioCodec::AacLc,
            sample_rate: 44_100,
            channels: 1,
            bitrate_bps: 96_000,
        })
        .unwrap();
    encoder.start().unwrap();

    let container = InMemoryContainer::new();
    let handle = container.handle();
    let mux = Arc::new(MuxCoordinator::new(Box::new(container)));
    if video_registered {
        mux.register_track(TrackRole::Video, &MediaFormat::video("video/avc", 64, 64))
            .unwrap();
    }

    let clock = PresentationClock::new(
        FrameRate::new(30, 1).unwrap(),
        AudioLayout::new(44_100, 1, 2).unwrap(),
    );
    let feeder = AudioFeeder::new(wrap(encoder), AudioCursor::new(pcm), clock, mux.clone(), T, T);
    Fixture {
        mux,
        container: handle,
        probe: backend.probe(),
        feeder,
    }
}

#[test]
fn cursor_fill_advances_to_exhaustion() {
    let mut cursor = AudioCursor::new((0u8..10).collect());
    let mut dst = [0u8; 4];
    assert_eq!(cursor.fill(&mut dst), 4);
    assert_eq!(dst, [0, 1, 2, 3]);
    assert_eq!(cursor.fill(&mut dst), 4);
    assert_eq!(cursor.fill(&mut dst), 2);
    assert_eq!(&dst[..2], &[8, 9]);
    assert!(cursor.is_exhausted());
    assert_eq!(cursor.fill(&mut dst), 0);
    assert_eq!(cursor.offset(), 10);
}

#[test]
fn zero_length_audio_emits_single_empty_end_of_stream_chunk() {
    let fx = fixture(Vec::new(), LoopbackOpts::default(), false);
    let report = fx.feeder.run();
    report.result.unwrap();

    assert_eq!(report.stats.chunks_queued, 1);
    assert_eq!(report.stats.bytes_queued, 0);
    assert!(report.stats.end_of_stream_queued);
    assert!(report.stats.drain.end_of_stream);

    let chunks = fx.probe.snapshot().audio_chunks;
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].len, 0);
    assert_eq!(chunks[0].presentation_time_us, 0);
    assert!(chunks[0].end_of_stream);

    // Audio registered, but nothing needed the writer.
    assert!(fx.mux.track(TrackRole::Audio).is_some());
    assert!(fx.container.snapshot().samples.is_empty());
}

#[test]
fn one_second_of_mono_audio_ends_exactly_at_buffer_length() {
    let fx = fixture(vec![0x55; 88_200], LoopbackOpts::default(), true);
    let report = fx.feeder.run();
    report.result.unwrap();

    let chunks = fx.probe.snapshot().audio_chunks;
    assert_eq!(chunks.len(), 22);
    assert_eq!(chunks.iter().filter(|c| c.end_of_stream).count(), 1);
    assert!(chunks.last().unwrap().end_of_stream);
    assert_eq!(chunks.iter().map(|c| c.len).sum::<usize>(), 88_200);

    let mut offset = 0u64;
    for chunk in &chunks {
        assert_eq!(chunk.presentation_time_us, (offset * 1_000_000 / 88_200) as i64);
        offset += chunk.len as u64;
    }
    assert_eq!(offset, 88_200);

    let record = fx.container.snapshot();
    let audio = fx.mux.track(TrackRole::Audio).unwrap();
    assert_eq!(record.samples_for(audio).count(), 22);
    assert!(record.violations.is_empty());
    assert_eq!(report.stats.drain.samples_written, 22);
}

#[test]
fn exact_multiple_of_slot_capacity_has_no_trailing_empty_chunk() {
    let opts = LoopbackOpts {
        audio_slot_capacity: 4_410,
        ..Default::default()
    };
    let fx = fixture(vec![1; 88_200], opts, true);
    let report = fx.feeder.run();
    report.result.unwrap();

    let chunks = fx.probe.snapshot().audio_chunks;
    assert_eq!(chunks.len(), 20);
    assert!(chunks.iter().all(|c| c.len == 4_410));
    assert!(chunks[19].end_of_stream);
}

#[test]
fn abort_before_first_iteration_queues_nothing() {
    let fx = fixture(vec![0; 1024], LoopbackOpts::default(), true);
    fx.feeder.abort_flag().store(true, Ordering::Release);
    let report = fx.feeder.run();
    report.result.unwrap();

    assert!(report.stats.aborted);
    assert_eq!(report.stats.chunks_queued, 0);
    assert!(!report.stats.end_of_stream_queued);
    assert!(fx.probe.snapshot().audio_chunks.is_empty());
}

#[test]
fn zero_capacity_slot_fails_and_closes_gate() {
    let opts = LoopbackOpts {
        audio_slot_capacity: 0,
        ..Default::default()
    };
    let fx = fixture(vec![0; 16], opts, false);
    let report = fx.feeder.run();

    assert!(matches!(report.result, Err(ExportError::Encoder(_))));
    assert!(!fx.mux.gate().is_open());
    assert!(fx.mux.gate().wait().unwrap_err().is_abort());
}

#[test]
fn spawned_feeder_is_released_by_closed_gate() {
    // Video never registers, so the first audio write waits on the gate until it closes.
    let fx = fixture(vec![3; 8192], LoopbackOpts::default(), false);
    let handle = fx.feeder.spawn("test-audio-feeder").unwrap();
    std::thread::sleep(Duration::from_millis(20));
    fx.mux.close_gate("session ended");
    handle.request_abort();

    let report = handle.join().unwrap();
    assert!(report.result.unwrap_err().is_abort());
    assert!(fx.container.snapshot().samples.is_empty());
}

#[test]
fn spawned_feeder_returns_encoder_on_join() {
    let fx = fixture(vec![9; 10_000], LoopbackOpts::default(), true);
    let handle = fx.feeder.spawn("test-audio-feeder").unwrap();
    let mut report = handle.join().unwrap();
    report.result.unwrap();
    assert!(report.stats.end_of_stream_queued);
    assert_eq!(report.stats.bytes_queued, 10_000);

    report.encoder.stop().unwrap();
    report.encoder.release().unwrap();
    let log = fx.probe.snapshot();
    assert!(log.audio.stopped && log.audio.released);
}

#[test]
fn late_format_announcement_is_awaited_after_last_chunk() {
    // One chunk carries end of stream, but the encoder only announces a few polls later.
    let fx = fixture_with(vec![5; 1000], LoopbackOpts::default(), true, |inner| {
        Box::new(Sluggish {
            inner,
            quiet_polls: 3,
            panic_on_queue: false,
        })
    });
    let report = fx.feeder.run();

    report.result.unwrap();
    assert_eq!(report.stats.chunks_queued, 1);
    assert!(report.stats.end_of_stream_queued);
    assert!(report.stats.drain.format_registered);
    assert!(report.stats.drain.passes > 1);
    assert!(fx.mux.track(TrackRole::Audio).is_some());
    assert!(fx.mux.gate().is_open());
    assert_eq!(fx.container.snapshot().start_calls, 1);
}

#[test]
fn late_format_wait_stops_on_abort() {
    let fx = fixture_with(vec![5; 1000], LoopbackOpts::default(), false, |inner| {
        Box::new(Sluggish {
            inner,
            quiet_polls: u32::MAX,
            panic_on_queue: false,
        })
    });
    let handle = fx.feeder.spawn("test-audio-feeder").unwrap();
    std::thread::sleep(Duration::from_millis(20));
    handle.request_abort();
    let report = handle.join().unwrap();

    report.result.unwrap();
    assert!(report.stats.aborted);
    assert!(fx.mux.track(TrackRole::Audio).is_none());
}

#[test]
fn panicking_encoder_is_handed_back_for_release() {
    let fx = fixture_with(vec![5; 1000], LoopbackOpts::default(), true, |inner| {
        Box::new(Sluggish {
            inner,
            quiet_polls: 0,
            panic_on_queue: true,
        })
    });
    let handle = fx.feeder.spawn("test-audio-feeder").unwrap();
    let mut report = handle.join().unwrap();

    assert!(matches!(report.result, Err(ExportError::Encoder(_))));
    assert!(fx.mux.gate().wait().unwrap_err().is_abort());
    report.encoder.stop().unwrap();
    report.encoder.release().unwrap();
    assert!(fx.probe.snapshot().audio.released);
}
