use crate::backend::MediaBackend;
use crate::codec::encoder::{AudioEncoder, EncoderOutput, VideoEncoder};
use crate::encode::audio_feeder::{AudioCursor, AudioFeeder, FeederHandle, FeederStats};
use crate::encode::drain::{DrainMode, DrainStats, drain_encoder};
use crate::foundation::core::FrameIndex;
use crate::foundation::error::{ExportError, ExportResult};
use crate::mux::coordinator::{MuxCoordinator, TrackRole, WriterPhase};
use crate::render::context::BoundContext;
use crate::session::opts::{EncodeParams, SessionOpts};
use crate::timing::clock::PresentationClock;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lifecycle of an [`ExportSession`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing created yet.
    Uninitialized,
    /// `begin_encoding` is creating resources, or failed partway and awaits `end_encoding`.
    Configuring,
    /// Frames may be submitted.
    Encoding,
    /// `end_encoding` is flushing and tearing down.
    DrainingFinal,
    /// Everything released. A new export may begin.
    TornDown,
}

/// What an export produced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExportSummary {
    /// Video frames submitted.
    pub frames: u64,
    /// Video drain counters across all passes.
    pub video: DrainStats,
    /// Audio drain counters across all passes, including the feeder's.
    pub audio: DrainStats,
    /// Audio feeder counters.
    pub feeder: FeederStats,
    /// The export was aborted; no final flush ran.
    pub aborted: bool,
    /// The container writer started, so the output holds both tracks.
    pub writer_started: bool,
}

/// Drives one export at a time: encoders, container writer, rendering context and the audio
/// feeder thread.
///
/// Typical use:
/// 1. [`ExportSession::begin_encoding`];
/// 2. render into the bound context, then [`ExportSession::add_frame`], once per frame;
/// 3. [`ExportSession::end_encoding`].
///
/// `end_encoding` must also be called after a failed `begin_encoding` to release whatever was
/// created. Dropping a session that was not ended performs an aborting teardown.
///
/// The session binds a GPU context to the calling thread and must stay on that thread.
pub struct ExportSession {
    backend: Box<dyn MediaBackend>,
    opts: SessionOpts,
    state: SessionState,
    faulted: bool,
    clock: Option<PresentationClock>,
    next_frame: FrameIndex,
    mux: Option<Arc<MuxCoordinator>>,
    video: Option<Box<dyn VideoEncoder>>,
    audio: Option<Box<dyn AudioEncoder>>,
    context: Option<BoundContext>,
    feeder: Option<FeederHandle>,
    video_drain: DrainStats,
    audio_drain: DrainStats,
}

impl ExportSession {
    /// Create an idle session over `backend`.
    pub fn new(backend: Box<dyn MediaBackend>, opts: SessionOpts) -> Self {
        Self {
            backend,
            opts,
            state: SessionState::Uninitialized,
            faulted: false,
            clock: None,
            next_frame: FrameIndex::default(),
            mux: None,
            video: None,
            audio: None,
            context: None,
            feeder: None,
            video_drain: DrainStats::default(),
            audio_drain: DrainStats::default(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Session options.
    pub fn opts(&self) -> &SessionOpts {
        &self.opts
    }

    /// Frames submitted in the current export.
    pub fn frames_submitted(&self) -> u64 {
        self.next_frame.0
    }

    /// Start an export, loading the raw audio from `params.audio_path` through the backend.
    ///
    /// Configuration errors are returned before anything is created and leave the session
    /// untouched. Any later failure leaves the session in [`SessionState::Configuring`] with
    /// partially created resources; call [`Self::end_encoding`] to release them.
    #[tracing::instrument(skip(self, params), fields(width = params.width, height = params.height))]
    pub fn begin_encoding(&mut self, params: &EncodeParams) -> ExportResult<()> {
        self.begin(params, None)
    }

    /// Like [`Self::begin_encoding`], with the raw audio supplied in memory.
    #[tracing::instrument(skip(self, params, pcm), fields(width = params.width, height = params.height, audio_bytes = pcm.len()))]
    pub fn begin_encoding_with_pcm(&mut self, params: &EncodeParams, pcm: Vec<u8>) -> ExportResult<()> {
        self.begin(params, Some(pcm))
    }

    fn begin(&mut self, params: &EncodeParams, pcm: Option<Vec<u8>>) -> ExportResult<()> {
        match self.state {
            SessionState::Uninitialized | SessionState::TornDown => {}
            other => {
                return Err(ExportError::session(format!(
                    "begin_encoding called while the session is {other:?}"
                )));
            }
        }
        params.validate()?;
        let video_config = params.video_config(&self.opts)?;
        let audio_config = params.audio_config(&self.opts)?;
        let clock = PresentationClock::new(params.frame_rate()?, params.audio_layout(&self.opts)?);

        self.state = SessionState::Configuring;
        self.faulted = false;
        self.next_frame = FrameIndex::default();
        self.video_drain = DrainStats::default();
        self.audio_drain = DrainStats::default();

        let video = self
            .video
            .insert(self.backend.create_video_encoder(&video_config)?);
        let surface = video.create_input_surface()?;
        video.start()?;

        let audio = self
            .audio
            .insert(self.backend.create_audio_encoder(&audio_config)?);
        audio.start()?;

        let writer = self
            .backend
            .create_container(&params.output_path, self.opts.container_format)?;
        let mux = Arc::new(MuxCoordinator::new(writer));
        self.mux = Some(mux.clone());

        let device = self.backend.create_render_device()?;
        self.context = Some(BoundContext::bind(
            device,
            surface,
            &self.opts.context_attributes,
        )?);

        let pcm = match pcm {
            Some(pcm) => pcm,
            None => self.backend.load_audio(&params.audio_path)?,
        };

        let timeout = self.opts.output_timeout();
        if let Some(video) = self.video.as_mut() {
            let stats = drain_encoder(video.as_mut(), TrackRole::Video, &mux, DrainMode::Poll, timeout)?;
            self.video_drain.merge(&stats);
        }
        if let Some(audio) = self.audio.as_mut() {
            let stats = drain_encoder(audio.as_mut(), TrackRole::Audio, &mux, DrainMode::Poll, timeout)?;
            self.audio_drain.merge(&stats);
        }
        let audio = self
            .audio
            .take()
            .ok_or_else(|| ExportError::session("audio encoder missing after creation"))?;

        let audio_bytes = pcm.len();
        let feeder = AudioFeeder::new(
            audio,
            AudioCursor::new(pcm),
            clock,
            mux,
            self.opts.input_timeout(),
            timeout,
        );
        self.feeder = Some(feeder.spawn(&self.opts.feeder_thread_name)?);
        self.clock = Some(clock);
        self.state = SessionState::Encoding;
        info!(
            output = %params.output_path.display(),
            fps_num = params.frame_rate_num,
            fps_den = params.frame_rate_den,
            channels = params.channels(),
            audio_bytes,
            "export session encoding"
        );
        Ok(())
    }

    /// Submit the frame currently rendered into the bound context.
    ///
    /// Stamps it with the next presentation time, presents it to the encoder surface and runs
    /// one polling drain of the video encoder. Rendering-context failures are fatal: the session
    /// only accepts `end_encoding` afterwards.
    pub fn add_frame(&mut self) -> ExportResult<FrameIndex> {
        if self.state != SessionState::Encoding {
            return Err(ExportError::session(format!(
                "add_frame called while the session is {:?}",
                self.state
            )));
        }
        if self.faulted {
            return Err(ExportError::session(
                "add_frame called after a fatal error; end the session",
            ));
        }
        let (Some(clock), Some(context), Some(video), Some(mux)) = (
            self.clock.as_ref(),
            self.context.as_mut(),
            self.video.as_mut(),
            self.mux.as_ref(),
        ) else {
            return Err(ExportError::session("encoding session is missing resources"));
        };

        let frame = self.next_frame;
        let pts_ns = clock.video_pts_ns(frame);
        if let Err(e) = context.present(pts_ns) {
            self.faulted = true;
            return Err(e);
        }
        self.next_frame = frame.next();

        let stats = drain_encoder(
            video.as_mut(),
            TrackRole::Video,
            mux,
            DrainMode::Poll,
            self.opts.output_timeout(),
        );
        let stats = match stats {
            Ok(stats) => stats,
            Err(e) => {
                self.faulted = true;
                return Err(e);
            }
        };
        self.video_drain.merge(&stats);
        debug!(frame = frame.0, pts_ns, samples = stats.samples_written, "frame submitted");
        Ok(frame)
    }

    /// Finish the export and release everything.
    ///
    /// With `abort == false` the video encoder is flushed, the audio feeder is joined and the
    /// audio encoder is flushed. With `abort == true` the feeder is stopped early and no flush
    /// runs. Teardown always completes; the first fatal error, if any, is returned afterwards.
    #[tracing::instrument(skip(self))]
    pub fn end_encoding(&mut self, abort: bool) -> ExportResult<ExportSummary> {
        match self.state {
            SessionState::Uninitialized | SessionState::TornDown => {
                debug!(state = ?self.state, "nothing to tear down");
                return Ok(ExportSummary {
                    aborted: abort,
                    ..Default::default()
                });
            }
            SessionState::Configuring | SessionState::Encoding | SessionState::DrainingFinal => {}
        }
        let aborting = abort || self.state != SessionState::Encoding;
        self.state = SessionState::DrainingFinal;

        let mut first_error = None;
        let mut feeder = FeederStats::default();

        if aborting {
            if let Some((stats, result)) = self.stop_feeder("export aborted") {
                feeder = stats;
                if let Err(e) = result
                    && !e.is_abort()
                {
                    warn!(error = %e, "audio feeder failed before abort");
                }
            }
        } else {
            let mode = if self.opts.flush_to_end_of_stream {
                DrainMode::UntilEndOfStream
            } else {
                DrainMode::Poll
            };
            if let Err(e) = self.flush_video(mode) {
                keep_first(&mut first_error, e);
            }
            if let Some(mux) = &self.mux
                && mux.close_gate("video stream ended before the audio track was announced")
            {
                debug!("start gate closed while still pending");
            }
            if let Some((stats, result)) = self.join_feeder() {
                feeder = stats;
                match result {
                    Ok(()) => {
                        if let Err(e) = self.flush_audio(mode, &stats) {
                            keep_first(&mut first_error, e);
                        }
                    }
                    Err(e) if e.is_abort() => debug!(error = %e, "audio feeder released by closed gate"),
                    Err(e) => keep_first(&mut first_error, e),
                }
            }
        }

        let writer_started = self
            .mux
            .as_ref()
            .is_some_and(|mux| mux.phase() == WriterPhase::Started);
        self.teardown();

        let mut audio = self.audio_drain;
        audio.merge(&feeder.drain);
        let summary = ExportSummary {
            frames: self.next_frame.0,
            video: self.video_drain,
            audio,
            feeder,
            aborted: aborting,
            writer_started,
        };
        info!(
            frames = summary.frames,
            video_samples = summary.video.samples_written,
            audio_samples = summary.audio.samples_written,
            aborted = summary.aborted,
            "export session ended"
        );

        if let Some(e) = first_error {
            return Err(e);
        }
        if !aborting && !writer_started {
            return Err(ExportError::encoder(
                "container writer never started: an encoder did not announce its output format",
            ));
        }
        Ok(summary)
    }

    fn flush_video(&mut self, mode: DrainMode) -> ExportResult<()> {
        let (Some(video), Some(mux)) = (self.video.as_mut(), self.mux.as_ref()) else {
            return Ok(());
        };
        if mode == DrainMode::UntilEndOfStream {
            video.signal_end_of_input_stream()?;
        }
        let stats = drain_encoder(
            video.as_mut(),
            TrackRole::Video,
            mux,
            mode,
            self.opts.output_timeout(),
        )?;
        self.video_drain.merge(&stats);
        Ok(())
    }

    fn flush_audio(&mut self, mode: DrainMode, feeder: &FeederStats) -> ExportResult<()> {
        let (Some(audio), Some(mux)) = (self.audio.as_mut(), self.mux.as_ref()) else {
            return Ok(());
        };
        if feeder.drain.end_of_stream {
            debug!("audio end of stream already drained by the feeder");
            return Ok(());
        }
        if mode == DrainMode::UntilEndOfStream && !feeder.end_of_stream_queued {
            return Ok(());
        }
        if !mux.gate().is_open() {
            debug!("container writer not started; skipping final audio drain");
            return Ok(());
        }
        let stats = drain_encoder(
            audio.as_mut(),
            TrackRole::Audio,
            mux,
            mode,
            self.opts.output_timeout(),
        )?;
        self.audio_drain.merge(&stats);
        Ok(())
    }

    /// Join the feeder and take the audio encoder back.
    fn join_feeder(&mut self) -> Option<(FeederStats, ExportResult<()>)> {
        let handle = self.feeder.take()?;
        match handle.join() {
            Ok(report) => {
                self.audio = Some(report.encoder);
                Some((report.stats, report.result))
            }
            Err(e) => Some((FeederStats::default(), Err(e))),
        }
    }

    fn stop_feeder(&mut self, reason: &str) -> Option<(FeederStats, ExportResult<()>)> {
        if let Some(feeder) = &self.feeder {
            feeder.request_abort();
        }
        if let Some(mux) = &self.mux {
            mux.close_gate(reason);
        }
        self.join_feeder()
    }

    /// Release in order: encoders, rendering context, container writer. Never fails.
    fn teardown(&mut self) {
        if self.feeder.is_some() {
            self.stop_feeder("session torn down");
        }
        if let Some(mut video) = self.video.take() {
            release_encoder(video.as_mut(), TrackRole::Video);
        }
        if let Some(mut audio) = self.audio.take() {
            release_encoder(audio.as_mut(), TrackRole::Audio);
        }
        drop(self.context.take());
        if let Some(mux) = self.mux.take() {
            mux.finish();
        }
        self.clock = None;
        self.state = SessionState::TornDown;
    }
}

impl Drop for ExportSession {
    fn drop(&mut self) {
        if matches!(
            self.state,
            SessionState::Configuring | SessionState::Encoding | SessionState::DrainingFinal
        ) {
            warn!(state = ?self.state, "export session dropped without end_encoding; aborting");
            self.teardown();
        }
    }
}

fn release_encoder(encoder: &mut dyn EncoderOutput, role: TrackRole) {
    if let Err(e) = encoder.stop() {
        warn!(%role, error = %e, "encoder stop failed");
    }
    if let Err(e) = encoder.release() {
        warn!(%role, error = %e, "encoder release failed");
    }
}

/// Keep the first error, preferring a real failure over the abort it caused elsewhere.
fn keep_first(slot: &mut Option<ExportError>, e: ExportError) {
    match slot {
        Some(first) if first.is_abort() && !e.is_abort() => {
            debug!(error = %first, "superseded by the failure that closed the gate");
            *slot = Some(e);
        }
        Some(first) => warn!(error = %e, first = %first, "additional error during end_encoding"),
        None => *slot = Some(e),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/export_session.rs"]
mod tests;
