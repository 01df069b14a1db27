use crate::codec::buffer::BufferInfo;
use crate::codec::format::MediaFormat;
use crate::foundation::error::{ExportError, ExportResult};
use crate::mux::container::{ContainerWriter, TrackIndex};
use crate::mux::gate::StartGate;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Which encoder a track belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackRole {
    /// The surface-fed video encoder.
    Video,
    /// The buffer-fed audio encoder.
    Audio,
}

impl std::fmt::Display for TrackRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Video => f.write_str("video"),
            Self::Audio => f.write_str("audio"),
        }
    }
}

/// Container writer lifecycle: `Unstarted -> Started -> Stopped`, or `Unstarted -> Stopped`
/// when the session ends before both tracks were known.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriterPhase {
    /// Tracks may be registered; no sample may be written.
    Unstarted,
    /// Both tracks registered and the writer started; samples flow.
    Started,
    /// Writer stopped and released.
    Stopped,
}

struct MuxInner {
    writer: Option<Box<dyn ContainerWriter>>,
    video: Option<TrackIndex>,
    audio: Option<TrackIndex>,
    phase: WriterPhase,
}

impl MuxInner {
    fn slot(&mut self, role: TrackRole) -> &mut Option<TrackIndex> {
        match role {
            TrackRole::Video => &mut self.video,
            TrackRole::Audio => &mut self.audio,
        }
    }
}

/// Shared container state touched by both drain paths.
///
/// One mutex guards track registration, the start-once transition and sample submission, so
/// "register, then check both registered and start" is observed atomically and writes from the
/// caller thread and the audio feeder thread never interleave inside the writer. The
/// [`StartGate`] is the release signal for writers that arrive before the start.
pub struct MuxCoordinator {
    inner: Mutex<MuxInner>,
    gate: StartGate,
}

impl MuxCoordinator {
    /// Wrap a freshly created, unstarted container writer.
    pub fn new(writer: Box<dyn ContainerWriter>) -> Self {
        Self {
            inner: Mutex::new(MuxInner {
                writer: Some(writer),
                video: None,
                audio: None,
                phase: WriterPhase::Unstarted,
            }),
            gate: StartGate::new(),
        }
    }

    /// The start gate sample writers wait on.
    pub fn gate(&self) -> &StartGate {
        &self.gate
    }

    /// Current writer phase.
    pub fn phase(&self) -> WriterPhase {
        self.lock().map(|inner| inner.phase).unwrap_or(WriterPhase::Stopped)
    }

    /// Track registered for `role`, if its format has been announced.
    pub fn track(&self, role: TrackRole) -> Option<TrackIndex> {
        self.lock().ok().and_then(|mut inner| *inner.slot(role))
    }

    /// Register the track for `role`. The first registration per role wins.
    ///
    /// When this call completes the pair, the writer is started and the gate opened, exactly
    /// once, regardless of which role arrived first.
    pub fn register_track(&self, role: TrackRole, format: &MediaFormat) -> ExportResult<TrackIndex> {
        let mut inner = self.lock()?;
        if inner.phase == WriterPhase::Stopped {
            return Err(ExportError::session(format!(
                "{role} format announced after the container writer stopped"
            )));
        }
        if let Some(existing) = *inner.slot(role) {
            warn!(%role, track = existing.0, mime = %format.mime, "output format announced again; keeping first track");
            return Ok(existing);
        }

        let writer = inner
            .writer
            .as_mut()
            .ok_or_else(|| ExportError::session("container writer already released"))?;
        let track = writer.add_track(format)?;
        *inner.slot(role) = Some(track);
        info!(%role, track = track.0, mime = %format.mime, "registered container track");

        if inner.video.is_some() && inner.audio.is_some() && inner.phase == WriterPhase::Unstarted {
            let started = inner
                .writer
                .as_mut()
                .ok_or_else(|| ExportError::session("container writer already released"))?
                .start();
            if let Err(e) = started {
                self.gate.close(format!("container writer failed to start: {e}"));
                return Err(e);
            }
            inner.phase = WriterPhase::Started;
            self.gate.open();
            info!("both tracks registered; container writer started");
        }
        Ok(track)
    }

    /// Write one sample for `role`, blocking until the writer has started.
    pub fn write_sample(&self, role: TrackRole, data: &[u8], info: &BufferInfo) -> ExportResult<()> {
        self.gate.wait()?;

        let mut inner = self.lock()?;
        if inner.phase != WriterPhase::Started {
            return Err(ExportError::session(format!(
                "{role} sample arrived while the container writer is {:?}",
                inner.phase
            )));
        }
        let track = (*inner.slot(role)).ok_or_else(|| {
            ExportError::session(format!("{role} sample arrived before its track was registered"))
        })?;
        let writer = inner
            .writer
            .as_mut()
            .ok_or_else(|| ExportError::session("container writer already released"))?;
        writer.write_sample(track, data, info)?;
        debug!(%role, track = track.0, bytes = data.len(), pts_us = info.presentation_time_us, "sample written");
        Ok(())
    }

    /// Release anyone blocked on the gate if the writer has not started yet.
    pub fn close_gate(&self, reason: impl Into<String>) -> bool {
        self.gate.close(reason)
    }

    /// Stop (only if started) and release the writer. Best-effort: failures are logged.
    pub fn finish(&self) {
        self.gate.close("container writer finished before both tracks were known");

        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => {
                warn!("container writer lock poisoned; releasing anyway");
                poisoned.into_inner()
            }
        };
        let was_started = inner.phase == WriterPhase::Started;
        inner.phase = WriterPhase::Stopped;
        let Some(mut writer) = inner.writer.take() else {
            return;
        };
        if was_started && let Err(e) = writer.stop() {
            warn!(error = %e, "container writer stop failed");
        }
        if let Err(e) = writer.release() {
            warn!(error = %e, "container writer release failed");
        }
    }

    fn lock(&self) -> ExportResult<MutexGuard<'_, MuxInner>> {
        self.inner
            .lock()
            .map_err(|_| ExportError::resource("container writer lock poisoned"))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/mux/coordinator.rs"]
mod tests;
