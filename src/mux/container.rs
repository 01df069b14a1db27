use crate::codec::buffer::BufferInfo;
use crate::codec::format::MediaFormat;
use crate::foundation::error::{ExportError, ExportResult};
use std::sync::{Arc, Mutex, MutexGuard};

/// Track index assigned by a container writer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackIndex(pub usize);

/// Container writer contract.
///
/// Lifecycle: `add_track` (once per track) -> `start` (once) -> `write_sample`* -> `stop` ->
/// `release`. The pipeline guarantees that ordering and serializes every call, so
/// implementations need not be internally synchronized.
pub trait ContainerWriter: Send {
    /// Register a track and return its index.
    fn add_track(&mut self, format: &MediaFormat) -> ExportResult<TrackIndex>;

    /// Begin writing. No sample is written before this succeeds.
    fn start(&mut self) -> ExportResult<()>;

    /// Append one compressed sample. `data` is exactly the payload described by `info`.
    fn write_sample(
        &mut self,
        track: TrackIndex,
        data: &[u8],
        info: &BufferInfo,
    ) -> ExportResult<()>;

    /// Finish the container. Only called after a successful `start`.
    fn stop(&mut self) -> ExportResult<()>;

    /// Free native resources. Always called, even if `start` never happened.
    fn release(&mut self) -> ExportResult<()>;
}

/// One sample captured by [`InMemoryContainer`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MuxedSample {
    /// Track the sample was written to.
    pub track: TrackIndex,
    /// Payload bytes.
    pub data: Vec<u8>,
    /// Metadata as passed to `write_sample`.
    pub info: BufferInfo,
}

/// Everything an [`InMemoryContainer`] observed, in call order.
#[derive(Clone, Debug, Default)]
pub struct ContainerRecord {
    /// Registered track formats; the position is the track index.
    pub tracks: Vec<MediaFormat>,
    /// Number of `start` calls, including rejected ones.
    pub start_calls: u32,
    /// Number of `stop` calls.
    pub stop_calls: u32,
    /// `release` has been called.
    pub released: bool,
    /// Samples in arrival order.
    pub samples: Vec<MuxedSample>,
    /// Protocol violations that were rejected.
    pub violations: Vec<String>,
}

impl ContainerRecord {
    /// Samples written to `track`, in arrival order.
    pub fn samples_for(&self, track: TrackIndex) -> impl Iterator<Item = &MuxedSample> {
        self.samples.iter().filter(move |s| s.track == track)
    }

    /// Index of the first track whose format satisfies `pred`.
    pub fn track_where(&self, pred: impl Fn(&MediaFormat) -> bool) -> Option<TrackIndex> {
        self.tracks.iter().position(pred).map(TrackIndex)
    }
}

/// Container writer that keeps samples in memory.
///
/// Useful for tests and dry runs. It rejects (and records) protocol violations: samples before
/// `start`, a second `start`, tracks added after `start`, and unknown track indices.
#[derive(Debug, Default)]
pub struct InMemoryContainer {
    record: Arc<Mutex<ContainerRecord>>,
    started: bool,
}

/// Shared read access to an [`InMemoryContainer`]'s record after the writer moved into a session.
#[derive(Clone, Debug, Default)]
pub struct ContainerHandle {
    record: Arc<Mutex<ContainerRecord>>,
}

impl ContainerHandle {
    /// Clone the current record.
    pub fn snapshot(&self) -> ContainerRecord {
        lock_record(&self.record).clone()
    }
}

impl InMemoryContainer {
    /// Create an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle that stays readable after the container is boxed and moved.
    pub fn handle(&self) -> ContainerHandle {
        ContainerHandle {
            record: self.record.clone(),
        }
    }

    fn reject(&self, msg: String) -> ExportError {
        lock_record(&self.record).violations.push(msg.clone());
        ExportError::session(msg)
    }
}

impl ContainerWriter for InMemoryContainer {
    fn add_track(&mut self, format: &MediaFormat) -> ExportResult<TrackIndex> {
        if self.started {
            return Err(self.reject(format!("track '{}' added after start", format.mime)));
        }
        let mut rec = lock_record(&self.record);
        rec.tracks.push(format.clone());
        Ok(TrackIndex(rec.tracks.len() - 1))
    }

    fn start(&mut self) -> ExportResult<()> {
        lock_record(&self.record).start_calls += 1;
        if self.started {
            return Err(self.reject("container started twice".to_owned()));
        }
        self.started = true;
        Ok(())
    }

    fn write_sample(
        &mut self,
        track: TrackIndex,
        data: &[u8],
        info: &BufferInfo,
    ) -> ExportResult<()> {
        if !self.started {
            return Err(self.reject(format!(
                "sample for track {} written before start",
                track.0
            )));
        }
        if data.len() != info.size {
            return Err(self.reject(format!(
                "sample payload is {} bytes but info.size is {}",
                data.len(),
                info.size
            )));
        }
        let mut rec = lock_record(&self.record);
        if track.0 >= rec.tracks.len() {
            drop(rec);
            return Err(self.reject(format!("unknown track {}", track.0)));
        }
        rec.samples.push(MuxedSample {
            track,
            data: data.to_vec(),
            info: *info,
        });
        Ok(())
    }

    fn stop(&mut self) -> ExportResult<()> {
        lock_record(&self.record).stop_calls += 1;
        if !self.started {
            return Err(self.reject("container stopped before start".to_owned()));
        }
        Ok(())
    }

    fn release(&mut self) -> ExportResult<()> {
        lock_record(&self.record).released = true;
        Ok(())
    }
}

fn lock_record(record: &Mutex<ContainerRecord>) -> MutexGuard<'_, ContainerRecord> {
    // The record is plain data; a panic mid-update cannot leave it logically inconsistent.
    record.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
#[path = "../../tests/unit/mux/container.rs"]
mod tests;
