use super::MediaBackend;
use crate::codec::buffer::{BufferInfo, InputSlot, OutputStatus, SampleFlags};
use crate::codec::encoder::{AudioEncoder, EncoderOutput, InputSurface, VideoEncoder};
use crate::codec::format::{
    AudioEncoderConfig, ContainerFormat, MediaFormat, VideoEncoderConfig,
};
use crate::foundation::error::{ExportError, ExportResult};
use crate::mux::container::{ContainerHandle, ContainerWriter, InMemoryContainer};
use crate::render::context::{ContextAttributes, ContextSnapshot, RenderDevice};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// Failure the loopback backend injects on request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopbackFault {
    /// `create_container` fails.
    CreateContainer,
    /// `RenderDevice::initialize` fails.
    InitializeContext,
    /// `RenderDevice::swap_buffers` fails once `after` frames have been presented.
    SwapBuffers {
        /// Successful swaps before the failure.
        after: u64,
    },
    /// The audio encoder's `queue_input_buffer` fails on the first chunk.
    QueueAudio,
}

/// Loopback backend settings.
#[derive(Clone, Debug)]
pub struct LoopbackOpts {
    /// Capacity of each audio input slot in bytes.
    pub audio_slot_capacity: usize,
    /// Number of audio input slots.
    pub audio_input_slots: usize,
    /// Emit a codec-config buffer before the first media sample of each stream.
    pub emit_codec_config: bool,
    /// Handles reported as current before the session binds its context.
    pub host_context: ContextSnapshot,
    /// PCM returned by `load_audio` instead of reading the file system.
    pub audio: Option<Vec<u8>>,
    /// Injected failure.
    pub fault: Option<LoopbackFault>,
}

impl Default for LoopbackOpts {
    fn default() -> Self {
        Self {
            audio_slot_capacity: 4096,
            audio_input_slots: 2,
            emit_codec_config: true,
            host_context: ContextSnapshot {
                display: 1,
                context: 1,
                draw_surface: 1,
                read_surface: 1,
            },
            audio: None,
            fault: None,
        }
    }
}

/// Start/stop/release bookkeeping of one service instance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Lifecycle {
    /// Created by the backend.
    pub created: bool,
    /// `start` succeeded.
    pub started: bool,
    /// `stop` was called.
    pub stopped: bool,
    /// `release` (or `destroy`) was called.
    pub released: bool,
}

/// One PCM chunk as the loopback audio encoder received it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueuedChunk {
    /// Input slot used.
    pub slot: usize,
    /// Payload length in bytes.
    pub len: usize,
    /// Timestamp attached by the feeder.
    pub presentation_time_us: i64,
    /// Chunk carried the end-of-stream flag.
    pub end_of_stream: bool,
}

/// Everything the loopback services did, shared through [`LoopbackProbe`].
#[derive(Clone, Debug, Default)]
pub struct LoopbackLog {
    /// Video encoder configuration as requested.
    pub video_config: Option<VideoEncoderConfig>,
    /// Audio encoder configuration as requested.
    pub audio_config: Option<AudioEncoderConfig>,
    /// Video encoder lifecycle.
    pub video: Lifecycle,
    /// Audio encoder lifecycle.
    pub audio: Lifecycle,
    /// Rendering context lifecycle; `released` means destroyed.
    pub context: Lifecycle,
    /// Attributes the context was initialized with.
    pub context_attributes: Option<ContextAttributes>,
    /// Handles restored when the context was torn down.
    pub restored: Option<ContextSnapshot>,
    /// Presentation timestamps of every swapped frame.
    pub presented_pts_ns: Vec<i64>,
    /// Audio input chunks in submission order.
    pub audio_chunks: Vec<QueuedChunk>,
    /// Path of the most recently created container.
    pub output_path: Option<PathBuf>,
    /// Inspection handle of the most recently created container.
    pub container: Option<ContainerHandle>,
}

/// Read access to a [`LoopbackBackend`]'s log after it moved into a session.
#[derive(Clone, Debug, Default)]
pub struct LoopbackProbe {
    log: Arc<Mutex<LoopbackLog>>,
}

impl LoopbackProbe {
    /// Clone the current log.
    pub fn snapshot(&self) -> LoopbackLog {
        lock(&self.log).clone()
    }
}

#[derive(Debug, Default)]
struct SurfaceLink {
    next_id: u64,
    frames: HashMap<u64, VecDeque<i64>>,
}

/// Software backend: an in-memory container, a render device whose swaps feed the video
/// encoder directly, and encoders that echo their input as "compressed" samples.
#[derive(Debug, Default)]
pub struct LoopbackBackend {
    opts: LoopbackOpts,
    log: Arc<Mutex<LoopbackLog>>,
    surfaces: Arc<Mutex<SurfaceLink>>,
}

impl LoopbackBackend {
    /// Backend with the given settings.
    pub fn new(opts: LoopbackOpts) -> Self {
        Self {
            opts,
            ..Default::default()
        }
    }

    /// Handle for inspecting what the services did.
    pub fn probe(&self) -> LoopbackProbe {
        LoopbackProbe {
            log: self.log.clone(),
        }
    }

    fn fault(&self, which: LoopbackFault) -> bool {
        self.opts.fault == Some(which)
    }
}

impl MediaBackend for LoopbackBackend {
    fn create_video_encoder(
        &self,
        config: &VideoEncoderConfig,
    ) -> ExportResult<Box<dyn VideoEncoder>> {
        {
            let mut log = lock(&self.log);
            log.video_config = Some(config.clone());
            log.video = Lifecycle {
                created: true,
                ..Default::default()
            };
        }
        let format = MediaFormat::video(config.codec.mime(), config.width, config.height)
            .with_codec_specific_data(vec![0, 0, 0, 1, 0x67, config.profile.idc(), 0, config.level.0])
            .with_codec_specific_data(vec![0, 0, 0, 1, 0x68]);
        Ok(Box::new(LoopbackVideoEncoder {
            log: self.log.clone(),
            surfaces: self.surfaces.clone(),
            surface: None,
            output: OutputQueue::new(format, self.opts.emit_codec_config),
            frames_out: 0,
            running: false,
        }))
    }

    fn create_audio_encoder(
        &self,
        config: &AudioEncoderConfig,
    ) -> ExportResult<Box<dyn AudioEncoder>> {
        {
            let mut log = lock(&self.log);
            log.audio_config = Some(config.clone());
            log.audio = Lifecycle {
                created: true,
                ..Default::default()
            };
        }
        let format = MediaFormat::audio(config.codec.mime(), config.sample_rate, config.channels)
            .with_codec_specific_data(audio_specific_config(config.sample_rate, config.channels));
        let slots = self.opts.audio_input_slots.max(1);
        Ok(Box::new(LoopbackAudioEncoder {
            log: self.log.clone(),
            inputs: vec![vec![0; self.opts.audio_slot_capacity]; slots],
            free: (0..slots).collect(),
            output: OutputQueue::new(format, self.opts.emit_codec_config),
            fail_queue: self.fault(LoopbackFault::QueueAudio),
            running: false,
        }))
    }

    fn create_container(
        &self,
        path: &Path,
        format: ContainerFormat,
    ) -> ExportResult<Box<dyn ContainerWriter>> {
        if self.fault(LoopbackFault::CreateContainer) {
            return Err(ExportError::resource(format!(
                "cannot create {format:?} container at '{}'",
                path.display()
            )));
        }
        let container = InMemoryContainer::new();
        let mut log = lock(&self.log);
        log.output_path = Some(path.to_path_buf());
        log.container = Some(container.handle());
        Ok(Box::new(container))
    }

    fn create_render_device(&self) -> ExportResult<Box<dyn RenderDevice>> {
        let swap_limit = match self.opts.fault {
            Some(LoopbackFault::SwapBuffers { after }) => Some(after),
            _ => None,
        };
        Ok(Box::new(LoopbackRenderDevice {
            log: self.log.clone(),
            surfaces: self.surfaces.clone(),
            current: self.opts.host_context,
            own: None,
            pending_pts_ns: 0,
            swaps: 0,
            fail_initialize: self.fault(LoopbackFault::InitializeContext),
            swap_limit,
        }))
    }

    fn load_audio(&self, path: &Path) -> ExportResult<Vec<u8>> {
        match &self.opts.audio {
            Some(pcm) => Ok(pcm.clone()),
            None => std::fs::read(path).map_err(|e| {
                ExportError::resource(format!("read audio data '{}': {e}", path.display()))
            }),
        }
    }
}

/// Two-byte MPEG-4 AudioSpecificConfig for AAC-LC.
fn audio_specific_config(sample_rate: u32, channels: u16) -> Vec<u8> {
    const RATES: [u32; 13] = [
        96_000, 88_200, 64_000, 48_000, 44_100, 32_000, 24_000, 22_050, 16_000, 12_000, 11_025,
        8_000, 7_350,
    ];
    const AAC_LC: u8 = 2;
    let freq = RATES.iter().position(|&r| r == sample_rate).unwrap_or(4) as u8;
    let ch = (channels.min(7)) as u8;
    vec![(AAC_LC << 3) | (freq >> 1), ((freq & 1) << 7) | (ch << 3)]
}

struct PendingSample {
    data: Vec<u8>,
    presentation_time_us: i64,
    flags: SampleFlags,
}

/// Output side shared by both loopback encoders.
///
/// Announces the format once there is something to encode, then optionally one codec-config
/// buffer, then pending samples in order.
struct OutputQueue {
    format: MediaFormat,
    emit_codec_config: bool,
    announced: bool,
    config_sent: bool,
    end_of_stream_queued: bool,
    pending: VecDeque<PendingSample>,
    buffers: Vec<Option<Vec<u8>>>,
}

impl OutputQueue {
    fn new(format: MediaFormat, emit_codec_config: bool) -> Self {
        Self {
            format,
            emit_codec_config,
            announced: false,
            config_sent: false,
            end_of_stream_queued: false,
            pending: VecDeque::new(),
            buffers: Vec::new(),
        }
    }

    fn push(&mut self, sample: PendingSample) {
        if self.end_of_stream_queued {
            return;
        }
        self.end_of_stream_queued = sample.flags.end_of_stream;
        self.pending.push_back(sample);
    }

    fn push_end_of_stream(&mut self) {
        let presentation_time_us = self
            .pending
            .back()
            .map(|s| s.presentation_time_us)
            .unwrap_or(0);
        self.push(PendingSample {
            data: Vec::new(),
            presentation_time_us,
            flags: SampleFlags::END_OF_STREAM,
        });
    }

    fn next_status(&mut self) -> OutputStatus {
        if self.pending.is_empty() {
            return OutputStatus::TryAgainLater;
        }
        if !self.announced {
            self.announced = true;
            return OutputStatus::FormatChanged;
        }
        if self.emit_codec_config && !self.config_sent {
            self.config_sent = true;
            let csd = self.format.codec_specific_data.concat();
            let presentation_time_us = self.pending.front().map_or(0, |s| s.presentation_time_us);
            return self.publish(csd, presentation_time_us, SampleFlags::CODEC_CONFIG);
        }
        match self.pending.pop_front() {
            Some(s) => self.publish(s.data, s.presentation_time_us, s.flags),
            None => OutputStatus::TryAgainLater,
        }
    }

    fn publish(&mut self, data: Vec<u8>, presentation_time_us: i64, flags: SampleFlags) -> OutputStatus {
        let info = BufferInfo {
            offset: 0,
            size: data.len(),
            presentation_time_us,
            flags,
        };
        let index = match self.buffers.iter().position(Option::is_none) {
            Some(free) => {
                self.buffers[free] = Some(data);
                free
            }
            None => {
                self.buffers.push(Some(data));
                self.buffers.len() - 1
            }
        };
        OutputStatus::Sample { index, info }
    }

    fn buffer(&self, index: usize) -> Option<&[u8]> {
        self.buffers.get(index)?.as_deref()
    }

    fn release(&mut self, index: usize) -> ExportResult<()> {
        match self.buffers.get_mut(index) {
            Some(slot) if slot.is_some() => {
                *slot = None;
                Ok(())
            }
            _ => Err(ExportError::encoder(format!(
                "output buffer {index} is not held by the caller"
            ))),
        }
    }

    fn format(&self) -> ExportResult<MediaFormat> {
        if !self.announced {
            return Err(ExportError::encoder("output format requested before it was announced"));
        }
        Ok(self.format.clone())
    }
}

/// Video encoder whose input is the frame queue of the surface it handed out.
pub struct LoopbackVideoEncoder {
    log: Arc<Mutex<LoopbackLog>>,
    surfaces: Arc<Mutex<SurfaceLink>>,
    surface: Option<InputSurface>,
    output: OutputQueue,
    frames_out: u64,
    running: bool,
}

impl LoopbackVideoEncoder {
    fn pull_presented_frames(&mut self) {
        let Some(surface) = self.surface else {
            return;
        };
        let frames: Vec<i64> = lock(&self.surfaces)
            .frames
            .get_mut(&surface.0)
            .map(|q| q.drain(..).collect())
            .unwrap_or_default();
        for pts_ns in frames {
            let key_frame = self.frames_out == 0;
            let mut data = self.frames_out.to_le_bytes().to_vec();
            data.extend_from_slice(&pts_ns.to_le_bytes());
            self.output.push(PendingSample {
                data,
                presentation_time_us: pts_ns / 1_000,
                flags: SampleFlags {
                    key_frame,
                    ..SampleFlags::NONE
                },
            });
            self.frames_out += 1;
        }
    }

    fn ensure_running(&self) -> ExportResult<()> {
        if self.running {
            Ok(())
        } else {
            Err(ExportError::encoder("loopback video encoder is not running"))
        }
    }
}

impl EncoderOutput for LoopbackVideoEncoder {
    fn dequeue_output_buffer(&mut self, _timeout: Duration) -> ExportResult<OutputStatus> {
        self.ensure_running()?;
        self.pull_presented_frames();
        Ok(self.output.next_status())
    }

    fn output_buffer(&self, index: usize) -> Option<&[u8]> {
        self.output.buffer(index)
    }

    fn output_format(&self) -> ExportResult<MediaFormat> {
        self.output.format()
    }

    fn release_output_buffer(&mut self, index: usize) -> ExportResult<()> {
        self.output.release(index)
    }

    fn signal_end_of_input_stream(&mut self) -> ExportResult<()> {
        self.ensure_running()?;
        self.pull_presented_frames();
        self.output.push_end_of_stream();
        Ok(())
    }

    fn start(&mut self) -> ExportResult<()> {
        if self.surface.is_none() {
            return Err(ExportError::encoder(
                "loopback video encoder started without an input surface",
            ));
        }
        self.running = true;
        lock(&self.log).video.started = true;
        Ok(())
    }

    fn stop(&mut self) -> ExportResult<()> {
        self.running = false;
        lock(&self.log).video.stopped = true;
        Ok(())
    }

    fn release(&mut self) -> ExportResult<()> {
        self.running = false;
        if let Some(surface) = self.surface.take() {
            lock(&self.surfaces).frames.remove(&surface.0);
        }
        self.output.buffers.clear();
        lock(&self.log).video.released = true;
        Ok(())
    }
}

impl VideoEncoder for LoopbackVideoEncoder {
    fn create_input_surface(&mut self) -> ExportResult<InputSurface> {
        if let Some(surface) = self.surface {
            return Ok(surface);
        }
        let mut link = lock(&self.surfaces);
        link.next_id += 1;
        let surface = InputSurface(link.next_id);
        link.frames.insert(surface.0, VecDeque::new());
        self.surface = Some(surface);
        Ok(surface)
    }
}

/// Audio encoder that echoes each queued PCM chunk as one output sample.
pub struct LoopbackAudioEncoder {
    log: Arc<Mutex<LoopbackLog>>,
    inputs: Vec<Vec<u8>>,
    free: VecDeque<usize>,
    output: OutputQueue,
    fail_queue: bool,
    running: bool,
}

impl EncoderOutput for LoopbackAudioEncoder {
    fn dequeue_output_buffer(&mut self, _timeout: Duration) -> ExportResult<OutputStatus> {
        if !self.running {
            return Err(ExportError::encoder("loopback audio encoder is not running"));
        }
        Ok(self.output.next_status())
    }

    fn output_buffer(&self, index: usize) -> Option<&[u8]> {
        self.output.buffer(index)
    }

    fn output_format(&self) -> ExportResult<MediaFormat> {
        self.output.format()
    }

    fn release_output_buffer(&mut self, index: usize) -> ExportResult<()> {
        self.output.release(index)
    }

    fn signal_end_of_input_stream(&mut self) -> ExportResult<()> {
        self.output.push_end_of_stream();
        Ok(())
    }

    fn start(&mut self) -> ExportResult<()> {
        self.running = true;
        lock(&self.log).audio.started = true;
        Ok(())
    }

    fn stop(&mut self) -> ExportResult<()> {
        self.running = false;
        lock(&self.log).audio.stopped = true;
        Ok(())
    }

    fn release(&mut self) -> ExportResult<()> {
        self.running = false;
        self.inputs.clear();
        self.free.clear();
        self.output.buffers.clear();
        lock(&self.log).audio.released = true;
        Ok(())
    }
}

impl AudioEncoder for LoopbackAudioEncoder {
    fn dequeue_input_buffer(&mut self, timeout: Duration) -> ExportResult<Option<InputSlot>> {
        if !self.running {
            return Err(ExportError::encoder("loopback audio encoder is not running"));
        }
        match self.free.pop_front() {
            Some(index) => Ok(Some(InputSlot {
                index,
                capacity: self.inputs[index].len(),
            })),
            None => {
                std::thread::sleep(timeout);
                Ok(None)
            }
        }
    }

    fn input_buffer_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        self.inputs.get_mut(index).map(Vec::as_mut_slice)
    }

    fn queue_input_buffer(
        &mut self,
        index: usize,
        len: usize,
        presentation_time_us: i64,
        flags: SampleFlags,
    ) -> ExportResult<()> {
        if self.fail_queue {
            return Err(ExportError::encoder("loopback audio encoder rejected input"));
        }
        let input = self
            .inputs
            .get(index)
            .ok_or_else(|| ExportError::encoder(format!("unknown audio input slot {index}")))?;
        if len > input.len() {
            return Err(ExportError::encoder(format!(
                "queued {len} bytes into a {}-byte audio input slot",
                input.len()
            )));
        }
        let data = input[..len].to_vec();
        lock(&self.log).audio_chunks.push(QueuedChunk {
            slot: index,
            len,
            presentation_time_us,
            end_of_stream: flags.end_of_stream,
        });
        self.output.push(PendingSample {
            data,
            presentation_time_us,
            flags: SampleFlags {
                key_frame: true,
                ..flags
            },
        });
        self.free.push_back(index);
        debug!(index, len, presentation_time_us, "loopback audio chunk queued");
        Ok(())
    }
}

/// Render device whose window surface is the frame queue of a loopback video encoder.
pub struct LoopbackRenderDevice {
    log: Arc<Mutex<LoopbackLog>>,
    surfaces: Arc<Mutex<SurfaceLink>>,
    current: ContextSnapshot,
    own: Option<(InputSurface, ContextSnapshot)>,
    pending_pts_ns: i64,
    swaps: u64,
    fail_initialize: bool,
    swap_limit: Option<u64>,
}

impl RenderDevice for LoopbackRenderDevice {
    fn current_snapshot(&self) -> ContextSnapshot {
        self.current
    }

    fn initialize(&mut self, surface: InputSurface, attrs: &ContextAttributes) -> ExportResult<()> {
        if self.fail_initialize {
            return Err(ExportError::resource("no EGL config matches the requested attributes"));
        }
        if !lock(&self.surfaces).frames.contains_key(&surface.0) {
            return Err(ExportError::device(format!("unknown input surface {}", surface.0)));
        }
        let handles = ContextSnapshot {
            display: 100,
            context: 100 + surface.0,
            draw_surface: 200 + surface.0,
            read_surface: 200 + surface.0,
        };
        self.own = Some((surface, handles));
        let mut log = lock(&self.log);
        log.context = Lifecycle {
            created: true,
            ..Default::default()
        };
        log.context_attributes = Some(*attrs);
        Ok(())
    }

    fn make_current(&mut self) -> ExportResult<()> {
        let (_, handles) = self
            .own
            .ok_or_else(|| ExportError::device("make_current before initialize"))?;
        self.current = handles;
        lock(&self.log).context.started = true;
        Ok(())
    }

    fn set_presentation_time(&mut self, pts_ns: i64) -> ExportResult<()> {
        self.pending_pts_ns = pts_ns;
        Ok(())
    }

    fn swap_buffers(&mut self) -> ExportResult<()> {
        let (surface, _) = self
            .own
            .ok_or_else(|| ExportError::device("swap_buffers without a window surface"))?;
        if self.swap_limit.is_some_and(|limit| self.swaps >= limit) {
            return Err(ExportError::device("eglSwapBuffers failed: EGL_BAD_SURFACE"));
        }
        lock(&self.surfaces)
            .frames
            .get_mut(&surface.0)
            .ok_or_else(|| ExportError::device(format!("input surface {} was released", surface.0)))?
            .push_back(self.pending_pts_ns);
        self.swaps += 1;
        lock(&self.log).presented_pts_ns.push(self.pending_pts_ns);
        Ok(())
    }

    fn destroy(&mut self) {
        self.own = None;
        lock(&self.log).context.released = true;
    }

    fn restore(&mut self, snapshot: &ContextSnapshot) {
        self.current = *snapshot;
        lock(&self.log).restored = Some(*snapshot);
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
#[path = "../../tests/unit/backend/loopback.rs"]
mod tests;
