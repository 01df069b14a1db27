use crate::codec::format::{
    AudioCodec, AudioEncoderConfig, ContainerFormat, H264Level, H264Profile, VideoCodec,
    VideoEncoderConfig,
};
use crate::foundation::core::{AudioLayout, FrameRate};
use crate::foundation::error::{ExportError, ExportResult};
use crate::render::context::ContextAttributes;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Session-wide tuning that stays fixed across exports.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOpts {
    /// Bounded wait of each `dequeue_output_buffer` call, in microseconds.
    pub output_poll_timeout_us: u64,
    /// Slice of the cancellable wait for a free audio input slot, in microseconds.
    pub input_poll_timeout_us: u64,
    /// On a normal end, signal end-of-input to the video encoder and drain until its
    /// end-of-stream buffer. When `false` a single polling pass is run instead.
    pub flush_to_end_of_stream: bool,
    /// Sample rate of the raw audio stream.
    pub audio_sample_rate: u32,
    /// Bytes per sample per channel of the raw audio stream.
    pub audio_bytes_per_sample: u16,
    /// Seconds between video key frames.
    pub video_i_frame_interval_secs: u32,
    /// Video codec profile.
    pub video_profile: H264Profile,
    /// Video codec level.
    pub video_level: H264Level,
    /// Audio codec.
    pub audio_profile: AudioCodec,
    /// Output container.
    pub container_format: ContainerFormat,
    /// Framebuffer configuration of the export context.
    pub context_attributes: ContextAttributes,
    /// Name of the audio feeder thread.
    pub feeder_thread_name: String,
}

impl Default for SessionOpts {
    fn default() -> Self {
        Self {
            output_poll_timeout_us: 10_000,
            input_poll_timeout_us: 10_000,
            flush_to_end_of_stream: true,
            audio_sample_rate: 44_100,
            audio_bytes_per_sample: 2,
            video_i_frame_interval_secs: 4,
            video_profile: H264Profile::High,
            video_level: H264Level(31),
            audio_profile: AudioCodec::AacLc,
            container_format: ContainerFormat::Mpeg4,
            context_attributes: ContextAttributes::default(),
            feeder_thread_name: "avexport-audio-feeder".to_owned(),
        }
    }
}

impl SessionOpts {
    /// Parse options from a JSON string. Missing fields take their defaults.
    pub fn from_json_str(s: &str) -> ExportResult<Self> {
        serde_json::from_str(s)
            .map_err(|e| ExportError::config(format!("parse session options JSON: {e}")))
    }

    /// Parse options from a JSON reader.
    pub fn from_reader<R: std::io::Read>(r: R) -> ExportResult<Self> {
        serde_json::from_reader(r)
            .map_err(|e| ExportError::config(format!("parse session options JSON: {e}")))
    }

    /// Parse options from a JSON file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> ExportResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            ExportError::config(format!("open session options JSON '{}': {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(f))
    }

    /// Output dequeue timeout.
    pub fn output_timeout(&self) -> Duration {
        Duration::from_micros(self.output_poll_timeout_us)
    }

    /// Input-slot poll slice.
    pub fn input_timeout(&self) -> Duration {
        Duration::from_micros(self.input_poll_timeout_us)
    }
}

/// Arguments of `BeginEncoding`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeParams {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Frame rate numerator.
    pub frame_rate_num: u32,
    /// Frame rate denominator.
    pub frame_rate_den: u32,
    /// Video bitrate in kbit/s.
    pub video_bitrate_kbps: u32,
    /// Audio bitrate in kbit/s.
    pub audio_bitrate_kbps: u32,
    /// Two audio channels instead of one.
    pub stereo: bool,
    /// Raw interleaved PCM file that becomes the audio track.
    pub audio_path: PathBuf,
    /// Container file to produce.
    pub output_path: PathBuf,
}

impl EncodeParams {
    /// Reject parameters no encoder could be configured with.
    pub fn validate(&self) -> ExportResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ExportError::config(format!(
                "frame size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(ExportError::config(format!(
                "frame size must be even for 4:2:0 encoding, got {}x{}",
                self.width, self.height
            )));
        }
        self.frame_rate()?;
        if self.video_bitrate_kbps == 0 || self.audio_bitrate_kbps == 0 {
            return Err(ExportError::config("bitrates must be non-zero"));
        }
        Ok(())
    }

    /// Frame rate as a validated ratio.
    pub fn frame_rate(&self) -> ExportResult<FrameRate> {
        FrameRate::new(self.frame_rate_num, self.frame_rate_den)
    }

    /// Channel count implied by `stereo`.
    pub fn channels(&self) -> u16 {
        if self.stereo { 2 } else { 1 }
    }

    /// Layout of the raw audio stream under `opts`.
    pub fn audio_layout(&self, opts: &SessionOpts) -> ExportResult<AudioLayout> {
        AudioLayout::new(opts.audio_sample_rate, self.channels(), opts.audio_bytes_per_sample)
    }

    /// Video encoder configuration under `opts`.
    pub fn video_config(&self, opts: &SessionOpts) -> ExportResult<VideoEncoderConfig> {
        Ok(VideoEncoderConfig {
            codec: VideoCodec::H264,
            width: self.width,
            height: self.height,
            bitrate_bps: kbps_to_bps(self.video_bitrate_kbps)?,
            frame_rate: self.frame_rate()?,
            i_frame_interval_secs: opts.video_i_frame_interval_secs,
            profile: opts.video_profile,
            level: opts.video_level,
        })
    }

    /// Audio encoder configuration under `opts`.
    pub fn audio_config(&self, opts: &SessionOpts) -> ExportResult<AudioEncoderConfig> {
        Ok(AudioEncoderConfig {
            codec: opts.audio_profile,
            sample_rate: opts.audio_sample_rate,
            channels: self.channels(),
            bitrate_bps: kbps_to_bps(self.audio_bitrate_kbps)?,
        })
    }
}

fn kbps_to_bps(kbps: u32) -> ExportResult<u32> {
    kbps.checked_mul(1000)
        .ok_or_else(|| ExportError::config(format!("bitrate {kbps} kbit/s is out of range")))
}

#[cfg(test)]
#[path = "../../tests/unit/session/opts.rs"]
mod tests;
