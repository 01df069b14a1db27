use crate::foundation::core::FrameRate;
use serde::{Deserialize, Serialize};

/// MIME type of H.264 / AVC elementary streams.
pub const MIME_VIDEO_AVC: &str = "video/avc";
/// MIME type of AAC audio in LATM/LOAS framing.
pub const MIME_AUDIO_AAC: &str = "audio/mp4a-latm";

/// Video codec family.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoCodec {
    /// H.264 / AVC.
    #[default]
    H264,
}

impl VideoCodec {
    /// MIME type used when asking the host for an encoder.
    pub fn mime(self) -> &'static str {
        match self {
            Self::H264 => MIME_VIDEO_AVC,
        }
    }
}

/// H.264 profile.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum H264Profile {
    /// Baseline profile.
    Baseline,
    /// Main profile.
    Main,
    /// High profile.
    #[default]
    High,
}

impl H264Profile {
    /// `profile_idc` value written into the sequence parameter set.
    pub fn idc(self) -> u8 {
        match self {
            Self::Baseline => 66,
            Self::Main => 77,
            Self::High => 100,
        }
    }
}

/// H.264 level expressed as `major * 10 + minor` (e.g. `31` for level 3.1).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct H264Level(pub u8);

impl Default for H264Level {
    fn default() -> Self {
        Self(31)
    }
}

/// Audio codec family.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioCodec {
    /// AAC low complexity.
    #[default]
    AacLc,
}

impl AudioCodec {
    /// MIME type used when asking the host for an encoder.
    pub fn mime(self) -> &'static str {
        match self {
            Self::AacLc => MIME_AUDIO_AAC,
        }
    }
}

/// Container produced by the writer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerFormat {
    /// ISO base media / MP4.
    #[default]
    Mpeg4,
}

/// Video encoder configuration handed to [`crate::MediaBackend::create_video_encoder`].
///
/// Input is always surface-backed: frames arrive through the rendering context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VideoEncoderConfig {
    /// Codec to encode with.
    pub codec: VideoCodec,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Target bitrate in bits per second.
    pub bitrate_bps: u32,
    /// Nominal frame rate.
    pub frame_rate: FrameRate,
    /// Seconds between key frames.
    pub i_frame_interval_secs: u32,
    /// Codec profile.
    pub profile: H264Profile,
    /// Codec level.
    pub level: H264Level,
}

/// Audio encoder configuration handed to [`crate::MediaBackend::create_audio_encoder`].
///
/// Input is buffer-backed interleaved 16-bit PCM.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioEncoderConfig {
    /// Codec to encode with.
    pub codec: AudioCodec,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u16,
    /// Target bitrate in bits per second.
    pub bitrate_bps: u32,
}

/// Output format announced by an encoder once its stream parameters are final.
///
/// The container writer registers a track from this.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFormat {
    /// MIME type of the compressed stream.
    pub mime: String,
    /// Video width, when this is a video format.
    pub width: Option<u32>,
    /// Video height, when this is a video format.
    pub height: Option<u32>,
    /// Audio sample rate, when this is an audio format.
    pub sample_rate: Option<u32>,
    /// Audio channel count, when this is an audio format.
    pub channels: Option<u16>,
    /// Codec-specific data blobs (`csd-0`, `csd-1`, ...): SPS/PPS or AudioSpecificConfig.
    #[serde(default)]
    pub codec_specific_data: Vec<Vec<u8>>,
}

impl MediaFormat {
    /// Build a video format.
    pub fn video(mime: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            mime: mime.into(),
            width: Some(width),
            height: Some(height),
            ..Default::default()
        }
    }

    /// Build an audio format.
    pub fn audio(mime: impl Into<String>, sample_rate: u32, channels: u16) -> Self {
        Self {
            mime: mime.into(),
            sample_rate: Some(sample_rate),
            channels: Some(channels),
            ..Default::default()
        }
    }

    /// Attach one codec-specific data blob.
    pub fn with_codec_specific_data(mut self, csd: impl Into<Vec<u8>>) -> Self {
        self.codec_specific_data.push(csd.into());
        self
    }

    /// Return `true` when the MIME type names a video stream.
    pub fn is_video(&self) -> bool {
        self.mime.starts_with("video/")
    }

    /// Return `true` when the MIME type names an audio stream.
    pub fn is_audio(&self) -> bool {
        self.mime.starts_with("audio/")
    }
}
