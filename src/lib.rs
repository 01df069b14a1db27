//! avexport is an offline two-track export pipeline.
//!
//! It takes GPU-rendered video frames and a raw PCM byte stream, drives a surface-fed video
//! encoder and a buffer-fed audio encoder, and interleaves their compressed output into one
//! container file. Encoders, container writer and rendering context are host services behind
//! traits; a [`MediaBackend`] supplies them.
//!
//! - Create an [`ExportSession`] over a backend
//! - [`ExportSession::begin_encoding`], then render and [`ExportSession::add_frame`] per frame
//! - [`ExportSession::end_encoding`]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

/// Host service factory and the loopback software backend.
pub mod backend;
/// Encoder service traits and the data they exchange.
pub mod codec;
/// Drain protocol and audio feeder thread.
pub mod encode;
/// Container writer seam and start coordination.
pub mod mux;
/// Rendering context binding.
pub mod render;
/// Session lifecycle and options.
pub mod session;
/// Presentation clock.
pub mod timing;

pub use crate::foundation::core::{AudioLayout, FrameIndex, FrameRate, MAX_FRAMES_PER_SECOND};
pub use crate::foundation::error::{ExportError, ExportResult};

pub use crate::backend::MediaBackend;
pub use crate::backend::loopback::{LoopbackBackend, LoopbackFault, LoopbackOpts, LoopbackProbe};
pub use crate::codec::buffer::{BufferInfo, InputSlot, OutputStatus, SampleFlags};
pub use crate::codec::encoder::{AudioEncoder, EncoderOutput, InputSurface, VideoEncoder};
pub use crate::codec::format::{
    AudioCodec, AudioEncoderConfig, ContainerFormat, H264Level, H264Profile, MediaFormat,
    VideoCodec, VideoEncoderConfig,
};
pub use crate::encode::audio_feeder::{AudioCursor, FeederStats};
pub use crate::encode::drain::{DrainMode, DrainStats, drain_encoder};
pub use crate::mux::container::{ContainerHandle, ContainerRecord, ContainerWriter, InMemoryContainer, TrackIndex};
pub use crate::mux::coordinator::{MuxCoordinator, TrackRole, WriterPhase};
pub use crate::mux::gate::StartGate;
pub use crate::render::context::{BoundContext, ContextAttributes, ContextSnapshot, RenderDevice};
pub use crate::session::export_session::{ExportSession, ExportSummary, SessionState};
pub use crate::session::opts::{EncodeParams, SessionOpts};
pub use crate::timing::clock::PresentationClock;
