//! Host service factory.
//!
//! The pipeline never names a concrete encoder, container or GPU API. A [`MediaBackend`]
//! hands it boxed trait objects for each service at `BeginEncoding` time.

use crate::codec::encoder::{AudioEncoder, VideoEncoder};
use crate::codec::format::{AudioEncoderConfig, ContainerFormat, VideoEncoderConfig};
use crate::foundation::error::{ExportError, ExportResult};
use crate::mux::container::ContainerWriter;
use crate::render::context::RenderDevice;
use std::path::Path;

/// Software backend used for dry runs and tests.
pub mod loopback;

/// Creates the host services one export session needs.
pub trait MediaBackend {
    /// Create and configure a video encoder. The encoder is not started.
    fn create_video_encoder(
        &self,
        config: &VideoEncoderConfig,
    ) -> ExportResult<Box<dyn VideoEncoder>>;

    /// Create and configure an audio encoder. The encoder is not started.
    fn create_audio_encoder(
        &self,
        config: &AudioEncoderConfig,
    ) -> ExportResult<Box<dyn AudioEncoder>>;

    /// Create an unstarted container writer targeting `path`.
    fn create_container(
        &self,
        path: &Path,
        format: ContainerFormat,
    ) -> ExportResult<Box<dyn ContainerWriter>>;

    /// Create an uninitialized rendering device on the calling thread.
    fn create_render_device(&self) -> ExportResult<Box<dyn RenderDevice>>;

    /// Load the raw interleaved 16-bit PCM stream that becomes the audio track.
    fn load_audio(&self, path: &Path) -> ExportResult<Vec<u8>> {
        std::fs::read(path).map_err(|e| {
            ExportError::resource(format!("read audio data '{}': {e}", path.display()))
        })
    }
}
