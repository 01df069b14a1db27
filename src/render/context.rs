use crate::codec::encoder::InputSurface;
use crate::foundation::error::{ExportError, ExportResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Raw handles of whatever display/context/surfaces were current on the calling thread.
///
/// Captured before the export context is created and restored when it is torn down.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ContextSnapshot {
    /// Display handle.
    pub display: u64,
    /// Context handle.
    pub context: u64,
    /// Draw surface handle.
    pub draw_surface: u64,
    /// Read surface handle.
    pub read_surface: u64,
}

impl ContextSnapshot {
    /// Nothing current.
    pub const NONE: Self = Self {
        display: 0,
        context: 0,
        draw_surface: 0,
        read_surface: 0,
    };
}

/// Framebuffer configuration requested for the export context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextAttributes {
    /// Red channel bits.
    pub red_bits: u8,
    /// Green channel bits.
    pub green_bits: u8,
    /// Blue channel bits.
    pub blue_bits: u8,
    /// Alpha channel bits.
    pub alpha_bits: u8,
    /// Depth buffer bits.
    pub depth_bits: u8,
    /// Surface must be usable as a video encoder input.
    pub recordable: bool,
    /// Client API major version (GLES).
    pub client_version: u8,
}

impl Default for ContextAttributes {
    fn default() -> Self {
        Self {
            red_bits: 8,
            green_bits: 8,
            blue_bits: 8,
            alpha_bits: 8,
            depth_bits: 16,
            recordable: true,
            client_version: 2,
        }
    }
}

/// Host rendering-context service (display + context + window surface).
///
/// The renderer draws into the current context between `AddFrame` calls; presenting the
/// window surface is what delivers a frame to the encoder. Device objects are thread-affine and
/// only used from the thread driving the session.
pub trait RenderDevice {
    /// Handles current on this thread right now.
    fn current_snapshot(&self) -> ContextSnapshot;

    /// Create display, context and a window surface targeting `surface`.
    fn initialize(&mut self, surface: InputSurface, attrs: &ContextAttributes) -> ExportResult<()>;

    /// Make the export context current.
    fn make_current(&mut self) -> ExportResult<()>;

    /// Timestamp attached to the next presented frame.
    fn set_presentation_time(&mut self, pts_ns: i64) -> ExportResult<()>;

    /// Present the window surface, handing the rendered frame to the encoder.
    fn swap_buffers(&mut self) -> ExportResult<()>;

    /// Destroy whatever `initialize` created. Must tolerate partial or failed initialization.
    fn destroy(&mut self);

    /// Make `snapshot` current again.
    fn restore(&mut self, snapshot: &ContextSnapshot);
}

/// Export context bound to the encoder surface for the lifetime of this value.
///
/// Initialization failures are returned as the device reported them; failures once the context
/// exists are device errors. The previously current handles are captured before anything is
/// created and are restored on drop, including when `bind` itself fails halfway.
pub struct BoundContext {
    device: Box<dyn RenderDevice>,
    saved: ContextSnapshot,
}

impl BoundContext {
    /// Create the context on `surface` and make it current.
    pub fn bind(
        device: Box<dyn RenderDevice>,
        surface: InputSurface,
        attrs: &ContextAttributes,
    ) -> ExportResult<Self> {
        let saved = device.current_snapshot();
        let mut bound = Self { device, saved };
        bound.device.initialize(surface, attrs)?;
        bound.device.make_current().map_err(as_device_error)?;
        debug!(?surface, ?saved, "export context bound");
        Ok(bound)
    }

    /// Stamp and present the current frame.
    pub fn present(&mut self, pts_ns: i64) -> ExportResult<()> {
        self.device
            .set_presentation_time(pts_ns)
            .map_err(as_device_error)?;
        self.device.swap_buffers().map_err(as_device_error)
    }
}

impl Drop for BoundContext {
    fn drop(&mut self) {
        self.device.destroy();
        self.device.restore(&self.saved);
        debug!(saved = ?self.saved, "export context destroyed; previous context restored");
    }
}

fn as_device_error(e: ExportError) -> ExportError {
    match e {
        ExportError::Device(_) => e,
        other => ExportError::device(other.to_string()),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/context.rs"]
mod tests;
