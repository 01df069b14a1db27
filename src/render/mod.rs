//! GPU rendering context bound to the video encoder's input surface.

/// Render device trait and the scoped context binding.
pub mod context;
