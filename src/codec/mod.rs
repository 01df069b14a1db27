//! Data model shared with host encoder services.

/// Output sample metadata and dequeue status codes.
pub mod buffer;
/// Encoder service traits.
pub mod encoder;
/// Codec identifiers, encoder configuration and announced output formats.
pub mod format;
