//! Presentation timestamps for both tracks.

/// Frame-index and byte-offset clocks.
pub mod clock;
