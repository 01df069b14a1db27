//! Moving compressed samples from the encoders into the container writer.

/// Background thread feeding raw audio into the audio encoder.
pub mod audio_feeder;
/// Encoder output drain protocol.
pub mod drain;
