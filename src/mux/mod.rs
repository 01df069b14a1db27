//! Container writer seam and the two-track start coordination.

/// Container writer trait and the in-memory writer.
pub mod container;
/// Track registration, start-once and serialized sample writes.
pub mod coordinator;
/// One-shot muxer start gate.
pub mod gate;
