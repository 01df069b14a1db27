/// Convenience result type used across the export pipeline.
pub type ExportResult<T> = Result<T, ExportError>;

/// Top-level error taxonomy used by pipeline APIs.
#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    /// Unsupported or invalid encode parameters. Raised before any resource is created.
    #[error("configuration error: {0}")]
    Config(String),

    /// A host resource (container writer, audio source, rendering context) could not be acquired.
    #[error("resource error: {0}")]
    Resource(String),

    /// Rendering surface or context failure. Always fatal for the session.
    #[error("device error: {0}")]
    Device(String),

    /// Encoder misbehaviour that cannot be skipped (e.g. an output index without a buffer).
    #[error("encoder error: {0}")]
    Encoder(String),

    /// Operation called in the wrong lifecycle state.
    #[error("session error: {0}")]
    Session(String),

    /// The muxer start gate was closed before the container writer started.
    #[error("export aborted: {0}")]
    Aborted(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ExportError {
    /// Build an [`ExportError::Config`] value.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build an [`ExportError::Resource`] value.
    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }

    /// Build an [`ExportError::Device`] value.
    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device(msg.into())
    }

    /// Build an [`ExportError::Encoder`] value.
    pub fn encoder(msg: impl Into<String>) -> Self {
        Self::Encoder(msg.into())
    }

    /// Build an [`ExportError::Session`] value.
    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    /// Build an [`ExportError::Aborted`] value.
    pub fn aborted(msg: impl Into<String>) -> Self {
        Self::Aborted(msg.into())
    }

    /// Return `true` for errors produced by cooperative cancellation rather than a failure.
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
