use crate::foundation::core::ImageId;

/// Convenience result type used across the crate.
pub type RestoreResult<T> = Result<T, RestoreError>;

/// Error taxonomy for image restoration and command batching.
///
/// Precondition violations (bad dimensions, drawing an image onto itself) are not part of this
/// enum: they panic at the call site.
#[derive(thiserror::Error, Debug)]
pub enum RestoreError {
    /// A pixel rectangle or buffer did not fit the addressed image.
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// The graphics capability layer failed (allocation, upload, readback).
    #[error("gpu error: {0}")]
    Gpu(String),

    /// The staleness/ordering protocol was violated. Never recoverable.
    #[error("internal invariant violated: {0}")]
    Invariant(String),

    /// The addressed image is not live.
    #[error("image {0} is disposed")]
    Disposed(ImageId),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RestoreError {
    /// Build a [`RestoreError::OutOfRange`] value.
    pub fn out_of_range(msg: impl Into<String>) -> Self {
        Self::OutOfRange(msg.into())
    }

    /// Build a [`RestoreError::Gpu`] value.
    pub fn gpu(msg: impl Into<String>) -> Self {
        Self::Gpu(msg.into())
    }

    /// Build a [`RestoreError::Invariant`] value.
    ///
    /// Every construction is logged at error level.
    pub fn invariant(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::error!(%msg, "internal invariant violated");
        Self::Invariant(msg)
    }

    /// Whether this error signals a broken internal invariant.
    pub fn is_invariant(&self) -> bool {
        matches!(self, Self::Invariant(_))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
