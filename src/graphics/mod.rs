//! Batching of draw commands and the device seam they are flushed to.

/// Queued commands, merging and chunked flushing.
pub mod command;
/// Capability trait implemented by graphics backends.
pub mod device;
/// CPU reference device.
pub mod soft;
/// Quad vertex generation.
pub mod vertices;
