//! Upward API over the restorable images.

/// The engine and its draw options.
pub mod api;
/// Process-wide engine instance.
pub mod global;
/// Engine counters.
pub mod stats;
