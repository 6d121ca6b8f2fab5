//! Shared value types, errors, configuration and small numeric helpers.

/// Configuration and engine-wide constants.
pub mod config;
/// Core value types.
pub mod core;
/// Error types.
pub mod error;
pub(crate) mod math;
