//! Geometry and color transforms consumed by draws.

/// Per-channel color matrix.
pub mod color;
/// Geometry transform seam over `kurbo::Affine`.
pub mod geometry;
