//! Geometry transform seam.

use crate::foundation::core::{Affine, Point};

/// Maps local quad corners to target pixel space.
pub trait GeometryTransform {
    fn apply(&self, x: f64, y: f64) -> (f64, f64);

    fn apply32(&self, x: f64, y: f64) -> (f32, f32) {
        let (x, y) = self.apply(x, y);
        (x as f32, y as f32)
    }
}

impl GeometryTransform for Affine {
    fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let p = *self * Point::new(x, y);
        (p.x, p.y)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/transform/geometry.rs"]
mod tests;
