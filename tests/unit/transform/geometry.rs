use super::*;
use crate::foundation::core::Vec2;

#[test]
fn affine_maps_points() {
    let m = Affine::translate(Vec2::new(3.0, -1.0)) * Affine::scale_non_uniform(2.0, 0.5);
    assert_eq!(m.apply(1.0, 4.0), (5.0, 1.0));
    assert_eq!(m.apply32(0.0, 0.0), (3.0, -1.0));
}

#[test]
fn works_through_a_trait_object() {
    let t: &dyn GeometryTransform = &Affine::rotate(std::f64::consts::FRAC_PI_2);
    let (x, y) = t.apply(1.0, 0.0);
    assert!(x.abs() < 1e-12);
    assert!((y - 1.0).abs() < 1e-12);
}
