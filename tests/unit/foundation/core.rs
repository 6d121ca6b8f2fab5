use super::*;

#[test]
fn premultiply_scales_color_by_alpha() {
    let p = Rgba8::new(255, 128, 0, 128).premultiply();
    assert_eq!(p.to_array(), [128, 64, 0, 128]);
    assert_eq!(
        Rgba8::new(10, 20, 30, 255).premultiply().to_array(),
        [10, 20, 30, 255]
    );
}

#[test]
fn blend_factors_for_common_modes() {
    assert_eq!(
        BlendMode::SourceOver.factors(),
        (BlendFactor::One, BlendFactor::OneMinusSrcAlpha)
    );
    assert_eq!(
        BlendMode::Copy.factors(),
        (BlendFactor::One, BlendFactor::Zero)
    );
    assert_eq!(
        BlendMode::Lighter.factors(),
        (BlendFactor::One, BlendFactor::One)
    );
}

#[test]
fn blend_factor_eval_uses_alphas() {
    assert_eq!(BlendFactor::OneMinusSrcAlpha.eval(0.25, 1.0), 0.75);
    assert_eq!(BlendFactor::DstAlpha.eval(0.25, 0.5), 0.5);
}

#[test]
fn image_id_display_is_prefixed() {
    assert_eq!(ImageId(42).to_string(), "#42");
}

#[test]
fn pixel_rect_byte_len() {
    assert_eq!(PixelRect::new(3, 4, 5, 6).byte_len(), 120);
    assert_eq!(PixelRect::full(2, 2), PixelRect::new(0, 0, 2, 2));
}
