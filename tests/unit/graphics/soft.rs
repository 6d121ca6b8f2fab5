use super::*;
use crate::foundation::core::Affine;
use crate::graphics::vertices::{QUAD_INDICES, SourceRect, VertexRing};

fn solid(width: u32, height: u32, px: [u8; 4]) -> Vec<u8> {
    px.repeat((width * height) as usize)
}

fn draw(
    dev: &mut SoftwareDevice,
    dst: RenderTarget,
    src: TextureId,
    (src_w, src_h): (u32, u32),
    rect: SourceRect,
    geo: Affine,
    blend: BlendMode,
    filter: Filter,
) -> RestoreResult<()> {
    let mut ring = VertexRing::new(1);
    let vs = ring
        .quad(src_w, src_h, rect, None, &geo)
        .expect("non-degenerate rect")
        .to_vec();
    dev.upload_buffers(&vs, &QUAD_INDICES)?;
    let color = ColorMatrix::identity();
    dev.draw_indexed(&DrawCall {
        target: dst,
        source: src,
        index_offset_bytes: 0,
        index_count: QUAD_INDICES.len(),
        color: &color,
        blend,
        filter,
    })
}

#[test]
fn textures_are_power_of_two_and_zeroed() {
    let mut dev = SoftwareDevice::new();
    let t = dev.create_texture(3, 3).unwrap();
    let px = dev.read_pixels(RenderTarget::Texture(t), 4, 4).unwrap();
    assert_eq!(px, vec![0; 64]);
    assert!(dev.read_pixels(RenderTarget::Texture(t), 5, 4).is_err());
}

#[test]
fn upload_validates_region_and_length() {
    let mut dev = SoftwareDevice::new();
    let t = dev.create_texture(2, 2).unwrap();
    dev.upload_sub_image(t, PixelRect::new(1, 1, 1, 1), &[9, 8, 7, 255])
        .unwrap();
    let px = dev.read_pixels(RenderTarget::Texture(t), 2, 2).unwrap();
    assert_eq!(&px[12..16], &[9, 8, 7, 255]);
    assert_eq!(&px[0..12], &[0; 12]);

    let err = dev
        .upload_sub_image(t, PixelRect::new(1, 1, 2, 1), &[0; 8])
        .unwrap_err();
    assert!(matches!(err, RestoreError::OutOfRange(_)));
    let err = dev
        .upload_sub_image(t, PixelRect::new(0, 0, 1, 1), &[0; 3])
        .unwrap_err();
    assert!(matches!(err, RestoreError::OutOfRange(_)));
}

#[test]
fn quad_triangles_cover_each_pixel_once() {
    let mut dev = SoftwareDevice::new();
    let src = dev.create_texture(2, 2).unwrap();
    dev.upload_sub_image(src, PixelRect::full(2, 2), &solid(2, 2, [10, 10, 10, 10]))
        .unwrap();
    let dst = dev.create_texture(8, 4).unwrap();
    let target = RenderTarget::Texture(dst);

    for dx in [0.0, 2.0] {
        draw(
            &mut dev,
            target,
            src,
            (2, 2),
            SourceRect::whole(2, 2),
            Affine::translate((dx, 1.0)),
            BlendMode::Lighter,
            Filter::Nearest,
        )
        .unwrap();
    }

    let px = dev.read_pixels(target, 8, 4).unwrap();
    for y in 0..4 {
        for x in 0..8 {
            let expected = if (0..4).contains(&x) && (1..3).contains(&y) {
                10
            } else {
                0
            };
            let i = (y * 8 + x) * 4;
            assert_eq!(px[i..i + 4], [expected; 4], "pixel ({x}, {y})");
        }
    }
}

#[test]
fn nearest_copy_is_exact() {
    let mut dev = SoftwareDevice::new();
    let src = dev.create_texture(3, 2).unwrap();
    let pixels: Vec<u8> = (0..24).map(|i| (i * 10) as u8).collect();
    dev.upload_sub_image(src, PixelRect::full(3, 2), &pixels)
        .unwrap();
    let dst = dev.create_texture(3, 2).unwrap();
    dev.upload_sub_image(dst, PixelRect::full(3, 2), &solid(3, 2, [1, 2, 3, 4]))
        .unwrap();
    draw(
        &mut dev,
        RenderTarget::Texture(dst),
        src,
        (3, 2),
        SourceRect::whole(3, 2),
        Affine::IDENTITY,
        BlendMode::Copy,
        Filter::Nearest,
    )
    .unwrap();
    assert_eq!(
        dev.read_pixels(RenderTarget::Texture(dst), 3, 2).unwrap(),
        pixels
    );
}

#[test]
fn linear_sampling_stays_inside_the_source_rect() {
    let mut dev = SoftwareDevice::new();
    let src = dev.create_texture(4, 4).unwrap();
    let mut pixels = Vec::new();
    for _y in 0..4 {
        for x in 0..4 {
            pixels.extend_from_slice(if x < 2 {
                &[255, 0, 0, 255]
            } else {
                &[0, 0, 255, 255]
            });
        }
    }
    dev.upload_sub_image(src, PixelRect::full(4, 4), &pixels)
        .unwrap();
    let dst = dev.create_texture(4, 8).unwrap();
    draw(
        &mut dev,
        RenderTarget::Texture(dst),
        src,
        (4, 4),
        SourceRect::new(0, 0, 2, 4),
        Affine::scale(2.0),
        BlendMode::SourceOver,
        Filter::Linear,
    )
    .unwrap();

    let out = dev.read_pixels(RenderTarget::Texture(dst), 4, 8).unwrap();
    for px in out.chunks_exact(4) {
        assert!(px[0] >= 254, "red channel {px:?}");
        assert_eq!(px[2], 0, "blue bled in: {px:?}");
    }
}

#[test]
fn drawing_onto_the_source_is_rejected() {
    let mut dev = SoftwareDevice::new();
    let t = dev.create_texture(2, 2).unwrap();
    let err = draw(
        &mut dev,
        RenderTarget::Texture(t),
        t,
        (2, 2),
        SourceRect::whole(2, 2),
        Affine::IDENTITY,
        BlendMode::SourceOver,
        Filter::Nearest,
    )
    .unwrap_err();
    assert!(matches!(err, RestoreError::Gpu(_)));
    assert_eq!(dev.live_textures(), 1);
}

#[test]
fn screen_framebuffer_keeps_exact_size() {
    let mut dev = SoftwareDevice::new();
    let fb = dev.screen_framebuffer(3, 5).unwrap();
    assert_eq!(
        dev.read_pixels(RenderTarget::Screen(fb), 3, 5).unwrap().len(),
        60
    );
    assert!(dev.read_pixels(RenderTarget::Screen(fb), 4, 5).is_err());
    dev.delete_framebuffer(fb);
    assert_eq!(dev.live_framebuffers(), 0);
    assert_eq!(dev.stats().framebuffers_deleted, 1);
}

#[test]
fn context_loss_drops_everything_until_reset() {
    let mut dev = SoftwareDevice::new();
    let t = dev.create_texture(2, 2).unwrap();
    dev.lose_context();
    assert!(dev.is_context_lost());
    assert_eq!(dev.live_textures(), 0);
    assert!(dev.read_pixels(RenderTarget::Texture(t), 2, 2).is_err());
    assert!(dev.create_texture(2, 2).is_err());

    dev.reset_context().unwrap();
    assert!(!dev.is_context_lost());
    let fresh = dev.create_texture(2, 2).unwrap();
    assert_ne!(fresh, t);
}

#[test]
fn allocation_budget_and_size_limit() {
    let mut dev = SoftwareDevice::new().with_max_texture_size(8);
    assert!(dev.create_texture(9, 1).is_err());
    dev.set_allocation_budget(Some(1));
    dev.create_texture(8, 8).unwrap();
    assert!(dev.create_texture(1, 1).is_err());
    dev.set_allocation_budget(None);
    dev.create_texture(1, 1).unwrap();
    assert_eq!(dev.stats().textures_created, 2);
}

#[test]
fn clear_target_covers_textures_and_the_screen() {
    let mut dev = SoftwareDevice::new();
    let tex = RenderTarget::Texture(dev.create_texture(3, 2).unwrap());
    let screen = RenderTarget::Screen(dev.screen_framebuffer(3, 2).unwrap());
    let red = Rgba8Premul::from_straight_rgba(255, 0, 0, 255);

    dev.clear_target(tex, red).unwrap();
    dev.clear_target(screen, Rgba8Premul::from_straight_rgba(0, 0, 0, 255))
        .unwrap();
    // The padded texture is cleared beyond the logical size too.
    assert_eq!(dev.read_pixels(tex, 4, 2).unwrap(), solid(4, 2, [255, 0, 0, 255]));
    assert_eq!(dev.read_pixels(screen, 3, 2).unwrap(), solid(3, 2, [0, 0, 0, 255]));
    assert_eq!(dev.stats().clears, 2);

    dev.lose_context();
    assert!(dev.clear_target(screen, red).is_err());
}
