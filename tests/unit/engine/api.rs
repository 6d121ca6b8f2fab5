use super::*;
use crate::graphics::soft::SoftwareDevice;

fn engine() -> Engine<SoftwareDevice> {
    Engine::new(SoftwareDevice::new(), EngineConfig::default())
}

#[test]
#[should_panic(expected = "drawn onto itself")]
fn drawing_onto_itself_panics() {
    let mut e = engine();
    let a = e.create(2, 2).unwrap();
    let _ = e.draw(a, a, &DrawOptions::default());
}

#[test]
#[should_panic(expected = "must be positive")]
fn zero_sized_image_panics() {
    let _ = engine().create(0, 4);
}

#[test]
#[should_panic(expected = "exceeds maximum")]
fn oversized_image_panics() {
    let mut e = Engine::new(
        SoftwareDevice::new(),
        EngineConfig {
            max_image_size: 16,
            ..EngineConfig::default()
        },
    );
    let _ = e.create(17, 1);
}

#[test]
#[should_panic(expected = "exceeds maximum 8")]
fn device_texture_limit_bounds_image_size() {
    let mut e = Engine::new(
        SoftwareDevice::new().with_max_texture_size(8),
        EngineConfig::default(),
    );
    e.create(8, 8).unwrap();
    let _ = e.create(9, 1);
}

#[test]
fn failed_allocation_registers_nothing() {
    let mut dev = SoftwareDevice::new();
    dev.set_allocation_budget(Some(0));
    let mut e = Engine::new(dev, EngineConfig::default());
    let err = e.create(4, 4).unwrap_err();
    assert!(matches!(err, RestoreError::Gpu(_)));
    assert_eq!(e.stats().live_images, 0);
    assert_eq!(e.stats().queued_commands, 0);
}

#[test]
fn disposed_endpoints() {
    let mut e = engine();
    let a = e.create(2, 2).unwrap();
    let b = e.create(2, 2).unwrap();
    e.dispose(b);
    e.dispose(b);
    assert!(!e.contains(b));

    e.draw(b, a, &DrawOptions::default()).unwrap();
    let err = e.draw(a, b, &DrawOptions::default()).unwrap_err();
    assert!(matches!(err, RestoreError::Disposed(id) if id == b));
    assert!(matches!(e.size(b), Err(RestoreError::Disposed(_))));
    e.replace_pixels(b, &[0; 16], PixelRect::full(2, 2)).unwrap();
    assert_eq!(e.read_pixel(b, 0, 0).unwrap(), Rgba8Premul::transparent());
}

#[test]
fn replace_pixels_validates_region() {
    let mut e = engine();
    let a = e.create(4, 4).unwrap();
    for (region, len) in [
        (PixelRect::new(0, 0, 0, 1), 0),
        (PixelRect::new(3, 0, 2, 1), 8),
        (PixelRect::new(0, 0, 2, 2), 15),
        (PixelRect::new(u32::MAX, 0, 2, 1), 8),
    ] {
        let err = e.replace_pixels(a, &vec![0; len], region).unwrap_err();
        assert!(matches!(err, RestoreError::OutOfRange(_)), "{region:?}");
    }
}

#[test]
fn repeated_draws_share_one_command_and_one_history_entry() {
    let mut e = engine();
    let src = e.create(2, 2).unwrap();
    let dst = e.create(8, 8).unwrap();
    e.flush().unwrap();
    for i in 0..4 {
        e.draw(dst, src, &DrawOptions::at(f64::from(i) * 2.0, 0.0))
            .unwrap();
    }
    assert_eq!(e.stats().queued_commands, 1);
    assert_eq!(e.image_state(dst).unwrap().history_len, 1);
}

#[test]
fn degenerate_source_rect_draws_nothing() {
    let mut e = engine();
    let src = e.create(2, 2).unwrap();
    let dst = e.create(2, 2).unwrap();
    e.flush().unwrap();
    let opts = DrawOptions {
        source_rect: Some(SourceRect::new(1, 1, 1, 2)),
        ..DrawOptions::default()
    };
    e.draw(dst, src, &opts).unwrap();
    assert_eq!(e.stats().queued_commands, 0);
    assert!(e.image_state(dst).unwrap().cached);
}

#[test]
fn disabled_restoring_never_tracks_history() {
    let mut e = Engine::new(
        SoftwareDevice::new(),
        EngineConfig {
            restoring_enabled: false,
            ..EngineConfig::default()
        },
    );
    let src = e.create(2, 2).unwrap();
    let dst = e.create(2, 2).unwrap();
    e.draw(dst, src, &DrawOptions::default()).unwrap();
    let state = e.image_state(dst).unwrap();
    assert!(state.stale);
    assert_eq!(state.history_len, 0);

    // Stale images are not read back either.
    e.on_frame_end().unwrap();
    assert!(e.image_state(dst).unwrap().stale);

    e.device_mut().lose_context();
    assert!(!e.is_invalidated().unwrap());
}

#[test]
fn drawing_from_a_fresh_dependent_makes_both_stale() {
    let mut e = engine();
    let a = e.create(2, 2).unwrap();
    let b = e.create(2, 2).unwrap();
    e.draw(b, a, &DrawOptions::default()).unwrap();
    assert_eq!(e.image_state(b).unwrap().history_len, 1);

    // b depends on a, so changing a invalidates b, which is then an untracked source.
    e.draw(a, b, &DrawOptions::default()).unwrap();
    assert!(e.image_state(b).unwrap().stale);
    assert!(e.image_state(a).unwrap().stale);

    e.on_frame_end().unwrap();
    assert_eq!(e.stats().stale_images, 0);
}

#[test]
fn volatile_and_screen_destinations_go_stale_on_draw() {
    let mut e = engine();
    let src = e.create(2, 2).unwrap();
    let scratch = e.create_volatile(2, 2).unwrap();
    let screen = e.create_screen(2, 2).unwrap();
    e.draw(scratch, src, &DrawOptions::default()).unwrap();
    e.draw(screen, src, &DrawOptions::default()).unwrap();
    assert!(e.image_state(scratch).unwrap().stale);
    assert!(e.image_state(screen).unwrap().stale);
    assert_eq!(e.stats().history_entries, 0);
    assert_eq!(e.stats().volatile_images, 1);
}

#[test]
fn screen_fill_and_clear_reach_the_framebuffer() {
    let mut e = engine();
    let screen = e.create_screen(8, 8).unwrap();
    let sprite = e.create(2, 2).unwrap();
    e.fill(sprite, Rgba8::new(255, 0, 0, 255)).unwrap();
    e.draw(screen, sprite, &DrawOptions::at(5.0, 5.0)).unwrap();

    e.fill(screen, Rgba8::new(0, 0, 0, 255)).unwrap();
    let state = e.image_state(screen).unwrap();
    assert!(!state.stale && state.cached);
    assert_eq!(e.read_pixel(screen, 5, 5).unwrap().to_array(), [0, 0, 0, 255]);

    // A later draw forces a readback, which must see the cleared framebuffer.
    e.draw(screen, sprite, &DrawOptions::default()).unwrap();
    assert!(e.image_state(screen).unwrap().stale);
    assert_eq!(e.read_pixel(screen, 1, 1).unwrap().to_array(), [255, 0, 0, 255]);
    assert_eq!(e.read_pixel(screen, 5, 5).unwrap().to_array(), [0, 0, 0, 255]);
    assert_eq!(e.device().stats().clears, 1);

    e.clear(screen).unwrap();
    e.flush().unwrap();
    assert_eq!(e.read_pixels(screen).unwrap(), vec![0; 8 * 8 * 4]);
    assert_eq!(e.device().stats().clears, 2);
}

#[test]
#[should_panic(expected = "screen cannot be used as a draw source")]
fn screen_is_not_a_source() {
    let mut e = engine();
    let screen = e.create_screen(2, 2).unwrap();
    let dst = e.create(2, 2).unwrap();
    let _ = e.draw(dst, screen, &DrawOptions::default());
}

#[test]
fn create_from_image_premultiplies() {
    let mut e = engine();
    let src = image::RgbaImage::from_pixel(2, 1, image::Rgba([200, 100, 0, 128]));
    let id = e.create_from_image(&src).unwrap();
    let px = e.read_pixel(id, 1, 0).unwrap();
    assert_eq!(px.to_array(), [100, 50, 0, 128]);
}

#[test]
fn stats_serialize_to_json() {
    let mut e = engine();
    e.create(1, 1).unwrap();
    let json = e.stats().to_json().unwrap();
    assert!(json.contains("\"live_images\":1"));
}
