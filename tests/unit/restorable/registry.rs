use super::*;
use crate::foundation::config::INDICES_NUM;
use crate::graphics::command::DrawMaterial;
use crate::graphics::soft::SoftwareDevice;
use crate::graphics::vertices::QUAD_FLOATS;
use crate::restorable::image::{HistoryLimits, ImageKind};

struct Fixture {
    dev: SoftwareDevice,
    queue: CommandQueue,
    registry: Registry,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dev: SoftwareDevice::new(),
            queue: CommandQueue::new(INDICES_NUM),
            registry: Registry::new(),
        }
    }

    fn add(&mut self, kind: ImageKind) -> ImageId {
        let id = self.registry.allocate_id();
        let image =
            RestorableImage::allocate(id, 2, 2, kind, &mut self.dev, &mut self.queue).unwrap();
        self.registry.add(image);
        id
    }

    fn depend(&mut self, dst: ImageId, src: ImageId) {
        self.registry.get_mut(dst).unwrap().append_history(
            src,
            &[0.0; QUAD_FLOATS],
            &DrawMaterial::default(),
            HistoryLimits::default(),
        );
        self.registry.note_dependency(src);
    }
}

#[test]
fn ids_are_monotonic_and_never_reused() {
    let mut f = Fixture::new();
    let a = f.add(ImageKind::Regular);
    let b = f.add(ImageKind::Regular);
    assert!(f.registry.remove(b).is_some());
    let c = f.add(ImageKind::Regular);
    assert!(a < b && b < c);
    assert!(!f.registry.contains(b));
    assert_eq!(f.registry.len(), 2);
}

#[test]
fn invalidation_hits_dependents_only() {
    let mut f = Fixture::new();
    let x = f.add(ImageKind::Regular);
    let y = f.add(ImageKind::Regular);
    let uses_x = f.add(ImageKind::Regular);
    let uses_y = f.add(ImageKind::Regular);
    f.depend(uses_x, x);
    f.depend(uses_y, y);

    assert_eq!(f.registry.invalidate_dependents(x), 1);
    assert!(f.registry.get(uses_x).unwrap().is_stale());
    assert!(!f.registry.get(uses_y).unwrap().is_stale());
    assert_eq!(f.registry.get(uses_y).unwrap().history_len(), 1);
}

#[test]
fn memo_skips_repeat_scans_until_a_new_dependency() {
    let mut f = Fixture::new();
    let x = f.add(ImageKind::Regular);
    let d = f.add(ImageKind::Regular);
    assert_eq!(f.registry.invalidate_dependents(x), 0);
    assert_eq!(f.registry.last_checked, Some(x));

    f.depend(d, x);
    assert_eq!(f.registry.last_checked, None);
    assert_eq!(f.registry.invalidate_dependents(x), 1);
    assert_eq!(f.registry.invalidate_dependents(x), 0);
}

#[test]
fn restore_order_puts_sources_first() {
    let mut f = Fixture::new();
    let a = f.add(ImageKind::Regular);
    let b = f.add(ImageKind::Regular);
    let c = f.add(ImageKind::Regular);
    let d = f.add(ImageKind::Regular);
    // a <- b <- c <- d, declared against id order.
    f.depend(a, b);
    f.depend(b, c);
    f.depend(c, d);
    assert_eq!(f.registry.restore_order().unwrap(), vec![d, c, b, a]);
}

#[test]
fn stale_images_have_no_ordering_constraints() {
    let mut f = Fixture::new();
    let a = f.add(ImageKind::Regular);
    let b = f.add(ImageKind::Regular);
    f.depend(a, b);
    f.registry.get_mut(a).unwrap().make_stale("test");
    assert_eq!(f.registry.restore_order().unwrap(), vec![a, b]);
}

#[test]
fn dependency_cycle_is_an_invariant_violation() {
    let mut f = Fixture::new();
    let a = f.add(ImageKind::Regular);
    let b = f.add(ImageKind::Regular);
    let free = f.add(ImageKind::Regular);
    f.depend(a, b);
    f.depend(b, a);
    let err = f.registry.restore_order().unwrap_err();
    assert!(err.is_invariant());
    assert!(err.to_string().contains(&a.to_string()));
    assert!(!err.to_string().contains(&free.to_string()));
}

#[test]
fn restore_all_counts_every_image() {
    let mut f = Fixture::new();
    let a = f.add(ImageKind::Regular);
    let b = f.add(ImageKind::Regular);
    f.add(ImageKind::Volatile);
    f.add(ImageKind::Screen);
    f.depend(a, b);
    f.queue.flush(&mut f.dev).unwrap();

    f.dev.lose_context();
    f.queue.discard();
    f.dev.reset_context().unwrap();
    let restored = f.registry.restore_all(&mut f.queue, &mut f.dev).unwrap();
    assert_eq!(restored, 4);
    assert!(f.registry.iter().all(|img| !img.is_stale()));
    assert_eq!(f.registry.get(a).unwrap().history_len(), 0);
}

#[test]
fn resolve_stale_reads_back_regular_images_only() {
    let mut f = Fixture::new();
    let regular = f.add(ImageKind::Regular);
    let volatile = f.add(ImageKind::Volatile);
    f.registry.get_mut(regular).unwrap().make_stale("test");
    f.registry.get_mut(volatile).unwrap().make_stale("test");

    let resolved = f.registry.resolve_stale(&mut f.queue, &mut f.dev).unwrap();
    assert_eq!(resolved, 1);
    let state = f.registry.get(regular).unwrap().state();
    assert!(!state.stale && state.cached);
    assert!(f.registry.get(volatile).unwrap().is_stale());
    assert_eq!(f.dev.stats().readbacks, 1);
}
